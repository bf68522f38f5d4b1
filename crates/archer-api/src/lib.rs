// archer-api: Async Rust clients for F5 BIG-IP, F5OS and the OpenStack network API

pub mod as3;
pub mod bigip;
pub mod credentials;
pub mod device;
pub mod error;
pub mod f5os;
pub mod naming;
pub mod neutron;
pub mod retry;
pub mod transport;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bigip::{BigIpClient, BigIpOptions};
pub use credentials::Credentials;
pub use device::{
    Device, DeviceKind, DynDevice, FailoverState, RouteDomainInfo, SelfIpInfo, VlanInfo,
};
pub use error::Error;
pub use f5os::{F5OsClient, F5OsOptions};
pub use neutron::{KeystoneAuth, NetworkApi, NeutronClient};
pub use retry::RetryPolicy;
pub use transport::{TlsMode, TransportConfig};
