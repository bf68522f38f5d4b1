// Network-management API (OpenStack Neutron behind Keystone).

pub mod client;
pub mod models;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Error;

pub use client::{KeystoneAuth, NeutronClient};
pub use models::{CreatePort, FixedIp, Network, Port, PortFilter, Segment, Subnet};

/// Network, subnet and port operations the agent needs.
///
/// Missing resources surface as [`Error::NotFound`]; `delete_port` of a
/// missing port succeeds.
#[async_trait]
pub trait NetworkApi: Send + Sync {
    async fn get_network(&self, id: Uuid) -> Result<Network, Error>;
    async fn get_subnet(&self, id: Uuid) -> Result<Subnet, Error>;
    async fn get_port(&self, id: Uuid) -> Result<Port, Error>;
    async fn list_ports(&self, filter: &PortFilter) -> Result<Vec<Port>, Error>;
    async fn create_port(&self, request: &CreatePort) -> Result<Port, Error>;
    async fn delete_port(&self, id: Uuid) -> Result<(), Error>;
}
