// Device capability set
//
// One trait, two implementations: the session-based BIG-IP client and the
// token-based F5OS client. Callers hold `Arc<dyn Device>` and only branch
// on the family when constructing sessions.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::as3::As3;
use crate::error::Error;

pub type DynDevice = Arc<dyn Device>;

/// Appliance family behind a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// BIG-IP with iControl REST and AS3 (stateful login session).
    BigIp,
    /// F5OS chassis REST API (JWT bearer token), VCMP host role only.
    F5Os,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BigIp => f.write_str("bigip"),
            Self::F5Os => f.write_str("f5os"),
        }
    }
}

/// HA state reported by a BIG-IP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailoverState {
    Active,
    Standby,
    Other(String),
}

impl FailoverState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// A VLAN as reported by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlanInfo {
    pub name: String,
    pub tag: Option<u16>,
}

/// A route domain as reported by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDomainInfo {
    pub name: String,
    pub id: u16,
}

/// A self-IP as reported by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfIpInfo {
    pub name: String,
    pub address: String,
    pub vlan: String,
}

/// Operations the agent performs on an appliance.
///
/// Every `ensure_*` is idempotent; every `delete_*` treats a missing
/// object as success. Families that cannot perform an operation return
/// [`Error::UnsupportedOperation`].
#[async_trait]
pub trait Device: Send + Sync {
    /// Family of this session.
    fn kind(&self) -> DeviceKind;

    /// Stable device name (management host), used in logs and port names.
    fn name(&self) -> &str;

    /// Current HA state of the device.
    async fn failover_state(&self) -> Result<FailoverState, Error>;

    /// POST a declarative config document.
    async fn post_declaration(&self, declaration: &As3) -> Result<(), Error>;

    async fn ensure_vlan(&self, segment: u16, mtu: u32) -> Result<(), Error>;
    async fn ensure_interface_vlan(&self, segment: u16) -> Result<(), Error>;
    async fn ensure_guest_vlan(&self, segment: u16) -> Result<(), Error>;
    async fn ensure_route_domain(&self, segment: u16, parent: Option<u16>) -> Result<(), Error>;
    async fn ensure_self_ip(&self, name: &str, address: &str, segment: u16) -> Result<(), Error>;

    /// Reconcile guest VLAN membership to exactly the used segments.
    async fn sync_guest_vlans(&self, used: &BTreeSet<u16>) -> Result<(), Error>;

    async fn delete_vlan(&self, segment: u16) -> Result<(), Error>;
    async fn delete_interface_vlan(&self, segment: u16) -> Result<(), Error>;
    async fn delete_guest_vlan(&self, segment: u16) -> Result<(), Error>;
    async fn delete_route_domain(&self, segment: u16) -> Result<(), Error>;
    async fn delete_self_ip(&self, name: &str) -> Result<(), Error>;

    async fn list_partitions(&self) -> Result<Vec<String>, Error>;
    async fn list_vlans(&self) -> Result<Vec<VlanInfo>, Error>;
    async fn list_route_domains(&self) -> Result<Vec<RouteDomainInfo>, Error>;
    async fn list_self_ips(&self) -> Result<Vec<SelfIpInfo>, Error>;
}
