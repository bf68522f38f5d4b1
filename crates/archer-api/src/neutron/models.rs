// Neutron v2.0 resource shapes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Segment {
    #[serde(rename = "provider:network_type", default)]
    pub network_type: Option<String>,
    #[serde(rename = "provider:physical_network", default)]
    pub physical_network: Option<String>,
    #[serde(rename = "provider:segmentation_id", default)]
    pub segmentation_id: Option<u16>,
}

/// A network. Single-segment networks report the provider attributes at
/// top level; multi-segment networks list them in `segments`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Network {
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mtu: Option<u32>,
    #[serde(flatten)]
    pub provider: Segment,
    #[serde(default)]
    pub segments: Vec<Segment>,
}

impl Network {
    /// Segmentation id on the given physical network, if any.
    pub fn segment_on(&self, physical_network: &str) -> Option<u16> {
        std::iter::once(&self.provider)
            .chain(self.segments.iter())
            .find(|s| s.physical_network.as_deref() == Some(physical_network))
            .and_then(|s| s.segmentation_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Subnet {
    pub id: Uuid,
    pub network_id: Uuid,
    pub cidr: String,
    #[serde(default)]
    pub gateway_ip: Option<String>,
}

impl Subnet {
    /// Prefix length of the subnet CIDR.
    pub fn prefix_len(&self) -> Option<u8> {
        self.cidr.split_once('/')?.1.parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedIp {
    pub subnet_id: Uuid,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Port {
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    pub network_id: Uuid,
    #[serde(default)]
    pub fixed_ips: Vec<FixedIp>,
    #[serde(default)]
    pub device_owner: String,
    #[serde(default)]
    pub device_id: String,
}

impl Port {
    /// First fixed IP, which is the one the agent uses.
    pub fn primary_ip(&self) -> Option<&FixedIp> {
        self.fixed_ips.first()
    }
}

/// Body of `POST /v2.0/ports`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatePort {
    pub network_id: Uuid,
    pub name: String,
    pub device_owner: String,
    pub device_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fixed_ips: Vec<FixedIp>,
}

/// Query filter for `GET /v2.0/ports`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortFilter {
    pub network_id: Option<Uuid>,
    pub device_owner: Option<String>,
    pub device_id: Option<String>,
    pub name: Option<String>,
}

impl PortFilter {
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut q = Vec::new();
        if let Some(id) = self.network_id {
            q.push(("network_id", id.to_string()));
        }
        if let Some(owner) = &self.device_owner {
            q.push(("device_owner", owner.clone()));
        }
        if let Some(device) = &self.device_id {
            q.push(("device_id", device.clone()));
        }
        if let Some(name) = &self.name {
            q.push(("name", name.clone()));
        }
        q
    }

    /// Client-side check, used by fakes and to double-check server filtering.
    pub fn matches(&self, port: &Port) -> bool {
        self.network_id.is_none_or(|id| port.network_id == id)
            && self
                .device_owner
                .as_ref()
                .is_none_or(|o| &port.device_owner == o)
            && self.device_id.as_ref().is_none_or(|d| &port.device_id == d)
            && self.name.as_ref().is_none_or(|n| &port.name == n)
    }
}

// ── Envelopes ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct NetworkEnvelope {
    pub network: Network,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubnetEnvelope {
    pub subnet: Subnet,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PortEnvelope {
    pub port: Port,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PortsEnvelope {
    #[serde(default)]
    pub ports: Vec<Port>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreatePortEnvelope<'a> {
    pub port: &'a CreatePort,
}
