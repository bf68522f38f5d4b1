// F5OS RESTCONF (yang-data+json) shapes.

use serde::{Deserialize, Serialize};

/// `openconfig-vlan:vlans` container.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct VlansDocument {
    #[serde(rename = "openconfig-vlan:vlans", default)]
    pub vlans: VlanList,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct VlanList {
    #[serde(default)]
    pub vlan: Vec<VlanEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VlanEntry {
    #[serde(rename = "vlan-id")]
    pub vlan_id: u16,
    pub config: VlanConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VlanConfig {
    #[serde(rename = "vlan-id")]
    pub vlan_id: u16,
    #[serde(default)]
    pub name: String,
}

/// Trunk membership of a LAG / interface.
#[derive(Debug, Serialize)]
pub struct TrunkVlansDocument {
    #[serde(rename = "openconfig-vlan:config")]
    pub config: TrunkVlans,
}

#[derive(Debug, Serialize)]
pub struct TrunkVlans {
    #[serde(rename = "trunk-vlans")]
    pub trunk_vlans: Vec<u16>,
}

/// `f5-tenants:vlans` leaf-list of a tenant.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TenantVlans {
    #[serde(rename = "f5-tenants:vlans", default)]
    pub vlans: Vec<u16>,
}
