// Deterministic object names shared by every device family.
//
// Names double as ownership markers: the orphan sweep only ever touches
// objects that parse back through these helpers.

use uuid::Uuid;

pub const PARTITION: &str = "Common";
const VLAN_PREFIX: &str = "vlan-";
const SELF_IP_PREFIX: &str = "selfip-";
const NETWORK_TENANT_PREFIX: &str = "net-";

/// VLAN object name for a segment.
pub fn vlan_name(segment: u16) -> String {
    format!("{VLAN_PREFIX}{segment}")
}

/// Full BIG-IP path of a segment's VLAN.
pub fn vlan_path(segment: u16) -> String {
    format!("/{PARTITION}/{}", vlan_name(segment))
}

/// Route domains reuse the VLAN name; the numeric id is the segment.
pub fn route_domain_name(segment: u16) -> String {
    vlan_name(segment)
}

/// Self-IP object name for the network port backing it.
pub fn self_ip_name(port_id: Uuid) -> String {
    format!("{SELF_IP_PREFIX}{port_id}")
}

/// Declarative tenant name for a destination network.
pub fn network_tenant_name(network_id: Uuid) -> String {
    format!("{NETWORK_TENANT_PREFIX}{network_id}")
}

/// Segment encoded in a VLAN or route-domain name (`vlan-<segment>`).
pub fn segment_from_name(name: &str) -> Option<u16> {
    let name = name.rsplit('/').next().unwrap_or(name);
    name.strip_prefix(VLAN_PREFIX)?.parse().ok()
}

/// Port id encoded in a self-IP name (`selfip-<uuid>`).
pub fn port_from_self_ip_name(name: &str) -> Option<Uuid> {
    let name = name.rsplit('/').next().unwrap_or(name);
    Uuid::parse_str(name.strip_prefix(SELF_IP_PREFIX)?).ok()
}

/// Network id encoded in a tenant/partition name (`net-<uuid>`).
pub fn network_from_tenant_name(name: &str) -> Option<Uuid> {
    Uuid::parse_str(name.strip_prefix(NETWORK_TENANT_PREFIX)?).ok()
}
