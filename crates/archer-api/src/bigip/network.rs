// L2/L3 objects: VLANs, route domains, self-IPs, partitions.
//
// All objects live in the `Common` partition. Object paths use the
// iControl `~Common~name` form.

use serde_json::json;
use tracing::debug;

use super::client::BigIpClient;
use super::models::{
    Collection, FailoverStatus, Partition, RouteDomain, SelfIp, Vlan, VlanInterface,
};
use crate::device::FailoverState;
use crate::error::Error;
use crate::naming::{self, PARTITION};

const VLAN_PATH: &str = "mgmt/tm/net/vlan";
const ROUTE_DOMAIN_PATH: &str = "mgmt/tm/net/route-domain";
const SELF_IP_PATH: &str = "mgmt/tm/net/self";
const PARTITION_PATH: &str = "mgmt/tm/auth/partition";
const FAILOVER_PATH: &str = "mgmt/tm/sys/failover";
const TRAFFIC_GROUP: &str = "/Common/traffic-group-local-only";

fn object_path(collection: &str, name: &str) -> String {
    format!("{collection}/~{PARTITION}~{name}")
}

/// Self-IP address in route-domain notation: `ip%rd/prefix`.
pub(crate) fn scoped_address(address: &str, segment: u16) -> String {
    match address.split_once('/') {
        Some((ip, prefix)) => format!("{ip}%{segment}/{prefix}"),
        None => format!("{address}%{segment}"),
    }
}

impl BigIpClient {
    // ── VLANs ────────────────────────────────────────────────────────

    pub async fn get_vlan(&self, segment: u16) -> Result<Option<Vlan>, Error> {
        self.get_optional(&object_path(VLAN_PATH, &naming::vlan_name(segment)))
            .await
    }

    pub async fn list_vlan_objects(&self) -> Result<Vec<Vlan>, Error> {
        let page: Collection<Vlan> = self.get(VLAN_PATH).await?;
        Ok(page.items)
    }

    /// Create the segment VLAN, or align its MTU when it already exists.
    ///
    /// With a physical interface configured the VLAN is tagged on it;
    /// VCMP guests create an untagged-interface VLAN inherited from the host.
    pub async fn create_or_update_vlan(&self, segment: u16, mtu: u32) -> Result<(), Error> {
        let name = naming::vlan_name(segment);
        if let Some(existing) = self.get_vlan(segment).await? {
            if existing.mtu != Some(mtu) {
                debug!(device = %self.name(), vlan = %name, mtu, "updating VLAN MTU");
                self.patch(&object_path(VLAN_PATH, &name), &json!({ "mtu": mtu }))
                    .await?;
            }
            return Ok(());
        }

        let mut body = json!({
            "name": name,
            "partition": PARTITION,
            "tag": segment,
            "mtu": mtu,
        });
        if let Some(interface) = &self.options().physical_interface {
            body["interfaces"] = json!([{ "name": interface, "tagged": true }]);
        }
        debug!(device = %self.name(), vlan = %name, "creating VLAN");
        self.post(VLAN_PATH, &body).await.map(|_| ())
    }

    /// Tag the segment VLAN on the configured physical interface.
    pub async fn attach_vlan_interface(&self, segment: u16) -> Result<(), Error> {
        let Some(interface) = &self.options().physical_interface else {
            return Ok(());
        };
        let path = format!(
            "{}/interfaces",
            object_path(VLAN_PATH, &naming::vlan_name(segment))
        );
        let attached: Collection<VlanInterface> = self.get(&path).await?;
        if attached.items.iter().any(|i| &i.name == interface) {
            return Ok(());
        }
        debug!(device = %self.name(), segment, %interface, "tagging VLAN on interface");
        self.post(&path, &json!({ "name": interface, "tagged": true }))
            .await
            .map(|_| ())
    }

    pub async fn remove_vlan(&self, segment: u16) -> Result<(), Error> {
        self.delete(&object_path(VLAN_PATH, &naming::vlan_name(segment)))
            .await
    }

    // ── Route domains ────────────────────────────────────────────────

    pub async fn list_route_domain_objects(&self) -> Result<Vec<RouteDomain>, Error> {
        let page: Collection<RouteDomain> = self.get(ROUTE_DOMAIN_PATH).await?;
        Ok(page.items)
    }

    /// Create route domain `vlan-<segment>` with id = segment, bound to the
    /// segment VLAN and optionally nested under a parent segment.
    pub async fn create_route_domain(&self, segment: u16, parent: Option<u16>) -> Result<(), Error> {
        let name = naming::route_domain_name(segment);
        let path = object_path(ROUTE_DOMAIN_PATH, &name);
        if self.get_optional::<RouteDomain>(&path).await?.is_some() {
            return Ok(());
        }

        let mut body = json!({
            "name": name,
            "partition": PARTITION,
            "id": segment,
            "vlans": [naming::vlan_path(segment)],
            "strict": "disabled",
        });
        if let Some(parent) = parent {
            body["parent"] = json!(format!("/{PARTITION}/{}", naming::route_domain_name(parent)));
        }
        debug!(device = %self.name(), route_domain = %name, ?parent, "creating route domain");
        self.post(ROUTE_DOMAIN_PATH, &body).await.map(|_| ())
    }

    pub async fn remove_route_domain(&self, segment: u16) -> Result<(), Error> {
        self.delete(&object_path(
            ROUTE_DOMAIN_PATH,
            &naming::route_domain_name(segment),
        ))
        .await
    }

    // ── Self-IPs ─────────────────────────────────────────────────────

    pub async fn list_self_ip_objects(&self) -> Result<Vec<SelfIp>, Error> {
        let page: Collection<SelfIp> = self.get(SELF_IP_PATH).await?;
        Ok(page.items)
    }

    pub async fn create_self_ip(&self, name: &str, address: &str, segment: u16) -> Result<(), Error> {
        let path = object_path(SELF_IP_PATH, name);
        if self.get_optional::<SelfIp>(&path).await?.is_some() {
            return Ok(());
        }

        let body = json!({
            "name": name,
            "partition": PARTITION,
            "address": scoped_address(address, segment),
            "vlan": naming::vlan_path(segment),
            "trafficGroup": TRAFFIC_GROUP,
            "allowService": "none",
        });
        debug!(device = %self.name(), self_ip = name, "creating self-IP");
        self.post(SELF_IP_PATH, &body).await.map(|_| ())
    }

    pub async fn remove_self_ip(&self, name: &str) -> Result<(), Error> {
        self.delete(&object_path(SELF_IP_PATH, name)).await
    }

    // ── Partitions / HA ──────────────────────────────────────────────

    pub async fn list_partition_objects(&self) -> Result<Vec<Partition>, Error> {
        let page: Collection<Partition> = self.get(PARTITION_PATH).await?;
        Ok(page.items)
    }

    /// Failover state from `tmsh show sys failover` (`Failover active`).
    pub async fn get_failover_state(&self) -> Result<FailoverState, Error> {
        let status: FailoverStatus = self.get(FAILOVER_PATH).await?;
        Ok(parse_failover(&status.api_raw_values.api_anonymous))
    }
}

pub(crate) fn parse_failover(raw: &str) -> FailoverState {
    let state = raw
        .trim()
        .strip_prefix("Failover")
        .unwrap_or(raw)
        .trim()
        .to_ascii_lowercase();
    match state.as_str() {
        "active" => FailoverState::Active,
        "standby" => FailoverState::Standby,
        _ => FailoverState::Other(state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_ip_address_gets_route_domain() {
        assert_eq!(scoped_address("10.0.0.5/24", 42), "10.0.0.5%42/24");
        assert_eq!(scoped_address("10.0.0.5", 42), "10.0.0.5%42");
    }

    #[test]
    fn failover_text_parses() {
        assert_eq!(parse_failover("Failover active"), FailoverState::Active);
        assert_eq!(parse_failover("Failover standby\n"), FailoverState::Standby);
        assert_eq!(
            parse_failover("Failover offline"),
            FailoverState::Other("offline".into())
        );
    }
}
