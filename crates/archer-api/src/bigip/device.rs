use std::collections::BTreeSet;

use async_trait::async_trait;

use super::client::BigIpClient;
use crate::as3::As3;
use crate::device::{Device, DeviceKind, FailoverState, RouteDomainInfo, SelfIpInfo, VlanInfo};
use crate::error::Error;

#[async_trait]
impl Device for BigIpClient {
    fn kind(&self) -> DeviceKind {
        DeviceKind::BigIp
    }

    fn name(&self) -> &str {
        BigIpClient::name(self)
    }

    async fn failover_state(&self) -> Result<FailoverState, Error> {
        self.get_failover_state().await
    }

    async fn post_declaration(&self, declaration: &As3) -> Result<(), Error> {
        self.declare(declaration).await
    }

    async fn ensure_vlan(&self, segment: u16, mtu: u32) -> Result<(), Error> {
        self.create_or_update_vlan(segment, mtu).await
    }

    async fn ensure_interface_vlan(&self, segment: u16) -> Result<(), Error> {
        self.attach_vlan_interface(segment).await
    }

    async fn ensure_guest_vlan(&self, segment: u16) -> Result<(), Error> {
        self.add_guest_vlan(segment).await
    }

    async fn ensure_route_domain(&self, segment: u16, parent: Option<u16>) -> Result<(), Error> {
        self.create_route_domain(segment, parent).await
    }

    async fn ensure_self_ip(&self, name: &str, address: &str, segment: u16) -> Result<(), Error> {
        self.create_self_ip(name, address, segment).await
    }

    async fn sync_guest_vlans(&self, used: &BTreeSet<u16>) -> Result<(), Error> {
        self.sync_guest_vlan_set(used).await
    }

    async fn delete_vlan(&self, segment: u16) -> Result<(), Error> {
        self.remove_vlan(segment).await
    }

    async fn delete_interface_vlan(&self, _segment: u16) -> Result<(), Error> {
        // Interface tagging goes away with the VLAN itself.
        Ok(())
    }

    async fn delete_guest_vlan(&self, segment: u16) -> Result<(), Error> {
        self.remove_guest_vlan(segment).await
    }

    async fn delete_route_domain(&self, segment: u16) -> Result<(), Error> {
        self.remove_route_domain(segment).await
    }

    async fn delete_self_ip(&self, name: &str) -> Result<(), Error> {
        self.remove_self_ip(name).await
    }

    async fn list_partitions(&self) -> Result<Vec<String>, Error> {
        Ok(self
            .list_partition_objects()
            .await?
            .into_iter()
            .map(|p| p.name)
            .collect())
    }

    async fn list_vlans(&self) -> Result<Vec<VlanInfo>, Error> {
        Ok(self
            .list_vlan_objects()
            .await?
            .into_iter()
            .map(|v| VlanInfo {
                name: v.name,
                tag: v.tag,
            })
            .collect())
    }

    async fn list_route_domains(&self) -> Result<Vec<RouteDomainInfo>, Error> {
        Ok(self
            .list_route_domain_objects()
            .await?
            .into_iter()
            .map(|rd| RouteDomainInfo {
                name: rd.name,
                id: rd.id,
            })
            .collect())
    }

    async fn list_self_ips(&self) -> Result<Vec<SelfIpInfo>, Error> {
        Ok(self
            .list_self_ip_objects()
            .await?
            .into_iter()
            .map(|s| SelfIpInfo {
                name: s.name,
                address: s.address,
                vlan: s.vlan,
            })
            .collect())
    }
}
