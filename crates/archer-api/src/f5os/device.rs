use std::collections::BTreeSet;

use async_trait::async_trait;

use super::client::F5OsClient;
use crate::as3::As3;
use crate::device::{Device, DeviceKind, FailoverState, RouteDomainInfo, SelfIpInfo, VlanInfo};
use crate::error::Error;

/// F5OS is only ever a VCMP chassis: VLANs, trunks and tenant VLANs.
#[async_trait]
impl Device for F5OsClient {
    fn kind(&self) -> DeviceKind {
        DeviceKind::F5Os
    }

    fn name(&self) -> &str {
        F5OsClient::name(self)
    }

    async fn failover_state(&self) -> Result<FailoverState, Error> {
        Err(Error::UnsupportedOperation("failover state on F5OS"))
    }

    async fn post_declaration(&self, _declaration: &As3) -> Result<(), Error> {
        Err(Error::UnsupportedOperation("AS3 declarations on F5OS"))
    }

    async fn ensure_vlan(&self, segment: u16, _mtu: u32) -> Result<(), Error> {
        self.create_vlan(segment).await
    }

    async fn ensure_interface_vlan(&self, segment: u16) -> Result<(), Error> {
        self.add_trunk_vlan(segment).await
    }

    async fn ensure_guest_vlan(&self, segment: u16) -> Result<(), Error> {
        self.add_tenant_vlan(segment).await
    }

    async fn ensure_route_domain(&self, _segment: u16, _parent: Option<u16>) -> Result<(), Error> {
        Err(Error::UnsupportedOperation("route domains on F5OS"))
    }

    async fn ensure_self_ip(&self, _name: &str, _address: &str, _segment: u16) -> Result<(), Error> {
        Err(Error::UnsupportedOperation("self-IPs on F5OS"))
    }

    async fn sync_guest_vlans(&self, used: &BTreeSet<u16>) -> Result<(), Error> {
        self.sync_tenant_vlans(used).await
    }

    async fn delete_vlan(&self, segment: u16) -> Result<(), Error> {
        self.remove_vlan(segment).await
    }

    async fn delete_interface_vlan(&self, segment: u16) -> Result<(), Error> {
        self.remove_trunk_vlan(segment).await
    }

    async fn delete_guest_vlan(&self, segment: u16) -> Result<(), Error> {
        self.remove_tenant_vlan(segment).await
    }

    async fn delete_route_domain(&self, _segment: u16) -> Result<(), Error> {
        Err(Error::UnsupportedOperation("route domains on F5OS"))
    }

    async fn delete_self_ip(&self, _name: &str) -> Result<(), Error> {
        Err(Error::UnsupportedOperation("self-IPs on F5OS"))
    }

    async fn list_partitions(&self) -> Result<Vec<String>, Error> {
        Err(Error::UnsupportedOperation("partitions on F5OS"))
    }

    async fn list_vlans(&self) -> Result<Vec<VlanInfo>, Error> {
        Ok(self
            .list_vlan_entries()
            .await?
            .into_iter()
            .map(|v| VlanInfo {
                name: v.config.name,
                tag: Some(v.vlan_id),
            })
            .collect())
    }

    async fn list_route_domains(&self) -> Result<Vec<RouteDomainInfo>, Error> {
        Err(Error::UnsupportedOperation("route domains on F5OS"))
    }

    async fn list_self_ips(&self) -> Result<Vec<SelfIpInfo>, Error> {
        Err(Error::UnsupportedOperation("self-IPs on F5OS"))
    }
}
