// VLANs, LAG trunk membership and tenant VLAN assignment.

use std::collections::BTreeSet;

use tracing::{debug, info};

use super::client::F5OsClient;
use super::models::{
    TenantVlans, TrunkVlans, TrunkVlansDocument, VlanConfig, VlanEntry, VlanList, VlansDocument,
};
use crate::error::Error;
use crate::naming;

const VLANS_PATH: &str = "api/data/openconfig-vlan:vlans";
const INTERFACES_PATH: &str = "api/data/openconfig-interfaces:interfaces";
const TENANTS_PATH: &str = "api/data/f5-tenants:tenants";

impl F5OsClient {
    fn trunk_path(&self) -> Result<String, Error> {
        let interface = self
            .options()
            .interface
            .as_deref()
            .ok_or(Error::UnsupportedOperation("trunk VLANs without an interface"))?;
        Ok(format!(
            "{INTERFACES_PATH}/interface={interface}/openconfig-if-aggregate:aggregation/openconfig-vlan:switched-vlan/config"
        ))
    }

    fn tenant_vlans_path(&self) -> Result<String, Error> {
        let tenant = self
            .options()
            .tenant
            .as_deref()
            .ok_or(Error::UnsupportedOperation("tenant VLANs without a tenant"))?;
        Ok(format!("{TENANTS_PATH}/tenant={tenant}/config/vlans"))
    }

    pub async fn list_vlan_entries(&self) -> Result<Vec<VlanEntry>, Error> {
        let doc: VlansDocument = self.get(VLANS_PATH).await?;
        Ok(doc.vlans.vlan)
    }

    /// Create (or rename into place) the segment VLAN.
    pub async fn create_vlan(&self, segment: u16) -> Result<(), Error> {
        let doc = VlansDocument {
            vlans: VlanList {
                vlan: vec![VlanEntry {
                    vlan_id: segment,
                    config: VlanConfig {
                        vlan_id: segment,
                        name: naming::vlan_name(segment),
                    },
                }],
            },
        };
        debug!(device = %self.name(), segment, "ensuring VLAN");
        self.patch(VLANS_PATH, &doc).await
    }

    pub async fn remove_vlan(&self, segment: u16) -> Result<(), Error> {
        self.delete(&format!("{VLANS_PATH}/vlan={segment}")).await
    }

    pub async fn add_trunk_vlan(&self, segment: u16) -> Result<(), Error> {
        let path = self.trunk_path()?;
        let doc = TrunkVlansDocument {
            config: TrunkVlans {
                trunk_vlans: vec![segment],
            },
        };
        self.patch(&path, &doc).await
    }

    pub async fn remove_trunk_vlan(&self, segment: u16) -> Result<(), Error> {
        let path = self.trunk_path()?;
        self.delete(&format!("{path}/trunk-vlans={segment}")).await
    }

    pub async fn tenant_vlans(&self) -> Result<Vec<u16>, Error> {
        let path = self.tenant_vlans_path()?;
        let doc: TenantVlans = self.get(&path).await?;
        Ok(doc.vlans)
    }

    pub async fn add_tenant_vlan(&self, segment: u16) -> Result<(), Error> {
        let path = self.tenant_vlans_path()?;
        self.patch(
            &path,
            &TenantVlans {
                vlans: vec![segment],
            },
        )
        .await
    }

    pub async fn remove_tenant_vlan(&self, segment: u16) -> Result<(), Error> {
        let path = self.tenant_vlans_path()?;
        self.delete(&format!("{path}={segment}")).await
    }

    /// Make the tenant's agent-managed VLANs exactly the used segments that
    /// exist on the chassis.
    ///
    /// A VLAN is agent-managed when its configured name follows the
    /// `vlan-<segment>` convention; others are left assigned.
    pub async fn sync_tenant_vlans(&self, used: &BTreeSet<u16>) -> Result<(), Error> {
        let entries = self.list_vlan_entries().await?;
        let existing: BTreeSet<u16> = entries.iter().map(|v| v.vlan_id).collect();
        let managed: BTreeSet<u16> = entries
            .iter()
            .filter(|v| naming::segment_from_name(&v.config.name) == Some(v.vlan_id))
            .map(|v| v.vlan_id)
            .collect();
        let assigned: BTreeSet<u16> = self.tenant_vlans().await?.into_iter().collect();

        let (add, remove) = tenant_vlan_changes(&assigned, &managed, &existing, used);
        if add.is_empty() && remove.is_empty() {
            return Ok(());
        }
        info!(device = %self.name(), ?add, ?remove, "syncing tenant VLANs");
        for segment in remove {
            self.remove_tenant_vlan(segment).await?;
        }
        if !add.is_empty() {
            let path = self.tenant_vlans_path()?;
            self.patch(&path, &TenantVlans { vlans: add }).await?;
        }
        Ok(())
    }
}

/// VLAN ids to add to and remove from a tenant. Only VLANs that exist on
/// the chassis are added.
pub(crate) fn tenant_vlan_changes(
    assigned: &BTreeSet<u16>,
    managed: &BTreeSet<u16>,
    existing: &BTreeSet<u16>,
    used: &BTreeSet<u16>,
) -> (Vec<u16>, Vec<u16>) {
    let add = used
        .iter()
        .filter(|id| existing.contains(id) && !assigned.contains(id))
        .copied()
        .collect();
    let remove = assigned
        .iter()
        .filter(|id| managed.contains(id) && !used.contains(id))
        .copied()
        .collect();
    (add, remove)
}
