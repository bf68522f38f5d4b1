// VCMP guest VLAN membership on a BIG-IP chassis.

use std::collections::BTreeSet;

use serde_json::json;
use tracing::{debug, info};

use super::client::BigIpClient;
use super::models::VcmpGuest;
use crate::error::Error;
use crate::naming;

const GUEST_PATH: &str = "mgmt/tm/vcmp/guest";

impl BigIpClient {
    fn guest_path(&self) -> Result<String, Error> {
        match &self.options().vcmp_guest {
            Some(guest) => Ok(format!("{GUEST_PATH}/{guest}")),
            None => Err(Error::UnsupportedOperation(
                "guest VLANs on a device without a VCMP guest",
            )),
        }
    }

    pub async fn get_guest(&self) -> Result<VcmpGuest, Error> {
        let path = self.guest_path()?;
        self.get(&path).await
    }

    async fn set_guest_vlans(&self, vlans: &[String]) -> Result<(), Error> {
        let path = self.guest_path()?;
        self.patch(&path, &json!({ "vlans": vlans })).await
    }

    /// Add the segment VLAN to the guest, if missing.
    pub async fn add_guest_vlan(&self, segment: u16) -> Result<(), Error> {
        let guest = self.get_guest().await?;
        let vlan = naming::vlan_path(segment);
        if guest.vlans.contains(&vlan) {
            return Ok(());
        }
        let mut vlans = guest.vlans;
        vlans.push(vlan);
        debug!(device = %self.name(), guest = %guest.name, segment, "adding guest VLAN");
        self.set_guest_vlans(&vlans).await
    }

    pub async fn remove_guest_vlan(&self, segment: u16) -> Result<(), Error> {
        let guest = self.get_guest().await?;
        let before = guest.vlans.len();
        let vlans: Vec<String> = guest
            .vlans
            .into_iter()
            .filter(|v| naming::segment_from_name(v) != Some(segment))
            .collect();
        if vlans.len() == before {
            return Ok(());
        }
        self.set_guest_vlans(&vlans).await
    }

    /// Make the guest's agent-managed VLANs exactly the used segments that
    /// have a VLAN on this host; foreign VLANs stay.
    pub async fn sync_guest_vlan_set(&self, used: &BTreeSet<u16>) -> Result<(), Error> {
        let existing: BTreeSet<u16> = self
            .list_vlan_objects()
            .await?
            .iter()
            .filter_map(|v| naming::segment_from_name(&v.name))
            .collect();
        let available: BTreeSet<u16> = used.intersection(&existing).copied().collect();
        if available.len() < used.len() {
            debug!(
                device = %self.name(),
                missing = ?used.difference(&existing).collect::<Vec<_>>(),
                "skipping guest VLANs without a host VLAN"
            );
        }

        let guest = self.get_guest().await?;
        let desired = merge_guest_vlans(&guest.vlans, &available);
        if desired == guest.vlans {
            return Ok(());
        }
        info!(
            device = %self.name(),
            guest = %guest.name,
            before = guest.vlans.len(),
            after = desired.len(),
            "syncing guest VLANs"
        );
        self.set_guest_vlans(&desired).await
    }
}

/// Keep foreign VLANs in their original order, then the used segments.
pub(crate) fn merge_guest_vlans(current: &[String], used: &BTreeSet<u16>) -> Vec<String> {
    let mut out: Vec<String> = current
        .iter()
        .filter(|v| naming::segment_from_name(v).is_none())
        .cloned()
        .collect();
    out.extend(used.iter().map(|s| naming::vlan_path(*s)));
    out
}
