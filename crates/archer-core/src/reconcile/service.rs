// Service reconciler
//
// All services of the host share the `Common` tenant, so every run
// declares the full set. Segments are resolved per network; L2, self-IPs
// and SNAT ports are provisioned once per network.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use archer_api::DynDevice;
use archer_api::as3::As3;
use futures_util::future::try_join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::settle;
use crate::context::AgentContext;
use crate::declaration::{COMMON_TENANT, ServiceSpec, service_tenant};
use crate::error::Result;
use crate::l2::{self, OwnedPorts};
use crate::store::StoreTx;

/// What one service run changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceSummary {
    pub declared: usize,
    pub deleted: usize,
    pub transitioned: usize,
}

/// Reconcile every service owned by the host.
pub async fn sync_services(ctx: &AgentContext) -> Result<ServiceSummary> {
    let device = ctx.active_device()?;
    let mut tx = ctx.store().begin().await?;
    let mut owned = OwnedPorts::default();
    let outcome = reconcile(ctx, &device, tx.as_mut(), &mut owned).await;
    settle(ctx, tx, owned, outcome).await
}

async fn reconcile(
    ctx: &AgentContext,
    device: &DynDevice,
    tx: &mut dyn StoreTx,
    owned: &mut OwnedPorts,
) -> Result<ServiceSummary> {
    let services = tx.lock_services(ctx.host()).await?;
    if services.is_empty() {
        debug!("no services to reconcile");
        return Ok(ServiceSummary::default());
    }

    let mut networks: BTreeMap<Uuid, (u16, u32)> = BTreeMap::new();
    for service in services.iter().filter(|s| !s.is_deleting()) {
        if let Entry::Vacant(slot) = networks.entry(service.network_id) {
            let segment = ctx.cache().segment(service.network_id).await?;
            let mtu = ctx.cache().mtu(service.network_id).await?;
            slot.insert((segment, mtu));
        }
    }

    try_join_all(
        networks
            .values()
            .map(|&(segment, mtu)| l2::ensure_l2(ctx, segment, None, mtu)),
    )
    .await?;

    let mut snat_addresses = BTreeMap::new();
    for (&network, &(segment, _)) in &networks {
        l2::ensure_self_ips(ctx, network, segment, owned).await?;
        snat_addresses.insert(network, l2::ensure_snat_ports(ctx, network, owned).await?);
    }

    let specs: Vec<ServiceSpec> = services
        .iter()
        .filter(|s| !s.is_deleting())
        .filter_map(|service| {
            let &(segment, _) = networks.get(&service.network_id)?;
            Some(ServiceSpec {
                service: service.clone(),
                segment,
                snat_addresses: snat_addresses
                    .get(&service.network_id)
                    .cloned()
                    .unwrap_or_default(),
            })
        })
        .collect();

    device
        .post_declaration(&As3::single(COMMON_TENANT, service_tenant(&specs)))
        .await?;
    info!(device = %device.name(), services = specs.len(), "declared services");

    let mut summary = ServiceSummary {
        declared: specs.len(),
        ..ServiceSummary::default()
    };
    for service in services.iter().filter(|s| s.is_deleting()) {
        if !networks.contains_key(&service.network_id) {
            if let Err(e) = l2::cleanup_snat_ports(ctx, service.network_id).await {
                warn!(service_id = %service.id, error = %e, "failed to release SNAT ports");
            }
        }
        tx.delete_service(service.id).await?;
        info!(service_id = %service.id, "deleted service");
        summary.deleted += 1;
    }
    for service in &services {
        if let Some(next) = service.status.after_success() {
            tx.set_service_status(service.id, next).await?;
            info!(service_id = %service.id, from = %service.status, to = %next, "service status");
            summary.transitioned += 1;
        }
    }
    Ok(summary)
}
