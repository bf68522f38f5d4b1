// Endpoint reconciler
//
// Endpoints are grouped by destination network: every endpoint on one
// network lives in the tenant `net-<network>`, so a run triggered for one
// endpoint reconciles all of its siblings.

use std::collections::HashSet;

use archer_api::as3::{As3, Tenant};
use archer_api::{DynDevice, naming};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::settle;
use crate::context::AgentContext;
use crate::declaration::{EndpointSpec, endpoint_tenant};
use crate::error::Result;
use crate::l2::{self, OwnedPorts};
use crate::model::{Endpoint, EndpointPort, EndpointStatus};
use crate::store::StoreTx;

/// What one endpoint run changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointSummary {
    pub declared: usize,
    pub deleted: usize,
    pub failed: usize,
    pub transitioned: usize,
}

/// Reconcile every endpoint sharing the destination network of
/// `endpoint_id`. An endpoint that no longer exists is a no-op.
pub async fn sync_endpoint(ctx: &AgentContext, endpoint_id: Uuid) -> Result<EndpointSummary> {
    let Some(network) = ctx.store().endpoint_network(endpoint_id).await? else {
        debug!(%endpoint_id, "endpoint no longer exists");
        return Ok(EndpointSummary::default());
    };
    sync_network(ctx, network).await
}

/// Reconcile every actionable endpoint on a destination network.
pub async fn sync_network(ctx: &AgentContext, network: Uuid) -> Result<EndpointSummary> {
    let device = ctx.active_device()?;
    let mut tx = ctx.store().begin().await?;
    let mut owned = OwnedPorts::default();
    let outcome = reconcile(ctx, &device, network, tx.as_mut(), &mut owned).await;
    settle(ctx, tx, owned, outcome).await
}

async fn reconcile(
    ctx: &AgentContext,
    device: &DynDevice,
    network: Uuid,
    tx: &mut dyn StoreTx,
    owned: &mut OwnedPorts,
) -> Result<EndpointSummary> {
    let endpoints = tx.lock_endpoints(ctx.host(), network).await?;
    if endpoints.is_empty() {
        debug!(%network, "no actionable endpoints");
        return Ok(EndpointSummary::default());
    }

    let teardown = endpoints.iter().all(Endpoint::is_deleting);
    let segment = if teardown {
        debug!(%network, "only deletions pending, skipping provisioning");
        None
    } else {
        match ctx.cache().segment(network).await {
            Ok(segment) => Some(segment),
            Err(e) if e.is_not_found() => {
                info!(%network, "destination network is gone, removing its tenant");
                None
            }
            Err(e) => return Err(e),
        }
    };
    let network_gone = !teardown && segment.is_none();

    let mut specs = Vec::new();
    let mut failed = HashSet::new();
    if let Some(segment) = segment {
        let mtu = ctx.cache().mtu(network).await?;
        l2::ensure_l2(ctx, segment, None, mtu).await?;
        l2::ensure_self_ips(ctx, network, segment, owned).await?;
        for endpoint in endpoints.iter().filter(|e| e.status.is_declared()) {
            match resolve_port(ctx, tx, endpoint, segment).await? {
                Some(spec) => specs.push(spec),
                None => {
                    failed.insert(endpoint.id);
                }
            }
        }
    }

    let tenant = segment.map_or_else(Tenant::default, |segment| endpoint_tenant(segment, &specs));
    device
        .post_declaration(&As3::single(naming::network_tenant_name(network), tenant))
        .await?;
    info!(device = %device.name(), %network, endpoints = specs.len(), "declared endpoints");

    let mut summary = EndpointSummary {
        declared: specs.len(),
        ..EndpointSummary::default()
    };
    for endpoint in &endpoints {
        if endpoint.is_deleting() || network_gone {
            release_port(ctx, endpoint).await;
            tx.delete_endpoint(endpoint.id).await?;
            info!(endpoint_id = %endpoint.id, "deleted endpoint");
            summary.deleted += 1;
        } else if failed.contains(&endpoint.id) {
            tx.set_endpoint_status(endpoint.id, EndpointStatus::Failed)
                .await?;
            summary.failed += 1;
        } else if let Some(next) = endpoint.status.after_success() {
            tx.set_endpoint_status(endpoint.id, next).await?;
            info!(endpoint_id = %endpoint.id, from = %endpoint.status, to = %next, "endpoint status");
            summary.transitioned += 1;
        }
    }
    Ok(summary)
}

/// Look up the destination port and persist its address, subnet and
/// segment. `None` when the port vanished or carries no address.
async fn resolve_port(
    ctx: &AgentContext,
    tx: &mut dyn StoreTx,
    endpoint: &Endpoint,
    segment: u16,
) -> Result<Option<EndpointSpec>> {
    let port = match ctx.cache().api().get_port(endpoint.port.port_id).await {
        Ok(port) => port,
        Err(e) if e.is_not_found() => {
            warn!(endpoint_id = %endpoint.id, port = %endpoint.port.port_id, "destination port vanished");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    let Some(ip) = port.primary_ip() else {
        warn!(endpoint_id = %endpoint.id, port = %port.id, "destination port has no address");
        return Ok(None);
    };

    let detail = EndpointPort {
        port_id: port.id,
        network_id: port.network_id,
        subnet_id: Some(ip.subnet_id),
        ip_address: Some(ip.ip_address.clone()),
        segment: Some(segment),
        owned: endpoint.port.owned,
    };
    if detail != endpoint.port {
        tx.update_endpoint_port(endpoint.id, &detail).await?;
    }
    Ok(Some(EndpointSpec {
        endpoint: endpoint.clone(),
        ip_address: ip.ip_address.clone(),
    }))
}

/// Best-effort release of an owned destination port.
async fn release_port(ctx: &AgentContext, endpoint: &Endpoint) {
    if !endpoint.port.owned {
        return;
    }
    match ctx.cache().api().delete_port(endpoint.port.port_id).await {
        Ok(()) => debug!(endpoint_id = %endpoint.id, port = %endpoint.port.port_id, "released port"),
        Err(e) => warn!(
            endpoint_id = %endpoint.id,
            port = %endpoint.port.port_id,
            error = %e,
            "failed to release endpoint port"
        ),
    }
    ctx.cache().invalidate_ports(endpoint.port.network_id);
}
