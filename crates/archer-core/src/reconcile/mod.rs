// ── Reconcilers ──
//
// Each run is one store transaction: lock rows, provision devices, POST
// one tenant, then persist status changes. Ports allocated along the way
// are released again if the transaction does not commit.

pub mod endpoint;
pub mod service;

use tracing::{error, info, warn};

use crate::context::AgentContext;
use crate::error::Result;
use crate::l2::OwnedPorts;
use crate::store::StoreTx;

pub use endpoint::{EndpointSummary, sync_endpoint, sync_network};
pub use service::{ServiceSummary, sync_services};

/// Catch-up scan: refresh the registration heartbeat and the active
/// device, claim unowned services, then reconcile pending services and
/// every network with pending endpoints.
///
/// A failing reconciliation does not stop the others; the first error is
/// returned at the end.
pub async fn pending_sync(ctx: &AgentContext) -> Result<()> {
    ctx.store().register_agent(&ctx.registration()).await?;
    ctx.refresh_active_device().await?;

    let claimed = ctx
        .store()
        .claim_services(ctx.host(), ctx.config().availability_zone.as_deref())
        .await?;
    if claimed > 0 {
        info!(claimed, "claimed services");
    }

    let mut first_error = None;
    if ctx.store().has_pending_services(ctx.host()).await? {
        if let Err(e) = sync_services(ctx).await {
            error!(error = %e, "pending service sync failed");
            first_error.get_or_insert(e);
        }
    }
    for network in ctx.store().pending_endpoint_networks(ctx.host()).await? {
        if let Err(e) = sync_network(ctx, network).await {
            error!(%network, error = %e, "pending endpoint sync failed");
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Commit a successful run; otherwise release owned ports and roll back.
async fn settle<T>(
    ctx: &AgentContext,
    tx: Box<dyn StoreTx>,
    owned: OwnedPorts,
    outcome: Result<T>,
) -> Result<T> {
    match outcome {
        Ok(value) => match tx.commit().await {
            Ok(()) => Ok(value),
            Err(e) => {
                owned.release(ctx).await;
                Err(e)
            }
        },
        Err(e) => {
            if !owned.is_empty() {
                warn!(ports = owned.len(), error = %e, "reconciliation failed, releasing ports");
            }
            owned.release(ctx).await;
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}
