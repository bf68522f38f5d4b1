// ── Orphan sweep ──
//
// Daily garbage collection of device objects and network ports that no
// row of the host references any more. The in-use set is built first; if
// that fails nothing is deleted. Each step after that is independent: its
// error is logged and recorded, and the next step runs. Within a step every
// device is attempted even when a sibling fails.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::time::Instant;

use archer_api::as3::{As3, Tenant};
use archer_api::{DynDevice, naming};
use futures_util::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::AgentContext;
use crate::error::{CoreError, Result};
use crate::l2;

/// Segment to network for every network referenced by the host's rows.
///
/// Two networks mapping to the same segment collapse into one entry.
pub type UsedSegments = BTreeMap<u16, Uuid>;

/// What the host's rows still reference.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InUse {
    pub segments: UsedSegments,
    /// Every referenced network, including ones sharing a segment with
    /// another network and ones that could not be resolved.
    pub networks: BTreeSet<Uuid>,
}

/// Outcome of one sweep step.
#[derive(Debug)]
pub struct StepReport {
    pub name: &'static str,
    /// Objects removed (segments torn down for VLANs, chassis synced for
    /// guest VLANs), or the first error of the step.
    pub outcome: std::result::Result<usize, String>,
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub used_segments: usize,
    pub steps: Vec<StepReport>,
}

impl SweepReport {
    pub fn step(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn removed(&self) -> usize {
        self.steps.iter().filter_map(|s| s.outcome.as_ref().ok()).sum()
    }

    pub fn failures(&self) -> usize {
        self.steps.iter().filter(|s| s.outcome.is_err()).count()
    }
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} used segments, {} objects removed, {} failed steps",
            self.used_segments,
            self.removed(),
            self.failures()
        )
    }
}

pub const STEP_SELF_IPS: &str = "orphaned_self_ips";
pub const STEP_ROUTE_DOMAINS: &str = "route_domains";
pub const STEP_VLANS: &str = "vlans";
pub const STEP_GUEST_VLANS: &str = "guest_vlans";
pub const STEP_SELF_IP_PORTS: &str = "self_ip_ports";
pub const STEP_PARTITIONS: &str = "partitions";

/// Run every sweep step.
pub async fn run(ctx: &AgentContext) -> Result<SweepReport> {
    let in_use = in_use(ctx).await?;
    let used = &in_use.segments;
    info!(
        segments = used.len(),
        networks = in_use.networks.len(),
        "orphan sweep started"
    );

    let mut report = SweepReport {
        used_segments: used.len(),
        steps: Vec::with_capacity(6),
    };
    report
        .steps
        .push(step(STEP_SELF_IPS, orphaned_self_ips(ctx)).await);
    report
        .steps
        .push(step(STEP_ROUTE_DOMAINS, unused_route_domains(ctx, used)).await);
    report.steps.push(step(STEP_VLANS, unused_vlans(ctx, used)).await);
    report
        .steps
        .push(step(STEP_GUEST_VLANS, guest_vlans(ctx, used)).await);
    report.steps.push(
        step(
            STEP_SELF_IP_PORTS,
            unused_self_ip_ports(ctx, &in_use.networks),
        )
        .await,
    );
    report
        .steps
        .push(step(STEP_PARTITIONS, unused_partitions(ctx, &in_use.networks)).await);

    info!(%report, "orphan sweep finished");
    Ok(report)
}

async fn step(name: &'static str, fut: impl Future<Output = Result<usize>>) -> StepReport {
    let started = Instant::now();
    let outcome = fut.await.map_err(|e| e.to_string());
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    match &outcome {
        Ok(removed) => debug!(step = name, removed, elapsed_ms, "sweep step done"),
        Err(e) => warn!(step = name, error = %e, elapsed_ms, "sweep step failed"),
    }
    StepReport { name, outcome }
}

/// Collect the segments and networks the host's rows reference, resolving
/// segments not persisted on the row. A network that cannot be resolved
/// any more contributes no segment but still counts as referenced.
pub async fn in_use(ctx: &AgentContext) -> Result<InUse> {
    let mut in_use = InUse::default();
    for row in ctx.store().used_networks(ctx.host()).await? {
        in_use.networks.insert(row.network_id);
        let segment = match row.segment {
            Some(segment) => segment,
            None => match ctx.cache().segment(row.network_id).await {
                Ok(segment) => segment,
                Err(e) if e.is_not_found() => {
                    debug!(network = %row.network_id, "network is gone, segment not in use");
                    continue;
                }
                Err(e) => return Err(e),
            },
        };
        in_use.segments.insert(segment, row.network_id);
    }
    Ok(in_use)
}

/// Removals and the first failure within one step.
#[derive(Debug, Default)]
struct Tally {
    removed: usize,
    first: Option<CoreError>,
}

impl Tally {
    fn removed_one(&mut self) {
        self.removed += 1;
    }

    fn failed(&mut self, e: impl Into<CoreError>) {
        self.first.get_or_insert(e.into());
    }

    fn finish(self) -> Result<usize> {
        self.first.map_or(Ok(self.removed), Err)
    }
}

/// Run `per_device` on every device concurrently and sum the removals.
/// A failing device is logged; the others still run.
async fn on_each_device<'a, F, Fut>(
    devices: &'a [DynDevice],
    step: &'static str,
    per_device: F,
) -> Result<usize>
where
    F: Fn(&'a DynDevice) -> Fut,
    Fut: Future<Output = Result<usize>>,
{
    let per_device = &per_device;
    let results = join_all(
        devices
            .iter()
            .map(|device| async move { (device.name(), per_device(device).await) }),
    )
    .await;

    let mut tally = Tally::default();
    for (device, result) in results {
        match result {
            Ok(removed) => tally.removed += removed,
            Err(e) => {
                warn!(device, step, error = %e, "sweep failed on device");
                tally.failed(e);
            }
        }
    }
    tally.finish()
}

// ── Steps ────────────────────────────────────────────────────────────

/// Device self-IPs whose backing port no longer exists.
async fn orphaned_self_ips(ctx: &AgentContext) -> Result<usize> {
    on_each_device(ctx.bigips(), STEP_SELF_IPS, |device| async move {
        let mut tally = Tally::default();
        for self_ip in device.list_self_ips().await? {
            let Some(port) = naming::port_from_self_ip_name(&self_ip.name) else {
                continue;
            };
            match ctx.cache().api().get_port(port).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => match device.delete_self_ip(&self_ip.name).await {
                    Ok(()) => {
                        info!(device = %device.name(), self_ip = %self_ip.name, "removed orphaned self-IP");
                        tally.removed_one();
                    }
                    Err(e) => {
                        warn!(device = %device.name(), self_ip = %self_ip.name, error = %e, "failed to remove self-IP");
                        tally.failed(e);
                    }
                },
                Err(e) => tally.failed(e),
            }
        }
        tally.finish()
    })
    .await
}

async fn unused_route_domains(ctx: &AgentContext, used: &UsedSegments) -> Result<usize> {
    on_each_device(ctx.bigips(), STEP_ROUTE_DOMAINS, |device| async move {
        let mut tally = Tally::default();
        for route_domain in device.list_route_domains().await? {
            let Some(segment) = naming::segment_from_name(&route_domain.name) else {
                continue;
            };
            if used.contains_key(&segment) {
                continue;
            }
            match device.delete_route_domain(segment).await {
                Ok(()) => {
                    info!(device = %device.name(), segment, "removed route domain");
                    tally.removed_one();
                }
                Err(e) => {
                    warn!(device = %device.name(), segment, error = %e, "failed to remove route domain");
                    tally.failed(e);
                }
            }
        }
        tally.finish()
    })
    .await
}

/// Segments with a VLAN on any device but no row, torn down on both
/// planes.
async fn unused_vlans(ctx: &AgentContext, used: &UsedSegments) -> Result<usize> {
    let listed = join_all(
        ctx.bigips()
            .iter()
            .chain(ctx.vcmps())
            .map(|device| async move { (device.name(), device.list_vlans().await) }),
    )
    .await;

    let mut tally = Tally::default();
    let mut stale = BTreeSet::new();
    for (device, result) in listed {
        match result {
            Ok(vlans) => stale.extend(
                vlans
                    .iter()
                    .filter_map(|vlan| naming::segment_from_name(&vlan.name))
                    .filter(|segment| !used.contains_key(segment)),
            ),
            Err(e) => {
                warn!(device, error = %e, "failed to list VLANs");
                tally.failed(e);
            }
        }
    }
    for segment in stale {
        match l2::cleanup_l2(ctx, segment).await {
            Ok(()) => {
                info!(segment, "removed unused segment");
                tally.removed_one();
            }
            Err(e) => tally.failed(e),
        }
    }
    tally.finish()
}

async fn guest_vlans(ctx: &AgentContext, used: &UsedSegments) -> Result<usize> {
    let segments: BTreeSet<u16> = used.keys().copied().collect();
    l2::sync_guest_vlans(ctx, &segments).await?;
    Ok(ctx.vcmps().len())
}

/// Self-IP ports of the host on networks no row uses.
async fn unused_self_ip_ports(ctx: &AgentContext, networks: &BTreeSet<Uuid>) -> Result<usize> {
    let unused: BTreeSet<Uuid> = l2::agent_ports(ctx, None, l2::SELF_IP_OWNER)
        .await?
        .into_iter()
        .map(|p| p.network_id)
        .filter(|network| !networks.contains(network))
        .collect();

    let mut tally = Tally::default();
    for network in unused {
        match l2::cleanup_self_ips(ctx, network).await {
            Ok(removed) => tally.removed += removed,
            Err(e) => {
                warn!(%network, error = %e, "failed to remove self-IP ports");
                tally.failed(e);
            }
        }
    }
    tally.finish()
}

/// Endpoint tenants whose network no row uses, emptied on the active
/// device.
async fn unused_partitions(ctx: &AgentContext, networks: &BTreeSet<Uuid>) -> Result<usize> {
    let device = ctx.active_device()?;
    let mut tenants = BTreeMap::new();
    for partition in device.list_partitions().await? {
        let Some(network) = naming::network_from_tenant_name(&partition) else {
            continue;
        };
        if !networks.contains(&network) {
            tenants.insert(partition, Tenant::default());
        }
    }
    if tenants.is_empty() {
        return Ok(0);
    }
    let removed = tenants.len();
    info!(device = %device.name(), tenants = ?tenants.keys().collect::<Vec<_>>(), "removing tenants");
    device.post_declaration(&As3::deploy(tenants)).await?;
    Ok(removed)
}
