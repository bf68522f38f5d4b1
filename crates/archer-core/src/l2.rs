// ── L2 resource manager ──
//
// VLANs, route domains, guest VLAN trunks and self-IPs across both device
// planes. The host plane is every VCMP chassis, the guest plane every
// device of the failover pair. Each device gets one future; a plane's
// wall time is that of its slowest device.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use archer_api::neutron::{CreatePort, Port, PortFilter};
use archer_api::{DynDevice, naming};
use futures_util::future::{join_all, try_join_all};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::AgentContext;
use crate::error::{CoreError, Result};

/// Device owner of self-IP ports on the network API.
pub const SELF_IP_OWNER: &str = "network:f5selfip";
/// Device owner of SNAT ports on the network API.
pub const SNAT_OWNER: &str = "network:f5snat";

fn self_ip_port_name(device: &str) -> String {
    format!("local-{device}")
}

fn snat_port_name(device: &str) -> String {
    format!("snat-{device}")
}

// ── Transaction-owned ports ──────────────────────────────────────────

/// Ports created during one reconciliation, and the device self-IPs
/// pushed for them.
///
/// Released when the reconciliation rolls back; forgotten on commit.
#[derive(Default)]
pub struct OwnedPorts {
    ports: Vec<(Uuid, Uuid)>,
    self_ips: Vec<(DynDevice, String)>,
}

impl fmt::Debug for OwnedPorts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedPorts")
            .field("ports", &self.ports)
            .field(
                "self_ips",
                &self
                    .self_ips
                    .iter()
                    .map(|(device, name)| (device.name(), name.as_str()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl OwnedPorts {
    fn track(&mut self, port: &Port) {
        self.ports.push((port.network_id, port.id));
    }

    fn track_self_ip(&mut self, device: &DynDevice, name: String) {
        self.self_ips.push((Arc::clone(device), name));
    }

    /// Number of tracked ports.
    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty() && self.self_ips.is_empty()
    }

    /// Delete every tracked self-IP, then every tracked port. Failures are
    /// logged, not returned.
    pub async fn release(self, ctx: &AgentContext) {
        for (device, name) in self.self_ips {
            match device.delete_self_ip(&name).await {
                Ok(()) => info!(device = %device.name(), self_ip = %name, "released transaction-owned self-IP"),
                Err(e) => warn!(device = %device.name(), self_ip = %name, error = %e, "failed to release self-IP"),
            }
        }
        for (network, port) in self.ports {
            match ctx.cache().api().delete_port(port).await {
                Ok(()) => info!(%port, %network, "released transaction-owned port"),
                Err(e) => warn!(%port, %network, error = %e, "failed to release port"),
            }
            ctx.cache().invalidate_ports(network);
        }
    }
}

// ── VLANs and route domains ──────────────────────────────────────────

/// Provision a segment on both planes.
///
/// Host plane: VLAN, interface trunk and guest membership on every
/// chassis. Guest plane: VLAN and route domain on every device. The first
/// error is returned once both planes have settled or failed.
pub async fn ensure_l2(
    ctx: &AgentContext,
    segment: u16,
    parent: Option<u16>,
    mtu: u32,
) -> Result<()> {
    debug!(segment, ?parent, mtu, "ensuring L2");
    let host_plane = try_join_all(ctx.vcmps().iter().map(|vcmp| async move {
        vcmp.ensure_vlan(segment, mtu).await?;
        vcmp.ensure_interface_vlan(segment).await?;
        vcmp.ensure_guest_vlan(segment).await
    }));
    let guest_plane = try_join_all(ctx.bigips().iter().map(|bigip| async move {
        bigip.ensure_vlan(segment, mtu).await?;
        bigip.ensure_route_domain(segment, parent).await
    }));
    tokio::try_join!(host_plane, guest_plane)?;
    Ok(())
}

/// Tear a segment down on both planes.
///
/// Every device is attempted; failures are logged and the first one is
/// returned.
pub async fn cleanup_l2(ctx: &AgentContext, segment: u16) -> Result<()> {
    debug!(segment, "cleaning up L2");
    let host_plane = ctx.vcmps().iter().map(|vcmp| async move {
        vcmp.delete_guest_vlan(segment).await?;
        vcmp.delete_interface_vlan(segment).await?;
        vcmp.delete_vlan(segment).await
    });
    let guest_plane = ctx.bigips().iter().map(|bigip| async move {
        bigip.delete_route_domain(segment).await?;
        bigip.delete_vlan(segment).await
    });
    let (host, guest) = tokio::join!(
        join_all(ctx.vcmps().iter().zip(host_plane).map(|(d, f)| named(d, f))),
        join_all(ctx.bigips().iter().zip(guest_plane).map(|(d, f)| named(d, f))),
    );
    first_error(host.into_iter().chain(guest), |device, e| {
        warn!(device, segment, error = %e, "L2 cleanup failed");
    })
}

async fn named<'a, F>(device: &'a DynDevice, fut: F) -> (&'a str, F::Output)
where
    F: Future,
{
    (device.name(), fut.await)
}

fn first_error<'a, I>(results: I, log: impl Fn(&str, &archer_api::Error)) -> Result<()>
where
    I: Iterator<Item = (&'a str, std::result::Result<(), archer_api::Error>)>,
{
    let mut first = None;
    for (device, result) in results {
        if let Err(e) = result {
            log(device, &e);
            first.get_or_insert(e);
        }
    }
    first.map_or(Ok(()), |e| Err(CoreError::Api(e)))
}

// ── Agent-owned ports ────────────────────────────────────────────────

/// Find the agent's port with the given name and owner on a network, or
/// create it. Created ports are tracked in `owned`.
async fn ensure_port(
    ctx: &AgentContext,
    network: Uuid,
    name: String,
    device_owner: &str,
    owned: &mut OwnedPorts,
) -> Result<Port> {
    let filter = PortFilter {
        network_id: Some(network),
        device_owner: Some(device_owner.to_owned()),
        device_id: Some(ctx.host().to_owned()),
        name: Some(name.clone()),
    };
    if let Some(port) = ctx
        .cache()
        .ports(network)
        .await?
        .into_iter()
        .find(|p| filter.matches(p))
    {
        return Ok(port);
    }

    let port = ctx
        .cache()
        .api()
        .create_port(&CreatePort {
            network_id: network,
            name,
            device_owner: device_owner.to_owned(),
            device_id: ctx.host().to_owned(),
            fixed_ips: Vec::new(),
        })
        .await?;
    ctx.cache().invalidate_ports(network);
    info!(port = %port.id, %network, owner = device_owner, "allocated port");
    owned.track(&port);
    Ok(port)
}

/// `address/prefix` of a port's primary fixed IP.
async fn port_cidr(ctx: &AgentContext, port: &Port) -> Result<String> {
    let ip = port.primary_ip().ok_or_else(|| {
        CoreError::Internal(format!("port {} has no fixed IP", port.id))
    })?;
    let subnet = ctx.cache().subnet(ip.subnet_id).await?;
    let prefix = subnet.prefix_len().ok_or_else(|| {
        CoreError::Internal(format!("subnet {} has invalid CIDR {}", subnet.id, subnet.cidr))
    })?;
    Ok(format!("{}/{prefix}", ip.ip_address))
}

/// One self-IP per guest-plane device on `network`, each backed by a
/// network port named after the device.
pub async fn ensure_self_ips(
    ctx: &AgentContext,
    network: Uuid,
    segment: u16,
    owned: &mut OwnedPorts,
) -> Result<()> {
    for device in ctx.bigips() {
        let allocated = owned.ports.len();
        let port = ensure_port(
            ctx,
            network,
            self_ip_port_name(device.name()),
            SELF_IP_OWNER,
            owned,
        )
        .await?;
        let address = port_cidr(ctx, &port).await?;
        let name = naming::self_ip_name(port.id);
        device.ensure_self_ip(&name, &address, segment).await?;
        // Self-IPs of ports that predate this run belong to committed state.
        if owned.ports.len() > allocated {
            owned.track_self_ip(device, name);
        }
    }
    Ok(())
}

/// One SNAT port per guest-plane device on `network`. Returns the SNAT
/// addresses in device order.
pub async fn ensure_snat_ports(
    ctx: &AgentContext,
    network: Uuid,
    owned: &mut OwnedPorts,
) -> Result<Vec<String>> {
    let mut addresses = Vec::with_capacity(ctx.bigips().len());
    for device in ctx.bigips() {
        let port = ensure_port(ctx, network, snat_port_name(device.name()), SNAT_OWNER, owned)
            .await?;
        let ip = port.primary_ip().ok_or_else(|| {
            CoreError::Internal(format!("SNAT port {} has no fixed IP", port.id))
        })?;
        addresses.push(ip.ip_address.clone());
    }
    Ok(addresses)
}

/// Agent-owned ports with the given owner, optionally on one network.
pub async fn agent_ports(
    ctx: &AgentContext,
    network: Option<Uuid>,
    device_owner: &str,
) -> Result<Vec<Port>> {
    let ports = ctx
        .cache()
        .api()
        .list_ports(&PortFilter {
            network_id: network,
            device_owner: Some(device_owner.to_owned()),
            device_id: Some(ctx.host().to_owned()),
            name: None,
        })
        .await?;
    Ok(ports)
}

/// Remove the self-IPs backed by `ports` from every device, then the ports.
/// A port is kept while any device still holds its self-IP.
async fn cleanup_self_ip_ports(ctx: &AgentContext, ports: &[Port]) -> Result<usize> {
    let mut removed = 0;
    for port in ports {
        let name = naming::self_ip_name(port.id);
        let results = join_all(
            ctx.bigips()
                .iter()
                .map(|device| named(device, device.delete_self_ip(&name))),
        )
        .await;
        first_error(results.into_iter(), |device, e| {
            warn!(device, self_ip = %name, error = %e, "failed to remove self-IP");
        })?;
        ctx.cache().api().delete_port(port.id).await?;
        ctx.cache().invalidate_ports(port.network_id);
        info!(port = %port.id, network = %port.network_id, "removed self-IP port");
        removed += 1;
    }
    Ok(removed)
}

/// Remove every self-IP of the agent on `network`.
pub async fn cleanup_self_ips(ctx: &AgentContext, network: Uuid) -> Result<usize> {
    let ports = agent_ports(ctx, Some(network), SELF_IP_OWNER).await?;
    cleanup_self_ip_ports(ctx, &ports).await
}

/// Remove every SNAT port of the agent on `network`.
pub async fn cleanup_snat_ports(ctx: &AgentContext, network: Uuid) -> Result<usize> {
    let ports = agent_ports(ctx, Some(network), SNAT_OWNER).await?;
    for port in &ports {
        ctx.cache().api().delete_port(port.id).await?;
        info!(port = %port.id, %network, "removed SNAT port");
    }
    ctx.cache().invalidate_ports(network);
    Ok(ports.len())
}

/// Reconcile guest VLAN membership on every chassis to `used`.
pub async fn sync_guest_vlans(ctx: &AgentContext, used: &BTreeSet<u16>) -> Result<()> {
    let results = join_all(
        ctx.vcmps()
            .iter()
            .map(|vcmp| named(vcmp, vcmp.sync_guest_vlans(used))),
    )
    .await;
    first_error(results.into_iter(), |device, e| {
        warn!(device, error = %e, "guest VLAN sync failed");
    })
}
