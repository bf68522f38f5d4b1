// Device session construction.
//
// The only place that knows about concrete device families; everything
// else works with `DynDevice`.

use std::sync::Arc;

use archer_api::{
    BigIpClient, BigIpOptions, DeviceKind, DynDevice, F5OsClient, F5OsOptions,
};
use tracing::info;

use crate::config::{AgentConfig, VcmpConfig};
use crate::error::Result;

/// Open sessions for the failover pair and every VCMP chassis.
///
/// Fails fast when a device has no resolvable credentials.
pub fn connect_devices(config: &AgentConfig) -> Result<(Vec<DynDevice>, Vec<DynDevice>)> {
    // Guests inherit their VLANs from the chassis; only bare-metal
    // devices tag VLANs on a local interface.
    let physical_interface = if config.vcmps.is_empty() {
        config.physical_interface.clone()
    } else {
        None
    };

    let mut bigips: Vec<DynDevice> = Vec::with_capacity(config.devices.len());
    for url in &config.devices {
        let client = BigIpClient::new(
            url,
            &config.transport,
            config.retry.clone(),
            BigIpOptions {
                physical_interface: physical_interface.clone(),
                vcmp_guest: None,
            },
        )?;
        info!(device = %client.name(), "configured BIG-IP session");
        bigips.push(Arc::new(client));
    }

    let vcmps = config
        .vcmps
        .iter()
        .map(|vcmp| connect_vcmp(config, vcmp))
        .collect::<Result<Vec<_>>>()?;

    Ok((bigips, vcmps))
}

fn connect_vcmp(config: &AgentConfig, vcmp: &VcmpConfig) -> Result<DynDevice> {
    let device: DynDevice = match vcmp.kind {
        DeviceKind::BigIp => Arc::new(BigIpClient::new(
            &vcmp.url,
            &config.transport,
            config.retry.clone(),
            BigIpOptions {
                physical_interface: vcmp
                    .interface
                    .clone()
                    .or_else(|| config.physical_interface.clone()),
                vcmp_guest: vcmp.guest.clone(),
            },
        )?),
        DeviceKind::F5Os => Arc::new(F5OsClient::new(
            &vcmp.url,
            &config.transport,
            config.retry.clone(),
            F5OsOptions {
                interface: vcmp
                    .interface
                    .clone()
                    .or_else(|| config.physical_interface.clone()),
                tenant: vcmp.guest.clone(),
            },
        )?),
    };
    info!(device = %device.name(), kind = %vcmp.kind, "configured VCMP session");
    Ok(device)
}
