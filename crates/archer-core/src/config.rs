// ── Runtime agent configuration ──
//
// Everything the agent needs at runtime, already validated. The config
// crate builds this from files and environment; core never reads disk.

use std::time::Duration;

use archer_api::{DeviceKind, RetryPolicy, TransportConfig};
use url::Url;

/// A VCMP chassis hosting the agent's guest.
#[derive(Debug, Clone)]
pub struct VcmpConfig {
    pub url: Url,
    pub kind: DeviceKind,
    /// Guest (BIG-IP) or tenant (F5OS) name on the chassis.
    pub guest: Option<String>,
    /// Interface or LAG VLANs are trunked on.
    pub interface: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Host name this agent registers and claims rows as.
    pub host: String,
    pub availability_zone: Option<String>,
    /// Physical network whose segments map to device VLANs.
    pub physical_network: String,
    /// Interface VLANs are tagged on when not running as a VCMP guest.
    pub physical_interface: Option<String>,
    /// Stateful-session devices forming one failover pair.
    pub devices: Vec<Url>,
    pub vcmps: Vec<VcmpConfig>,
    pub transport: TransportConfig,
    pub retry: RetryPolicy,
    pub pending_sync_interval: Duration,
    pub cleanup_interval: Duration,
    pub job_queue_size: usize,
    pub shutdown_timeout: Duration,
    pub listener_timeout: Duration,
}

impl AgentConfig {
    /// Defaults for everything but identity and devices.
    pub fn new(host: impl Into<String>, physical_network: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            availability_zone: None,
            physical_network: physical_network.into(),
            physical_interface: None,
            devices: Vec::new(),
            vcmps: Vec::new(),
            transport: TransportConfig::default(),
            retry: RetryPolicy::default(),
            pending_sync_interval: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(24 * 3600),
            job_queue_size: 32,
            shutdown_timeout: Duration::from_secs(30),
            listener_timeout: Duration::from_secs(60),
        }
    }
}
