//! Reconciliation engine of the archer agent.
//!
//! Keeps F5 devices in line with the service and endpoint rows of one
//! agent host:
//!
//! - **[`reconcile`]**: transactional service and endpoint reconcilers,
//!   plus the catch-up [`pending_sync`](reconcile::pending_sync) scan.
//! - **[`l2`]**: VLANs, route domains, guest VLAN trunks, self-IPs and
//!   SNAT ports across the host plane (VCMP chassis) and the guest plane
//!   (failover pair).
//! - **[`declaration`]**: pure mapping from rows to declarative tenants.
//! - **[`sweep`]**: daily removal of objects no row references.
//! - **[`Scheduler`]** and **[`listener`]**: a single-worker job queue fed
//!   by timers and by database change notifications.
//! - **[`AgentContext`]**: configuration, store, network cache and device
//!   sessions, shared by everything above.

pub mod cache;
pub mod config;
pub mod context;
pub mod declaration;
pub mod error;
pub mod l2;
pub mod listener;
pub mod model;
pub mod proxy_protocol;
pub mod reconcile;
pub mod scheduler;
pub mod sessions;
pub mod store;
pub mod sweep;

#[cfg(test)]
pub(crate) mod test_support;

// ── Primary re-exports ──────────────────────────────────────────────
pub use cache::NetworkCache;
pub use config::{AgentConfig, VcmpConfig};
pub use context::AgentContext;
pub use error::CoreError;
pub use model::{
    AgentRegistration, Endpoint, EndpointPort, EndpointStatus, Service, ServiceStatus,
};
pub use scheduler::{
    AgentRunner, Job, JobKind, JobRunner, JobSender, JobStats, Scheduler, SchedulerConfig,
};
pub use sessions::connect_devices;
pub use store::{PgStore, Store, StoreTx};
pub use sweep::SweepReport;
