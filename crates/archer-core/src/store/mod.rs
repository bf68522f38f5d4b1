// ── Persistent state ──
//
// The reconcilers only see these two traits. Reconciliation runs inside
// one `StoreTx` whose rows stay locked until commit or rollback; the
// scans and the sweep use plain reads on `Store`.

pub mod postgres;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{
    AgentRegistration, Endpoint, EndpointPort, EndpointStatus, Service, ServiceStatus,
};

pub use postgres::PgStore;

/// A network referenced by a row the agent owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsedNetwork {
    pub network_id: Uuid,
    /// Segment persisted on the row, if known.
    pub segment: Option<u16>,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Start a serializable transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;

    /// Upsert the agent row and refresh its heartbeat.
    async fn register_agent(&self, agent: &AgentRegistration) -> Result<()>;

    /// Assign unowned tenant services in the agent's availability zone to
    /// `host`. Returns the number of claimed rows.
    async fn claim_services(&self, host: &str, availability_zone: Option<&str>) -> Result<u64>;

    /// Whether any service owned by `host` is in a `PENDING_*` state.
    async fn has_pending_services(&self, host: &str) -> Result<bool>;

    /// Destination networks with actionable pending endpoints on `host`.
    async fn pending_endpoint_networks(&self, host: &str) -> Result<Vec<Uuid>>;

    /// Destination network of an endpoint, `None` if the endpoint is gone.
    async fn endpoint_network(&self, endpoint_id: Uuid) -> Result<Option<Uuid>>;

    /// Networks of every service and endpoint owned by `host`.
    async fn used_networks(&self, host: &str) -> Result<Vec<UsedNetwork>>;
}

#[async_trait]
pub trait StoreTx: Send {
    /// Lock and load all tenant services owned by `host`.
    async fn lock_services(&mut self, host: &str) -> Result<Vec<Service>>;

    /// Lock and load the actionable endpoints of `host` on `network`.
    async fn lock_endpoints(&mut self, host: &str, network: Uuid) -> Result<Vec<Endpoint>>;

    async fn set_service_status(&mut self, id: Uuid, status: ServiceStatus) -> Result<()>;
    async fn delete_service(&mut self, id: Uuid) -> Result<()>;

    async fn set_endpoint_status(&mut self, id: Uuid, status: EndpointStatus) -> Result<()>;
    /// Persist resolved destination details (address, subnet, segment).
    async fn update_endpoint_port(&mut self, endpoint_id: Uuid, port: &EndpointPort) -> Result<()>;
    async fn delete_endpoint(&mut self, id: Uuid) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}
