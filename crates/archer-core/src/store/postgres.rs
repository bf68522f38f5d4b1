// Postgres-backed store.
//
// Schema is owned by the API server's migrations; the agent only reads
// and updates `service`, `endpoint`, `endpoint_port` and `agents`.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::{Store, StoreTx, UsedNetwork};
use crate::error::{CoreError, Result};
use crate::model::{
    AgentRegistration, Endpoint, EndpointPort, EndpointStatus, PROVIDER_TENANT, Service,
    ServiceStatus,
};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

// ── Row types ────────────────────────────────────────────────────────

#[derive(Debug, FromRow)]
struct ServiceRow {
    id: Uuid,
    enabled: bool,
    network_id: Uuid,
    ip_addresses: Vec<String>,
    port: i32,
    proxy_protocol: bool,
    status: String,
    host: Option<String>,
    availability_zone: Option<String>,
}

impl TryFrom<ServiceRow> for Service {
    type Error = CoreError;

    fn try_from(row: ServiceRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            enabled: row.enabled,
            network_id: row.network_id,
            ip_addresses: row.ip_addresses,
            port: to_port(row.port)?,
            proxy_protocol: row.proxy_protocol,
            status: ServiceStatus::from_str(&row.status)
                .map_err(|_| CoreError::Internal(format!("unknown service status {}", row.status)))?,
            host: row.host,
            availability_zone: row.availability_zone,
        })
    }
}

#[derive(Debug, FromRow)]
struct EndpointRow {
    id: Uuid,
    service_id: Uuid,
    status: String,
    port_id: Uuid,
    network: Uuid,
    subnet: Option<Uuid>,
    ip_address: Option<String>,
    segmentation_id: Option<i32>,
    owned: bool,
    service_port: i32,
    proxy_protocol: bool,
}

impl TryFrom<EndpointRow> for Endpoint {
    type Error = CoreError;

    fn try_from(row: EndpointRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            service_id: row.service_id,
            status: EndpointStatus::from_str(&row.status).map_err(|_| {
                CoreError::Internal(format!("unknown endpoint status {}", row.status))
            })?,
            port: EndpointPort {
                port_id: row.port_id,
                network_id: row.network,
                subnet_id: row.subnet,
                ip_address: row.ip_address,
                segment: row.segmentation_id.and_then(|s| u16::try_from(s).ok()),
                owned: row.owned,
            },
            service_port: to_port(row.service_port)?,
            proxy_protocol: row.proxy_protocol,
        })
    }
}

#[derive(Debug, FromRow)]
struct UsedNetworkRow {
    network: Uuid,
    segmentation_id: Option<i32>,
}

fn to_port(value: i32) -> Result<u16> {
    u16::try_from(value).map_err(|_| CoreError::Internal(format!("port {value} out of range")))
}

// ── Store ────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Pool shared with the notification listener.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgStoreTx { tx }))
    }

    async fn register_agent(&self, agent: &AgentRegistration) -> Result<()> {
        sqlx::query(
            "INSERT INTO agents (host, availability_zone, physnet, provider, heartbeat_at) \
             VALUES ($1, $2, $3, $4, now()) \
             ON CONFLICT (host) DO UPDATE SET \
                availability_zone = EXCLUDED.availability_zone, \
                physnet = EXCLUDED.physnet, \
                provider = EXCLUDED.provider, \
                heartbeat_at = now()",
        )
        .bind(&agent.host)
        .bind(agent.availability_zone.as_deref())
        .bind(&agent.physical_network)
        .bind(&agent.provider)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim_services(&self, host: &str, availability_zone: Option<&str>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE service SET host = $1, updated_at = now() \
             WHERE host IS NULL AND provider = $2 \
               AND availability_zone IS NOT DISTINCT FROM $3",
        )
        .bind(host)
        .bind(PROVIDER_TENANT)
        .bind(availability_zone)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn has_pending_services(&self, host: &str) -> Result<bool> {
        let pending: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM service \
             WHERE host = $1 AND provider = $2 AND status LIKE 'PENDING\\_%')",
        )
        .bind(host)
        .bind(PROVIDER_TENANT)
        .fetch_one(&self.pool)
        .await?;
        Ok(pending)
    }

    async fn pending_endpoint_networks(&self, host: &str) -> Result<Vec<Uuid>> {
        let networks: Vec<Uuid> = sqlx::query_scalar(
            "SELECT DISTINCT endpoint_port.network FROM endpoint \
             JOIN endpoint_port ON endpoint_port.endpoint_id = endpoint.id \
             JOIN service ON service.id = endpoint.service_id \
             WHERE service.host = $1 AND endpoint.status IN \
               ('PENDING_CREATE', 'PENDING_UPDATE', 'PENDING_DELETE', 'PENDING_REJECTED')",
        )
        .bind(host)
        .fetch_all(&self.pool)
        .await?;
        Ok(networks)
    }

    async fn endpoint_network(&self, endpoint_id: Uuid) -> Result<Option<Uuid>> {
        let network: Option<Uuid> =
            sqlx::query_scalar("SELECT network FROM endpoint_port WHERE endpoint_id = $1")
                .bind(endpoint_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(network)
    }

    async fn used_networks(&self, host: &str) -> Result<Vec<UsedNetwork>> {
        let rows: Vec<UsedNetworkRow> = sqlx::query_as(
            "SELECT network_id AS network, NULL::int AS segmentation_id FROM service \
             WHERE host = $1 AND provider = $2 \
             UNION \
             SELECT endpoint_port.network, endpoint_port.segmentation_id FROM endpoint \
             JOIN endpoint_port ON endpoint_port.endpoint_id = endpoint.id \
             JOIN service ON service.id = endpoint.service_id \
             WHERE service.host = $1 AND endpoint.status NOT IN ('REJECTED', 'FAILED')",
        )
        .bind(host)
        .bind(PROVIDER_TENANT)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| UsedNetwork {
                network_id: r.network,
                segment: r.segmentation_id.and_then(|s| u16::try_from(s).ok()),
            })
            .collect())
    }
}

// ── Transaction ──────────────────────────────────────────────────────

pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn lock_services(&mut self, host: &str) -> Result<Vec<Service>> {
        let rows: Vec<ServiceRow> = sqlx::query_as(
            "SELECT id, enabled, network_id, ip_addresses::text[] AS ip_addresses, port, \
                    proxy_protocol, status, host, availability_zone \
             FROM service WHERE host = $1 AND provider = $2 \
             ORDER BY id FOR UPDATE",
        )
        .bind(host)
        .bind(PROVIDER_TENANT)
        .fetch_all(&mut *self.tx)
        .await?;
        debug!(host, rows = rows.len(), "locked services");
        rows.into_iter().map(Service::try_from).collect()
    }

    async fn lock_endpoints(&mut self, host: &str, network: Uuid) -> Result<Vec<Endpoint>> {
        let rows: Vec<EndpointRow> = sqlx::query_as(
            "SELECT endpoint.id, endpoint.service_id, endpoint.status, \
                    endpoint_port.port_id, endpoint_port.network, endpoint_port.subnet, \
                    host(endpoint_port.ip_address) AS ip_address, \
                    endpoint_port.segmentation_id, endpoint_port.owned, \
                    service.port AS service_port, service.proxy_protocol \
             FROM endpoint \
             JOIN endpoint_port ON endpoint_port.endpoint_id = endpoint.id \
             JOIN service ON service.id = endpoint.service_id \
             WHERE endpoint_port.network = $1 AND service.host = $2 \
               AND endpoint.status NOT IN ('PENDING_APPROVAL', 'REJECTED', 'FAILED') \
             ORDER BY endpoint.id FOR UPDATE OF endpoint, endpoint_port",
        )
        .bind(network)
        .bind(host)
        .fetch_all(&mut *self.tx)
        .await?;
        debug!(host, %network, rows = rows.len(), "locked endpoints");
        rows.into_iter().map(Endpoint::try_from).collect()
    }

    async fn set_service_status(&mut self, id: Uuid, status: ServiceStatus) -> Result<()> {
        sqlx::query("UPDATE service SET status = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(status.as_ref())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_service(&mut self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM service WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn set_endpoint_status(&mut self, id: Uuid, status: EndpointStatus) -> Result<()> {
        sqlx::query("UPDATE endpoint SET status = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(status.as_ref())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn update_endpoint_port(&mut self, endpoint_id: Uuid, port: &EndpointPort) -> Result<()> {
        sqlx::query(
            "UPDATE endpoint_port SET ip_address = $2::text::inet, subnet = $3, \
                    segmentation_id = $4 \
             WHERE endpoint_id = $1",
        )
        .bind(endpoint_id)
        .bind(port.ip_address.as_deref())
        .bind(port.subnet_id)
        .bind(port.segment.map(i32::from))
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_endpoint(&mut self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM endpoint WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
