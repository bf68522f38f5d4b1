// In-memory store for tests.
//
// Transactions are serialized by an owned mutex guard and work on a copy
// of the state, which replaces the shared state only on commit.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{Store, StoreTx, UsedNetwork};
use crate::error::{CoreError, Result};
use crate::model::{
    AgentRegistration, Endpoint, EndpointPort, EndpointStatus, Service, ServiceStatus,
};

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub services: BTreeMap<Uuid, Service>,
    pub endpoints: BTreeMap<Uuid, Endpoint>,
    pub agents: BTreeMap<String, AgentRegistration>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    commits: Arc<AtomicUsize>,
    rollbacks: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_service(&self, service: Service) {
        self.state
            .lock()
            .await
            .services
            .insert(service.id, service);
    }

    pub async fn insert_endpoint(&self, endpoint: Endpoint) {
        self.state
            .lock()
            .await
            .endpoints
            .insert(endpoint.id, endpoint);
    }

    pub async fn service(&self, id: Uuid) -> Option<Service> {
        self.state.lock().await.services.get(&id).cloned()
    }

    pub async fn endpoint(&self, id: Uuid) -> Option<Endpoint> {
        self.state.lock().await.endpoints.get(&id).cloned()
    }

    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

fn owned_by(state: &MemoryState, endpoint: &Endpoint, host: &str) -> bool {
    state
        .services
        .get(&endpoint.service_id)
        .is_some_and(|s| s.host.as_deref() == Some(host))
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            working,
            commits: Arc::clone(&self.commits),
            rollbacks: Arc::clone(&self.rollbacks),
        }))
    }

    async fn register_agent(&self, agent: &AgentRegistration) -> Result<()> {
        self.state
            .lock()
            .await
            .agents
            .insert(agent.host.clone(), agent.clone());
        Ok(())
    }

    async fn claim_services(&self, host: &str, availability_zone: Option<&str>) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut claimed = 0;
        for service in state.services.values_mut() {
            if service.host.is_none() && service.availability_zone.as_deref() == availability_zone {
                service.host = Some(host.to_owned());
                claimed += 1;
            }
        }
        Ok(claimed)
    }

    async fn has_pending_services(&self, host: &str) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state
            .services
            .values()
            .any(|s| s.host.as_deref() == Some(host) && s.status.is_pending()))
    }

    async fn pending_endpoint_networks(&self, host: &str) -> Result<Vec<Uuid>> {
        let state = self.state.lock().await;
        let mut networks: Vec<Uuid> = state
            .endpoints
            .values()
            .filter(|e| owned_by(&state, e, host))
            .filter(|e| {
                matches!(
                    e.status,
                    EndpointStatus::PendingCreate
                        | EndpointStatus::PendingUpdate
                        | EndpointStatus::PendingDelete
                        | EndpointStatus::PendingRejected
                )
            })
            .map(|e| e.port.network_id)
            .collect();
        networks.sort_unstable();
        networks.dedup();
        Ok(networks)
    }

    async fn endpoint_network(&self, endpoint_id: Uuid) -> Result<Option<Uuid>> {
        let state = self.state.lock().await;
        Ok(state.endpoints.get(&endpoint_id).map(|e| e.port.network_id))
    }

    async fn used_networks(&self, host: &str) -> Result<Vec<UsedNetwork>> {
        let state = self.state.lock().await;
        let services = state
            .services
            .values()
            .filter(|s| s.host.as_deref() == Some(host))
            .map(|s| UsedNetwork {
                network_id: s.network_id,
                segment: None,
            });
        let endpoints = state
            .endpoints
            .values()
            .filter(|e| owned_by(&state, e, host))
            .filter(|e| !matches!(e.status, EndpointStatus::Rejected | EndpointStatus::Failed))
            .map(|e| UsedNetwork {
                network_id: e.port.network_id,
                segment: e.port.segment,
            });
        Ok(services.chain(endpoints).collect())
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    commits: Arc<AtomicUsize>,
    rollbacks: Arc<AtomicUsize>,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_services(&mut self, host: &str) -> Result<Vec<Service>> {
        Ok(self
            .working
            .services
            .values()
            .filter(|s| s.host.as_deref() == Some(host))
            .cloned()
            .collect())
    }

    async fn lock_endpoints(&mut self, host: &str, network: Uuid) -> Result<Vec<Endpoint>> {
        Ok(self
            .working
            .endpoints
            .values()
            .filter(|e| e.port.network_id == network && e.status.is_actionable())
            .filter(|e| owned_by(&self.working, e, host))
            .cloned()
            .collect())
    }

    async fn set_service_status(&mut self, id: Uuid, status: ServiceStatus) -> Result<()> {
        let service = self
            .working
            .services
            .get_mut(&id)
            .ok_or_else(|| CoreError::Internal(format!("no service {id}")))?;
        service.status = status;
        Ok(())
    }

    async fn delete_service(&mut self, id: Uuid) -> Result<()> {
        self.working.services.remove(&id);
        Ok(())
    }

    async fn set_endpoint_status(&mut self, id: Uuid, status: EndpointStatus) -> Result<()> {
        let endpoint = self
            .working
            .endpoints
            .get_mut(&id)
            .ok_or_else(|| CoreError::Internal(format!("no endpoint {id}")))?;
        endpoint.status = status;
        Ok(())
    }

    async fn update_endpoint_port(&mut self, endpoint_id: Uuid, port: &EndpointPort) -> Result<()> {
        let endpoint = self
            .working
            .endpoints
            .get_mut(&endpoint_id)
            .ok_or_else(|| CoreError::Internal(format!("no endpoint {endpoint_id}")))?;
        endpoint.port.ip_address.clone_from(&port.ip_address);
        endpoint.port.subnet_id = port.subnet_id;
        endpoint.port.segment = port.segment;
        Ok(())
    }

    async fn delete_endpoint(&mut self, id: Uuid) -> Result<()> {
        self.working.endpoints.remove(&id);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTx {
            mut guard,
            working,
            commits,
            ..
        } = *self;
        *guard = working;
        commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
