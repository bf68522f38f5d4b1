// Fakes for reconciler, sweep and scheduler tests.

#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use archer_api::as3::As3;
use archer_api::neutron::{CreatePort, FixedIp, Network, Port, PortFilter, Segment, Subnet};
use archer_api::{
    Device, DeviceKind, DynDevice, Error, FailoverState, NetworkApi, RouteDomainInfo, SelfIpInfo, VlanInfo,
    naming,
};
use async_trait::async_trait;
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::context::AgentContext;
use crate::model::{Endpoint, EndpointPort, EndpointStatus, Service, ServiceStatus};
use crate::store::memory::MemoryStore;

// ── Fake device ──────────────────────────────────────────────────────

#[derive(Debug, Default, Clone)]
pub struct DeviceState {
    pub vlans: BTreeMap<u16, u32>,
    pub interface_vlans: BTreeSet<u16>,
    pub guest_vlans: BTreeSet<u16>,
    pub route_domains: BTreeMap<u16, Option<u16>>,
    pub self_ips: BTreeMap<String, (String, u16)>,
    pub partitions: BTreeSet<String>,
    pub declarations: Vec<As3>,
}

/// Device recording every call and holding its objects in memory.
///
/// Operations named in `fail` return a 500 API error.
pub struct FakeDevice {
    name: String,
    kind: DeviceKind,
    failover: Mutex<FailoverState>,
    state: Mutex<DeviceState>,
    calls: Mutex<Vec<String>>,
    fail: Mutex<HashSet<&'static str>>,
}

impl FakeDevice {
    pub fn new(name: &str, kind: DeviceKind) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            failover: Mutex::new(FailoverState::Active),
            state: Mutex::new(DeviceState {
                partitions: BTreeSet::from(["Common".to_owned()]),
                ..DeviceState::default()
            }),
            calls: Mutex::new(Vec::new()),
            fail: Mutex::new(HashSet::new()),
        }
    }

    pub fn bigip(name: &str) -> Self {
        Self::new(name, DeviceKind::BigIp)
    }

    pub fn set_failover(&self, state: FailoverState) {
        *self.failover.lock().unwrap() = state;
    }

    pub fn fail_on(&self, op: &'static str) {
        self.fail.lock().unwrap().insert(op);
    }

    pub fn clear_failures(&self) {
        self.fail.lock().unwrap().clear();
    }

    pub fn state(&self) -> DeviceState {
        self.state.lock().unwrap().clone()
    }

    pub fn with_state(&self, f: impl FnOnce(&mut DeviceState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn declarations(&self) -> Vec<As3> {
        self.state.lock().unwrap().declarations.clone()
    }

    fn record(&self, op: &'static str, detail: impl std::fmt::Display) -> Result<(), Error> {
        self.calls.lock().unwrap().push(format!("{op}({detail})"));
        if self.fail.lock().unwrap().contains(op) {
            return Err(Error::Api {
                status: 500,
                message: format!("injected failure in {op}"),
            });
        }
        Ok(())
    }

    fn bigip_only(&self, op: &'static str) -> Result<(), Error> {
        match self.kind {
            DeviceKind::BigIp => Ok(()),
            DeviceKind::F5Os => Err(Error::UnsupportedOperation(op)),
        }
    }
}

#[async_trait]
impl Device for FakeDevice {
    fn kind(&self) -> DeviceKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn failover_state(&self) -> Result<FailoverState, Error> {
        self.record("failover_state", "")?;
        Ok(self.failover.lock().unwrap().clone())
    }

    async fn post_declaration(&self, declaration: &As3) -> Result<(), Error> {
        self.bigip_only("post_declaration")?;
        let tenants: Vec<&str> = declaration.tenant_names().collect();
        self.record("post_declaration", tenants.join(","))?;
        let mut state = self.state.lock().unwrap();
        for (name, tenant) in &declaration.declaration.tenants {
            if tenant.is_empty() && name != "Common" {
                state.partitions.remove(name);
            } else {
                state.partitions.insert(name.clone());
            }
        }
        state.declarations.push(declaration.clone());
        Ok(())
    }

    async fn ensure_vlan(&self, segment: u16, mtu: u32) -> Result<(), Error> {
        self.record("ensure_vlan", segment)?;
        self.state.lock().unwrap().vlans.insert(segment, mtu);
        Ok(())
    }

    async fn ensure_interface_vlan(&self, segment: u16) -> Result<(), Error> {
        self.record("ensure_interface_vlan", segment)?;
        self.state.lock().unwrap().interface_vlans.insert(segment);
        Ok(())
    }

    async fn ensure_guest_vlan(&self, segment: u16) -> Result<(), Error> {
        self.record("ensure_guest_vlan", segment)?;
        self.state.lock().unwrap().guest_vlans.insert(segment);
        Ok(())
    }

    async fn ensure_route_domain(&self, segment: u16, parent: Option<u16>) -> Result<(), Error> {
        self.bigip_only("ensure_route_domain")?;
        self.record("ensure_route_domain", segment)?;
        self.state
            .lock()
            .unwrap()
            .route_domains
            .insert(segment, parent);
        Ok(())
    }

    async fn ensure_self_ip(&self, name: &str, address: &str, segment: u16) -> Result<(), Error> {
        self.bigip_only("ensure_self_ip")?;
        self.record("ensure_self_ip", name)?;
        self.state
            .lock()
            .unwrap()
            .self_ips
            .insert(name.to_owned(), (address.to_owned(), segment));
        Ok(())
    }

    async fn sync_guest_vlans(&self, used: &BTreeSet<u16>) -> Result<(), Error> {
        self.record("sync_guest_vlans", used.len())?;
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        state.guest_vlans = used
            .iter()
            .filter(|s| state.vlans.contains_key(s))
            .copied()
            .collect();
        Ok(())
    }

    async fn delete_vlan(&self, segment: u16) -> Result<(), Error> {
        self.record("delete_vlan", segment)?;
        self.state.lock().unwrap().vlans.remove(&segment);
        Ok(())
    }

    async fn delete_interface_vlan(&self, segment: u16) -> Result<(), Error> {
        self.record("delete_interface_vlan", segment)?;
        self.state.lock().unwrap().interface_vlans.remove(&segment);
        Ok(())
    }

    async fn delete_guest_vlan(&self, segment: u16) -> Result<(), Error> {
        self.record("delete_guest_vlan", segment)?;
        self.state.lock().unwrap().guest_vlans.remove(&segment);
        Ok(())
    }

    async fn delete_route_domain(&self, segment: u16) -> Result<(), Error> {
        self.bigip_only("delete_route_domain")?;
        self.record("delete_route_domain", segment)?;
        self.state.lock().unwrap().route_domains.remove(&segment);
        Ok(())
    }

    async fn delete_self_ip(&self, name: &str) -> Result<(), Error> {
        self.bigip_only("delete_self_ip")?;
        self.record("delete_self_ip", name)?;
        self.state.lock().unwrap().self_ips.remove(name);
        Ok(())
    }

    async fn list_partitions(&self) -> Result<Vec<String>, Error> {
        self.bigip_only("list_partitions")?;
        self.record("list_partitions", "")?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .partitions
            .iter()
            .cloned()
            .collect())
    }

    async fn list_vlans(&self) -> Result<Vec<VlanInfo>, Error> {
        self.record("list_vlans", "")?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .vlans
            .keys()
            .map(|s| VlanInfo {
                name: naming::vlan_name(*s),
                tag: Some(*s),
            })
            .collect())
    }

    async fn list_route_domains(&self) -> Result<Vec<RouteDomainInfo>, Error> {
        self.bigip_only("list_route_domains")?;
        self.record("list_route_domains", "")?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .route_domains
            .keys()
            .map(|s| RouteDomainInfo {
                name: naming::route_domain_name(*s),
                id: *s,
            })
            .collect())
    }

    async fn list_self_ips(&self) -> Result<Vec<SelfIpInfo>, Error> {
        self.bigip_only("list_self_ips")?;
        self.record("list_self_ips", "")?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .self_ips
            .iter()
            .map(|(name, (address, segment))| SelfIpInfo {
                name: name.clone(),
                address: address.clone(),
                vlan: naming::vlan_path(*segment),
            })
            .collect())
    }
}

// ── Fake network API ─────────────────────────────────────────────────

#[derive(Debug, Default)]
struct NetworkState {
    networks: BTreeMap<Uuid, Network>,
    subnets: BTreeMap<Uuid, Subnet>,
    ports: BTreeMap<Uuid, Port>,
    next_host: u8,
}

/// Network API holding networks, subnets and ports in memory.
///
/// Every network gets one `/24` subnet; created ports receive the next
/// free address in it.
pub struct FakeNetworkApi {
    physical_network: String,
    state: Mutex<NetworkState>,
    network_lookups: AtomicUsize,
    fail_create: Mutex<bool>,
}

impl FakeNetworkApi {
    pub fn new(physical_network: &str) -> Self {
        Self {
            physical_network: physical_network.to_owned(),
            state: Mutex::new(NetworkState {
                next_host: 10,
                ..NetworkState::default()
            }),
            network_lookups: AtomicUsize::new(0),
            fail_create: Mutex::new(false),
        }
    }

    /// Add a network with a single segment on the physical network.
    pub fn add_network(&self, segment: u16, mtu: u32) -> Uuid {
        let id = Uuid::new_v4();
        let subnet = Subnet {
            id: Uuid::new_v4(),
            network_id: id,
            cidr: format!("10.{}.{}.0/24", segment / 256, segment % 256),
            gateway_ip: None,
        };
        let network = Network {
            id,
            name: format!("net-{segment}"),
            mtu: Some(mtu),
            provider: Segment {
                network_type: Some("vlan".into()),
                physical_network: Some(self.physical_network.clone()),
                segmentation_id: Some(segment),
            },
            segments: Vec::new(),
        };
        let mut state = self.state.lock().unwrap();
        state.subnets.insert(subnet.id, subnet);
        state.networks.insert(id, network);
        id
    }

    pub fn remove_network(&self, id: Uuid) {
        let mut state = self.state.lock().unwrap();
        state.networks.remove(&id);
        state.ports.retain(|_, p| p.network_id != id);
    }

    /// Add a foreign (endpoint destination) port on a network.
    pub fn add_port(&self, network: Uuid, ip_address: &str) -> Uuid {
        let mut state = self.state.lock().unwrap();
        let subnet_id = state
            .subnets
            .values()
            .find(|s| s.network_id == network)
            .map_or_else(Uuid::nil, |s| s.id);
        let port = Port {
            id: Uuid::new_v4(),
            name: "endpoint".into(),
            network_id: network,
            fixed_ips: vec![FixedIp {
                subnet_id,
                ip_address: ip_address.to_owned(),
            }],
            device_owner: String::new(),
            device_id: String::new(),
        };
        let id = port.id;
        state.ports.insert(id, port);
        id
    }

    pub fn remove_port(&self, id: Uuid) {
        self.state.lock().unwrap().ports.remove(&id);
    }

    pub fn ports(&self) -> Vec<Port> {
        self.state.lock().unwrap().ports.values().cloned().collect()
    }

    pub fn ports_owned_by(&self, device_owner: &str) -> Vec<Port> {
        self.ports()
            .into_iter()
            .filter(|p| p.device_owner == device_owner)
            .collect()
    }

    pub fn network_lookups(&self) -> usize {
        self.network_lookups.load(Ordering::SeqCst)
    }

    pub fn fail_port_creation(&self, fail: bool) {
        *self.fail_create.lock().unwrap() = fail;
    }
}

#[async_trait]
impl NetworkApi for FakeNetworkApi {
    async fn get_network(&self, id: Uuid) -> Result<Network, Error> {
        self.network_lookups.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .networks
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("network {id}")))
    }

    async fn get_subnet(&self, id: Uuid) -> Result<Subnet, Error> {
        self.state
            .lock()
            .unwrap()
            .subnets
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("subnet {id}")))
    }

    async fn get_port(&self, id: Uuid) -> Result<Port, Error> {
        self.state
            .lock()
            .unwrap()
            .ports
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("port {id}")))
    }

    async fn list_ports(&self, filter: &PortFilter) -> Result<Vec<Port>, Error> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .ports
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect())
    }

    async fn create_port(&self, request: &CreatePort) -> Result<Port, Error> {
        if *self.fail_create.lock().unwrap() {
            return Err(Error::Api {
                status: 409,
                message: "IP address exhausted".into(),
            });
        }
        let mut state = self.state.lock().unwrap();
        let subnet = state
            .subnets
            .values()
            .find(|s| s.network_id == request.network_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("subnet of {}", request.network_id)))?;
        let host = state.next_host;
        state.next_host = state.next_host.wrapping_add(1);
        let prefix = subnet.cidr.trim_end_matches(".0/24");
        let port = Port {
            id: Uuid::new_v4(),
            name: request.name.clone(),
            network_id: request.network_id,
            fixed_ips: vec![FixedIp {
                subnet_id: subnet.id,
                ip_address: format!("{prefix}.{host}"),
            }],
            device_owner: request.device_owner.clone(),
            device_id: request.device_id.clone(),
        };
        state.ports.insert(port.id, port.clone());
        Ok(port)
    }

    async fn delete_port(&self, id: Uuid) -> Result<(), Error> {
        self.state.lock().unwrap().ports.remove(&id);
        Ok(())
    }
}

// ── Harness ──────────────────────────────────────────────────────────

pub const HOST: &str = "agent-1";
pub const PHYSNET: &str = "physnet1";

/// A context over fakes: an active and a standby device, one F5OS chassis,
/// an in-memory store and a fake network API.
pub struct Harness {
    pub ctx: Arc<AgentContext>,
    pub store: MemoryStore,
    pub api: Arc<FakeNetworkApi>,
    pub active: Arc<FakeDevice>,
    pub standby: Arc<FakeDevice>,
    pub vcmp: Arc<FakeDevice>,
}

impl Harness {
    pub async fn new() -> Self {
        let store = MemoryStore::new();
        let api = Arc::new(FakeNetworkApi::new(PHYSNET));
        let active = Arc::new(FakeDevice::bigip("lb-a"));
        let standby = Arc::new(FakeDevice::bigip("lb-b"));
        standby.set_failover(FailoverState::Standby);
        let vcmp = Arc::new(FakeDevice::new("chassis", DeviceKind::F5Os));

        let ctx = Arc::new(AgentContext::new(
            AgentConfig::new(HOST, PHYSNET),
            Arc::new(store.clone()),
            api.clone(),
            vec![
                Arc::clone(&active) as DynDevice,
                Arc::clone(&standby) as DynDevice,
            ],
            vec![Arc::clone(&vcmp) as DynDevice],
        ));
        ctx.refresh_active_device().await.unwrap();

        Self {
            ctx,
            store,
            api,
            active,
            standby,
            vcmp,
        }
    }

    /// Insert a service owned by the harness host.
    pub async fn add_service(&self, network: Uuid, status: ServiceStatus) -> Service {
        let service = Service {
            id: Uuid::new_v4(),
            enabled: true,
            network_id: network,
            ip_addresses: vec!["10.0.0.10".into()],
            port: 80,
            proxy_protocol: false,
            status,
            host: Some(HOST.to_owned()),
            availability_zone: None,
        };
        self.store.insert_service(service.clone()).await;
        service
    }

    /// Insert an endpoint of `service` whose destination port lives on
    /// `network`.
    pub async fn add_endpoint(
        &self,
        service: &Service,
        network: Uuid,
        port_id: Uuid,
        status: EndpointStatus,
    ) -> Endpoint {
        let endpoint = Endpoint {
            id: Uuid::new_v4(),
            service_id: service.id,
            status,
            port: EndpointPort {
                port_id,
                network_id: network,
                subnet_id: None,
                ip_address: None,
                segment: None,
                owned: true,
            },
            service_port: service.port,
            proxy_protocol: service.proxy_protocol,
        };
        self.store.insert_endpoint(endpoint.clone()).await;
        endpoint
    }
}
