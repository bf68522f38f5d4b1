// ── Network resource cache ──
//
// Three bounded TTL caches in front of the network API: networks,
// subnets and ports-by-network. Reads are concurrent; each key has a
// single writer at a time through `DashMap`'s shard locks.

use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use archer_api::NetworkApi;
use archer_api::neutron::{Network, Port, PortFilter, Subnet};
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::trace;
use uuid::Uuid;

use crate::error::{CoreError, Result};

pub const DEFAULT_TTL: Duration = Duration::from_secs(600);
pub const DEFAULT_CAPACITY: usize = 128;
const DEFAULT_MTU: u32 = 1500;

struct Slot<V> {
    stored: Instant,
    /// Recency stamp from the cache's access counter.
    used: u64,
    value: V,
}

/// Bounded map whose entries expire after a fixed TTL.
///
/// On overflow the least recently used entry is evicted.
pub(crate) struct TtlCache<K, V> {
    entries: DashMap<K, Slot<V>>,
    accesses: AtomicU64,
    ttl: Duration,
    capacity: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub(crate) fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            accesses: AtomicU64::new(0),
            ttl,
            capacity: capacity.max(1),
        }
    }

    fn stamp(&self) -> u64 {
        self.accesses.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn get(&self, key: &K) -> Option<V> {
        let fresh = {
            let mut slot = self.entries.get_mut(key)?;
            if slot.stored.elapsed() < self.ttl {
                slot.used = self.stamp();
                Some(slot.value.clone())
            } else {
                None
            }
        };
        if fresh.is_none() {
            self.entries.remove(key);
        }
        fresh
    }

    pub(crate) fn insert(&self, key: K, value: V) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            let coldest = self
                .entries
                .iter()
                .min_by_key(|e| e.value().used)
                .map(|e| e.key().clone());
            if let Some(coldest) = coldest {
                self.entries.remove(&coldest);
            }
        }
        let slot = Slot {
            stored: Instant::now(),
            used: self.stamp(),
            value,
        };
        self.entries.insert(key, slot);
    }

    pub(crate) fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Cached network lookups plus segment/MTU resolution for one physical
/// network.
pub struct NetworkCache {
    api: Arc<dyn NetworkApi>,
    physical_network: String,
    networks: TtlCache<Uuid, Network>,
    subnets: TtlCache<Uuid, Subnet>,
    ports: TtlCache<Uuid, Vec<Port>>,
}

impl NetworkCache {
    pub fn new(api: Arc<dyn NetworkApi>, physical_network: impl Into<String>) -> Self {
        Self::with_limits(api, physical_network, DEFAULT_TTL, DEFAULT_CAPACITY)
    }

    pub fn with_limits(
        api: Arc<dyn NetworkApi>,
        physical_network: impl Into<String>,
        ttl: Duration,
        capacity: usize,
    ) -> Self {
        Self {
            api,
            physical_network: physical_network.into(),
            networks: TtlCache::new(ttl, capacity),
            subnets: TtlCache::new(ttl, capacity),
            ports: TtlCache::new(ttl, capacity),
        }
    }

    /// Uncached access for writes (port create/delete).
    pub fn api(&self) -> &Arc<dyn NetworkApi> {
        &self.api
    }

    pub fn physical_network(&self) -> &str {
        &self.physical_network
    }

    /// Network by id. A network deleted upstream yields
    /// [`CoreError::NetworkNotFound`].
    pub async fn network(&self, id: Uuid) -> Result<Network> {
        if let Some(network) = self.networks.get(&id) {
            trace!(network = %id, "network cache hit");
            return Ok(network);
        }
        let network = self.api.get_network(id).await.map_err(|e| {
            if e.is_not_found() {
                CoreError::NetworkNotFound { network: id }
            } else {
                CoreError::Api(e)
            }
        })?;
        self.networks.insert(id, network.clone());
        Ok(network)
    }

    pub async fn subnet(&self, id: Uuid) -> Result<Subnet> {
        if let Some(subnet) = self.subnets.get(&id) {
            return Ok(subnet);
        }
        let subnet = self.api.get_subnet(id).await?;
        self.subnets.insert(id, subnet.clone());
        Ok(subnet)
    }

    /// All ports of a network.
    pub async fn ports(&self, network: Uuid) -> Result<Vec<Port>> {
        if let Some(ports) = self.ports.get(&network) {
            return Ok(ports);
        }
        let ports = self
            .api
            .list_ports(&PortFilter {
                network_id: Some(network),
                ..PortFilter::default()
            })
            .await?;
        self.ports.insert(network, ports.clone());
        Ok(ports)
    }

    /// Drop cached ports after creating or deleting one.
    pub fn invalidate_ports(&self, network: Uuid) {
        self.ports.invalidate(&network);
    }

    /// Segmentation id of the network on the agent's physical network.
    pub async fn segment(&self, network: Uuid) -> Result<u16> {
        let net = self.network(network).await?;
        net.segment_on(&self.physical_network)
            .ok_or_else(|| CoreError::NoPhysicalNetwork {
                network,
                physical_network: self.physical_network.clone(),
            })
    }

    pub async fn mtu(&self, network: Uuid) -> Result<u32> {
        Ok(self.network(network).await?.mtu.unwrap_or(DEFAULT_MTU))
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeNetworkApi;

    #[test]
    fn ttl_cache_evicts_oldest_on_overflow() {
        let cache = TtlCache::new(Duration::from_secs(60), 2);
        cache.insert(1, "a");
        cache.insert(2, "b");
        cache.insert(3, "c");
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&3), Some("c"));
    }

    #[test]
    fn ttl_cache_evicts_least_recently_used() {
        let cache = TtlCache::new(Duration::from_secs(60), 2);
        cache.insert(1, "a");
        cache.insert(2, "b");
        assert_eq!(cache.get(&1), Some("a"));

        cache.insert(3, "c");
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some("a"));
        assert_eq!(cache.get(&3), Some("c"));
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_cache_expires_entries() {
        let cache = TtlCache::new(Duration::from_secs(600), 4);
        cache.insert("net", 1);
        tokio::time::advance(Duration::from_secs(599)).await;
        assert_eq!(cache.get(&"net"), Some(1));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get(&"net"), None);
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn segment_lookup_is_cached() {
        let api = Arc::new(FakeNetworkApi::new("physnet1"));
        let network = api.add_network(42, 9000);
        let cache = NetworkCache::new(api.clone(), "physnet1");

        assert_eq!(cache.segment(network).await.unwrap(), 42);
        assert_eq!(cache.mtu(network).await.unwrap(), 9000);
        assert_eq!(api.network_lookups(), 1);
    }

    #[tokio::test]
    async fn wrong_physical_network_is_typed_error() {
        let api = Arc::new(FakeNetworkApi::new("physnet1"));
        let network = api.add_network(42, 1500);
        let cache = NetworkCache::new(api, "physnet2");

        let err = cache.segment(network).await.unwrap_err();
        assert!(matches!(err, CoreError::NoPhysicalNetwork { .. }));
    }

    #[tokio::test]
    async fn deleted_network_is_not_found() {
        let api = Arc::new(FakeNetworkApi::new("physnet1"));
        let cache = NetworkCache::new(api, "physnet1");
        let err = cache.segment(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, CoreError::NetworkNotFound { .. }));
        assert!(err.is_not_found());
    }
}
