// ── Agent context ──
//
// Explicitly constructed state shared by every job: configuration, store,
// network cache, device sessions and the active-device pointer. Built once
// at startup and handed around as `Arc<AgentContext>`.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use archer_api::{DynDevice, NetworkApi};
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::cache::NetworkCache;
use crate::config::AgentConfig;
use crate::error::{CoreError, Result};
use crate::model::{AgentRegistration, PROVIDER_TENANT};
use crate::store::Store;

pub struct AgentContext {
    config: AgentConfig,
    store: Arc<dyn Store>,
    cache: NetworkCache,
    bigips: Vec<DynDevice>,
    vcmps: Vec<DynDevice>,
    active: ArcSwapOption<DynDevice>,
}

impl AgentContext {
    /// Assemble the context. No device is active until
    /// [`refresh_active_device`](Self::refresh_active_device) has run.
    pub fn new(
        config: AgentConfig,
        store: Arc<dyn Store>,
        network_api: Arc<dyn NetworkApi>,
        bigips: Vec<DynDevice>,
        vcmps: Vec<DynDevice>,
    ) -> Self {
        let cache = NetworkCache::new(network_api, config.physical_network.clone());
        Self {
            config,
            store,
            cache,
            bigips,
            vcmps,
            active: ArcSwapOption::empty(),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn cache(&self) -> &NetworkCache {
        &self.cache
    }

    /// Devices of the failover pair (guest plane).
    pub fn bigips(&self) -> &[DynDevice] {
        &self.bigips
    }

    /// VCMP chassis (host plane).
    pub fn vcmps(&self) -> &[DynDevice] {
        &self.vcmps
    }

    /// The device receiving declarative config POSTs.
    pub fn active_device(&self) -> Result<DynDevice> {
        self.active
            .load()
            .as_deref()
            .cloned()
            .ok_or(CoreError::NoActiveDevice)
    }

    /// Ask every device for its failover state and swap the active pointer
    /// to the first one reporting active.
    ///
    /// When no device reports active the previous choice is kept; with no
    /// previous choice this is [`CoreError::NoActiveDevice`].
    pub async fn refresh_active_device(&self) -> Result<DynDevice> {
        let states = join_all(self.bigips.iter().map(|device| async move {
            (device, device.failover_state().await)
        }))
        .await;

        let mut found = None;
        for (device, state) in states {
            match state {
                Ok(state) if state.is_active() => {
                    found = Some(Arc::clone(device));
                    break;
                }
                Ok(state) => debug!(device = %device.name(), ?state, "device not active"),
                Err(e) => warn!(device = %device.name(), error = %e, "failover state unavailable"),
            }
        }

        let Some(active) = found else {
            warn!("no device reports active, keeping previous choice");
            return self.active_device();
        };

        let previous = self.active.swap(Some(Arc::new(Arc::clone(&active))));
        let changed = previous
            .as_deref()
            .is_none_or(|prev| prev.name() != active.name());
        if changed {
            info!(device = %active.name(), "active device selected");
        }
        Ok(active)
    }

    pub fn registration(&self) -> AgentRegistration {
        AgentRegistration {
            host: self.config.host.clone(),
            availability_zone: self.config.availability_zone.clone(),
            physical_network: self.config.physical_network.clone(),
            provider: PROVIDER_TENANT.to_owned(),
        }
    }
}
