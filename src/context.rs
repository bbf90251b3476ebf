use crate::collectors::software::SoftwareCache;
use crate::config::Config;
use crate::delta::RateTracker;
use crate::metrics::Metrics;
use crate::state::State;
use crate::store::PersistenceWriter;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

#[derive(Debug, Error)]
#[error("база данных не подключена, сохранение недоступно")]
pub struct PersistUnavailable;

/// Everything the views share for one agent run: rendered state, metrics, the optional
/// database writer and the caches that survive between passes.
pub struct AgentContext {
    pub state: Arc<RwLock<State>>,
    pub metrics: Arc<Metrics>,
    pub writer: Option<PersistenceWriter>,
    pub rates: Mutex<RateTracker>,
    pub software_cache: Mutex<SoftwareCache>,
    pub client: Client,
    pub config: Config,
    persist: AtomicBool,
}

impl AgentContext {
    pub fn new(
        config: Config,
        state: Arc<RwLock<State>>,
        metrics: Arc<Metrics>,
        writer: Option<PersistenceWriter>,
        persist: bool,
    ) -> Arc<Self> {
        let client = Client::builder()
            .user_agent(concat!("inventoryd/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());
        let cache_ttl = Duration::from_secs(config.agent.software_cache_secs);
        Arc::new(Self {
            state,
            metrics,
            persist: AtomicBool::new(persist && writer.is_some()),
            writer,
            rates: Mutex::new(RateTracker::new()),
            software_cache: Mutex::new(SoftwareCache::new(cache_ttl)),
            client,
            config,
        })
    }

    pub fn persist_enabled(&self) -> bool {
        self.persist.load(Ordering::Relaxed)
    }

    /// Writer to use for this pass, if persistence is on.
    pub fn active_writer(&self) -> Option<&PersistenceWriter> {
        self.writer.as_ref().filter(|_| self.persist_enabled())
    }

    pub fn set_persist(&self, enabled: bool) -> Result<(), PersistUnavailable> {
        if enabled && self.writer.is_none() {
            return Err(PersistUnavailable);
        }
        let previous = self.persist.swap(enabled, Ordering::Relaxed);
        if previous != enabled {
            info!(enabled, "сохранение в базу переключено");
        }
        Ok(())
    }
}
