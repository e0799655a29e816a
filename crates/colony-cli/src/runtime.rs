//! Builds the wired-up orchestrator/health-monitor pair every command
//! shares, loading and persisting the `MemoryStore` snapshot around it.
//!
//! Grounded on the corpus's `gator-cli::main` pattern of "open a pool,
//! do the thing, close the pool" per invocation — here there's no
//! database to open a connection to, so "open" means deserializing the
//! JSON snapshot and "close" means re-serializing it.

use std::sync::Arc;

use anyhow::Result;
use colony_core::health::{HealthMonitor, HealthMonitorConfig};
use colony_core::messaging::HandlerRegistry;
use colony_core::orchestrator::{Orchestrator, OrchestratorConfig};
use colony_store::MemoryStore;

use crate::config::{self, OrchestratorSection};
use crate::local::{EchoInferenceClient, LedgerFunding, LogTransport, StoreBackedTracker};

/// Everything a command needs to act on the colony, plus the store handle
/// it must hand back to [`Session::persist`] when done.
pub struct Session {
    pub store: Arc<MemoryStore>,
    pub orchestrator: Orchestrator,
    pub health: HealthMonitor,
}

impl Session {
    pub fn load() -> Result<Self> {
        let settings = config::resolve();
        let store = match config::load_state() {
            Some(raw) => MemoryStore::from_snapshot(&raw)?,
            None => MemoryStore::new(),
        };

        Ok(Self::build(store, &settings))
    }

    fn build(store: Arc<MemoryStore>, settings: &OrchestratorSection) -> Self {
        let inference = Arc::new(EchoInferenceClient::new());
        let transport = Arc::new(LogTransport::new());
        let funding = Arc::new(LedgerFunding::new(settings.starting_balance_cents));
        let tracker = Arc::new(StoreBackedTracker::new(store.clone() as Arc<dyn colony_core::contracts::DurableStore>));

        let orchestrator_config = OrchestratorConfig {
            max_replans: settings.max_replans,
            auto_budget_threshold: settings.auto_budget_threshold_cents,
            classification_threshold: settings.classification_threshold,
            disable_spawn: settings.disable_spawn,
            tick_interval: std::time::Duration::from_secs(settings.tick_interval_secs),
        };

        let orchestrator = Orchestrator::new(
            store.clone() as Arc<dyn colony_core::contracts::DurableStore>,
            inference,
            transport.clone(),
            tracker.clone(),
            HandlerRegistry::new(),
            orchestrator_config,
        );

        let health = HealthMonitor::new(
            store.clone() as Arc<dyn colony_core::contracts::DurableStore>,
            transport,
            tracker,
            funding,
            HealthMonitorConfig::default(),
        );

        Self { store, orchestrator, health }
    }

    /// Snapshot the store back to disk. Every command that mutates
    /// anything must call this before returning.
    pub async fn persist(&self) -> Result<()> {
        let raw = self.store.export_snapshot().await;
        config::save_state(&raw)
    }
}
