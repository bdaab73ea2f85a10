//! Complaint lifecycle and aggregate-consistency engine.
//!
//! - [`lifecycle::LifecycleManager`] applies status transitions and their side effects.
//! - [`reconciler::CounterReconciler`] keeps per-user counters equal to the complaint table.
//! - [`analytics::AnalyticsEngine`] computes read-only aggregate statistics.
//!
//! Storage is behind [`db::RecordStore`]; notifications go out through
//! [`notify::NotificationEmitter`].

use std::sync::Arc;

pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod notify;
pub mod reconciler;
pub mod retry;

pub use analytics::AnalyticsEngine;
pub use config::Config;
pub use db::RecordStore;
pub use error::{EngineError, Result, StoreError};
pub use lifecycle::LifecycleManager;
pub use notify::NotificationEmitter;
pub use reconciler::CounterReconciler;

/// The three components wired to one store.
#[derive(Clone)]
pub struct Engine {
    pub lifecycle: LifecycleManager,
    pub counters: CounterReconciler,
    pub analytics: AnalyticsEngine,
}

impl Engine {
    pub fn new(store: Arc<dyn RecordStore>, emitter: Arc<dyn NotificationEmitter>, config: &Config) -> Self {
        let counters = CounterReconciler::new(Arc::clone(&store), config.reconciler.clone());
        let lifecycle = LifecycleManager::new(
            Arc::clone(&store),
            emitter,
            counters.clone(),
            config.lifecycle.clone(),
        );
        let analytics = AnalyticsEngine::new(store, config.analytics.clone());
        Self { lifecycle, counters, analytics }
    }
}
