#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use complaint_engine::config::RegressionPolicy;
use complaint_engine::db::{InMemoryStore, RecordStore};
use complaint_engine::models::{Location, NewComplaint, Role, User};
use complaint_engine::notify::RecordingEmitter;
use complaint_engine::retry::Backoff;
use complaint_engine::{Config, Engine};
use uuid::Uuid;

pub struct Harness {
    pub store: InMemoryStore,
    pub emitter: RecordingEmitter,
    pub engine: Engine,
    pub config: Config,
}

/// Retries fast enough that fault-injection tests stay quick.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.reconciler.backoff = Backoff {
        max_retries: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        multiplier: 2.0,
    };
    config
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_policy(policy: RegressionPolicy) -> Self {
        let mut config = test_config();
        config.lifecycle.regression_policy = policy;
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> Self {
        let store = InMemoryStore::new();
        let emitter = RecordingEmitter::new();
        let engine = Engine::new(Arc::new(store.clone()), Arc::new(emitter.clone()), &config);
        Self { store, emitter, engine, config }
    }

    pub async fn user(&self, role: Role) -> Uuid {
        let user = User::new("Test User", role);
        self.store.insert_user(&user).await.unwrap();
        user.user_id
    }

    pub async fn citizen(&self) -> Uuid {
        self.user(Role::Citizen).await
    }

    pub async fn official(&self) -> Uuid {
        self.user(Role::Official).await
    }

    pub async fn counters(&self, user_id: Uuid) -> (i64, i64) {
        let u = self.store.get_user(user_id).await.unwrap();
        (u.complaints_count, u.resolved_complaints_count)
    }
}

pub fn new_complaint(category: &str, district: Option<&str>) -> NewComplaint {
    NewComplaint {
        category: category.to_string(),
        title: "Broken water pipe".into(),
        description: "Water has been leaking for a week".into(),
        location: Location { district: district.map(str::to_string), ..Location::default() },
        is_urgent: false,
        is_anonymous: false,
    }
}
