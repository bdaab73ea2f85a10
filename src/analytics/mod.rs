//! On-demand analytics over the complaint set.
//!
//! Stateless and read-only: every call asks the store for grouped counts
//! and sums, then folds them in memory. Reads are not synchronized with
//! concurrent writers, so results are a point-in-time snapshot. Each store
//! read is bounded by the configured timeout and surfaces
//! [`EngineError::Timeout`] instead of a partial result.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::timeout;
use tracing::warn;

use crate::config::AnalyticsConfig;
use crate::db::RecordStore;
use crate::error::{EngineError, Result};
use crate::models::{ComplaintFilter, ComplaintGroup};

pub mod report;

pub use report::{
    CategoryCount, CategoryStats, Dashboard, DistrictStats, OfficialPerformance, PerformanceSnapshot,
    PriorityStats, Satisfaction, UNKNOWN_DISTRICT,
};

#[derive(Clone)]
pub struct AnalyticsEngine {
    store: Arc<dyn RecordStore>,
    config: AnalyticsConfig,
}

impl AnalyticsEngine {
    pub fn new(store: Arc<dyn RecordStore>, config: AnalyticsConfig) -> Self {
        Self { store, config }
    }

    /// Same engine with a caller-chosen bound on each store read.
    pub fn with_timeout(&self, limit: Duration) -> Self {
        let mut config = self.config.clone();
        config.timeout = limit;
        Self { store: Arc::clone(&self.store), config }
    }

    async fn load(&self, filter: &ComplaintFilter) -> Result<Vec<ComplaintGroup>> {
        match timeout(self.config.timeout, self.store.complaint_groups(filter)).await {
            Ok(rows) => Ok(rows?),
            Err(_) => {
                warn!(timeout_ms = self.config.timeout.as_millis() as u64, "analytics read timed out");
                Err(EngineError::Timeout(self.config.timeout))
            }
        }
    }

    async fn load_all(&self) -> Result<Vec<ComplaintGroup>> {
        self.load(&ComplaintFilter::default()).await
    }

    pub async fn dashboard(&self) -> Result<Dashboard> {
        let all = self.load_all().await?;
        Ok(report::dashboard(&all, self.config.include_empty_categories))
    }

    pub async fn by_category(&self) -> Result<Vec<CategoryStats>> {
        Ok(report::by_category(&self.load_all().await?))
    }

    pub async fn by_priority(&self) -> Result<Vec<PriorityStats>> {
        Ok(report::by_priority(&self.load_all().await?))
    }

    pub async fn by_district(&self) -> Result<Vec<DistrictStats>> {
        Ok(report::by_district(&self.load_all().await?))
    }

    pub async fn satisfaction_score(&self) -> Result<Satisfaction> {
        Ok(report::satisfaction(&self.load_all().await?))
    }

    pub async fn official_performance(&self) -> Result<Vec<OfficialPerformance>> {
        Ok(report::official_performance(&self.load_all().await?))
    }

    /// Dashboard figures restricted to complaints created in `[start, end]`.
    /// Both bounds or neither.
    pub async fn performance_metrics(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Dashboard> {
        let filter = match (start, end) {
            (None, None) => ComplaintFilter::default(),
            (Some(s), Some(e)) if s > e => {
                return Err(EngineError::validation("start date is after end date"));
            }
            (Some(s), Some(e)) => ComplaintFilter::created_between(s, e),
            _ => {
                return Err(EngineError::validation("start and end dates must be supplied together"));
            }
        };
        let rows = self.load(&filter).await?;
        Ok(report::dashboard(&rows, self.config.include_empty_categories))
    }

    pub async fn snapshot(&self) -> Result<PerformanceSnapshot> {
        let all = self.load_all().await?;
        Ok(report::snapshot(&all, self.config.include_empty_categories, Utc::now()))
    }
}
