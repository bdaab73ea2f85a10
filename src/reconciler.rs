//! Keeps `complaints_count` / `resolved_complaints_count` equal to what the
//! complaint table says.
//!
//! Every routine change is an atomic signed delta against the store, so
//! concurrent writers commute and nothing is lost to read-modify-write.
//! `reconcile` recomputes both counters from the complaint table and
//! overwrites the cache, repairing drift left by partial failures.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ReconcilerConfig;
use crate::db::RecordStore;
use crate::error::{EngineError, Result, StoreError};
use crate::models::CounterField;
use crate::retry::retry_with;

/// Cached vs. recomputed counters for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterReport {
    pub user_id: Uuid,
    pub cached_complaints: i64,
    pub actual_complaints: i64,
    pub cached_resolved: i64,
    pub actual_resolved: i64,
}

impl CounterReport {
    pub fn complaints_drift(&self) -> i64 {
        self.cached_complaints - self.actual_complaints
    }

    pub fn resolved_drift(&self) -> i64 {
        self.cached_resolved - self.actual_resolved
    }

    pub fn is_consistent(&self) -> bool {
        self.complaints_drift() == 0 && self.resolved_drift() == 0
    }

    fn max_drift(&self) -> i64 {
        self.complaints_drift().abs().max(self.resolved_drift().abs())
    }
}

/// Summary of a full sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub users_checked: usize,
    pub users_repaired: usize,
    pub failures: Vec<(Uuid, String)>,
}

#[derive(Clone)]
pub struct CounterReconciler {
    store: Arc<dyn RecordStore>,
    config: ReconcilerConfig,
}

impl CounterReconciler {
    pub fn new(store: Arc<dyn RecordStore>, config: ReconcilerConfig) -> Self {
        Self { store, config }
    }

    /// Applies `delta` to `field`, retrying transient faults with backoff.
    pub async fn apply_delta(&self, user_id: Uuid, field: CounterField, delta: i64) -> Result<()> {
        if delta == 0 {
            return Ok(());
        }
        retry_with(
            &self.config.backoff,
            || self.store.adjust_counter(user_id, field, delta),
            StoreError::is_transient,
        )
        .await
        .map_err(EngineError::from)
    }

    /// Like [`apply_delta`](Self::apply_delta), but a failure is logged for
    /// later reconciliation instead of being returned. The complaint record
    /// is the source of truth, so the caller's operation still succeeds.
    pub async fn apply_delta_or_log(&self, user_id: Uuid, field: CounterField, delta: i64, complaint_id: Uuid) {
        if let Err(e) = self.apply_delta(user_id, field, delta).await {
            error!(
                %user_id,
                %complaint_id,
                field = field.column(),
                delta,
                error = %e,
                "counter update failed; reconcile required"
            );
        }
    }

    /// Compares cached counters with the complaint table without writing.
    pub async fn inspect(&self, user_id: Uuid) -> Result<CounterReport> {
        let user = self.store.get_user(user_id).await?;
        let (actual_complaints, actual_resolved) = self.store.count_owned(user_id).await?;
        Ok(CounterReport {
            user_id,
            cached_complaints: user.complaints_count,
            actual_complaints,
            cached_resolved: user.resolved_complaints_count,
            actual_resolved,
        })
    }

    /// Fails with `Conflict` when drift exceeds the configured tolerance.
    pub async fn verify(&self, user_id: Uuid) -> Result<CounterReport> {
        let report = self.inspect(user_id).await?;
        if report.max_drift() > i64::from(self.config.drift_tolerance) {
            let (field, cached, actual) = if report.complaints_drift() != 0 {
                (CounterField::ComplaintsCount, report.cached_complaints, report.actual_complaints)
            } else {
                (CounterField::ResolvedComplaintsCount, report.cached_resolved, report.actual_resolved)
            };
            return Err(EngineError::counter_drift(user_id, field, cached, actual));
        }
        Ok(report)
    }

    /// Recomputes both counters and overwrites the cache. Idempotent.
    /// Returns the report as observed before the repair.
    pub async fn reconcile(&self, user_id: Uuid) -> Result<CounterReport> {
        let report = self.inspect(user_id).await?;
        if report.is_consistent() {
            return Ok(report);
        }
        if report.max_drift() > i64::from(self.config.drift_tolerance) {
            warn!(
                %user_id,
                complaints_drift = report.complaints_drift(),
                resolved_drift = report.resolved_drift(),
                "counter drift beyond tolerance"
            );
        }
        retry_with(
            &self.config.backoff,
            || self.store.overwrite_counters(user_id, report.actual_complaints, report.actual_resolved),
            StoreError::is_transient,
        )
        .await?;
        info!(
            %user_id,
            complaints = report.actual_complaints,
            resolved = report.actual_resolved,
            "counters reconciled"
        );
        Ok(report)
    }

    /// Reconciles every user. Per-user failures are collected, not fatal.
    pub async fn reconcile_all(&self) -> Result<SweepReport> {
        let mut sweep = SweepReport::default();
        for user_id in self.store.list_user_ids().await? {
            sweep.users_checked += 1;
            match self.reconcile(user_id).await {
                Ok(report) if !report.is_consistent() => sweep.users_repaired += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(%user_id, error = %e, "reconcile failed");
                    sweep.failures.push((user_id, e.to_string()));
                }
            }
        }
        Ok(sweep)
    }
}
