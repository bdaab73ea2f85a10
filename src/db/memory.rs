//! HashMap-backed [`RecordStore`] for tests and local runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{RecordStore, StoreResult};
use crate::error::StoreError;
use crate::models::{Complaint, ComplaintFilter, ComplaintGroup, CounterField, Feedback, Page, Status, StatusUpdate, User};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    complaints: HashMap<Uuid, Complaint>,
}

/// In-memory store. Clone-friendly via `Arc`; every method holds the lock
/// for a single step, which gives the same per-row atomicity as the SQL store.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    counter_faults: Arc<AtomicU32>,
    scan_delay_ms: Arc<AtomicU64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` counter writes fail with [`StoreError::Transient`].
    pub fn fail_next_counter_writes(&self, n: u32) {
        self.counter_faults.store(n, Ordering::SeqCst);
    }

    /// Every scan and grouped read sleeps this long first, to simulate a
    /// slow aggregate query.
    pub fn set_scan_delay(&self, delay: Duration) {
        self.scan_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Overwrites a user's cached counters without going through the engine,
    /// to simulate historical drift.
    pub fn corrupt_counters(&self, user_id: Uuid, complaints: i64, resolved: i64) -> StoreResult<()> {
        let mut t = self.write()?;
        let user = t.users.get_mut(&user_id).ok_or(StoreError::user_not_found(user_id))?;
        user.complaints_count = complaints;
        user.resolved_complaints_count = resolved;
        Ok(())
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| StoreError::Transient("lock poisoned".into()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| StoreError::Transient("lock poisoned".into()))
    }

    async fn scan_delay(&self) {
        let delay = self.scan_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    fn take_counter_fault(&self) -> StoreResult<()> {
        let tripped = self
            .counter_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            return Err(StoreError::Transient("injected counter fault".into()));
        }
        Ok(())
    }
}

fn newest_first(a: &Complaint, b: &Complaint) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at).then_with(|| b.complaint_id.cmp(&a.complaint_id))
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        self.write()?.users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn get_user(&self, user_id: Uuid) -> StoreResult<User> {
        self.read()?.users.get(&user_id).cloned().ok_or(StoreError::user_not_found(user_id))
    }

    async fn list_user_ids(&self) -> StoreResult<Vec<Uuid>> {
        let mut ids: Vec<Uuid> = self.read()?.users.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    async fn insert_complaint(&self, complaint: &Complaint) -> StoreResult<()> {
        self.write()?.complaints.insert(complaint.complaint_id, complaint.clone());
        Ok(())
    }

    async fn get_complaint(&self, complaint_id: Uuid) -> StoreResult<Complaint> {
        self.read()?
            .complaints
            .get(&complaint_id)
            .cloned()
            .ok_or(StoreError::complaint_not_found(complaint_id))
    }

    async fn write_complaint(&self, c: &Complaint, expected: Status, clear_feedback: bool) -> StoreResult<bool> {
        let mut t = self.write()?;
        let Some(stored) = t.complaints.get_mut(&c.complaint_id) else {
            return Ok(false);
        };
        if stored.status != expected {
            return Ok(false);
        }
        stored.status = c.status;
        stored.priority = c.priority;
        stored.assigned_to = c.assigned_to;
        stored.resolution = c.resolution.clone();
        if clear_feedback {
            stored.feedback = None;
        }
        stored.updated_at = c.updated_at;
        Ok(true)
    }

    async fn append_status_update(&self, complaint_id: Uuid, entry: &StatusUpdate) -> StoreResult<()> {
        let mut t = self.write()?;
        let stored = t
            .complaints
            .get_mut(&complaint_id)
            .ok_or(StoreError::complaint_not_found(complaint_id))?;
        stored.status_updates.push(entry.clone());
        Ok(())
    }

    async fn set_feedback_once(&self, complaint_id: Uuid, feedback: &Feedback) -> StoreResult<bool> {
        let mut t = self.write()?;
        let stored = t
            .complaints
            .get_mut(&complaint_id)
            .ok_or(StoreError::complaint_not_found(complaint_id))?;
        if stored.feedback.is_some() || stored.status != Status::Resolved {
            return Ok(false);
        }
        stored.feedback = Some(feedback.clone());
        stored.updated_at = Utc::now();
        Ok(true)
    }

    async fn increment_views(&self, complaint_id: Uuid) -> StoreResult<i64> {
        let mut t = self.write()?;
        let stored = t
            .complaints
            .get_mut(&complaint_id)
            .ok_or(StoreError::complaint_not_found(complaint_id))?;
        stored.views += 1;
        Ok(stored.views)
    }

    async fn delete_complaint(&self, complaint_id: Uuid) -> StoreResult<Complaint> {
        self.write()?
            .complaints
            .remove(&complaint_id)
            .ok_or(StoreError::complaint_not_found(complaint_id))
    }

    async fn adjust_counter(&self, user_id: Uuid, field: CounterField, delta: i64) -> StoreResult<()> {
        self.take_counter_fault()?;
        let mut t = self.write()?;
        let user = t.users.get_mut(&user_id).ok_or(StoreError::user_not_found(user_id))?;
        match field {
            CounterField::ComplaintsCount => user.complaints_count += delta,
            CounterField::ResolvedComplaintsCount => user.resolved_complaints_count += delta,
        }
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn overwrite_counters(&self, user_id: Uuid, complaints: i64, resolved: i64) -> StoreResult<()> {
        self.take_counter_fault()?;
        let mut t = self.write()?;
        let user = t.users.get_mut(&user_id).ok_or(StoreError::user_not_found(user_id))?;
        user.complaints_count = complaints;
        user.resolved_complaints_count = resolved;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn count_owned(&self, user_id: Uuid) -> StoreResult<(i64, i64)> {
        let t = self.read()?;
        let owned = t.complaints.values().filter(|c| c.user_id == user_id);
        let (total, resolved) = owned.fold((0, 0), |(n, r), c| {
            (n + 1, r + i64::from(c.status == Status::Resolved))
        });
        Ok((total, resolved))
    }

    async fn scan_complaints(&self, filter: &ComplaintFilter, page: Option<Page>) -> StoreResult<Vec<Complaint>> {
        self.scan_delay().await;
        let t = self.read()?;
        let mut rows: Vec<Complaint> = t.complaints.values().filter(|c| filter.matches(c)).cloned().collect();
        rows.sort_by(newest_first);
        Ok(match page {
            Some(p) => rows
                .into_iter()
                .skip(p.offset() as usize)
                .take(p.limit() as usize)
                .collect(),
            None => rows,
        })
    }

    async fn count_complaints(&self, filter: &ComplaintFilter) -> StoreResult<i64> {
        Ok(self.read()?.complaints.values().filter(|c| filter.matches(c)).count() as i64)
    }

    async fn complaint_groups(&self, filter: &ComplaintFilter) -> StoreResult<Vec<ComplaintGroup>> {
        self.scan_delay().await;
        let t = self.read()?;
        Ok(ComplaintGroup::collect(t.complaints.values().filter(|c| filter.matches(c))))
    }
}
