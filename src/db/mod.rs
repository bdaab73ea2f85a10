//! Record store boundary and Postgres connection setup.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::models::{Complaint, ComplaintFilter, ComplaintGroup, CounterField, Feedback, Page, StatusUpdate, Status, User};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgRecordStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable storage of complaints and users.
///
/// Counter fields (`views`, `complaints_count`, `resolved_complaints_count`)
/// are only ever changed through the atomic methods here; no method writes a
/// whole row back over them.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    async fn get_user(&self, user_id: Uuid) -> StoreResult<User>;
    async fn list_user_ids(&self) -> StoreResult<Vec<Uuid>>;

    async fn insert_complaint(&self, complaint: &Complaint) -> StoreResult<()>;
    async fn get_complaint(&self, complaint_id: Uuid) -> StoreResult<Complaint>;

    /// Writes status, priority, assignment, resolution and `updated_at`, but
    /// only while the stored status is still `expected`. `Ok(false)` means
    /// another writer changed the status first (or the row is gone); the
    /// caller reloads.
    ///
    /// Feedback is never written from `complaint`: it belongs to
    /// [`set_feedback_once`](Self::set_feedback_once). With `clear_feedback`
    /// the stored feedback is dropped in the same conditional statement.
    async fn write_complaint(&self, complaint: &Complaint, expected: Status, clear_feedback: bool)
        -> StoreResult<bool>;

    /// Appends to the status history without touching existing entries.
    async fn append_status_update(&self, complaint_id: Uuid, entry: &StatusUpdate) -> StoreResult<()>;

    /// Sets feedback only if none is present and the complaint is resolved.
    async fn set_feedback_once(&self, complaint_id: Uuid, feedback: &Feedback) -> StoreResult<bool>;

    /// Atomic `views + 1`; returns the new value.
    async fn increment_views(&self, complaint_id: Uuid) -> StoreResult<i64>;

    /// Removes the complaint and returns it as it was.
    async fn delete_complaint(&self, complaint_id: Uuid) -> StoreResult<Complaint>;

    /// Atomic signed delta on one of the user's derived counters.
    async fn adjust_counter(&self, user_id: Uuid, field: CounterField, delta: i64) -> StoreResult<()>;

    /// Replaces both counters; reserved for reconciliation.
    async fn overwrite_counters(&self, user_id: Uuid, complaints: i64, resolved: i64) -> StoreResult<()>;

    /// `(total, resolved)` complaints owned by the user, from the complaint table.
    async fn count_owned(&self, user_id: Uuid) -> StoreResult<(i64, i64)>;

    /// Newest first. `page = None` returns every match.
    async fn scan_complaints(&self, filter: &ComplaintFilter, page: Option<Page>) -> StoreResult<Vec<Complaint>>;
    async fn count_complaints(&self, filter: &ComplaintFilter) -> StoreResult<i64>;

    /// Grouped counts and sums over the matching complaints, one row per
    /// distinct `(category, status, priority, district, assigned_to)`.
    async fn complaint_groups(&self, filter: &ComplaintFilter) -> StoreResult<Vec<ComplaintGroup>>;
}

pub async fn connect(cfg: &DatabaseConfig, url: &str) -> anyhow::Result<Pool<Postgres>> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(cfg.max_connections)
        .connect(url)
        .await?;

    tracing::info!(max_connections = cfg.max_connections, "connected to PostgreSQL");
    Ok(pool)
}

pub async fn migrate(pool: &Pool<Postgres>) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("schema migrations applied");
    Ok(())
}
