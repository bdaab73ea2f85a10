//! Postgres-backed [`RecordStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{query, query_as, query_scalar, FromRow, PgPool};
use uuid::Uuid;

use super::{RecordStore, StoreResult};
use crate::error::StoreError;
use crate::models::{
    Category, Complaint, ComplaintFilter, ComplaintGroup, CounterField, Feedback, Location, Page, Priority, Resolution, Status,
    StatusUpdate, User,
};

const COMPLAINT_COLUMNS: &str = "complaint_id, reference, user_id, category, title, description, location, \
     status, priority, is_urgent, assigned_to, resolution, feedback, is_anonymous, views, status_updates, \
     created_at, updated_at";

const USER_COLUMNS: &str =
    "user_id, full_name, role, complaints_count, resolved_complaints_count, created_at, updated_at";

// Shared WHERE clause for filtered scans; binds $1..$7 in ComplaintFilter field order.
const FILTER_CLAUSE: &str = r#"
    WHERE ($1::complaint_category IS NULL OR category = $1)
      AND ($2::complaint_status   IS NULL OR status = $2)
      AND ($3::complaint_priority IS NULL OR priority = $3)
      AND ($4::uuid        IS NULL OR user_id = $4)
      AND ($5::uuid        IS NULL OR assigned_to = $5)
      AND ($6::timestamptz IS NULL OR created_at >= $6)
      AND ($7::timestamptz IS NULL OR created_at <= $7)
"#;

const RESOLVED_WITH_TIME: &str = "status = 'resolved' AND resolution ? 'resolved_at'";

#[derive(FromRow)]
struct ComplaintRow {
    complaint_id: Uuid,
    reference: String,
    user_id: Uuid,
    category: Category,
    title: String,
    description: String,
    location: Json<Location>,
    status: Status,
    priority: Priority,
    is_urgent: bool,
    assigned_to: Option<Uuid>,
    resolution: Option<Json<Resolution>>,
    feedback: Option<Json<Feedback>>,
    is_anonymous: bool,
    views: i64,
    status_updates: Json<Vec<StatusUpdate>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ComplaintRow> for Complaint {
    fn from(r: ComplaintRow) -> Self {
        Complaint {
            complaint_id: r.complaint_id,
            reference: r.reference,
            user_id: r.user_id,
            category: r.category,
            title: r.title,
            description: r.description,
            location: r.location.0,
            status: r.status,
            priority: r.priority,
            is_urgent: r.is_urgent,
            assigned_to: r.assigned_to,
            resolution: r.resolution.map(|j| j.0),
            feedback: r.feedback.map(|j| j.0),
            is_anonymous: r.is_anonymous,
            views: r.views,
            status_updates: r.status_updates.0,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

// Common error mapper
fn store_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(e.to_string())
        }
        other => StoreError::Transient(other.to_string()),
    }
}

/// [`RecordStore`] over the relational schema in `migrations/`.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        query(
            r#"
            INSERT INTO public.users
              (user_id, full_name, role, complaints_count, resolved_complaints_count, created_at, updated_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.full_name)
        .bind(user.role)
        .bind(user.complaints_count)
        .bind(user.resolved_complaints_count)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn get_user(&self, user_id: Uuid) -> StoreResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM public.users WHERE user_id = $1");
        query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .ok_or(StoreError::user_not_found(user_id))
    }

    async fn list_user_ids(&self) -> StoreResult<Vec<Uuid>> {
        query_scalar::<_, Uuid>(r#"SELECT user_id FROM public.users ORDER BY user_id"#)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)
    }

    async fn insert_complaint(&self, c: &Complaint) -> StoreResult<()> {
        query(
            r#"
            INSERT INTO public.complaints
              (complaint_id, reference, user_id, category, title, description, location,
               status, priority, is_urgent, assigned_to, resolution, feedback, is_anonymous,
               views, status_updates, created_at, updated_at)
            VALUES
              ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18)
            "#,
        )
        .bind(c.complaint_id)
        .bind(&c.reference)
        .bind(c.user_id)
        .bind(c.category)
        .bind(&c.title)
        .bind(&c.description)
        .bind(Json(c.location.clone()))
        .bind(c.status)
        .bind(c.priority)
        .bind(c.is_urgent)
        .bind(c.assigned_to)
        .bind(c.resolution.clone().map(Json))
        .bind(c.feedback.clone().map(Json))
        .bind(c.is_anonymous)
        .bind(c.views)
        .bind(Json(c.status_updates.clone()))
        .bind(c.created_at)
        .bind(c.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn get_complaint(&self, complaint_id: Uuid) -> StoreResult<Complaint> {
        let sql = format!("SELECT {COMPLAINT_COLUMNS} FROM public.complaints WHERE complaint_id = $1");
        query_as::<_, ComplaintRow>(&sql)
            .bind(complaint_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .map(Complaint::from)
            .ok_or(StoreError::complaint_not_found(complaint_id))
    }

    async fn write_complaint(&self, c: &Complaint, expected: Status, clear_feedback: bool) -> StoreResult<bool> {
        let res = query(
            r#"
            UPDATE public.complaints SET
              status      = $2,
              priority    = $3,
              assigned_to = $4,
              resolution  = $5,
              feedback    = CASE WHEN $6 THEN NULL ELSE feedback END,
              updated_at  = $7
            WHERE complaint_id = $1 AND status = $8
            "#,
        )
        .bind(c.complaint_id)
        .bind(c.status)
        .bind(c.priority)
        .bind(c.assigned_to)
        .bind(c.resolution.clone().map(Json))
        .bind(clear_feedback)
        .bind(c.updated_at)
        .bind(expected)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(res.rows_affected() == 1)
    }

    async fn append_status_update(&self, complaint_id: Uuid, entry: &StatusUpdate) -> StoreResult<()> {
        let res = query(
            r#"
            UPDATE public.complaints
               SET status_updates = status_updates || jsonb_build_array($2::jsonb)
             WHERE complaint_id = $1
            "#,
        )
        .bind(complaint_id)
        .bind(Json(entry.clone()))
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::complaint_not_found(complaint_id));
        }
        Ok(())
    }

    async fn set_feedback_once(&self, complaint_id: Uuid, feedback: &Feedback) -> StoreResult<bool> {
        let res = query(
            r#"
            UPDATE public.complaints
               SET feedback = $2, updated_at = now()
             WHERE complaint_id = $1 AND feedback IS NULL AND status = 'resolved'
            "#,
        )
        .bind(complaint_id)
        .bind(Json(feedback.clone()))
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(res.rows_affected() == 1)
    }

    async fn increment_views(&self, complaint_id: Uuid) -> StoreResult<i64> {
        query_scalar::<_, i64>(
            r#"UPDATE public.complaints SET views = views + 1 WHERE complaint_id = $1 RETURNING views"#,
        )
        .bind(complaint_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?
        .ok_or(StoreError::complaint_not_found(complaint_id))
    }

    async fn delete_complaint(&self, complaint_id: Uuid) -> StoreResult<Complaint> {
        let sql = format!("DELETE FROM public.complaints WHERE complaint_id = $1 RETURNING {COMPLAINT_COLUMNS}");
        query_as::<_, ComplaintRow>(&sql)
            .bind(complaint_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .map(Complaint::from)
            .ok_or(StoreError::complaint_not_found(complaint_id))
    }

    async fn adjust_counter(&self, user_id: Uuid, field: CounterField, delta: i64) -> StoreResult<()> {
        // Column names cannot be bound; pick from a closed set.
        let sql = match field {
            CounterField::ComplaintsCount => {
                r#"UPDATE public.users SET complaints_count = complaints_count + $2, updated_at = now() WHERE user_id = $1"#
            }
            CounterField::ResolvedComplaintsCount => {
                r#"UPDATE public.users SET resolved_complaints_count = resolved_complaints_count + $2, updated_at = now() WHERE user_id = $1"#
            }
        };
        let res = query(sql)
            .bind(user_id)
            .bind(delta)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::user_not_found(user_id));
        }
        Ok(())
    }

    async fn overwrite_counters(&self, user_id: Uuid, complaints: i64, resolved: i64) -> StoreResult<()> {
        let res = query(
            r#"
            UPDATE public.users
               SET complaints_count = $2, resolved_complaints_count = $3, updated_at = now()
             WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(complaints)
        .bind(resolved)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::user_not_found(user_id));
        }
        Ok(())
    }

    async fn count_owned(&self, user_id: Uuid) -> StoreResult<(i64, i64)> {
        query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*)::BIGINT,
                   (COUNT(*) FILTER (WHERE status = 'resolved'))::BIGINT
              FROM public.complaints
             WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)
    }

    async fn scan_complaints(&self, f: &ComplaintFilter, page: Option<Page>) -> StoreResult<Vec<Complaint>> {
        let sql = format!(
            "SELECT {COMPLAINT_COLUMNS} FROM public.complaints {FILTER_CLAUSE} \
             ORDER BY created_at DESC, complaint_id DESC LIMIT $8 OFFSET $9"
        );
        let rows = query_as::<_, ComplaintRow>(&sql)
            .bind(f.category)
            .bind(f.status)
            .bind(f.priority)
            .bind(f.user_id)
            .bind(f.assigned_to)
            .bind(f.created_from)
            .bind(f.created_to)
            .bind(page.map(|p| i64::from(p.limit())))
            .bind(page.map_or(0, |p| p.offset()))
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().map(Complaint::from).collect())
    }

    async fn count_complaints(&self, f: &ComplaintFilter) -> StoreResult<i64> {
        let sql = format!("SELECT COUNT(*)::BIGINT FROM public.complaints {FILTER_CLAUSE}");
        query_scalar::<_, i64>(&sql)
            .bind(f.category)
            .bind(f.status)
            .bind(f.priority)
            .bind(f.user_id)
            .bind(f.assigned_to)
            .bind(f.created_from)
            .bind(f.created_to)
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)
    }

    async fn complaint_groups(&self, f: &ComplaintFilter) -> StoreResult<Vec<ComplaintGroup>> {
        let sql = format!(
            r#"
            SELECT category, status, priority,
                   NULLIF(BTRIM(location->>'district'), '') AS district,
                   assigned_to,
                   COUNT(*)::BIGINT AS count,
                   COALESCE(SUM(EXTRACT(EPOCH FROM (resolution->>'resolved_at')::timestamptz - created_at))
                            FILTER (WHERE {RESOLVED_WITH_TIME}), 0)::DOUBLE PRECISION AS resolution_seconds_sum,
                   (COUNT(*) FILTER (WHERE {RESOLVED_WITH_TIME}))::BIGINT AS resolution_samples,
                   COALESCE(SUM((feedback->>'rating')::BIGINT), 0)::BIGINT AS rating_sum,
                   COUNT(feedback)::BIGINT AS rating_count
              FROM public.complaints {FILTER_CLAUSE}
             GROUP BY 1, 2, 3, 4, 5
            "#
        );
        query_as::<_, ComplaintGroup>(&sql)
            .bind(f.category)
            .bind(f.status)
            .bind(f.priority)
            .bind(f.user_id)
            .bind(f.assigned_to)
            .bind(f.created_from)
            .bind(f.created_to)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)
    }
}
