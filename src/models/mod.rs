//! Domain types shared by the store, the engine and the binary.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ───────────────────────────────────────
// Enumerations (persisted labels are the wire contract)
// ───────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "complaint_category", rename_all = "kebab-case")]
pub enum Category {
    SocialWelfare,
    Education,
    Healthcare,
    Infrastructure,
    WaterSanitation,
    Electricity,
    Roads,
    Agriculture,
    Security,
    Other,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::SocialWelfare,
        Category::Education,
        Category::Healthcare,
        Category::Infrastructure,
        Category::WaterSanitation,
        Category::Electricity,
        Category::Roads,
        Category::Agriculture,
        Category::Security,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::SocialWelfare => "social-welfare",
            Category::Education => "education",
            Category::Healthcare => "healthcare",
            Category::Infrastructure => "infrastructure",
            Category::WaterSanitation => "water-sanitation",
            Category::Electricity => "electricity",
            Category::Roads => "roads",
            Category::Agriculture => "agriculture",
            Category::Security => "security",
            Category::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "complaint_status", rename_all = "kebab-case")]
pub enum Status {
    Submitted,
    InProgress,
    Resolved,
    Closed,
    Rejected,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Submitted => "submitted",
            Status::InProgress => "in-progress",
            Status::Resolved => "resolved",
            Status::Closed => "closed",
            Status::Rejected => "rejected",
        }
    }

    /// Still waiting on an official: counted as "pending" by analytics.
    pub fn is_pending(self) -> bool {
        matches!(self, Status::Submitted | Status::InProgress)
    }

    /// Terminal under normal flow; administrative updates may still move it.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Resolved | Status::Closed | Status::Rejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "complaint_priority", rename_all = "kebab-case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Priority::Low, Priority::Medium, Priority::High, Priority::Urgent];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    pub fn from_urgency(is_urgent: bool) -> Self {
        if is_urgent {
            Priority::Urgent
        } else {
            Priority::Medium
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "user_role", rename_all = "kebab-case")]
pub enum Role {
    Citizen,
    Official,
    Admin,
}

macro_rules! wire_enum_text {
    ($ty:ident, $what:literal, [$($variant:ident),+ $(,)?]) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = UnknownValue;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim();
                [$($ty::$variant),+]
                    .into_iter()
                    .find(|v| v.as_str() == wanted)
                    .ok_or_else(|| UnknownValue { kind: $what, value: s.to_string() })
            }
        }
    };
}

wire_enum_text!(Category, "category", [
    SocialWelfare, Education, Healthcare, Infrastructure, WaterSanitation,
    Electricity, Roads, Agriculture, Security, Other,
]);
wire_enum_text!(Status, "status", [Submitted, InProgress, Resolved, Closed, Rejected]);
wire_enum_text!(Priority, "priority", [Low, Medium, High, Urgent]);

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Citizen => "citizen",
            Role::Official => "official",
            Role::Admin => "admin",
        }
    }
}

wire_enum_text!(Role, "role", [Citizen, Official, Admin]);

/// A string that is not one of the enumerated wire values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
}

// ───────────────────────────────────────
// Embedded values (JSONB columns)
// ───────────────────────────────────────
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub district: Option<String>,
    pub sector: Option<String>,
    pub cell: Option<String>,
    pub coordinates: Option<Coordinates>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub description: String,
    pub resolved_at: DateTime<Utc>,
    pub resolved_by: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub rating: u8, // 1..=5
    pub comment: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// One entry of the append-only status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: Status,
    pub message: Option<String>,
    pub updated_by: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

// ───────────────────────────────────────
// Entities
// ───────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Complaint {
    pub complaint_id: Uuid,
    pub reference: String, // COMP-<millis>, informational only
    pub user_id: Uuid,
    pub category: Category,
    pub title: String,
    pub description: String,
    pub location: Location,
    pub status: Status,
    pub priority: Priority,
    pub is_urgent: bool,
    pub assigned_to: Option<Uuid>,
    pub resolution: Option<Resolution>,
    pub feedback: Option<Feedback>,
    pub is_anonymous: bool,
    pub views: i64,
    pub status_updates: Vec<StatusUpdate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Complaint {
    pub fn district(&self) -> Option<&str> {
        self.location
            .district
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }

    /// Seconds from creation to resolution, for resolved complaints only.
    pub fn resolution_seconds(&self) -> Option<f64> {
        if self.status != Status::Resolved {
            return None;
        }
        let resolution = self.resolution.as_ref()?;
        let elapsed = resolution.resolved_at - self.created_at;
        Some(elapsed.num_milliseconds() as f64 / 1000.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub full_name: String,
    pub role: Role,
    pub complaints_count: i64,
    pub resolved_complaints_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(full_name: impl Into<String>, role: Role) -> Self {
        let now = Utc::now();
        Self {
            user_id: Uuid::new_v4(),
            full_name: full_name.into(),
            role,
            complaints_count: 0,
            resolved_complaints_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Derived per-user counters. Names match the `users` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterField {
    ComplaintsCount,
    ResolvedComplaintsCount,
}

impl CounterField {
    pub fn column(self) -> &'static str {
        match self {
            CounterField::ComplaintsCount => "complaints_count",
            CounterField::ResolvedComplaintsCount => "resolved_complaints_count",
        }
    }
}

// ───────────────────────────────────────
// Inputs
// ───────────────────────────────────────
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewComplaint {
    #[serde(default)] pub category: String,
    #[serde(default)] pub title: String,
    #[serde(default)] pub description: String,
    #[serde(default)] pub location: Location,
    #[serde(default)] pub is_urgent: bool,
    #[serde(default)] pub is_anonymous: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResolutionInput {
    pub description: String,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Partial update; only these fields are writable after submission.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComplaintUpdate {
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<Uuid>,
    pub resolution: Option<ResolutionInput>,
    /// Free text recorded in the status history entry.
    pub message: Option<String>,
    pub updated_by: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedbackInput {
    pub rating: i64,
    pub comment: Option<String>,
}

// ───────────────────────────────────────
// Queries
// ───────────────────────────────────────
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComplaintFilter {
    pub category: Option<Category>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub user_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

impl ComplaintFilter {
    pub fn for_user(user_id: Uuid) -> Self {
        Self { user_id: Some(user_id), ..Self::default() }
    }

    pub fn created_between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { created_from: Some(from), created_to: Some(to), ..Self::default() }
    }

    pub fn matches(&self, c: &Complaint) -> bool {
        self.category.map_or(true, |v| c.category == v)
            && self.status.map_or(true, |v| c.status == v)
            && self.priority.map_or(true, |v| c.priority == v)
            && self.user_id.map_or(true, |v| c.user_id == v)
            && self.assigned_to.map_or(true, |v| c.assigned_to == Some(v))
            && self.created_from.map_or(true, |v| c.created_at >= v)
            && self.created_to.map_or(true, |v| c.created_at <= v)
    }
}

/// 1-based page request. Only built through [`Page::new`], so `limit` is
/// always within `1..=MAX_LIMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "PageParams")]
pub struct Page {
    page: u32,
    limit: u32,
}

#[derive(Deserialize)]
struct PageParams {
    #[serde(default = "first_page")]
    page: u32,
    #[serde(default = "default_limit")]
    limit: u32,
}

fn first_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    Page::DEFAULT_LIMIT
}

impl From<PageParams> for Page {
    fn from(p: PageParams) -> Self {
        Page::new(p.page, p.limit)
    }
}

impl Page {
    pub const MAX_LIMIT: u32 = 100;
    pub const DEFAULT_LIMIT: u32 = 10;

    pub fn new(page: u32, limit: u32) -> Self {
        Self { page: page.max(1), limit: limit.clamp(1, Self::MAX_LIMIT) }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, Self::DEFAULT_LIMIT)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub pages: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: i64, page: Page) -> Self {
        let limit = page.limit().max(1);
        let per_page = i64::from(limit);
        Self {
            items,
            pagination: Pagination {
                total,
                page: page.page(),
                limit,
                pages: (total.max(0) + per_page - 1) / per_page,
            },
        }
    }
}

// ───────────────────────────────────────
// Grouped aggregates
// ───────────────────────────────────────

/// Counts and sums for all complaints sharing one
/// `(category, status, priority, district, assigned_to)` key. Every analytics
/// view is a fold over these rows, so the store can do the heavy reading.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ComplaintGroup {
    pub category: Category,
    pub status: Status,
    pub priority: Priority,
    /// Trimmed; `None` when missing or blank.
    pub district: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub count: i64,
    /// Sum of creation-to-resolution seconds over resolved complaints that
    /// carry a resolution.
    pub resolution_seconds_sum: f64,
    pub resolution_samples: i64,
    pub rating_sum: i64,
    pub rating_count: i64,
}

impl ComplaintGroup {
    /// Groups an in-memory complaint set the same way the SQL store does.
    pub fn collect<'a>(complaints: impl IntoIterator<Item = &'a Complaint>) -> Vec<ComplaintGroup> {
        type Key = (Category, Status, Priority, Option<String>, Option<Uuid>);
        let mut groups: HashMap<Key, ComplaintGroup> = HashMap::new();
        for c in complaints {
            let district = c.district().map(str::to_string);
            let key = (c.category, c.status, c.priority, district.clone(), c.assigned_to);
            let g = groups.entry(key).or_insert_with(|| ComplaintGroup {
                category: c.category,
                status: c.status,
                priority: c.priority,
                district,
                assigned_to: c.assigned_to,
                count: 0,
                resolution_seconds_sum: 0.0,
                resolution_samples: 0,
                rating_sum: 0,
                rating_count: 0,
            });
            g.count += 1;
            if let Some(secs) = c.resolution_seconds() {
                g.resolution_seconds_sum += secs;
                g.resolution_samples += 1;
            }
            if let Some(f) = &c.feedback {
                g.rating_sum += i64::from(f.rating);
                g.rating_count += 1;
            }
        }
        groups.into_values().collect()
    }
}
