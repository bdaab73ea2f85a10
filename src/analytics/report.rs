//! Aggregate statistics over grouped complaint rows. Pure functions; the
//! engine feeds them whatever [`RecordStore::complaint_groups`] returned.
//!
//! [`RecordStore::complaint_groups`]: crate::db::RecordStore::complaint_groups

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Category, ComplaintGroup, Priority, Status};

/// Bucket for complaints without a district.
pub const UNKNOWN_DISTRICT: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub category: Category,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub total: u64,
    pub resolved: u64,
    pub pending: u64,
    pub urgent: u64,
    /// Percentage, two decimals; 0 when there are no complaints.
    pub resolution_rate: f64,
    pub avg_resolution_seconds: f64,
    pub category_breakdown: Vec<CategoryCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryStats {
    pub category: Category,
    pub count: u64,
    pub resolved: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriorityStats {
    pub priority: Priority,
    pub count: u64,
    pub resolved: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistrictStats {
    pub district: String,
    pub total: u64,
    pub resolved: u64,
    pub pending: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Satisfaction {
    pub average_score: f64,
    pub total_feedback: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfficialPerformance {
    pub official_id: Uuid,
    pub handled: u64,
    pub resolved: u64,
    pub avg_resolution_seconds: f64,
}

/// Everything at once, stamped with when it was computed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSnapshot {
    pub generated_at: DateTime<Utc>,
    pub dashboard: Dashboard,
    pub rejected: u64,
    pub urgent_resolved: u64,
    pub priority_breakdown: Vec<PriorityStats>,
    pub district_performance: Vec<DistrictStats>,
    pub official_performance: Vec<OfficialPerformance>,
    pub satisfaction: Satisfaction,
}

pub fn resolution_rate(resolved: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(resolved as f64 / total as f64 * 100.0)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Running totals for one output bucket.
#[derive(Default)]
struct Tally {
    count: u64,
    resolved: u64,
    pending: u64,
    seconds_sum: f64,
    seconds_samples: i64,
}

impl Tally {
    fn add(&mut self, g: &ComplaintGroup) {
        let n = g.count.max(0) as u64;
        self.count += n;
        if g.status == Status::Resolved {
            self.resolved += n;
        }
        if g.status.is_pending() {
            self.pending += n;
        }
        self.seconds_sum += g.resolution_seconds_sum;
        self.seconds_samples += g.resolution_samples;
    }

    fn avg_resolution_seconds(&self) -> f64 {
        if self.seconds_samples <= 0 {
            0.0
        } else {
            self.seconds_sum / self.seconds_samples as f64
        }
    }
}

fn tally_by<K, F>(groups: &[ComplaintGroup], key: F) -> HashMap<K, Tally>
where
    K: std::hash::Hash + Eq,
    F: Fn(&ComplaintGroup) -> Option<K>,
{
    let mut out: HashMap<K, Tally> = HashMap::new();
    for g in groups {
        if let Some(k) = key(g) {
            out.entry(k).or_default().add(g);
        }
    }
    out
}

fn count_where(groups: &[ComplaintGroup], pred: impl Fn(&ComplaintGroup) -> bool) -> u64 {
    groups.iter().filter(|g| pred(g)).map(|g| g.count.max(0) as u64).sum()
}

/// Count descending, then label ascending.
fn by_count_then_label(a: (u64, &str), b: (u64, &str)) -> Ordering {
    b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1))
}

pub fn dashboard(groups: &[ComplaintGroup], include_empty_categories: bool) -> Dashboard {
    let mut all = Tally::default();
    for g in groups {
        all.add(g);
    }

    let mut counts: HashMap<Category, u64> = HashMap::new();
    if include_empty_categories {
        counts.extend(Category::ALL.map(|c| (c, 0)));
    }
    for (category, t) in tally_by(groups, |g| Some(g.category)) {
        counts.insert(category, t.count);
    }
    let mut category_breakdown: Vec<CategoryCount> =
        counts.into_iter().map(|(category, count)| CategoryCount { category, count }).collect();
    category_breakdown
        .sort_by(|a, b| by_count_then_label((a.count, a.category.as_str()), (b.count, b.category.as_str())));

    Dashboard {
        total: all.count,
        resolved: all.resolved,
        pending: all.pending,
        urgent: count_where(groups, |g| g.priority == Priority::Urgent),
        resolution_rate: resolution_rate(all.resolved, all.count),
        avg_resolution_seconds: all.avg_resolution_seconds(),
        category_breakdown,
    }
}

pub fn by_category(groups: &[ComplaintGroup]) -> Vec<CategoryStats> {
    let mut out: Vec<CategoryStats> = tally_by(groups, |g| Some(g.category))
        .into_iter()
        .map(|(category, t)| CategoryStats { category, count: t.count, resolved: t.resolved })
        .collect();
    out.sort_by(|a, b| by_count_then_label((a.count, a.category.as_str()), (b.count, b.category.as_str())));
    out
}

pub fn by_priority(groups: &[ComplaintGroup]) -> Vec<PriorityStats> {
    let mut out: Vec<PriorityStats> = tally_by(groups, |g| Some(g.priority))
        .into_iter()
        .map(|(priority, t)| PriorityStats { priority, count: t.count, resolved: t.resolved })
        .collect();
    out.sort_by(|a, b| by_count_then_label((a.count, a.priority.as_str()), (b.count, b.priority.as_str())));
    out
}

pub fn by_district(groups: &[ComplaintGroup]) -> Vec<DistrictStats> {
    let named = |g: &ComplaintGroup| Some(g.district.clone().unwrap_or_else(|| UNKNOWN_DISTRICT.to_string()));
    let mut out: Vec<DistrictStats> = tally_by(groups, named)
        .into_iter()
        .map(|(district, t)| DistrictStats { district, total: t.count, resolved: t.resolved, pending: t.pending })
        .collect();
    out.sort_by(|a, b| by_count_then_label((a.total, a.district.as_str()), (b.total, b.district.as_str())));
    out
}

pub fn satisfaction(groups: &[ComplaintGroup]) -> Satisfaction {
    let (sum, n) = groups
        .iter()
        .fold((0i64, 0i64), |(s, n), g| (s + g.rating_sum, n + g.rating_count));
    Satisfaction {
        total_feedback: n.max(0) as u64,
        average_score: if n > 0 { sum as f64 / n as f64 } else { 0.0 },
    }
}

pub fn official_performance(groups: &[ComplaintGroup]) -> Vec<OfficialPerformance> {
    let mut out: Vec<OfficialPerformance> = tally_by(groups, |g| g.assigned_to)
        .into_iter()
        .map(|(official_id, t)| OfficialPerformance {
            official_id,
            handled: t.count,
            resolved: t.resolved,
            avg_resolution_seconds: t.avg_resolution_seconds(),
        })
        .collect();
    out.sort_by(|a, b| b.handled.cmp(&a.handled).then_with(|| a.official_id.cmp(&b.official_id)));
    out
}

pub fn snapshot(groups: &[ComplaintGroup], include_empty_categories: bool, now: DateTime<Utc>) -> PerformanceSnapshot {
    PerformanceSnapshot {
        generated_at: now,
        dashboard: dashboard(groups, include_empty_categories),
        rejected: count_where(groups, |g| g.status == Status::Rejected),
        urgent_resolved: count_where(groups, |g| g.priority == Priority::Urgent && g.status == Status::Resolved),
        priority_breakdown: by_priority(groups),
        district_performance: by_district(groups),
        official_performance: official_performance(groups),
        satisfaction: satisfaction(groups),
    }
}
