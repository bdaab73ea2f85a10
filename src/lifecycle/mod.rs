//! Complaint lifecycle: submission, official updates, views, feedback, deletion.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::LifecycleConfig;
use crate::db::RecordStore;
use crate::error::{EngineError, Result};
use crate::models::{
    Category, Complaint, ComplaintFilter, ComplaintUpdate, CounterField, Feedback, FeedbackInput, NewComplaint,
    Page, Paginated, Priority, Resolution, Status, StatusUpdate,
};
use crate::notify::{LifecycleEvent, NotificationEmitter};
use crate::reconciler::CounterReconciler;

pub mod transition;

pub use transition::{Effects, Transition};

#[derive(Clone)]
pub struct LifecycleManager {
    store: Arc<dyn RecordStore>,
    emitter: Arc<dyn NotificationEmitter>,
    counters: CounterReconciler,
    config: LifecycleConfig,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<dyn RecordStore>,
        emitter: Arc<dyn NotificationEmitter>,
        counters: CounterReconciler,
        config: LifecycleConfig,
    ) -> Self {
        Self { store, emitter, counters, config }
    }

    /// Files a new complaint for `citizen_id` and bumps their complaint count.
    pub async fn submit(&self, citizen_id: Uuid, input: NewComplaint) -> Result<Complaint> {
        let category = validate_new(&input)?;
        self.store.get_user(citizen_id).await?;

        let now = Utc::now();
        let complaint = Complaint {
            complaint_id: Uuid::new_v4(),
            reference: format!("COMP-{}", now.timestamp_millis()),
            user_id: citizen_id,
            category,
            title: input.title.trim().to_string(),
            description: input.description.trim().to_string(),
            location: input.location,
            status: Status::Submitted,
            priority: Priority::from_urgency(input.is_urgent),
            is_urgent: input.is_urgent,
            assigned_to: None,
            resolution: None,
            feedback: None,
            is_anonymous: input.is_anonymous,
            views: 0,
            status_updates: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        self.store.insert_complaint(&complaint).await?;
        self.counters
            .apply_delta_or_log(citizen_id, CounterField::ComplaintsCount, 1, complaint.complaint_id)
            .await;

        info!(
            complaint_id = %complaint.complaint_id,
            user_id = %citizen_id,
            category = %complaint.category,
            priority = %complaint.priority,
            "complaint submitted"
        );
        Ok(complaint)
    }

    pub async fn get(&self, complaint_id: Uuid) -> Result<Complaint> {
        Ok(self.store.get_complaint(complaint_id).await?)
    }

    /// Detail read: loads the complaint and counts the view.
    pub async fn view(&self, complaint_id: Uuid) -> Result<Complaint> {
        let mut complaint = self.store.get_complaint(complaint_id).await?;
        if let Some(views) = self.record_view(complaint_id).await {
            complaint.views = views;
        }
        Ok(complaint)
    }

    /// Atomic `views + 1`. Never fails the surrounding read; returns the new
    /// count when the increment went through.
    pub async fn record_view(&self, complaint_id: Uuid) -> Option<i64> {
        match self.store.increment_views(complaint_id).await {
            Ok(views) => Some(views),
            Err(e) => {
                warn!(%complaint_id, error = %e, "view increment dropped");
                None
            }
        }
    }

    pub async fn list(&self, filter: &ComplaintFilter, page: Page) -> Result<Paginated<Complaint>> {
        let items = self.store.scan_complaints(filter, Some(page)).await?;
        let total = self.store.count_complaints(filter).await?;
        Ok(Paginated::new(items, total, page))
    }

    pub async fn list_for_user(&self, user_id: Uuid, page: Page) -> Result<Paginated<Complaint>> {
        self.list(&ComplaintFilter::for_user(user_id), page).await
    }

    /// Partial update of status, priority, assignment and resolution.
    ///
    /// The status write is conditional on the status read, so transition
    /// side effects run exactly once per real change even with concurrent
    /// updaters; a writer that loses the race reloads and recomputes.
    /// Feedback is never written back from the read, so a rating recorded
    /// while the update is in flight survives it.
    pub async fn update(&self, complaint_id: Uuid, changes: ComplaintUpdate) -> Result<Complaint> {
        validate_update(&changes)?;

        for attempt in 1..=self.config.max_write_attempts.max(1) {
            let current = self.store.get_complaint(complaint_id).await?;
            let now = Utc::now();
            let (next, transition) = self.plan_update(&current, &changes, now)?;
            let clear_feedback =
                transition.effects().regresses_resolution && self.config.regression_policy.clears_feedback();

            if !self.store.write_complaint(&next, current.status, clear_feedback).await? {
                debug!(%complaint_id, attempt, "status changed underneath update; retrying");
                continue;
            }
            return Ok(self.after_write(&current, next, transition, &changes, now).await);
        }

        Err(EngineError::Conflict(format!(
            "complaint {complaint_id} kept changing; gave up after {} attempts",
            self.config.max_write_attempts
        )))
    }

    /// Computes the record to write and the transition it represents.
    fn plan_update(
        &self,
        current: &Complaint,
        changes: &ComplaintUpdate,
        now: DateTime<Utc>,
    ) -> Result<(Complaint, Transition)> {
        let new_status = changes.status.unwrap_or(current.status);
        let transition = Transition::classify(current.status, new_status);
        let fx = transition.effects();

        let mut next = current.clone();
        next.status = new_status;
        next.updated_at = now;
        if let Some(priority) = changes.priority {
            next.priority = priority;
        }
        if let Some(official) = changes.assigned_to {
            next.assigned_to = Some(official);
        }

        match &changes.resolution {
            Some(_) if new_status != Status::Resolved => {
                return Err(EngineError::validation(
                    "resolution can only be recorded when the complaint is resolved",
                ));
            }
            Some(input) => {
                let keep_time = (!fx.requires_resolution)
                    .then(|| current.resolution.as_ref().map(|r| r.resolved_at))
                    .flatten();
                let resolved_at = input.resolved_at.or(keep_time).unwrap_or(now);
                if resolved_at < current.created_at {
                    return Err(EngineError::validation("resolved_at is earlier than the complaint itself"));
                }
                next.resolution = Some(Resolution {
                    description: input.description.trim().to_string(),
                    resolved_at,
                    resolved_by: changes
                        .updated_by
                        .or_else(|| current.resolution.as_ref().and_then(|r| r.resolved_by)),
                });
            }
            None if fx.requires_resolution => {
                // A stale resolution left by a `keep` regression can be reused.
                let Some(previous) = &current.resolution else {
                    return Err(EngineError::validation(
                        "resolution description is required to resolve a complaint",
                    ));
                };
                next.resolution = Some(Resolution {
                    description: previous.description.clone(),
                    resolved_at: now,
                    resolved_by: changes.updated_by.or(previous.resolved_by),
                });
            }
            None => {}
        }

        if fx.regresses_resolution {
            let policy = self.config.regression_policy;
            if policy.clears_resolution() {
                next.resolution = None;
            }
            if policy.clears_feedback() {
                next.feedback = None;
            }
        }

        Ok((next, transition))
    }

    /// History, counters and notifications for a committed update. Failures
    /// here are logged; the complaint write already happened.
    async fn after_write(
        &self,
        before: &Complaint,
        mut after: Complaint,
        transition: Transition,
        changes: &ComplaintUpdate,
        now: DateTime<Utc>,
    ) -> Complaint {
        let fx = transition.effects();
        let complaint_id = after.complaint_id;

        if after.status == Status::Resolved {
            // Feedback may have landed since the read; report what is stored.
            match self.store.get_complaint(complaint_id).await {
                Ok(latest) if latest.status == after.status => after.feedback = latest.feedback,
                Ok(_) => {}
                Err(e) => debug!(%complaint_id, error = %e, "feedback refresh skipped"),
            }
        }

        if fx.append_history {
            let entry = StatusUpdate {
                status: after.status,
                message: changes.message.clone(),
                updated_by: changes.updated_by,
                updated_at: now,
            };
            match self.store.append_status_update(complaint_id, &entry).await {
                Ok(()) => after.status_updates.push(entry),
                Err(e) => error!(%complaint_id, error = %e, "status history append failed"),
            }
            info!(%complaint_id, from = %before.status, to = %after.status, "status transition");
        }

        self.counters
            .apply_delta_or_log(after.user_id, CounterField::ResolvedComplaintsCount, fx.resolved_delta, complaint_id)
            .await;

        if fx.notify_resolution {
            self.emit(LifecycleEvent::resolution(&after)).await;
        }
        if fx.notify_status_change {
            self.emit(LifecycleEvent::status_change(&after, before.status)).await;
        }
        if let Some(official) = changes.assigned_to.filter(|o| before.assigned_to != Some(*o)) {
            info!(%complaint_id, official = %official, "complaint assigned");
            self.emit(LifecycleEvent::assignment(&after, official)).await;
        }

        after
    }

    /// Records citizen feedback once, after resolution.
    pub async fn submit_feedback(&self, complaint_id: Uuid, input: FeedbackInput) -> Result<Complaint> {
        let rating = u8::try_from(input.rating)
            .ok()
            .filter(|r| (1..=5).contains(r))
            .ok_or_else(|| EngineError::validation(format!("rating must be 1..=5, got {}", input.rating)))?;

        let current = self.store.get_complaint(complaint_id).await?;
        check_feedback_allowed(&current)?;

        let feedback = Feedback {
            rating,
            comment: input.comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            submitted_at: Utc::now(),
        };
        if !self.store.set_feedback_once(complaint_id, &feedback).await? {
            // Lost a race: report whatever made the conditional write miss.
            let latest = self.store.get_complaint(complaint_id).await?;
            check_feedback_allowed(&latest)?;
            return Err(EngineError::Conflict(format!("feedback write for {complaint_id} did not apply")));
        }

        info!(%complaint_id, rating, "feedback recorded");
        let mut updated = current;
        updated.feedback = Some(feedback);
        Ok(updated)
    }

    /// Administrative hard delete; decrements the owner's counters.
    pub async fn delete(&self, complaint_id: Uuid) -> Result<Complaint> {
        let removed = self.store.delete_complaint(complaint_id).await?;
        self.counters
            .apply_delta_or_log(removed.user_id, CounterField::ComplaintsCount, -1, complaint_id)
            .await;
        if removed.status == Status::Resolved {
            self.counters
                .apply_delta_or_log(removed.user_id, CounterField::ResolvedComplaintsCount, -1, complaint_id)
                .await;
        }
        info!(%complaint_id, user_id = %removed.user_id, "complaint deleted");
        Ok(removed)
    }

    async fn emit(&self, event: LifecycleEvent) {
        if let Err(e) = self.emitter.emit(&event).await {
            warn!(
                complaint_id = %event.complaint_id,
                kind = ?event.kind,
                error = %e,
                "notification dropped"
            );
        }
    }
}

fn validate_new(input: &NewComplaint) -> Result<Category> {
    if input.category.trim().is_empty() {
        return Err(EngineError::validation("category is required"));
    }
    if input.title.trim().is_empty() {
        return Err(EngineError::validation("title is required"));
    }
    if input.description.trim().is_empty() {
        return Err(EngineError::validation("description is required"));
    }
    input.category.parse().map_err(|e| EngineError::validation(format!("{e}")))
}

fn validate_update(changes: &ComplaintUpdate) -> Result<()> {
    if let Some(r) = &changes.resolution {
        if r.description.trim().is_empty() {
            return Err(EngineError::validation("resolution description must not be empty"));
        }
    }
    Ok(())
}

fn check_feedback_allowed(c: &Complaint) -> Result<()> {
    if c.status != Status::Resolved {
        return Err(EngineError::InvalidState(format!(
            "feedback needs a resolved complaint; {} is {}",
            c.complaint_id, c.status
        )));
    }
    if c.feedback.is_some() {
        return Err(EngineError::AlreadySubmitted(c.complaint_id));
    }
    Ok(())
}
