//! Lifecycle events handed to the notification emitter.
//!
//! Delivery (push, SMS, email) lives outside this crate. The engine emits
//! synchronously after a successful transition and only logs emitter errors;
//! a failed emission never rolls back the lifecycle change.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Complaint, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    Resolution,
    Assignment,
    StatusChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub complaint_id: Uuid,
    /// Recipient: the owning citizen, or the official for assignments.
    pub user_id: Uuid,
    pub payload: serde_json::Value,
}

impl LifecycleEvent {
    pub fn resolution(c: &Complaint) -> Self {
        let description = c.resolution.as_ref().map(|r| r.description.as_str()).unwrap_or_default();
        Self {
            kind: EventKind::Resolution,
            complaint_id: c.complaint_id,
            user_id: c.user_id,
            payload: json!({
                "title": "Complaint resolved",
                "message": format!("Your complaint {} has been resolved.", c.reference),
                "reference": c.reference,
                "resolution": description,
                "resolvedAt": c.resolution.as_ref().map(|r| r.resolved_at),
            }),
        }
    }

    pub fn status_change(c: &Complaint, from: Status) -> Self {
        Self {
            kind: EventKind::StatusChange,
            complaint_id: c.complaint_id,
            user_id: c.user_id,
            payload: json!({
                "title": "Complaint status updated",
                "message": format!("Complaint {} moved from {} to {}.", c.reference, from, c.status),
                "reference": c.reference,
                "from": from,
                "to": c.status,
            }),
        }
    }

    pub fn assignment(c: &Complaint, official: Uuid) -> Self {
        Self {
            kind: EventKind::Assignment,
            complaint_id: c.complaint_id,
            user_id: official,
            payload: json!({
                "title": "Complaint assigned",
                "message": format!("Complaint {} has been assigned to you.", c.reference),
                "reference": c.reference,
                "category": c.category,
                "priority": c.priority,
            }),
        }
    }
}

#[derive(Debug, Error)]
#[error("notification emission failed: {0}")]
pub struct EmitError(pub String);

#[async_trait]
pub trait NotificationEmitter: Send + Sync {
    async fn emit(&self, event: &LifecycleEvent) -> Result<(), EmitError>;
}

/// Writes events to the log; the default when no delivery backend is wired.
#[derive(Debug, Clone, Default)]
pub struct TracingEmitter;

#[async_trait]
impl NotificationEmitter for TracingEmitter {
    async fn emit(&self, event: &LifecycleEvent) -> Result<(), EmitError> {
        tracing::info!(
            kind = ?event.kind,
            complaint_id = %event.complaint_id,
            user_id = %event.user_id,
            "lifecycle event"
        );
        Ok(())
    }
}

/// Keeps every emitted event in memory. Can be told to fail.
#[derive(Debug, Clone, Default)]
pub struct RecordingEmitter {
    events: Arc<Mutex<Vec<LifecycleEvent>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut f) = self.failing.lock() {
            *f = failing;
        }
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events().iter().filter(|e| e.kind == kind).count()
    }
}

#[async_trait]
impl NotificationEmitter for RecordingEmitter {
    async fn emit(&self, event: &LifecycleEvent) -> Result<(), EmitError> {
        let failing = self.failing.lock().map(|f| *f).unwrap_or(false);
        if failing {
            return Err(EmitError("delivery backend unavailable".into()));
        }
        self.events
            .lock()
            .map_err(|_| EmitError("recorder poisoned".into()))?
            .push(event.clone());
        Ok(())
    }
}
