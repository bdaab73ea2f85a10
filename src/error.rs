//! Error kinds surfaced by the engine and by the record store boundary.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::models::CounterField;

/// Failures reported by a [`RecordStore`](crate::db::RecordStore).
///
/// "Not found" and "transient" are always distinct so callers can decide
/// whether a retry makes sense.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The addressed record does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Table/collection name.
        entity: &'static str,
        /// Requested id.
        id: Uuid,
    },

    /// Retryable infrastructure fault (connection reset, pool exhausted, ...).
    #[error("transient store error: {0}")]
    Transient(String),

    /// Stored data could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn complaint_not_found(id: Uuid) -> Self {
        StoreError::NotFound { entity: "complaint", id }
    }

    pub fn user_not_found(id: Uuid) -> Self {
        StoreError::NotFound { entity: "user", id }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// Errors returned to callers of the lifecycle, reconciler and analytics APIs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Missing or malformed input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown complaint or user id.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind.
        entity: &'static str,
        /// Requested id.
        id: Uuid,
    },

    /// The operation is not legal for the complaint's current status.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Feedback was already recorded for this complaint.
    #[error("feedback already submitted for complaint {0}")]
    AlreadySubmitted(Uuid),

    /// Counter drift beyond tolerance, or a write lost a race too many times.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Retryable infrastructure fault.
    #[error("transient store error: {0}")]
    TransientStore(String),

    /// A bounded read did not finish in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::TransientStore(_))
    }

    pub(crate) fn counter_drift(user_id: Uuid, field: CounterField, cached: i64, actual: i64) -> Self {
        EngineError::Conflict(format!(
            "user {user_id} {}: cached {cached}, actual {actual}",
            field.column()
        ))
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            StoreError::Transient(msg) => EngineError::TransientStore(msg),
            StoreError::Corrupt(msg) => EngineError::TransientStore(format!("corrupt record: {msg}")),
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
