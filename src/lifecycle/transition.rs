//! Status transition table.
//!
//! Side effects are decided from `(old, new)` alone, so the table can be
//! audited and tested without a store.

use crate::models::Status;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Status did not change. No history entry, no counter delta.
    Unchanged,
    /// `* -> resolved` from a non-resolved status.
    Resolve,
    /// `resolved -> *`.
    Reopen,
    /// Any other change between non-resolved statuses.
    Move,
}

/// What a transition obliges the lifecycle manager to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Effects {
    pub resolved_delta: i64,
    pub append_history: bool,
    pub requires_resolution: bool,
    pub regresses_resolution: bool,
    pub notify_resolution: bool,
    pub notify_status_change: bool,
}

impl Transition {
    pub fn classify(old: Status, new: Status) -> Self {
        match (old, new) {
            (o, n) if o == n => Transition::Unchanged,
            (_, Status::Resolved) => Transition::Resolve,
            (Status::Resolved, _) => Transition::Reopen,
            _ => Transition::Move,
        }
    }

    pub fn effects(self) -> Effects {
        match self {
            Transition::Unchanged => Effects {
                resolved_delta: 0,
                append_history: false,
                requires_resolution: false,
                regresses_resolution: false,
                notify_resolution: false,
                notify_status_change: false,
            },
            Transition::Resolve => Effects {
                resolved_delta: 1,
                append_history: true,
                requires_resolution: true,
                regresses_resolution: false,
                notify_resolution: true,
                notify_status_change: false,
            },
            Transition::Reopen => Effects {
                resolved_delta: -1,
                append_history: true,
                requires_resolution: false,
                regresses_resolution: true,
                notify_resolution: false,
                notify_status_change: true,
            },
            Transition::Move => Effects {
                resolved_delta: 0,
                append_history: true,
                requires_resolution: false,
                regresses_resolution: false,
                notify_resolution: false,
                notify_status_change: true,
            },
        }
    }
}
