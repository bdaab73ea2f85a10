mod common;

use std::sync::Arc;

use common::{new_complaint, Harness};
use complaint_engine::config::RegressionPolicy;
use complaint_engine::models::{
    ComplaintUpdate, FeedbackInput, Page, Priority, ResolutionInput, Status,
};
use complaint_engine::notify::EventKind;
use complaint_engine::EngineError;
use uuid::Uuid;

fn resolve_with(description: &str, official: Uuid) -> ComplaintUpdate {
    ComplaintUpdate {
        status: Some(Status::Resolved),
        resolution: Some(ResolutionInput { description: description.into(), resolved_at: None }),
        updated_by: Some(official),
        ..ComplaintUpdate::default()
    }
}

fn move_to(status: Status) -> ComplaintUpdate {
    ComplaintUpdate { status: Some(status), ..ComplaintUpdate::default() }
}

#[tokio::test]
async fn urgent_healthcare_complaint_is_filed_then_resolved() {
    let h = Harness::new();
    let citizen = h.citizen().await;
    let official = h.official().await;

    let mut input = new_complaint("healthcare", Some("Gasabo"));
    input.is_urgent = true;
    let filed = h.engine.lifecycle.submit(citizen, input).await.unwrap();

    assert_eq!(filed.status, Status::Submitted);
    assert_eq!(filed.priority, Priority::Urgent);
    assert!(filed.is_urgent);
    assert!(filed.reference.starts_with("COMP-"));
    assert!(filed.status_updates.is_empty());
    assert_eq!(h.counters(citizen).await, (1, 0));

    let resolved = h
        .engine
        .lifecycle
        .update(filed.complaint_id, resolve_with("Clinic restocked", official))
        .await
        .unwrap();

    assert_eq!(resolved.status, Status::Resolved);
    let resolution = resolved.resolution.as_ref().unwrap();
    assert_eq!(resolution.description, "Clinic restocked");
    assert_eq!(resolution.resolved_by, Some(official));
    assert_eq!(resolved.status_updates.len(), 1);
    assert_eq!(resolved.status_updates[0].status, Status::Resolved);
    assert_eq!(h.counters(citizen).await, (1, 1));
    assert_eq!(h.emitter.count(EventKind::Resolution), 1);

    let stored = h.engine.lifecycle.get(filed.complaint_id).await.unwrap();
    assert_eq!(stored.status_updates.len(), 1);
}

#[tokio::test]
async fn resolve_unresolve_resolve_counts_once() {
    let h = Harness::new();
    let citizen = h.citizen().await;
    let official = h.official().await;
    let id = h.engine.lifecycle.submit(citizen, new_complaint("roads", None)).await.unwrap().complaint_id;

    h.engine.lifecycle.update(id, resolve_with("Patched", official)).await.unwrap();
    assert_eq!(h.counters(citizen).await, (1, 1));

    // Re-resolving an already resolved complaint is not a new resolution.
    h.engine.lifecycle.update(id, resolve_with("Patched again", official)).await.unwrap();
    assert_eq!(h.counters(citizen).await, (1, 1));
    assert_eq!(h.emitter.count(EventKind::Resolution), 1);

    h.engine.lifecycle.update(id, move_to(Status::InProgress)).await.unwrap();
    assert_eq!(h.counters(citizen).await, (1, 0));

    h.engine.lifecycle.update(id, resolve_with("Fixed properly", official)).await.unwrap();
    assert_eq!(h.counters(citizen).await, (1, 1));

    let c = h.engine.lifecycle.get(id).await.unwrap();
    assert_eq!(c.status_updates.len(), 3);
    assert_eq!(h.emitter.count(EventKind::Resolution), 2);
    assert_eq!(h.emitter.count(EventKind::StatusChange), 1);
    assert!(h.engine.counters.verify(citizen).await.is_ok());
}

#[tokio::test]
async fn priority_only_update_has_no_status_side_effects() {
    let h = Harness::new();
    let citizen = h.citizen().await;
    let id = h.engine.lifecycle.submit(citizen, new_complaint("education", None)).await.unwrap().complaint_id;

    let changes = ComplaintUpdate { priority: Some(Priority::High), ..ComplaintUpdate::default() };
    let c = h.engine.lifecycle.update(id, changes).await.unwrap();

    assert_eq!(c.priority, Priority::High);
    assert!(c.status_updates.is_empty());
    assert!(h.emitter.events().is_empty());
}

#[tokio::test]
async fn resolving_requires_a_description() {
    let h = Harness::new();
    let citizen = h.citizen().await;
    let id = h.engine.lifecycle.submit(citizen, new_complaint("security", None)).await.unwrap().complaint_id;

    let err = h.engine.lifecycle.update(id, move_to(Status::Resolved)).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let blank = ComplaintUpdate {
        status: Some(Status::Resolved),
        resolution: Some(ResolutionInput { description: "   ".into(), resolved_at: None }),
        ..ComplaintUpdate::default()
    };
    let err = h.engine.lifecycle.update(id, blank).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let c = h.engine.lifecycle.get(id).await.unwrap();
    assert_eq!(c.status, Status::Submitted);
    assert_eq!(h.counters(citizen).await, (1, 0));
}

#[tokio::test]
async fn resolution_on_unresolved_target_is_rejected() {
    let h = Harness::new();
    let citizen = h.citizen().await;
    let id = h.engine.lifecycle.submit(citizen, new_complaint("electricity", None)).await.unwrap().complaint_id;

    let changes = ComplaintUpdate {
        status: Some(Status::InProgress),
        resolution: Some(ResolutionInput { description: "done".into(), resolved_at: None }),
        ..ComplaintUpdate::default()
    };
    let err = h.engine.lifecycle.update(id, changes).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn assignment_notifies_the_official_once() {
    let h = Harness::new();
    let citizen = h.citizen().await;
    let official = h.official().await;
    let id = h.engine.lifecycle.submit(citizen, new_complaint("agriculture", None)).await.unwrap().complaint_id;

    let assign = ComplaintUpdate { assigned_to: Some(official), ..ComplaintUpdate::default() };
    let c = h.engine.lifecycle.update(id, assign.clone()).await.unwrap();
    assert_eq!(c.assigned_to, Some(official));

    // Same official again: nothing new to announce.
    h.engine.lifecycle.update(id, assign).await.unwrap();

    let events: Vec<_> = h.emitter.events().into_iter().filter(|e| e.kind == EventKind::Assignment).collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].user_id, official);
}

#[tokio::test]
async fn emitter_failure_does_not_roll_back_the_update() {
    let h = Harness::new();
    let citizen = h.citizen().await;
    let official = h.official().await;
    let id = h.engine.lifecycle.submit(citizen, new_complaint("roads", None)).await.unwrap().complaint_id;

    h.emitter.set_failing(true);
    let c = h.engine.lifecycle.update(id, resolve_with("Graded", official)).await.unwrap();

    assert_eq!(c.status, Status::Resolved);
    assert_eq!(h.counters(citizen).await, (1, 1));
    assert!(h.emitter.events().is_empty());
}

#[tokio::test]
async fn unknown_complaint_is_not_found() {
    let h = Harness::new();
    let missing = Uuid::new_v4();

    assert!(matches!(h.engine.lifecycle.get(missing).await, Err(EngineError::NotFound { .. })));
    assert!(matches!(
        h.engine.lifecycle.update(missing, move_to(Status::Closed)).await,
        Err(EngineError::NotFound { .. })
    ));
    assert!(matches!(h.engine.lifecycle.delete(missing).await, Err(EngineError::NotFound { .. })));
    assert_eq!(h.engine.lifecycle.record_view(missing).await, None);
}

#[tokio::test]
async fn submit_validates_input_and_owner() {
    let h = Harness::new();
    let citizen = h.citizen().await;

    let mut no_title = new_complaint("roads", None);
    no_title.title = " ".into();
    assert!(matches!(h.engine.lifecycle.submit(citizen, no_title).await, Err(EngineError::Validation(_))));

    let no_category = new_complaint("", None);
    assert!(matches!(h.engine.lifecycle.submit(citizen, no_category).await, Err(EngineError::Validation(_))));

    let bad_category = new_complaint("weather", None);
    assert!(matches!(h.engine.lifecycle.submit(citizen, bad_category).await, Err(EngineError::Validation(_))));

    let stranger = Uuid::new_v4();
    assert!(matches!(
        h.engine.lifecycle.submit(stranger, new_complaint("roads", None)).await,
        Err(EngineError::NotFound { .. })
    ));

    assert_eq!(h.counters(citizen).await, (0, 0));
}

#[tokio::test]
async fn feedback_only_after_resolution_and_only_once() {
    let h = Harness::new();
    let citizen = h.citizen().await;
    let official = h.official().await;
    let id = h.engine.lifecycle.submit(citizen, new_complaint("water-sanitation", None)).await.unwrap().complaint_id;

    let good = FeedbackInput { rating: 4, comment: Some("Quick fix".into()) };
    let err = h.engine.lifecycle.submit_feedback(id, good.clone()).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    h.engine.lifecycle.update(id, resolve_with("Pipe replaced", official)).await.unwrap();

    for rating in [0, 6, -1] {
        let err = h
            .engine
            .lifecycle
            .submit_feedback(id, FeedbackInput { rating, comment: None })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)), "rating {rating}");
    }

    let c = h.engine.lifecycle.submit_feedback(id, good.clone()).await.unwrap();
    assert_eq!(c.feedback.as_ref().map(|f| f.rating), Some(4));

    let err = h.engine.lifecycle.submit_feedback(id, good).await.unwrap_err();
    assert_eq!(err, EngineError::AlreadySubmitted(id));
}

#[tokio::test]
async fn reopening_follows_the_regression_policy() {
    for (policy, keeps_resolution, keeps_feedback) in [
        (RegressionPolicy::Keep, true, true),
        (RegressionPolicy::ClearResolution, false, true),
        (RegressionPolicy::ClearAll, false, false),
    ] {
        let h = Harness::with_policy(policy);
        let citizen = h.citizen().await;
        let official = h.official().await;
        let id = h.engine.lifecycle.submit(citizen, new_complaint("roads", None)).await.unwrap().complaint_id;

        h.engine.lifecycle.update(id, resolve_with("Filled potholes", official)).await.unwrap();
        h.engine
            .lifecycle
            .submit_feedback(id, FeedbackInput { rating: 5, comment: None })
            .await
            .unwrap();
        let reopened = h.engine.lifecycle.update(id, move_to(Status::InProgress)).await.unwrap();

        assert_eq!(reopened.resolution.is_some(), keeps_resolution, "{policy}");
        assert_eq!(reopened.feedback.is_some(), keeps_feedback, "{policy}");
        assert_eq!(h.counters(citizen).await, (1, 0), "{policy}");
    }
}

#[tokio::test]
async fn kept_resolution_can_be_reused_when_resolving_again() {
    let h = Harness::with_policy(RegressionPolicy::Keep);
    let citizen = h.citizen().await;
    let official = h.official().await;
    let id = h.engine.lifecycle.submit(citizen, new_complaint("roads", None)).await.unwrap().complaint_id;

    h.engine.lifecycle.update(id, resolve_with("Resurfaced", official)).await.unwrap();
    h.engine.lifecycle.update(id, move_to(Status::InProgress)).await.unwrap();
    let c = h.engine.lifecycle.update(id, move_to(Status::Resolved)).await.unwrap();

    assert_eq!(c.resolution.as_ref().map(|r| r.description.as_str()), Some("Resurfaced"));
    assert_eq!(h.counters(citizen).await, (1, 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_views_are_all_counted() {
    let h = Harness::new();
    let citizen = h.citizen().await;
    let id = h.engine.lifecycle.submit(citizen, new_complaint("roads", None)).await.unwrap().complaint_id;

    let lifecycle = Arc::new(h.engine.lifecycle.clone());
    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let lifecycle = Arc::clone(&lifecycle);
            tokio::spawn(async move { lifecycle.record_view(id).await })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap().is_some());
    }

    assert_eq!(h.engine.lifecycle.get(id).await.unwrap().views, 10);
    assert_eq!(h.engine.lifecycle.view(id).await.unwrap().views, 11);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_resolves_apply_side_effects_once() {
    let h = Harness::new();
    let citizen = h.citizen().await;
    let official = h.official().await;
    let id = h.engine.lifecycle.submit(citizen, new_complaint("roads", None)).await.unwrap().complaint_id;

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let lifecycle = h.engine.lifecycle.clone();
            let changes = resolve_with(&format!("crew {i}"), official);
            tokio::spawn(async move { lifecycle.update(id, changes).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(h.counters(citizen).await, (1, 1));
    assert_eq!(h.engine.lifecycle.get(id).await.unwrap().status_updates.len(), 1);
    assert_eq!(h.emitter.count(EventKind::Resolution), 1);
}

#[tokio::test]
async fn delete_decrements_both_counters_for_resolved_complaints() {
    let h = Harness::new();
    let citizen = h.citizen().await;
    let official = h.official().await;
    let a = h.engine.lifecycle.submit(citizen, new_complaint("roads", None)).await.unwrap().complaint_id;
    let b = h.engine.lifecycle.submit(citizen, new_complaint("roads", None)).await.unwrap().complaint_id;
    h.engine.lifecycle.update(a, resolve_with("Done", official)).await.unwrap();
    assert_eq!(h.counters(citizen).await, (2, 1));

    h.engine.lifecycle.delete(a).await.unwrap();
    assert_eq!(h.counters(citizen).await, (1, 0));

    h.engine.lifecycle.delete(b).await.unwrap();
    assert_eq!(h.counters(citizen).await, (0, 0));
    assert!(h.engine.counters.verify(citizen).await.is_ok());
}

#[tokio::test]
async fn listing_is_paginated_and_scoped_to_owner() {
    let h = Harness::new();
    let alice = h.citizen().await;
    let bob = h.citizen().await;
    for _ in 0..5 {
        h.engine.lifecycle.submit(alice, new_complaint("roads", None)).await.unwrap();
    }
    h.engine.lifecycle.submit(bob, new_complaint("education", None)).await.unwrap();

    let first = h.engine.lifecycle.list_for_user(alice, Page::new(1, 2)).await.unwrap();
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.pagination.total, 5);
    assert_eq!(first.pagination.pages, 3);

    let last = h.engine.lifecycle.list_for_user(alice, Page::new(3, 2)).await.unwrap();
    assert_eq!(last.items.len(), 1);
    assert!(last.items.iter().all(|c| c.user_id == alice));

    let everyone = h.engine.lifecycle.list(&Default::default(), Page::new(1, 500)).await.unwrap();
    assert_eq!(everyone.pagination.limit, Page::MAX_LIMIT);
    assert_eq!(everyone.items.len(), 6);
}

#[tokio::test]
async fn deserialized_zero_limit_page_lists_without_panicking() {
    let h = Harness::new();
    let citizen = h.citizen().await;
    h.engine.lifecycle.submit(citizen, new_complaint("roads", None)).await.unwrap();

    let page: Page = serde_json::from_str(r#"{"page":1,"limit":0}"#).unwrap();
    let listed = h.engine.lifecycle.list_for_user(citizen, page).await.unwrap();

    assert_eq!(listed.pagination.limit, 1);
    assert_eq!(listed.pagination.pages, 1);
    assert_eq!(listed.items.len(), 1);
}
