//! Integration tests for the in-memory reference implementation of the
//! remote lead store.

use pb_core::types::{Lead, Pipeline, Stage, UserSummary};
use pb_remote::{MemoryLeadStore, RemoteError, RemoteLeadStore};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn seeded_store() -> (MemoryLeadStore, Pipeline, Vec<Lead>) {
    let mut pipeline = Pipeline::new("Sales");
    pipeline.add_stage(Stage::new("New", 0));
    pipeline.add_stage(Stage::new("Contacted", 1));
    pipeline.add_stage(Stage::new("Won", 2));

    let new_stage = pipeline.stages[0].id;
    let leads = vec![
        Lead::new(pipeline.id, new_stage, "Ana López").with_email("ana@example.com"),
        Lead::new(pipeline.id, new_stage, "Bob Chen").with_phone("+1 555 0100"),
    ];

    let store = MemoryLeadStore::new();
    store.insert_pipeline(pipeline.clone());
    for lead in &leads {
        store.insert_lead(lead.clone());
    }
    (store, pipeline, leads)
}

fn acting_user() -> UserSummary {
    UserSummary::new("Sam Field", "sam@example.com")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_groups_by_stage_with_all_keys_present() {
    let (store, pipeline, leads) = seeded_store();

    let grouping = store.fetch_leads_by_stage(pipeline.id).await.unwrap();

    assert_eq!(grouping.stage_ids().count(), 3);
    assert_eq!(grouping.stage(pipeline.stages[0].id).len(), 2);
    assert!(grouping.stage(pipeline.stages[1].id).is_empty());
    assert_eq!(grouping.total_leads(), leads.len());
}

#[tokio::test]
async fn fetch_unknown_pipeline_errors() {
    let (store, _, _) = seeded_store();
    let err = store.fetch_leads_by_stage(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, RemoteError::PipelineNotFound(_)));
}

#[tokio::test]
async fn stage_update_writes_history_keyed_by_previous_stage() {
    let (store, pipeline, leads) = seeded_store();
    let user = acting_user();
    let from = pipeline.stages[0].id;
    let to = pipeline.stages[1].id;

    let updated = store
        .update_lead_stage(leads[0].id, to, &user)
        .await
        .unwrap();

    assert_eq!(updated.stage_id, to);
    let history = store.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_stage_id, from);
    assert_eq!(history[0].to_stage_id, to);
    assert_eq!(history[0].changed_by, user.id);
}

#[tokio::test]
async fn stage_update_to_unknown_stage_is_rejected() {
    let (store, _, leads) = seeded_store();
    let err = store
        .update_lead_stage(leads[0].id, Uuid::new_v4(), &acting_user())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::StageNotFound(_)));
    assert!(store.history().is_empty());
}

#[tokio::test]
async fn injected_failure_is_returned_without_mutating() {
    let (store, pipeline, leads) = seeded_store();
    store.fail_next_update(RemoteError::Transport("503".into()));

    let err = store
        .update_lead_stage(leads[0].id, pipeline.stages[1].id, &acting_user())
        .await
        .unwrap_err();

    assert!(matches!(err, RemoteError::Transport(_)));
    assert_eq!(store.lead(leads[0].id).unwrap().stage_id, pipeline.stages[0].id);
    assert!(store.history().is_empty());

    // The queue is consumed; the next call goes through.
    store
        .update_lead_stage(leads[0].id, pipeline.stages[1].id, &acting_user())
        .await
        .unwrap();
}

#[tokio::test]
async fn assignment_returns_denormalized_assignee() {
    let (store, _, leads) = seeded_store();
    let user = acting_user();
    store.insert_user(user.clone());

    let updated = store
        .update_lead_assignment(leads[0].id, Some(user.id))
        .await
        .unwrap();
    assert_eq!(updated.assigned_user_id, Some(user.id));
    assert_eq!(
        updated.assigned_user.as_ref().map(|u| u.display_name.as_str()),
        Some("Sam Field")
    );

    let cleared = store
        .update_lead_assignment(leads[0].id, None)
        .await
        .unwrap();
    assert_eq!(cleared.assigned_user_id, None);
    assert!(cleared.assigned_user.is_none());
}

#[tokio::test]
async fn mutations_notify_subscribers() {
    let (store, pipeline, leads) = seeded_store();
    let sub = store.subscribe(pipeline.id);

    store
        .update_lead_stage(leads[0].id, pipeline.stages[1].id, &acting_user())
        .await
        .unwrap();

    let notice = sub.try_recv().expect("change notice published");
    assert_eq!(notice.pipeline_id, pipeline.id);
}

#[tokio::test]
async fn external_update_notifies_subscribers() {
    let (store, pipeline, leads) = seeded_store();
    let sub = store.subscribe(pipeline.id);

    store.simulate_external_update(leads[1].id).unwrap();

    assert!(sub.try_recv().is_some());
}
