use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use notification_pipeline::{
    error::StoreError,
    models::{
        notification::{NotificationRecord, NotificationType, ValidatedNotification},
        status::{NotificationStatus, StatusUpdate},
    },
    store::{StatusStore, StoreConfig},
};
use uuid::Uuid;

fn record() -> NotificationRecord {
    let notification = ValidatedNotification {
        message_id: Uuid::new_v4(),
        content_message: "Hello".to_string(),
        type_notification: NotificationType::Email,
    };
    NotificationRecord::received(Uuid::new_v4(), &notification)
}

fn store_with(capacity: usize, ttl_seconds: i64) -> StatusStore {
    StatusStore::new(StoreConfig {
        capacity,
        terminal_ttl: TimeDelta::seconds(ttl_seconds),
    })
}

/// Test: Trace ids are never reused
#[tokio::test]
async fn test_duplicate_and_nil_trace_ids_are_rejected() {
    let store = StatusStore::new(StoreConfig::default());
    let first = record();
    let trace_id = first.trace_id;

    store.create(first.clone()).await.unwrap();

    assert_eq!(
        store.create(first).await,
        Err(StoreError::DuplicateTraceId(trace_id))
    );

    let mut nil = record();
    nil.trace_id = Uuid::nil();
    assert_eq!(store.create(nil).await, Err(StoreError::NilTraceId));
    assert_eq!(store.len().await, 1);
}

/// Test: Status updates apply once, repeat harmlessly and never leave a terminal state
#[tokio::test]
async fn test_status_transitions() {
    let store = StatusStore::new(StoreConfig::default());
    let created = record();
    let trace_id = created.trace_id;
    store.create(created).await.unwrap();

    assert_eq!(
        store
            .update_status(&trace_id, NotificationStatus::Processed, 0, None)
            .await,
        StatusUpdate::Applied
    );
    assert_eq!(
        store
            .update_status(&trace_id, NotificationStatus::Processed, 0, None)
            .await,
        StatusUpdate::Unchanged
    );
    assert_eq!(
        store
            .update_status(&trace_id, NotificationStatus::Validated, 0, None)
            .await,
        StatusUpdate::Applied
    );
    assert_eq!(
        store
            .update_status(
                &trace_id,
                NotificationStatus::Retrying,
                1,
                Some("late failure".to_string())
            )
            .await,
        StatusUpdate::TerminalKept(NotificationStatus::Validated)
    );

    let stored = store.get(&trace_id).await.unwrap();
    assert_eq!(stored.status, NotificationStatus::Validated);
    assert!(stored.last_error.is_none());
    assert!(store.is_terminal(&trace_id).await);
}

/// Test: Non-terminal updates from an earlier attempt are ignored
#[tokio::test]
async fn test_stale_update_does_not_regress_status() {
    let store = StatusStore::new(StoreConfig::default());
    let created = record();
    let trace_id = created.trace_id;
    store.create(created).await.unwrap();

    store
        .update_status(
            &trace_id,
            NotificationStatus::Retrying,
            1,
            Some("provider down".to_string()),
        )
        .await;

    assert_eq!(
        store
            .update_status(&trace_id, NotificationStatus::Processed, 0, None)
            .await,
        StatusUpdate::Stale
    );

    let stored = store.get(&trace_id).await.unwrap();
    assert_eq!(stored.status, NotificationStatus::Retrying);
    assert_eq!(stored.retry_count, 1);

    // Terminal outcomes still land regardless of the counter.
    assert_eq!(
        store
            .update_status(&trace_id, NotificationStatus::Validated, 0, None)
            .await,
        StatusUpdate::Applied
    );
}

/// Test: Updates for unknown trace ids are no-ops
#[tokio::test]
async fn test_update_for_unknown_trace_id_is_noop() {
    let store = StatusStore::new(StoreConfig::default());

    let update = store
        .update_status(&Uuid::new_v4(), NotificationStatus::FailedDlq, 3, None)
        .await;

    assert_eq!(update, StatusUpdate::Missing);
    assert!(store.is_empty().await);
}

/// Test: Concurrent duplicate updates converge with a single applied write
#[tokio::test]
async fn test_concurrent_updates_are_serialized() {
    let store = Arc::new(StatusStore::new(StoreConfig::default()));
    let created = record();
    let trace_id = created.trace_id;
    store.create(created).await.unwrap();

    let mut handles = vec![];
    for i in 0..20 {
        let store = Arc::clone(&store);
        let status = if i % 2 == 0 {
            NotificationStatus::Validated
        } else {
            NotificationStatus::Retrying
        };

        handles.push(tokio::spawn(async move {
            store.update_status(&trace_id, status, 0, None).await
        }));
    }

    let updates: Vec<StatusUpdate> = futures_util::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let final_status = store.get(&trace_id).await.unwrap().status;
    assert_eq!(final_status, NotificationStatus::Validated);

    let applied_validated = updates
        .iter()
        .filter(|u| **u == StatusUpdate::Applied)
        .count();
    assert!(applied_validated >= 1);
    assert!(
        !updates.contains(&StatusUpdate::Missing),
        "Record must stay present"
    );
}

/// Test: The oldest record is evicted once capacity is reached
#[tokio::test]
async fn test_capacity_evicts_oldest_record() {
    let store = store_with(2, 3_600);
    let first = record();
    let second = record();
    let third = record();
    let (first_id, second_id, third_id) = (first.trace_id, second.trace_id, third.trace_id);

    store.create(first).await.unwrap();
    store.create(second).await.unwrap();
    store.create(third).await.unwrap();

    assert_eq!(store.len().await, 2);
    assert!(store.get(&first_id).await.is_none());
    assert!(store.get(&second_id).await.is_some());
    assert!(store.get(&third_id).await.is_some());
}

/// Test: Expired terminal records are purged before evicting live ones
#[tokio::test]
async fn test_capacity_prefers_expired_terminal_records() {
    let store = store_with(2, 0);
    let live = record();
    let finished = record();
    let (live_id, finished_id) = (live.trace_id, finished.trace_id);

    store.create(live).await.unwrap();
    store.create(finished).await.unwrap();
    store
        .update_status(&finished_id, NotificationStatus::Validated, 0, None)
        .await;

    store.create(record()).await.unwrap();

    assert!(store.get(&live_id).await.is_some());
    assert!(store.get(&finished_id).await.is_none());
}

/// Test: TTL eviction only removes terminal records past their TTL
#[tokio::test]
async fn test_ttl_evicts_only_expired_terminal_records() {
    let store = store_with(100, 60);
    let in_flight = record();
    let done = record();
    let (in_flight_id, done_id) = (in_flight.trace_id, done.trace_id);

    store.create(in_flight).await.unwrap();
    store.create(done).await.unwrap();
    store
        .update_status(&done_id, NotificationStatus::FailedDlq, 3, Some("gave up".to_string()))
        .await;

    assert_eq!(store.evict_expired_at(Utc::now()).await, 0);

    let later = Utc::now() + TimeDelta::seconds(61);
    assert_eq!(store.evict_expired_at(later).await, 1);

    assert!(store.get(&done_id).await.is_none());
    assert!(store.get(&in_flight_id).await.is_some());
}

/// Test: Removing a record frees its slot
#[tokio::test]
async fn test_remove_record() {
    let store = store_with(1, 3_600);
    let created = record();
    let trace_id = created.trace_id;

    store.create(created).await.unwrap();
    assert!(store.remove(&trace_id).await.is_some());
    assert!(store.remove(&trace_id).await.is_none());
    assert!(store.is_empty().await);
}
