//! Concurrency properties of the push operation, checked against the
//! in-memory backend.

use std::sync::Arc;

use event_store::{
    AggregateId, EventStore, EventStoreError, ExpectedVersion, InMemoryEventStore, PendingEvent,
    PushRequest, UniqueConstraint, Version,
};

fn org_added(org_id: &str) -> PendingEvent {
    PendingEvent::new(
        "org",
        AggregateId::from(org_id),
        AggregateId::from(org_id),
        "org.added",
        serde_json::json!({"name": "acme"}),
    )
    .expect(ExpectedVersion::NoStream)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_on_same_key_admit_exactly_one_winner() {
    let store = Arc::new(InMemoryEventStore::new());

    let mut handles = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .push(
                    PushRequest::new()
                        .event(org_added(&format!("org{i}")))
                        .constraint(UniqueConstraint::add(
                            "org-name",
                            "acme",
                            "Errors.Org.AlreadyExists",
                        )),
                )
                .await
        }));
    }

    let mut winners = 0;
    let mut already_exists = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(EventStoreError::UniqueConstraintViolation { namespace, key, .. }) => {
                assert_eq!(namespace, "org-name");
                assert_eq!(key, "acme");
                already_exists += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(already_exists, 15);
    assert_eq!(store.event_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_with_same_expectation_single_writer_wins() {
    let store = Arc::new(InMemoryEventStore::new());
    store.push(PushRequest::new().event(org_added("org1"))).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .push(
                    PushRequest::new().event(
                        PendingEvent::new(
                            "org",
                            AggregateId::from("org1"),
                            AggregateId::from("org1"),
                            "org.deactivated",
                            serde_json::json!({}),
                        )
                        .expect(ExpectedVersion::Exact(Version::first())),
                    ),
                )
                .await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(EventStoreError::ConcurrencyConflict { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(successes, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn versions_stay_gapless_under_concurrent_unchecked_pushes() {
    let store = Arc::new(InMemoryEventStore::new());

    let mut handles = Vec::new();
    for _ in 0..20 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .push(PushRequest::new().event(PendingEvent::new(
                    "user",
                    AggregateId::from("user1"),
                    AggregateId::from("org1"),
                    "user.metadata.set",
                    serde_json::json!({}),
                )))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let events = store
        .events_for_aggregate("user", &AggregateId::from("user1"))
        .await
        .unwrap();
    let versions: Vec<i64> = events.iter().map(|e| e.version.as_i64()).collect();
    assert_eq!(versions, (1..=20).collect::<Vec<_>>());

    let positions: Vec<i64> = events.iter().map(|e| e.position.as_i64()).collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}
