use common::AggregateId;
use criterion::{Criterion, criterion_group, criterion_main};
use event_store::{
    EventStore, ExpectedVersion, InMemoryEventStore, PendingEvent, Position, PushRequest,
    UniqueConstraint,
};

fn org_event(org_id: &AggregateId, event_type: &str) -> PendingEvent {
    PendingEvent::new(
        "org",
        org_id.clone(),
        org_id.clone(),
        event_type,
        serde_json::json!({
            "type": event_type,
            "data": { "name": org_id.to_string() }
        }),
    )
}

fn bench_push_single_event(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_store/push_single_event", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryEventStore::new();
                let org_id = AggregateId::new();
                store
                    .push(PushRequest::new().event(org_event(&org_id, "org.added")))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_push_org_batch_with_claims(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();

    c.bench_function("event_store/push_org_batch_with_claims", |b| {
        b.iter(|| {
            rt.block_on(async {
                let org_id = AggregateId::new();
                let request = PushRequest::new()
                    .event(org_event(&org_id, "org.added").expect(ExpectedVersion::NoStream))
                    .event(org_event(&org_id, "org.domain.added"))
                    .event(org_event(&org_id, "org.domain.verified"))
                    .event(org_event(&org_id, "org.domain.primary.set"))
                    .event(org_event(&org_id, "org.member.added"))
                    .constraint(UniqueConstraint::add("org-name", org_id.to_string(), "m"))
                    .constraint(UniqueConstraint::add(
                        "org-domain",
                        format!("{org_id}.localhost"),
                        "m",
                    ))
                    .constraint(UniqueConstraint::add(
                        "member",
                        format!("{org_id}/user1"),
                        "m",
                    ));
                store.push(request).await.unwrap();
            });
        });
    });
}

fn bench_events_for_aggregate(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let org_id = AggregateId::new();

    rt.block_on(async {
        let request =
            PushRequest::new().events((0..100).map(|_| org_event(&org_id, "org.metadata.set")));
        store.push(request).await.unwrap();
    });

    c.bench_function("event_store/events_for_aggregate_100", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.events_for_aggregate("org", &org_id).await.unwrap();
            });
        });
    });
}

fn bench_events_since(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();

    rt.block_on(async {
        for _ in 0..10 {
            let org_id = AggregateId::new();
            let request = PushRequest::new()
                .events((0..100).map(|_| org_event(&org_id, "org.metadata.set")));
            store.push(request).await.unwrap();
        }
    });

    c.bench_function("event_store/events_since_batch_100", |b| {
        b.iter(|| {
            rt.block_on(async {
                let events = store.events_since(Position::new(500), 100).await.unwrap();
                assert_eq!(events.len(), 100);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_push_single_event,
    bench_push_org_batch_with_claims,
    bench_events_for_aggregate,
    bench_events_since,
);
criterion_main!(benches);
