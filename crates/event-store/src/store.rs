use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{
    AggregateId, CheckpointStore, EventEnvelope, EventQuery, EventStoreError, ExpectedVersion, PendingEvent,
    Position, ProjectionLocker, Result, Snapshot, UniqueConstraint, Version,
};

/// A batch of events and unique-constraint claims committed atomically.
///
/// The batch may span several aggregates. Either every event and every
/// claim is recorded or none is.
#[derive(Debug, Clone, Default)]
pub struct PushRequest {
    pub events: Vec<PendingEvent>,
    pub constraints: Vec<UniqueConstraint>,
}

impl PushRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an event to the batch.
    pub fn event(mut self, event: PendingEvent) -> Self {
        self.events.push(event);
        self
    }

    /// Adds several events to the batch.
    pub fn events(mut self, events: impl IntoIterator<Item = PendingEvent>) -> Self {
        self.events.extend(events);
        self
    }

    /// Adds a unique-constraint claim. Claims are applied in insertion order.
    pub fn constraint(mut self, constraint: UniqueConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Adds several unique-constraint claims.
    pub fn constraints(mut self, constraints: impl IntoIterator<Item = UniqueConstraint>) -> Self {
        self.constraints.extend(constraints);
        self
    }
}

/// The concurrency expectation a push holds for one aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateExpectation {
    pub aggregate_type: String,
    pub aggregate_id: AggregateId,
    pub expected: ExpectedVersion,
}

/// A stream of events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Core trait for event store implementations.
///
/// The store is the only writer of the append log and of the
/// unique-constraint ledger. `push` is the single serialization point of
/// the system.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Atomically appends a batch of events and applies its constraint claims.
    ///
    /// Fails with `ConcurrencyConflict` if an aggregate is not at the version
    /// its events expect, and with `UniqueConstraintViolation` if an `add`
    /// claim targets an active key. On failure nothing is recorded.
    ///
    /// Returns the committed events with versions, positions and timestamps.
    async fn push(&self, request: PushRequest) -> Result<Vec<EventEnvelope>>;

    /// Retrieves events matching a query, ordered by position.
    async fn filter(&self, query: EventQuery) -> Result<Vec<EventEnvelope>>;

    /// Retrieves all events for a specific aggregate in version order.
    async fn events_for_aggregate(
        &self,
        aggregate_type: &str,
        aggregate_id: &AggregateId,
    ) -> Result<Vec<EventEnvelope>>;

    /// Retrieves events for an aggregate starting from a specific version.
    ///
    /// Used when replaying from a snapshot.
    async fn events_for_aggregate_from_version(
        &self,
        aggregate_type: &str,
        aggregate_id: &AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>>;

    /// Gets the current version of an aggregate, or None if it has no events.
    async fn aggregate_version(
        &self,
        aggregate_type: &str,
        aggregate_id: &AggregateId,
    ) -> Result<Option<Version>>;

    /// Retrieves up to `limit` events committed after `position`, in position order.
    async fn events_since(&self, position: Position, limit: usize) -> Result<Vec<EventEnvelope>>;

    /// Position of the most recently committed event.
    async fn latest_position(&self) -> Result<Position>;

    /// Streams all events in position order.
    async fn stream_all_events(&self) -> Result<EventStream>;

    /// Saves a snapshot, replacing any existing one for the aggregate.
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()>;

    /// Retrieves the latest snapshot for an aggregate.
    async fn get_snapshot(
        &self,
        aggregate_type: &str,
        aggregate_id: &AggregateId,
    ) -> Result<Option<Snapshot>>;

    /// Returns true if `(namespace, key)` has an active unique-constraint claim.
    async fn is_claimed(&self, namespace: &str, key: &str) -> Result<bool>;
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Pushes a single event without constraint claims.
    async fn push_event(&self, event: PendingEvent) -> Result<EventEnvelope> {
        let mut committed = self.push(PushRequest::new().event(event)).await?;
        committed
            .pop()
            .ok_or_else(|| EventStoreError::InvalidPush("push returned no events".to_string()))
    }

    /// Checks if an aggregate exists (has any events).
    async fn aggregate_exists(&self, aggregate_type: &str, aggregate_id: &AggregateId) -> Result<bool> {
        Ok(self
            .aggregate_version(aggregate_type, aggregate_id)
            .await?
            .is_some())
    }

    /// Retrieves all events of one type in position order.
    async fn events_by_type(&self, event_type: &str) -> Result<Vec<EventEnvelope>> {
        self.filter(EventQuery::for_event_type(event_type)).await
    }

    /// Loads an aggregate's events, optionally starting from a snapshot.
    ///
    /// If a snapshot exists, returns it and the events after it.
    /// Otherwise, returns None and all events.
    async fn load_aggregate(
        &self,
        aggregate_type: &str,
        aggregate_id: &AggregateId,
    ) -> Result<(Option<Snapshot>, Vec<EventEnvelope>)> {
        if let Some(snapshot) = self.get_snapshot(aggregate_type, aggregate_id).await? {
            let events = self
                .events_for_aggregate_from_version(
                    aggregate_type,
                    aggregate_id,
                    snapshot.version.next(),
                )
                .await?;
            Ok((Some(snapshot), events))
        } else {
            let events = self
                .events_for_aggregate(aggregate_type, aggregate_id)
                .await?;
            Ok((None, events))
        }
    }
}

// Blanket implementation for all EventStore implementations
impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// A complete backend: the event log plus projection checkpoints and leases.
///
/// Services hold an `Arc<dyn EventBackend>` so the backend can be chosen at
/// startup.
pub trait EventBackend: EventStore + CheckpointStore + ProjectionLocker {}

impl<T: EventStore + CheckpointStore + ProjectionLocker + ?Sized> EventBackend for T {}

/// Validates a push before any storage access.
///
/// Returns one expectation per aggregate in order of first appearance. The
/// first event of an aggregate sets its expectation; later events of the
/// same aggregate must repeat it or expect `Any`.
pub fn validate_push(request: &PushRequest) -> Result<Vec<AggregateExpectation>> {
    if request.events.is_empty() {
        return Err(EventStoreError::InvalidPush(
            "cannot push an empty event list".to_string(),
        ));
    }

    let mut expectations: Vec<AggregateExpectation> = Vec::new();
    for event in &request.events {
        if event.aggregate_type.is_empty() || event.event_type.is_empty() {
            return Err(EventStoreError::InvalidPush(
                "aggregate type and event type are required".to_string(),
            ));
        }
        if event.aggregate_id.is_blank() {
            return Err(EventStoreError::InvalidPush(format!(
                "aggregate id is required for {}",
                event.event_type
            )));
        }

        match expectations.iter().find(|e| {
            e.aggregate_type == event.aggregate_type && e.aggregate_id == event.aggregate_id
        }) {
            Some(existing) => {
                if event.expected_version != ExpectedVersion::Any
                    && event.expected_version != existing.expected
                {
                    return Err(EventStoreError::InvalidPush(format!(
                        "conflicting version expectations for {} {}",
                        event.aggregate_type, event.aggregate_id
                    )));
                }
            }
            None => expectations.push(AggregateExpectation {
                aggregate_type: event.aggregate_type.clone(),
                aggregate_id: event.aggregate_id.clone(),
                expected: event.expected_version,
            }),
        }
    }

    if let Some(constraint) = request
        .constraints
        .iter()
        .find(|c| c.namespace.is_empty() || c.key.is_empty())
    {
        return Err(EventStoreError::InvalidPush(format!(
            "unique constraint requires namespace and key, got {constraint}"
        )));
    }

    Ok(expectations)
}

/// Records the outcome of a push in the metrics registry.
pub(crate) fn record_push(result: &Result<Vec<EventEnvelope>>) {
    metrics::counter!("eventstore_push_total").increment(1);
    match result {
        Ok(events) => {
            metrics::counter!("eventstore_events_appended_total").increment(events.len() as u64);
        }
        Err(err) => {
            metrics::counter!("eventstore_push_conflicts_total", "kind" => err.kind())
                .increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(aggregate_id: &str, expected: ExpectedVersion) -> PendingEvent {
        PendingEvent::new(
            "org",
            AggregateId::from(aggregate_id),
            AggregateId::from(aggregate_id),
            "org.added",
            serde_json::json!({}),
        )
        .expect(expected)
    }

    #[test]
    fn empty_push_is_rejected() {
        let result = validate_push(&PushRequest::new());
        assert!(matches!(result, Err(EventStoreError::InvalidPush(_))));
    }

    #[test]
    fn one_expectation_per_aggregate_in_order() {
        let request = PushRequest::new()
            .event(pending("org1", ExpectedVersion::NoStream))
            .event(pending("org2", ExpectedVersion::Exact(Version::new(3))))
            .event(pending("org1", ExpectedVersion::Any));

        let expectations = validate_push(&request).unwrap();
        assert_eq!(expectations.len(), 2);
        assert_eq!(expectations[0].aggregate_id.as_str(), "org1");
        assert_eq!(expectations[0].expected, ExpectedVersion::NoStream);
        assert_eq!(expectations[1].expected, ExpectedVersion::Exact(Version::new(3)));
    }

    #[test]
    fn contradicting_expectations_are_rejected() {
        let request = PushRequest::new()
            .event(pending("org1", ExpectedVersion::NoStream))
            .event(pending("org1", ExpectedVersion::Exact(Version::new(1))));

        assert!(matches!(
            validate_push(&request),
            Err(EventStoreError::InvalidPush(_))
        ));
    }

    #[test]
    fn blank_aggregate_id_is_rejected() {
        let request = PushRequest::new().event(pending(" ", ExpectedVersion::Any));
        assert!(validate_push(&request).is_err());
    }

    #[test]
    fn constraint_without_key_is_rejected() {
        let request = PushRequest::new()
            .event(pending("org1", ExpectedVersion::Any))
            .constraint(UniqueConstraint::add("org-name", "", "m"));
        assert!(validate_push(&request).is_err());
    }
}
