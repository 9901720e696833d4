//! Core aggregate and domain event traits.

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::{EventEnvelope, UniqueConstraint, Version};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::DomainError;

/// Identifies the aggregate an event is appended to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregateRef {
    pub aggregate_type: &'static str,
    pub id: AggregateId,
    pub resource_owner: AggregateId,
}

impl AggregateRef {
    /// Addresses an aggregate of type `A`.
    pub fn of<A: Aggregate>(id: AggregateId, resource_owner: AggregateId) -> Self {
        Self {
            aggregate_type: A::aggregate_type(),
            id,
            resource_owner,
        }
    }

    /// Addresses an aggregate that was loaded from its history. None for a
    /// fresh aggregate.
    pub fn existing<A: Aggregate>(aggregate: &A) -> Option<Self> {
        let root = aggregate.root();
        Some(Self::of::<A>(root.id.clone()?, root.resource_owner.clone()?))
    }
}

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name.
    ///
    /// This is used for serialization and event store filtering.
    fn event_type(&self) -> &'static str;

    /// Unique-constraint claims implied by appending this event to `target`.
    fn unique_constraints(&self, target: &AggregateRef) -> Vec<UniqueConstraint> {
        let _ = target;
        Vec::new()
    }
}

/// Identity and version bookkeeping shared by all aggregates.
///
/// Filled from committed envelopes while folding, never from event payloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateRoot {
    pub id: Option<AggregateId>,
    pub resource_owner: Option<AggregateId>,
    pub version: Version,
    pub change_date: Option<DateTime<Utc>>,
}

impl AggregateRoot {
    /// Records the identity, version and date of a committed event.
    pub fn observe(&mut self, envelope: &EventEnvelope) {
        if self.id.is_none() {
            self.id = Some(envelope.aggregate_id.clone());
        }
        self.resource_owner = Some(envelope.resource_owner.clone());
        self.version = envelope.version;
        self.change_date = Some(envelope.timestamp);
    }
}

/// Trait for aggregates in an event-sourced system.
///
/// Aggregates are rebuilt by replaying events in version order. `apply` is
/// pure and infallible; commands are decided by methods that inspect the
/// folded state and return the events to append.
pub trait Aggregate: Default + Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    fn root(&self) -> &AggregateRoot;

    fn root_mut(&mut self) -> &mut AggregateRoot;

    /// Applies an event to the aggregate, updating its state.
    ///
    /// Must be deterministic and must not fail: events are facts.
    fn apply(&mut self, event: Self::Event);

    /// Returns true while the aggregate is live, i.e. created and not removed.
    fn exists(&self) -> bool;

    /// Returns the aggregate's identifier, None for a fresh aggregate.
    fn id(&self) -> Option<&AggregateId> {
        self.root().id.as_ref()
    }

    /// Returns the current version. Version 0 means no events.
    fn version(&self) -> Version {
        self.root().version
    }

    fn set_version(&mut self, version: Version) {
        self.root_mut().version = version;
    }

    /// Applies multiple events in sequence.
    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }

    /// Applies a committed envelope, decoding its payload.
    fn apply_envelope(&mut self, envelope: &EventEnvelope) -> Result<(), serde_json::Error> {
        let event: Self::Event = envelope.payload_as()?;
        self.root_mut().observe(envelope);
        self.apply(event);
        Ok(())
    }

    /// Folds an aggregate from its full history.
    fn from_history<'a>(
        envelopes: impl IntoIterator<Item = &'a EventEnvelope>,
    ) -> Result<Self, serde_json::Error> {
        let mut aggregate = Self::default();
        for envelope in envelopes {
            aggregate.apply_envelope(envelope)?;
        }
        Ok(aggregate)
    }
}

/// Trait for aggregates that support snapshotting.
///
/// The aggregate state is periodically serialized and stored so loading
/// only replays the events after the snapshot.
pub trait SnapshotCapable: Aggregate + Serialize + DeserializeOwned {
    /// Returns the snapshot interval (number of events between snapshots).
    fn snapshot_interval() -> usize {
        100
    }

    /// Returns whether a snapshot is due after moving from `since` to the
    /// current version.
    ///
    /// One commit can append several events, so the check is whether an
    /// interval boundary was crossed rather than landed on exactly.
    fn should_snapshot(&self, since: Version) -> bool {
        let interval = Self::snapshot_interval().max(1) as i64;
        let current = self.version().as_i64();
        current > since.as_i64() && current / interval > since.as_i64().max(0) / interval
    }
}

/// Outcome of a check whose failure is itself recorded.
///
/// A failed check still appends its events before the error reaches the
/// caller.
#[derive(Debug)]
pub enum CheckOutcome<E> {
    Passed(Vec<E>),
    Failed { events: Vec<E>, error: DomainError },
}

impl<E> CheckOutcome<E> {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed(_))
    }

    /// The events to append regardless of the outcome.
    pub fn events(&self) -> &[E] {
        match self {
            Self::Passed(events) | Self::Failed { events, .. } => events,
        }
    }
}
