//! Command handling infrastructure.
//!
//! Commands load the aggregates they touch, decide events from the folded
//! state and hand everything to the store as one [`EventBatch`]. The batch
//! carries the version each aggregate was observed at, so a concurrent
//! writer turns the push into a conflict instead of a lost update.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::{
    EventEnvelope, EventStore, EventStoreError, EventStoreExt, ExpectedVersion, PendingEvent,
    PushRequest, Snapshot, UniqueConstraint, Version,
};
use serde::{Serialize, de::DeserializeOwned};

use crate::aggregate::{Aggregate, AggregateRef, AggregateRoot, CheckOutcome, DomainEvent, SnapshotCapable};
use crate::error::DomainError;

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The events that were generated and persisted.
    pub events: Vec<A::Event>,

    /// The new version of the aggregate after the command.
    pub new_version: Version,
}

impl<A: Aggregate> CommandResult<A> {
    /// Details of the aggregate after the command, None if it was never created.
    pub fn details(&self) -> Option<ObjectDetails> {
        ObjectDetails::from_root(self.aggregate.root())
    }
}

/// What a successful command reports back about the written aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectDetails {
    pub resource_id: AggregateId,
    pub resource_owner: AggregateId,
    pub sequence: Version,
    pub change_date: DateTime<Utc>,
}

impl ObjectDetails {
    /// Details of `resource_id` taken from its last committed event.
    pub fn from_committed(resource_id: &AggregateId, committed: &[EventEnvelope]) -> Option<Self> {
        committed
            .iter()
            .rev()
            .find(|envelope| &envelope.aggregate_id == resource_id)
            .map(|envelope| Self {
                resource_id: envelope.aggregate_id.clone(),
                resource_owner: envelope.resource_owner.clone(),
                sequence: envelope.version,
                change_date: envelope.timestamp,
            })
    }

    pub fn from_root(root: &AggregateRoot) -> Option<Self> {
        Some(Self {
            resource_id: root.id.clone()?,
            resource_owner: root.resource_owner.clone()?,
            sequence: root.version,
            change_date: root.change_date?,
        })
    }

    /// Like [`ObjectDetails::from_committed`], failing if the push did not
    /// touch `resource_id`.
    pub fn require(resource_id: &AggregateId, committed: &[EventEnvelope]) -> Result<Self, DomainError> {
        Self::from_committed(resource_id, committed).ok_or_else(|| {
            DomainError::EventStore(EventStoreError::InvalidPush(format!(
                "push committed no events for {resource_id}"
            )))
        })
    }
}

/// Events and claims collected from one or more aggregates, pushed atomically.
#[derive(Debug, Clone)]
pub struct EventBatch {
    editor: String,
    events: Vec<PendingEvent>,
    constraints: Vec<UniqueConstraint>,
}

impl EventBatch {
    pub fn new(editor: impl Into<String>) -> Self {
        Self {
            editor: editor.into(),
            events: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Appends events for `target`, which was observed at `expected`.
    ///
    /// The claims each event implies are collected in event order.
    pub fn append<E: DomainEvent>(
        &mut self,
        target: &AggregateRef,
        expected: ExpectedVersion,
        events: impl IntoIterator<Item = E>,
    ) -> Result<(), DomainError> {
        for event in events {
            self.constraints.extend(event.unique_constraints(target));
            let pending = PendingEvent::from_payload(
                target.aggregate_type,
                target.id.clone(),
                target.resource_owner.clone(),
                event.event_type(),
                &event,
            )?
            .editor(self.editor.clone())
            .expect(expected);
            self.events.push(pending);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn constraints(&self) -> &[UniqueConstraint] {
        &self.constraints
    }

    pub fn into_request(self) -> PushRequest {
        PushRequest::new()
            .events(self.events)
            .constraints(self.constraints)
    }
}

/// Handler for executing commands against aggregates.
///
/// The handler is responsible for:
/// 1. Loading aggregates from the event store (with optional snapshot)
/// 2. Running the decide function to produce events
/// 3. Persisting the events together with their unique-constraint claims
/// 4. Optionally saving a snapshot
pub struct CommandHandler<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for CommandHandler<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: EventStore + ?Sized> CommandHandler<S> {
    /// Creates a new command handler with the given event store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads an aggregate from the event store.
    ///
    /// If the aggregate doesn't exist, returns a default instance.
    pub async fn load<A>(&self, aggregate_id: &AggregateId) -> Result<A, DomainError>
    where
        A: Aggregate + DeserializeOwned,
    {
        let (snapshot, events) = self
            .store
            .load_aggregate(A::aggregate_type(), aggregate_id)
            .await?;

        let mut aggregate = match snapshot {
            Some(snapshot) => snapshot.into_state::<A>()?,
            None => A::default(),
        };

        // Apply events after snapshot
        for envelope in &events {
            aggregate.apply_envelope(envelope)?;
        }

        Ok(aggregate)
    }

    /// Loads an aggregate, returning None if it doesn't exist or was removed.
    pub async fn load_existing<A>(&self, aggregate_id: &AggregateId) -> Result<Option<A>, DomainError>
    where
        A: Aggregate + DeserializeOwned,
    {
        let aggregate: A = self.load(aggregate_id).await?;
        Ok(aggregate.exists().then_some(aggregate))
    }

    /// Pushes a batch, returning the committed envelopes.
    ///
    /// An empty batch is a no-op.
    pub async fn push(&self, batch: EventBatch) -> Result<Vec<EventEnvelope>, DomainError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(
            events = batch.len(),
            constraints = batch.constraints().len(),
            "pushing event batch"
        );
        Ok(self.store.push(batch.into_request()).await?)
    }

    /// Executes a command against a single aggregate and persists the
    /// resulting events.
    ///
    /// The decide function receives the current aggregate state and returns
    /// either a list of events to apply, or an error.
    pub async fn execute<A, F>(
        &self,
        target: &AggregateRef,
        editor: &str,
        decide: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        A: SnapshotCapable,
        F: FnOnce(&A) -> Result<Vec<A::Event>, DomainError>,
    {
        let aggregate: A = self.load(&target.id).await?;
        let events = decide(&aggregate)?;
        self.commit(target, editor, aggregate, events).await
    }

    /// Executes a check whose failure is recorded before it is reported.
    ///
    /// The outcome's events are pushed either way; a failed check then
    /// returns its error.
    pub async fn execute_check<A, F>(
        &self,
        target: &AggregateRef,
        editor: &str,
        decide: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        A: SnapshotCapable,
        F: FnOnce(&A) -> Result<CheckOutcome<A::Event>, DomainError>,
    {
        let aggregate: A = self.load(&target.id).await?;
        let outcome = decide(&aggregate)?;
        self.commit_outcome(target, editor, aggregate, outcome).await
    }

    /// Commits a check outcome against an aggregate loaded by the caller.
    ///
    /// A failed check still pushes its events before returning its error.
    pub async fn commit_outcome<A>(
        &self,
        target: &AggregateRef,
        editor: &str,
        aggregate: A,
        outcome: CheckOutcome<A::Event>,
    ) -> Result<CommandResult<A>, DomainError>
    where
        A: SnapshotCapable,
    {
        match outcome {
            CheckOutcome::Passed(events) => self.commit(target, editor, aggregate, events).await,
            CheckOutcome::Failed { events, error } => {
                self.commit(target, editor, aggregate, events).await?;
                Err(error)
            }
        }
    }

    /// Pushes `events` decided against `aggregate`, expecting the version
    /// it was loaded at, and folds the committed envelopes back into it.
    ///
    /// Saves a snapshot when the commit crosses the aggregate's snapshot
    /// interval.
    pub async fn commit<A>(
        &self,
        target: &AggregateRef,
        editor: &str,
        mut aggregate: A,
        events: Vec<A::Event>,
    ) -> Result<CommandResult<A>, DomainError>
    where
        A: SnapshotCapable,
    {
        let current_version = aggregate.version();

        if events.is_empty() {
            return Ok(CommandResult {
                aggregate,
                events: vec![],
                new_version: current_version,
            });
        }

        let mut batch = EventBatch::new(editor);
        batch.append(
            target,
            ExpectedVersion::observed(current_version),
            events.iter().cloned(),
        )?;
        let committed = self.push(batch).await?;

        for envelope in &committed {
            aggregate.apply_envelope(envelope)?;
        }
        let new_version = aggregate.version();

        if aggregate.should_snapshot(current_version) {
            self.save_snapshot(&target.id, &aggregate).await;
        }

        Ok(CommandResult {
            aggregate,
            events,
            new_version,
        })
    }

    /// Stores the folded state of an aggregate whose events are already
    /// committed.
    ///
    /// Failures are logged; the command has already succeeded.
    async fn save_snapshot<A: SnapshotCapable>(&self, id: &AggregateId, aggregate: &A) {
        let snapshot = Snapshot::from_state(
            id.clone(),
            A::aggregate_type(),
            aggregate.version(),
            aggregate,
        );
        let snapshot = match snapshot {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(aggregate_id = %id, error = %err, "failed to serialize snapshot");
                return;
            }
        };
        match self.store.save_snapshot(snapshot).await {
            Ok(()) => tracing::debug!(
                aggregate_id = %id,
                version = %aggregate.version(),
                "snapshot saved"
            ),
            Err(err) => tracing::warn!(aggregate_id = %id, error = %err, "failed to save snapshot"),
        }
    }
}
