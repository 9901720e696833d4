//! Append log, unique-constraint ledger and projection bookkeeping.
//!
//! The [`EventStore`] trait is the sole writer of events and constraint
//! claims. Two backends implement it: [`InMemoryEventStore`] for tests and
//! single-process use, and [`PostgresEventStore`] for production.

pub mod checkpoint;
pub mod constraint;
pub mod error;
pub mod event;
pub mod lock;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod snapshot;
pub mod store;

pub use checkpoint::CheckpointStore;
pub use common::AggregateId;
pub use constraint::{ConstraintAction, ConstraintLedger, UniqueConstraint};
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventId, ExpectedVersion, PendingEvent, Position, Version};
pub use lock::{LockResult, ProjectionLocker, RenewalResult};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use query::EventQuery;
pub use snapshot::Snapshot;
pub use store::{
    AggregateExpectation, EventBackend, EventStore, EventStoreExt, EventStream, PushRequest,
};
