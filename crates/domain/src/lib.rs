//! Domain layer of the identity core.
//!
//! This crate provides:
//! - the [`Aggregate`] and [`DomainEvent`] traits, folding events into state
//! - [`CommandHandler`], the load/decide/push pipeline with optimistic concurrency
//! - the org, user, auth request and key pair aggregates
//! - the unique-constraint claims each event carries
//! - [`DomainError`] with its error kind taxonomy

pub mod aggregate;
pub mod auth_request;
pub mod command;
pub mod constraints;
pub mod error;
pub mod key_pair;
pub mod metadata;
pub mod org;
pub mod user;

pub use aggregate::{
    Aggregate, AggregateRef, AggregateRoot, CheckOutcome, DomainEvent, SnapshotCapable,
};
pub use auth_request::{AuthRequest, AuthRequestEvent, AuthRequestStep, LoginAsCheck};
pub use command::{CommandHandler, CommandResult, EventBatch, ObjectDetails};
pub use error::{DomainError, ErrorKind};
pub use key_pair::{KeyPair, KeyPairEvent, KeyUsage};
pub use org::{Org, OrgEvent, OrgState};
pub use user::{User, UserEvent, UserState};
