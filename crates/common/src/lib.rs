//! Shared types used across the identity workspace crates.

mod types;

pub use types::AggregateId;
