//! Read models and projections for the query side.
//!
//! - [`Projection`] folds committed events into a read model
//! - [`ProjectionProcessor`] feeds the append log to projections under a
//!   per-projection lock, persisting a checkpoint after every batch
//! - [`Queries`] serves lookups and searches from the [`ReadModels`]
//! - [`PublicKeyCache`] keeps verification keys close to token validation

pub mod cache;
pub mod error;
pub mod processor;
pub mod projection;
pub mod queries;
pub mod search;
pub mod views;

pub use cache::PublicKeyCache;
pub use error::{ProjectionError, Result};
pub use processor::{ProcessorConfig, ProjectionProcessor};
pub use projection::{Projection, ReadModel, Row};
pub use queries::Queries;
pub use search::{SearchQuery, SearchRequest, SearchResult, Searchable, TextMethod};
pub use views::{
    AuthRequestsView, KeysView, MembershipsView, OrgColumn, OrgDomainsView, OrgRow, OrgsView,
    PublicKeyRow, ReadModels, UserColumn, UserRow, UsersView,
};
