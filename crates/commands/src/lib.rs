//! Command side of the identity core.
//!
//! [`Commands`] turns business intents into validated event batches:
//! - organizations, their domains, members and metadata
//! - human and machine users
//! - the login flow through [`AuthRequestUpdater`]
//! - signing key publication
//!
//! Every operation runs under a [`RetryPolicy`] that re-runs it against
//! fresh state after a concurrency conflict or a lagging read model.

pub mod auth_request;
pub mod config;
pub mod context;
pub mod crypto;
mod key_pair;
mod member;
pub mod org;
pub mod retry;
mod service;
pub mod user;

pub use auth_request::AuthRequestUpdater;
pub use config::{CommandsConfig, RoleMappings};
pub use context::CommandContext;
pub use crypto::{
    PasswordHasher, RandomSecretGenerator, SecondFactorVerifier, SecretGenerator,
    Sha256PasswordHasher, StaticSecondFactorVerifier,
};
pub use org::{CreatedOrg, OrgAdmin, OrgSetup, OrgSetupAdmin};
pub use retry::RetryPolicy;
pub use service::Commands;
pub use user::{AddHuman, AddMachine};
