//! The command service and the plumbing its operations share.

use std::sync::Arc;

use chrono::Utc;
use common::AggregateId;
use domain::user::{InitCode, Password};
use domain::{
    Aggregate, AggregateRef, CheckOutcome, CommandHandler, CommandResult, DomainError,
    ObjectDetails, SnapshotCapable, User,
};
use event_store::EventStore;
use projections::{Queries, UserRow};

use crate::config::CommandsConfig;
use crate::context::CommandContext;
use crate::crypto::{
    PasswordHasher, RandomSecretGenerator, SecondFactorVerifier, SecretGenerator,
    Sha256PasswordHasher, StaticSecondFactorVerifier,
};

/// Entry point of every state-changing operation.
///
/// Operations validate their input before any I/O, load the aggregates they
/// touch, check preconditions against the folded state (and against read
/// models where another aggregate is involved) and push the resulting
/// events with their claims in one batch. Each operation runs under the
/// configured [`RetryPolicy`](crate::RetryPolicy).
///
/// Reads go through [`Queries`]; the query side never calls back into
/// commands.
pub struct Commands<S: EventStore + ?Sized> {
    pub(crate) handler: CommandHandler<S>,
    pub(crate) queries: Queries,
    pub(crate) config: CommandsConfig,
    pub(crate) secrets: Arc<dyn SecretGenerator>,
    pub(crate) passwords: Arc<dyn PasswordHasher>,
    pub(crate) second_factor: Arc<dyn SecondFactorVerifier>,
}

impl<S: EventStore + ?Sized> Clone for Commands<S> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            queries: self.queries.clone(),
            config: self.config.clone(),
            secrets: Arc::clone(&self.secrets),
            passwords: Arc::clone(&self.passwords),
            second_factor: Arc::clone(&self.second_factor),
        }
    }
}

impl<S: EventStore + ?Sized> Commands<S> {
    /// Creates the service with random secrets, salted SHA-256 password
    /// hashes and no registered second factors.
    pub fn new(store: Arc<S>, queries: Queries, config: CommandsConfig) -> Self {
        Self {
            handler: CommandHandler::new(store),
            queries,
            config,
            secrets: Arc::new(RandomSecretGenerator::default()),
            passwords: Arc::new(Sha256PasswordHasher),
            second_factor: Arc::new(StaticSecondFactorVerifier::new()),
        }
    }

    pub fn with_secret_generator(mut self, secrets: Arc<dyn SecretGenerator>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_password_hasher(mut self, passwords: Arc<dyn PasswordHasher>) -> Self {
        self.passwords = passwords;
        self
    }

    pub fn with_second_factor_verifier(
        mut self,
        second_factor: Arc<dyn SecondFactorVerifier>,
    ) -> Self {
        self.second_factor = second_factor;
        self
    }

    pub fn config(&self) -> &CommandsConfig {
        &self.config
    }

    pub fn queries(&self) -> &Queries {
        &self.queries
    }

    pub fn handler(&self) -> &CommandHandler<S> {
        &self.handler
    }

    /// Loads an existing aggregate, decides events against it and commits
    /// them at the version it was loaded at.
    pub(crate) async fn update<A, F>(
        &self,
        ctx: &CommandContext,
        id: &str,
        decide: F,
    ) -> Result<ObjectDetails, DomainError>
    where
        A: SnapshotCapable,
        F: FnOnce(&A) -> Result<Vec<A::Event>, DomainError>,
    {
        let id = required_id(id)?;
        let aggregate: A = self.handler.load(&id).await?;
        let events = decide(&aggregate)?;
        let target = AggregateRef::existing(&aggregate).ok_or_else(object_not_found)?;
        let result = self
            .handler
            .commit(&target, &ctx.editor, aggregate, events)
            .await?;
        details(&result)
    }

    /// Like [`Commands::update`] for checks whose failure is recorded too.
    pub(crate) async fn update_checked<A, F>(
        &self,
        ctx: &CommandContext,
        id: &str,
        decide: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        A: SnapshotCapable,
        F: FnOnce(&A) -> Result<CheckOutcome<A::Event>, DomainError>,
    {
        let id = required_id(id)?;
        let aggregate: A = self.handler.load(&id).await?;
        let outcome = decide(&aggregate)?;
        let target = AggregateRef::existing(&aggregate).ok_or_else(object_not_found)?;
        self.handler
            .commit_outcome(&target, &ctx.editor, aggregate, outcome)
            .await
    }

    /// Hashes a password that satisfies the length policy.
    pub(crate) fn password(
        &self,
        password: &str,
        change_required: bool,
    ) -> Result<Password, DomainError> {
        if password.chars().count() < self.config.password_min_length {
            return Err(DomainError::invalid_argument(
                "COMMAND-Pw3mL",
                "Errors.User.Password.TooShort",
            ));
        }
        Ok(Password {
            hash: self.passwords.hash(password),
            change_required,
        })
    }

    pub(crate) fn init_code(&self) -> InitCode {
        InitCode::new(
            self.secrets.generate(),
            Utc::now(),
            self.config.initial_code_expiry.as_secs(),
        )
    }

    /// The user's read model row.
    ///
    /// A user the store knows but the read model does not is reported as
    /// a lagging read model, which the retry policy retries.
    pub(crate) async fn user_row(&self, user_id: &str) -> Result<UserRow, DomainError> {
        if let Some(row) = self.queries.user_by_id(user_id).await {
            return Ok(row);
        }
        let stored = self
            .handler
            .load_existing::<User>(&AggregateId::from(user_id))
            .await?;
        Err(match stored {
            Some(_) => DomainError::stale_read_model("QUERY-Dfbe2", "Errors.User.NotFound"),
            None => DomainError::not_found("QUERY-Dfbe2", "Errors.User.NotFound"),
        })
    }

    /// Fails unless the user exists in the store.
    pub(crate) async fn existing_user(&self, user_id: &str) -> Result<User, DomainError> {
        let id = required_id(user_id)?;
        self.handler
            .load_existing::<User>(&id)
            .await?
            .ok_or_else(|| DomainError::precondition_failed("ORG-GoXOn", "Errors.User.NotFound"))
    }
}

pub(crate) fn required_id(id: &str) -> Result<AggregateId, DomainError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(DomainError::invalid_argument(
            "COMMAND-4M0fs",
            "Errors.IDMissing",
        ));
    }
    Ok(AggregateId::from(id))
}

pub(crate) fn details<A: Aggregate>(result: &CommandResult<A>) -> Result<ObjectDetails, DomainError> {
    result.details().ok_or_else(object_not_found)
}

fn object_not_found() -> DomainError {
    DomainError::not_found("COMMAND-0bJ3c", "Errors.Object.NotFound")
}
