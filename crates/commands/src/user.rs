//! Human and machine user commands.

use chrono::Utc;
use common::AggregateId;
use domain::user::{MachineProfile, NewHuman, Profile, validate_email};
use domain::{AggregateRef, DomainError, ObjectDetails, Org, User};
use event_store::EventStore;

use crate::context::CommandContext;
use crate::service::{Commands, details, required_id};

/// Input of [`Commands::add_human`].
#[derive(Debug, Clone)]
pub struct AddHuman {
    pub username: String,
    pub profile: Profile,
    pub email: String,
    pub email_verified: bool,
    /// Plain password, hashed before it is stored.
    pub password: Option<String>,
    pub password_change_required: bool,
}

/// Input of [`Commands::add_machine`].
#[derive(Debug, Clone)]
pub struct AddMachine {
    pub username: String,
    pub name: String,
    pub description: String,
}

impl<S: EventStore + ?Sized> Commands<S> {
    /// Adds a human user to an existing organization.
    ///
    /// Users without a password or without a verified email get an
    /// initialization code.
    #[tracing::instrument(skip(self, ctx, human), fields(username = %human.username))]
    pub async fn add_human(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        human: &AddHuman,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("add_human", ctx.timeout, || async {
                let new = self.new_human(human)?;
                let target = self.new_user_ref(org_id).await?;
                let user = User::default();
                let events = user.add_human(new, self.config.user_login_must_be_domain)?;
                let result = self.handler.commit(&target, &ctx.editor, user, events).await?;
                tracing::info!(user_id = %target.id, "human added");
                details(&result)
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx, machine), fields(username = %machine.username))]
    pub async fn add_machine(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        machine: &AddMachine,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("add_machine", ctx.timeout, || async {
                let (username, profile) = new_machine(machine)?;
                let target = self.new_user_ref(org_id).await?;
                let user = User::default();
                let events =
                    user.add_machine(&username, profile, self.config.user_login_must_be_domain)?;
                let result = self.handler.commit(&target, &ctx.editor, user, events).await?;
                tracing::info!(user_id = %target.id, "machine added");
                details(&result)
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn change_username(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        username: &str,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("change_username", ctx.timeout, || {
                self.update(ctx, user_id, move |user: &User| user.change_username(username))
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn change_email(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        email: &str,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("change_email", ctx.timeout, || async move {
                validate_email(email)?;
                self.update(ctx, user_id, move |user: &User| user.change_email(email))
                    .await
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn verify_email(
        &self,
        ctx: &CommandContext,
        user_id: &str,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("verify_email", ctx.timeout, || {
                self.update(ctx, user_id, User::verify_email)
            })
            .await
    }

    /// Issues a new initialization code, optionally to a changed address.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn resend_initial_mail(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        email: Option<&str>,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("resend_initial_mail", ctx.timeout, || {
                let code = self.init_code();
                self.update(ctx, user_id, move |user: &User| {
                    user.resend_initial_mail(email, code)
                })
            })
            .await
    }

    /// Records that the initialization code reached the user.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn init_code_sent(
        &self,
        ctx: &CommandContext,
        user_id: &str,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("init_code_sent", ctx.timeout, || {
                self.update(ctx, user_id, User::initial_code_sent)
            })
            .await
    }

    /// Checks an initialization code and, if it is valid, activates the
    /// user with an optional first password.
    ///
    /// A wrong or expired code is recorded before it is reported.
    #[tracing::instrument(skip(self, ctx, code, password))]
    pub async fn verify_init_code(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        code: &str,
        password: Option<&str>,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("verify_init_code", ctx.timeout, || async move {
                let password = password
                    .filter(|p| !p.is_empty())
                    .map(|p| self.password(p, false))
                    .transpose()?;
                let result = self
                    .update_checked(ctx, user_id, move |user: &User| {
                        user.verify_init_code(code, Utc::now(), password)
                    })
                    .await?;
                details(&result)
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx, password))]
    pub async fn change_password(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        password: &str,
        change_required: bool,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("change_password", ctx.timeout, || async move {
                let password = self.password(password, change_required)?;
                self.update(ctx, user_id, move |user: &User| user.change_password(password))
                    .await
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn deactivate_user(
        &self,
        ctx: &CommandContext,
        user_id: &str,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("deactivate_user", ctx.timeout, || {
                self.update(ctx, user_id, User::deactivate)
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn reactivate_user(
        &self,
        ctx: &CommandContext,
        user_id: &str,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("reactivate_user", ctx.timeout, || {
                self.update(ctx, user_id, User::reactivate)
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn lock_user(
        &self,
        ctx: &CommandContext,
        user_id: &str,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("lock_user", ctx.timeout, || self.update(ctx, user_id, User::lock))
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn unlock_user(
        &self,
        ctx: &CommandContext,
        user_id: &str,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("unlock_user", ctx.timeout, || {
                self.update(ctx, user_id, User::unlock)
            })
            .await
    }

    /// Removes the user, releasing its username and IdP links.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn remove_user(
        &self,
        ctx: &CommandContext,
        user_id: &str,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("remove_user", ctx.timeout, || {
                self.update(ctx, user_id, User::remove)
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn add_idp_link(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        idp_id: &str,
        external_user_id: &str,
        display_name: &str,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("add_idp_link", ctx.timeout, || {
                self.update(ctx, user_id, move |user: &User| {
                    user.add_idp_link(idp_id, external_user_id, display_name)
                })
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn remove_idp_link(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        idp_id: &str,
        external_user_id: &str,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("remove_idp_link", ctx.timeout, || {
                self.update(ctx, user_id, move |user: &User| {
                    user.remove_idp_link(idp_id, external_user_id)
                })
            })
            .await
    }

    /// Validates a human's input and prepares its creation, hashing the
    /// password and generating an initialization code where needed.
    pub(crate) fn new_human(&self, human: &AddHuman) -> Result<NewHuman, DomainError> {
        if human.username.trim().is_empty() {
            return Err(DomainError::invalid_argument(
                "V2-zzad3",
                "Errors.Invalid.Argument",
            ));
        }
        let email = validate_email(&human.email)?;
        let password = human
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| self.password(p, human.password_change_required))
            .transpose()?;
        let init_code = (password.is_none() || !human.email_verified).then(|| self.init_code());
        Ok(NewHuman {
            username: human.username.clone(),
            profile: human.profile.clone(),
            email,
            email_verified: human.email_verified,
            password,
            init_code,
        })
    }

    /// Generates the reference of a new user in an existing org.
    async fn new_user_ref(&self, org_id: &str) -> Result<AggregateRef, DomainError> {
        let org_id = required_id(org_id)?;
        if self.handler.load_existing::<Org>(&org_id).await?.is_none() {
            return Err(DomainError::precondition_failed(
                "COMMAND-3Ngs9",
                "Errors.Org.NotFound",
            ));
        }
        Ok(AggregateRef::of::<User>(AggregateId::new(), org_id))
    }
}

pub(crate) fn new_machine(machine: &AddMachine) -> Result<(String, MachineProfile), DomainError> {
    if machine.username.trim().is_empty() || machine.name.trim().is_empty() {
        return Err(DomainError::invalid_argument(
            "COMMAND-bm9Ds",
            "Errors.User.Invalid",
        ));
    }
    Ok((
        machine.username.clone(),
        MachineProfile {
            name: machine.name.clone(),
            description: machine.description.clone(),
        },
    ))
}

