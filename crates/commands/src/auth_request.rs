//! The login flow, driven one step at a time through an auth request.

use async_trait::async_trait;
use common::AggregateId;
use domain::auth_request::{CLEAR_SELECTION, NewAuthRequest, SelectedUser};
use domain::metadata::LOGIN_AS;
use domain::{
    AggregateRef, AuthRequest, AuthRequestEvent, CheckOutcome, DomainError, LoginAsCheck, User,
    UserState,
};
use event_store::EventStore;

use crate::context::CommandContext;
use crate::service::{Commands, required_id};

/// Steps of the login flow.
///
/// Every step validates against the freshly folded request and returns
/// the request as it is after the step. Failed credential checks are
/// recorded on the request before the error is returned.
#[async_trait]
pub trait AuthRequestUpdater: Send + Sync {
    /// Starts a request. The password attempt limit is the instance's.
    async fn add_auth_request(
        &self,
        ctx: &CommandContext,
        request: NewAuthRequest,
    ) -> Result<AuthRequest, DomainError>;

    /// Selects a user from the account list; `"0"` clears the selection.
    async fn select_user(
        &self,
        ctx: &CommandContext,
        auth_request_id: &str,
        user_id: &str,
    ) -> Result<AuthRequest, DomainError>;

    async fn check_login_name(
        &self,
        ctx: &CommandContext,
        auth_request_id: &str,
        login_name: &str,
    ) -> Result<AuthRequest, DomainError>;

    /// Lets the selected user continue as `target_user_id`.
    async fn check_login_as(
        &self,
        ctx: &CommandContext,
        auth_request_id: &str,
        target_user_id: &str,
    ) -> Result<AuthRequest, DomainError>;

    async fn check_password(
        &self,
        ctx: &CommandContext,
        auth_request_id: &str,
        password: &str,
    ) -> Result<AuthRequest, DomainError>;

    async fn check_second_factor(
        &self,
        ctx: &CommandContext,
        auth_request_id: &str,
        code: &str,
    ) -> Result<AuthRequest, DomainError>;

    async fn give_consent(
        &self,
        ctx: &CommandContext,
        auth_request_id: &str,
    ) -> Result<AuthRequest, DomainError>;

    /// Issues the authorization code of a completed request.
    async fn issue_code(
        &self,
        ctx: &CommandContext,
        auth_request_id: &str,
    ) -> Result<AuthRequest, DomainError>;

    async fn fail_auth_request(
        &self,
        ctx: &CommandContext,
        auth_request_id: &str,
        reason: &str,
    ) -> Result<AuthRequest, DomainError>;
}

#[async_trait]
impl<S: EventStore + ?Sized> AuthRequestUpdater for Commands<S> {
    #[tracing::instrument(skip(self, ctx, request), fields(client_id = %request.client_id))]
    async fn add_auth_request(
        &self,
        ctx: &CommandContext,
        request: NewAuthRequest,
    ) -> Result<AuthRequest, DomainError> {
        let id = AggregateId::new();
        let request = NewAuthRequest {
            max_password_attempts: self.config.max_password_attempts,
            ..request
        };
        self.config
            .retry
            .run("add_auth_request", ctx.timeout, || async {
                let target = AggregateRef::of::<AuthRequest>(
                    id.clone(),
                    AggregateId::from(self.config.instance_id.as_str()),
                );
                let fresh: AuthRequest = self.handler.load(&id).await?;
                let events = fresh.add(request.clone())?;
                let result = self.handler.commit(&target, &ctx.editor, fresh, events).await?;
                Ok(result.aggregate)
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    async fn select_user(
        &self,
        ctx: &CommandContext,
        auth_request_id: &str,
        user_id: &str,
    ) -> Result<AuthRequest, DomainError> {
        self.config
            .retry
            .run("select_user", ctx.timeout, || async move {
                let selected = if user_id.trim() == CLEAR_SELECTION {
                    None
                } else {
                    let row = self.user_row(user_id.trim()).await?;
                    Some(SelectedUser {
                        login_name: self.queries.preferred_login_name(&row).await,
                        user_id: row.id,
                        resource_owner: row.resource_owner,
                    })
                };
                self.step(ctx, auth_request_id, move |request| {
                    request.select_user(selected)
                })
                .await
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    async fn check_login_name(
        &self,
        ctx: &CommandContext,
        auth_request_id: &str,
        login_name: &str,
    ) -> Result<AuthRequest, DomainError> {
        self.config
            .retry
            .run("check_login_name", ctx.timeout, || async move {
                if login_name.trim().is_empty() {
                    return Err(DomainError::invalid_argument(
                        "LOGIN-Lm3sR",
                        "Errors.User.LoginName.Empty",
                    ));
                }
                let row = self
                    .queries
                    .user_by_login_name(login_name)
                    .await
                    .ok_or_else(|| {
                        DomainError::not_found("LOGIN-Bsa2d", "Errors.User.NotFound")
                    })?;
                if row.state == UserState::Inactive {
                    return Err(DomainError::precondition_failed(
                        "LOGIN-2n8fs",
                        "Errors.User.Inactive",
                    ));
                }
                let user = SelectedUser {
                    login_name: self.queries.preferred_login_name(&row).await,
                    user_id: row.id,
                    resource_owner: row.resource_owner,
                };
                self.step(ctx, auth_request_id, move |request| {
                    request.check_login_name(user)
                })
                .await
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    async fn check_login_as(
        &self,
        ctx: &CommandContext,
        auth_request_id: &str,
        target_user_id: &str,
    ) -> Result<AuthRequest, DomainError> {
        self.config
            .retry
            .run("check_login_as", ctx.timeout, || async move {
                let request = self.load_request(auth_request_id).await?;
                // without a selected user the check fails on the request itself
                let check = match request.user_id() {
                    Some(orig_user_id) => {
                        self.login_as_check(&request, orig_user_id, target_user_id)
                            .await?
                    }
                    None => LoginAsCheck::default(),
                };
                let outcome = request.check_login_as(&check)?;
                if let CheckOutcome::Failed { error, .. } = &outcome {
                    tracing::warn!(
                        orig_user_id = %check.orig_user_id,
                        target_user_id = %check.target_user_id,
                        reason = error.message_key(),
                        "login as rejected"
                    );
                }
                self.commit_check(ctx, request, outcome).await
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx, password))]
    async fn check_password(
        &self,
        ctx: &CommandContext,
        auth_request_id: &str,
        password: &str,
    ) -> Result<AuthRequest, DomainError> {
        self.config
            .retry
            .run("check_password", ctx.timeout, || async move {
                let request = self.load_request(auth_request_id).await?;
                let passed = match request.user_id() {
                    Some(user_id) => self.password_matches(user_id, password).await?,
                    None => false,
                };
                let outcome = request.check_password(passed)?;
                self.commit_check(ctx, request, outcome).await
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx, code))]
    async fn check_second_factor(
        &self,
        ctx: &CommandContext,
        auth_request_id: &str,
        code: &str,
    ) -> Result<AuthRequest, DomainError> {
        self.config
            .retry
            .run("check_second_factor", ctx.timeout, || async move {
                let request = self.load_request(auth_request_id).await?;
                let passed = match request.user_id() {
                    Some(user_id) => self.second_factor.verify(user_id, code).await,
                    None => false,
                };
                let outcome = request.check_second_factor(passed)?;
                self.commit_check(ctx, request, outcome).await
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    async fn give_consent(
        &self,
        ctx: &CommandContext,
        auth_request_id: &str,
    ) -> Result<AuthRequest, DomainError> {
        self.config
            .retry
            .run("give_consent", ctx.timeout, || {
                self.step(ctx, auth_request_id, AuthRequest::give_consent)
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    async fn issue_code(
        &self,
        ctx: &CommandContext,
        auth_request_id: &str,
    ) -> Result<AuthRequest, DomainError> {
        self.config
            .retry
            .run("issue_code", ctx.timeout, || {
                let code = self.secrets.generate();
                self.step(ctx, auth_request_id, move |request| request.issue_code(&code))
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    async fn fail_auth_request(
        &self,
        ctx: &CommandContext,
        auth_request_id: &str,
        reason: &str,
    ) -> Result<AuthRequest, DomainError> {
        self.config
            .retry
            .run("fail_auth_request", ctx.timeout, || {
                self.step(ctx, auth_request_id, move |request| request.fail(reason))
            })
            .await
    }
}

impl<S: EventStore + ?Sized> Commands<S> {
    /// Applies a step that cannot fail half-way.
    async fn step<F>(
        &self,
        ctx: &CommandContext,
        auth_request_id: &str,
        decide: F,
    ) -> Result<AuthRequest, DomainError>
    where
        F: FnOnce(&AuthRequest) -> Result<Vec<AuthRequestEvent>, DomainError>,
    {
        let result = self
            .update_checked(ctx, auth_request_id, move |request: &AuthRequest| {
                decide(request).map(CheckOutcome::Passed)
            })
            .await?;
        Ok(result.aggregate)
    }

    async fn load_request(&self, auth_request_id: &str) -> Result<AuthRequest, DomainError> {
        let id = required_id(auth_request_id)?;
        self.handler.load(&id).await
    }

    async fn commit_check(
        &self,
        ctx: &CommandContext,
        request: AuthRequest,
        outcome: CheckOutcome<AuthRequestEvent>,
    ) -> Result<AuthRequest, DomainError> {
        let target = AggregateRef::existing(&request).ok_or_else(|| {
            DomainError::not_found("AUTH-s7jf3", "Errors.AuthRequest.NotFound")
        })?;
        let result = self
            .handler
            .commit_outcome(&target, &ctx.editor, request, outcome)
            .await?;
        Ok(result.aggregate)
    }

    /// Gathers what the login-as rules need from the read models.
    async fn login_as_check(
        &self,
        request: &AuthRequest,
        orig_user_id: &str,
        target_user_id: &str,
    ) -> Result<LoginAsCheck, DomainError> {
        let orig = self.user_row(orig_user_id).await?;
        let target = self.user_row(target_user_id.trim()).await?;
        let target_login_name = self.queries.preferred_login_name(&target).await;
        let target_roles = self.queries.user_roles(&target.id).await;
        let granted_org_ids = match request.requested_org_id() {
            Some(org_id) => self.queries.org_granted_org_ids(org_id).await,
            None => Vec::new(),
        };
        Ok(LoginAsCheck {
            orig_user_id: orig.id,
            orig_resource_owner: orig.resource_owner,
            target_login_as: target.metadata.get(LOGIN_AS).cloned(),
            target_user_id: target.id,
            target_resource_owner: target.resource_owner,
            target_login_name,
            target_roles,
            default_org_id: self.config.default_org_id.clone(),
            requested_org_id: request.requested_org_id().map(str::to_string),
            granted_org_ids,
        })
    }

    /// Verifies the password of the stored user.
    async fn password_matches(&self, user_id: &str, password: &str) -> Result<bool, DomainError> {
        let Some(user) = self
            .handler
            .load_existing::<User>(&AggregateId::from(user_id))
            .await?
        else {
            return Ok(false);
        };
        match user.state() {
            UserState::Locked => Err(DomainError::precondition_failed(
                "COMMAND-JLK35",
                "Errors.User.Locked",
            )),
            UserState::Inactive => Err(DomainError::precondition_failed(
                "COMMAND-3n8fs",
                "Errors.User.Inactive",
            )),
            _ => Ok(user
                .password()
                .is_some_and(|stored| self.passwords.verify(password, &stored.hash))),
        }
    }
}
