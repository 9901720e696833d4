//! Organization membership and metadata commands.

use domain::{DomainError, ObjectDetails, Org, User};
use event_store::EventStore;

use crate::context::CommandContext;
use crate::service::Commands;

impl<S: EventStore + ?Sized> Commands<S> {
    /// Grants roles in the organization to an existing user.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn add_org_member(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        user_id: &str,
        roles: &[String],
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("add_org_member", ctx.timeout, || async move {
                self.validate_member_roles(roles)?;
                self.existing_user(user_id).await?;
                self.update(ctx, org_id, move |org: &Org| {
                    org.add_member(user_id.trim(), roles.to_vec())
                })
                .await
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn change_org_member(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        user_id: &str,
        roles: &[String],
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("change_org_member", ctx.timeout, || async move {
                self.validate_member_roles(roles)?;
                self.update(ctx, org_id, move |org: &Org| {
                    org.change_member(user_id.trim(), roles.to_vec())
                })
                .await
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn remove_org_member(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        user_id: &str,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("remove_org_member", ctx.timeout, || {
                self.update(ctx, org_id, move |org: &Org| org.remove_member(user_id.trim()))
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx, value))]
    pub async fn set_org_metadata(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        key: &str,
        value: &str,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("set_org_metadata", ctx.timeout, || {
                self.update(ctx, org_id, move |org: &Org| org.set_metadata(key, value))
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn remove_org_metadata(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        key: &str,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("remove_org_metadata", ctx.timeout, || {
                self.update(ctx, org_id, move |org: &Org| org.remove_metadata(key))
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx, value))]
    pub async fn set_user_metadata(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        key: &str,
        value: &str,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("set_user_metadata", ctx.timeout, || {
                self.update(ctx, user_id, move |user: &User| user.set_metadata(key, value))
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn remove_user_metadata(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        key: &str,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("remove_user_metadata", ctx.timeout, || {
                self.update(ctx, user_id, move |user: &User| user.remove_metadata(key))
            })
            .await
    }

    /// Member roles must be given and known to the instance.
    fn validate_member_roles(&self, roles: &[String]) -> Result<(), DomainError> {
        if roles.is_empty() {
            return Err(DomainError::invalid_argument(
                "Org-4Mlfs",
                "Errors.Org.MemberInvalid",
            ));
        }
        self.validate_roles(roles)
    }

    /// Every role in `roles` is known to the instance.
    pub(crate) fn validate_roles(&self, roles: &[String]) -> Result<(), DomainError> {
        if roles.iter().all(|role| self.config.roles.is_known(role)) {
            Ok(())
        } else {
            Err(DomainError::invalid_argument(
                "Org-Rl9kN",
                "Errors.Org.Member.RoleUnknown",
            ))
        }
    }
}
