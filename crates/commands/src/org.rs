//! Organization commands.

use std::collections::BTreeSet;

use common::AggregateId;
use domain::{
    Aggregate, AggregateRef, DomainError, EventBatch, ObjectDetails, Org, OrgEvent, User,
};
use domain::user::IdpLink;
use event_store::{EventQuery, EventStore, ExpectedVersion, Version};

use crate::context::CommandContext;
use crate::service::{Commands, details, required_id};
use crate::user::{AddHuman, AddMachine, new_machine};

/// Input of [`Commands::set_up_org`].
#[derive(Debug, Clone)]
pub struct OrgSetup {
    pub name: String,
    pub admins: Vec<OrgSetupAdmin>,
}

/// An administrator of a new organization and the roles granted to it.
/// Empty roles grant the owner role.
#[derive(Debug, Clone)]
pub struct OrgSetupAdmin {
    pub admin: OrgAdmin,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum OrgAdmin {
    /// A user that already exists, in any organization.
    Existing { user_id: String },
    /// A human created inside the new organization.
    Human(AddHuman),
    /// A machine user created inside the new organization.
    Machine(AddMachine),
}

/// Result of [`Commands::set_up_org`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedOrg {
    pub details: ObjectDetails,
    /// Ids of the users created along with the organization.
    pub created_admins: Vec<AggregateId>,
}

impl<S: EventStore + ?Sized> Commands<S> {
    /// Creates an organization with its derived domain and makes
    /// `owner_user_id` its owner.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn add_org(
        &self,
        ctx: &CommandContext,
        name: &str,
        owner_user_id: &str,
        owner_resource_owner: &str,
    ) -> Result<ObjectDetails, DomainError> {
        let org_id = AggregateId::new();
        self.add_org_with_id(ctx, org_id.as_str(), name, owner_user_id, owner_resource_owner)
            .await
    }

    /// [`Commands::add_org`] with a caller-assigned id.
    ///
    /// The owner is usually the authenticated caller. It does not have to
    /// be stored here, but a stored owner must not be removed and must
    /// belong to `owner_resource_owner`.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn add_org_with_id(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        name: &str,
        owner_user_id: &str,
        owner_resource_owner: &str,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("add_org", ctx.timeout, || async {
                let org_id = required_id(org_id)?;
                if name.trim().is_empty() {
                    return Err(DomainError::invalid_argument(
                        "ORG-mruNY",
                        "Errors.Invalid.Argument",
                    ));
                }
                if owner_user_id.trim().is_empty() {
                    return Err(DomainError::invalid_argument(
                        "ORG-Nu7Mo",
                        "Errors.Org.Owner.Missing",
                    ));
                }
                let owner_role = self.owner_role()?;

                let owner: User = self
                    .handler
                    .load(&AggregateId::from(owner_user_id.trim()))
                    .await?;
                if owner.version() > Version::initial() {
                    if !owner.exists() {
                        return Err(DomainError::precondition_failed(
                            "ORG-3nfJs",
                            "Errors.User.NotFound",
                        ));
                    }
                    if owner
                        .root()
                        .resource_owner
                        .as_ref()
                        .is_some_and(|ro| ro.as_str() != owner_resource_owner)
                    {
                        return Err(DomainError::precondition_failed(
                            "ORG-GoXOn",
                            "Errors.User.NotFound",
                        ));
                    }
                }

                let org: Org = self.handler.load(&org_id).await?;
                let mut events = org.add(name, &self.config.instance_domain)?;
                events.push(OrgEvent::member_added(owner_user_id.trim(), vec![owner_role]));

                let target = AggregateRef::of::<Org>(org_id.clone(), org_id);
                let result = self.handler.commit(&target, &ctx.editor, org, events).await?;
                tracing::info!(org_id = %target.id, "organization added");
                details(&result)
            })
            .await
    }

    /// Creates an organization together with its administrators in one
    /// push: either everything is created or nothing is.
    #[tracing::instrument(skip(self, ctx, setup), fields(name = %setup.name))]
    pub async fn set_up_org(
        &self,
        ctx: &CommandContext,
        setup: &OrgSetup,
    ) -> Result<CreatedOrg, DomainError> {
        let org_id = AggregateId::new();
        self.config
            .retry
            .run("set_up_org", ctx.timeout, || self.try_set_up_org(ctx, &org_id, setup))
            .await
    }

    async fn try_set_up_org(
        &self,
        ctx: &CommandContext,
        org_id: &AggregateId,
        setup: &OrgSetup,
    ) -> Result<CreatedOrg, DomainError> {
        if setup.name.trim().is_empty() {
            return Err(DomainError::invalid_argument(
                "ORG-mruNY",
                "Errors.Invalid.Argument",
            ));
        }
        for admin in &setup.admins {
            self.validate_roles(&admin.roles)?;
        }
        let owner_role = self.owner_role()?;

        let org_ref = AggregateRef::of::<Org>(org_id.clone(), org_id.clone());
        let org: Org = self.handler.load(org_id).await?;
        let org_expected = ExpectedVersion::observed(org.version());
        let mut batch = EventBatch::new(&ctx.editor);
        batch.append(
            &org_ref,
            org_expected,
            org.add(&setup.name, &self.config.instance_domain)?,
        )?;

        let mut members = Vec::with_capacity(setup.admins.len());
        let mut created_admins = Vec::new();
        for admin in &setup.admins {
            let user_id = match &admin.admin {
                OrgAdmin::Existing { user_id } => {
                    self.existing_user(user_id).await?;
                    AggregateId::from(user_id.trim())
                }
                OrgAdmin::Human(human) => {
                    let new = self.new_human(human)?;
                    let user_ref = AggregateRef::of::<User>(AggregateId::new(), org_id.clone());
                    let events = User::default()
                        .add_human(new, self.config.user_login_must_be_domain)?;
                    batch.append(&user_ref, ExpectedVersion::NoStream, events)?;
                    created_admins.push(user_ref.id.clone());
                    user_ref.id
                }
                OrgAdmin::Machine(machine) => {
                    let (username, profile) = new_machine(machine)?;
                    let user_ref = AggregateRef::of::<User>(AggregateId::new(), org_id.clone());
                    let events = User::default().add_machine(
                        &username,
                        profile,
                        self.config.user_login_must_be_domain,
                    )?;
                    batch.append(&user_ref, ExpectedVersion::NoStream, events)?;
                    created_admins.push(user_ref.id.clone());
                    user_ref.id
                }
            };
            let roles = if admin.roles.is_empty() {
                vec![owner_role.clone()]
            } else {
                admin.roles.clone()
            };
            members.push(OrgEvent::member_added(user_id.as_str(), roles));
        }
        batch.append(&org_ref, org_expected, members)?;

        let committed = self.handler.push(batch).await?;
        tracing::info!(
            org_id = %org_id,
            admins = setup.admins.len(),
            "organization set up"
        );
        Ok(CreatedOrg {
            details: ObjectDetails::require(org_id, &committed)?,
            created_admins,
        })
    }

    /// Renames the organization, moving its derived domain along.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn change_org(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        name: &str,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("change_org", ctx.timeout, || async move {
                if name.trim().is_empty() {
                    return Err(DomainError::invalid_argument(
                        "ORG-BwR9a",
                        "Errors.Org.Invalid",
                    ));
                }
                let instance_domain = self.config.instance_domain.as_str();
                self.update(ctx, org_id, move |org: &Org| {
                    org.change_name(name, instance_domain)
                })
                .await
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn deactivate_org(
        &self,
        ctx: &CommandContext,
        org_id: &str,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("deactivate_org", ctx.timeout, || {
                self.update(ctx, org_id, Org::deactivate)
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn reactivate_org(
        &self,
        ctx: &CommandContext,
        org_id: &str,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("reactivate_org", ctx.timeout, || {
                self.update(ctx, org_id, Org::reactivate)
            })
            .await
    }

    /// Removes the organization and releases the names its users claimed.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn remove_org(
        &self,
        ctx: &CommandContext,
        org_id: &str,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("remove_org", ctx.timeout, || self.try_remove_org(ctx, org_id))
            .await
    }

    async fn try_remove_org(
        &self,
        ctx: &CommandContext,
        org_id: &str,
    ) -> Result<ObjectDetails, DomainError> {
        let id = required_id(org_id)?;
        if id.as_str() == self.config.default_org_id {
            return Err(DomainError::precondition_failed(
                "COMMA-wG9p1",
                "Errors.Org.DefaultOrgNotDeletable",
            ));
        }
        let org: Org = self.handler.load(&id).await?;
        if !org.exists() {
            return Err(DomainError::not_found("ORG-1MRds", "Errors.Org.NotFound"));
        }

        let users = self.users_owned_by(&id).await?;
        let usernames = users.iter().map(|user| user.username().to_string()).collect();
        let idp_links = users
            .iter()
            .flat_map(|user| user.idp_links().iter().map(IdpLink::to_ref))
            .collect();

        let events = org.remove(usernames, self.config.user_login_must_be_domain, idp_links)?;
        let target = AggregateRef::of::<Org>(id.clone(), id);
        let result = self.handler.commit(&target, &ctx.editor, org, events).await?;
        tracing::info!(org_id = %target.id, users = users.len(), "organization removed");
        details(&result)
    }

    /// Live users of the organization, folded from the log.
    ///
    /// Read from the store rather than the users view so that a user added
    /// after the last catch-up still has its claims released.
    async fn users_owned_by(&self, org_id: &AggregateId) -> Result<Vec<User>, DomainError> {
        let query = EventQuery::new()
            .aggregate_type(User::aggregate_type())
            .resource_owner(org_id.clone());
        let user_ids: BTreeSet<AggregateId> = self
            .handler
            .store()
            .filter(query)
            .await?
            .into_iter()
            .map(|event| event.aggregate_id)
            .collect();

        let mut users = Vec::with_capacity(user_ids.len());
        for user_id in &user_ids {
            let user: User = self.handler.load(user_id).await?;
            if user.exists() {
                users.push(user);
            }
        }
        Ok(users)
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn add_org_domain(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        domain: &str,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("add_org_domain", ctx.timeout, || {
                self.update(ctx, org_id, move |org: &Org| org.add_domain(domain))
            })
            .await
    }

    /// Verifies a domain, claiming it for the organization.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn verify_org_domain(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        domain: &str,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("verify_org_domain", ctx.timeout, || {
                self.update(ctx, org_id, move |org: &Org| org.verify_domain(domain))
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn set_primary_org_domain(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        domain: &str,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("set_primary_org_domain", ctx.timeout, || {
                self.update(ctx, org_id, move |org: &Org| org.set_primary_domain(domain))
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn remove_org_domain(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        domain: &str,
    ) -> Result<ObjectDetails, DomainError> {
        self.config
            .retry
            .run("remove_org_domain", ctx.timeout, || {
                self.update(ctx, org_id, move |org: &Org| org.remove_domain(domain))
            })
            .await
    }

    fn owner_role(&self) -> Result<String, DomainError> {
        if !self.config.roles.has_owner_role() {
            return Err(DomainError::precondition_failed(
                "ORG-Dbs2e",
                "Errors.Org.Member.OwnerRoleMissing",
            ));
        }
        Ok(self.config.roles.org_owner_role.clone())
    }
}
