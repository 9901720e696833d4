//! User domain events.

use chrono::{DateTime, Utc};
use event_store::UniqueConstraint;
use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregateRef, DomainEvent};
use crate::constraints;
use crate::metadata::{MetadataRemovedData, MetadataSetData};

use super::IdpLinkRef;

/// Events that can occur on a user aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum UserEvent {
    #[serde(rename = "user.human.added")]
    HumanAdded(HumanAddedData),

    #[serde(rename = "user.machine.added")]
    MachineAdded(MachineAddedData),

    #[serde(rename = "user.username.changed")]
    UsernameChanged(UsernameChangedData),

    #[serde(rename = "user.human.email.changed")]
    HumanEmailChanged(EmailChangedData),

    #[serde(rename = "user.human.email.verified")]
    HumanEmailVerified,

    #[serde(rename = "user.human.initialization.code.added")]
    HumanInitialCodeAdded(InitialCodeAddedData),

    #[serde(rename = "user.human.initialization.code.sent")]
    HumanInitialCodeSent,

    #[serde(rename = "user.human.initialization.check.succeeded")]
    HumanInitializedCheckSucceeded,

    #[serde(rename = "user.human.initialization.check.failed")]
    HumanInitializedCheckFailed,

    #[serde(rename = "user.human.password.changed")]
    HumanPasswordChanged(PasswordChangedData),

    #[serde(rename = "user.deactivated")]
    UserDeactivated,

    #[serde(rename = "user.reactivated")]
    UserReactivated,

    #[serde(rename = "user.locked")]
    UserLocked,

    #[serde(rename = "user.unlocked")]
    UserUnlocked,

    #[serde(rename = "user.removed")]
    UserRemoved(UserRemovedData),

    #[serde(rename = "user.idp.link.added")]
    IdpLinkAdded(IdpLinkAddedData),

    #[serde(rename = "user.idp.link.removed")]
    IdpLinkRemoved(IdpLinkRef),

    #[serde(rename = "user.metadata.set")]
    MetadataSet(MetadataSetData),

    #[serde(rename = "user.metadata.removed")]
    MetadataRemoved(MetadataRemovedData),
}

impl DomainEvent for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::HumanAdded(_) => "user.human.added",
            UserEvent::MachineAdded(_) => "user.machine.added",
            UserEvent::UsernameChanged(_) => "user.username.changed",
            UserEvent::HumanEmailChanged(_) => "user.human.email.changed",
            UserEvent::HumanEmailVerified => "user.human.email.verified",
            UserEvent::HumanInitialCodeAdded(_) => "user.human.initialization.code.added",
            UserEvent::HumanInitialCodeSent => "user.human.initialization.code.sent",
            UserEvent::HumanInitializedCheckSucceeded => {
                "user.human.initialization.check.succeeded"
            }
            UserEvent::HumanInitializedCheckFailed => "user.human.initialization.check.failed",
            UserEvent::HumanPasswordChanged(_) => "user.human.password.changed",
            UserEvent::UserDeactivated => "user.deactivated",
            UserEvent::UserReactivated => "user.reactivated",
            UserEvent::UserLocked => "user.locked",
            UserEvent::UserUnlocked => "user.unlocked",
            UserEvent::UserRemoved(_) => "user.removed",
            UserEvent::IdpLinkAdded(_) => "user.idp.link.added",
            UserEvent::IdpLinkRemoved(_) => "user.idp.link.removed",
            UserEvent::MetadataSet(_) => "user.metadata.set",
            UserEvent::MetadataRemoved(_) => "user.metadata.removed",
        }
    }

    fn unique_constraints(&self, target: &AggregateRef) -> Vec<UniqueConstraint> {
        let owner = target.resource_owner.as_str();
        match self {
            UserEvent::HumanAdded(data) => vec![constraints::add_username(
                &data.username,
                owner,
                data.user_login_must_be_domain,
            )],
            UserEvent::MachineAdded(data) => vec![constraints::add_username(
                &data.username,
                owner,
                data.user_login_must_be_domain,
            )],
            UserEvent::UsernameChanged(data) => vec![
                constraints::remove_username(
                    &data.old_username,
                    owner,
                    data.user_login_must_be_domain,
                ),
                constraints::add_username(&data.username, owner, data.user_login_must_be_domain),
            ],
            UserEvent::UserRemoved(data) => {
                let mut claims = vec![constraints::remove_username(
                    &data.username,
                    owner,
                    data.user_login_must_be_domain,
                )];
                claims.extend(data.idp_links.iter().map(|link| {
                    constraints::remove_idp_link(&link.idp_id, &link.external_user_id)
                }));
                claims
            }
            UserEvent::IdpLinkAdded(data) => {
                vec![constraints::add_idp_link(&data.idp_id, &data.external_user_id)]
            }
            UserEvent::IdpLinkRemoved(link) => {
                vec![constraints::remove_idp_link(&link.idp_id, &link.external_user_id)]
            }
            _ => Vec::new(),
        }
    }
}

/// Data for user.human.added event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanAddedData {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    #[serde(default)]
    pub preferred_language: Option<String>,
    pub email: String,
    /// Whether the username claim is scoped to the owning organization.
    #[serde(default)]
    pub user_login_must_be_domain: bool,
}

/// Data for user.machine.added event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineAddedData {
    pub username: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub user_login_must_be_domain: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsernameChangedData {
    pub old_username: String,
    pub username: String,
    #[serde(default)]
    pub user_login_must_be_domain: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailChangedData {
    pub email: String,
}

/// Data for user.human.initialization.code.added event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialCodeAddedData {
    pub code: String,
    pub expiry_secs: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasswordChangedData {
    pub password_hash: String,
    #[serde(default)]
    pub change_required: bool,
}

/// Data for user.removed event.
///
/// Carries the claims the user holds so they are released with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRemovedData {
    pub username: String,
    #[serde(default)]
    pub user_login_must_be_domain: bool,
    #[serde(default)]
    pub idp_links: Vec<IdpLinkRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdpLinkAddedData {
    pub idp_id: String,
    pub external_user_id: String,
    #[serde(default)]
    pub display_name: String,
}
