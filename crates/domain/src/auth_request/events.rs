//! Authentication request domain events.

use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

/// Events that can occur on an authentication request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum AuthRequestEvent {
    #[serde(rename = "auth_request.added")]
    AuthRequestAdded(AuthRequestAddedData),

    #[serde(rename = "auth_request.user.selection.cleared")]
    UserSelectionCleared,

    #[serde(rename = "auth_request.user.selected")]
    UserSelected(SelectedUserData),

    #[serde(rename = "auth_request.login_name.checked")]
    LoginNameChecked(SelectedUserData),

    #[serde(rename = "auth_request.login_as.checked")]
    LoginAsChecked(LoginAsCheckedData),

    #[serde(rename = "auth_request.privilege.check.failed")]
    PrivilegeCheckFailed(PrivilegeCheckFailedData),

    #[serde(rename = "auth_request.password.checked")]
    PasswordChecked,

    #[serde(rename = "auth_request.password.check.failed")]
    PasswordCheckFailed,

    #[serde(rename = "auth_request.second_factor.checked")]
    SecondFactorChecked,

    #[serde(rename = "auth_request.second_factor.check.failed")]
    SecondFactorCheckFailed,

    #[serde(rename = "auth_request.consent.given")]
    ConsentGiven,

    #[serde(rename = "auth_request.code.added")]
    CodeAdded(CodeAddedData),

    #[serde(rename = "auth_request.failed")]
    AuthRequestFailed(AuthRequestFailedData),
}

impl DomainEvent for AuthRequestEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AuthRequestEvent::AuthRequestAdded(_) => "auth_request.added",
            AuthRequestEvent::UserSelectionCleared => "auth_request.user.selection.cleared",
            AuthRequestEvent::UserSelected(_) => "auth_request.user.selected",
            AuthRequestEvent::LoginNameChecked(_) => "auth_request.login_name.checked",
            AuthRequestEvent::LoginAsChecked(_) => "auth_request.login_as.checked",
            AuthRequestEvent::PrivilegeCheckFailed(_) => "auth_request.privilege.check.failed",
            AuthRequestEvent::PasswordChecked => "auth_request.password.checked",
            AuthRequestEvent::PasswordCheckFailed => "auth_request.password.check.failed",
            AuthRequestEvent::SecondFactorChecked => "auth_request.second_factor.checked",
            AuthRequestEvent::SecondFactorCheckFailed => {
                "auth_request.second_factor.check.failed"
            }
            AuthRequestEvent::ConsentGiven => "auth_request.consent.given",
            AuthRequestEvent::CodeAdded(_) => "auth_request.code.added",
            AuthRequestEvent::AuthRequestFailed(_) => "auth_request.failed",
        }
    }
}

/// Data for auth_request.added event.
///
/// The flags fix which steps follow a successful credential check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthRequestAddedData {
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub requested_org_id: Option<String>,
    #[serde(default)]
    pub login_hint: Option<String>,
    #[serde(default)]
    pub requires_second_factor: bool,
    #[serde(default)]
    pub requires_consent: bool,
    /// Failed password checks tolerated before the request fails, 0 for no limit.
    #[serde(default)]
    pub max_password_attempts: u32,
}

/// The user a request is currently about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedUserData {
    pub user_id: String,
    pub user_resource_owner: String,
    pub login_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginAsCheckedData {
    /// The impersonated user.
    pub user_id: String,
    pub user_resource_owner: String,
    pub login_name: String,
    /// The authenticated user acting on the target's behalf.
    pub orig_user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivilegeCheckFailedData {
    pub user_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeAddedData {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthRequestFailedData {
    pub reason: String,
}
