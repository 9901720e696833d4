//! Rules for acting on behalf of another user.

use crate::error::DomainError;
use crate::metadata;

/// Facts about the original and the target user of a login-as attempt,
/// gathered from read models by the caller.
#[derive(Debug, Clone, Default)]
pub struct LoginAsCheck {
    pub orig_user_id: String,
    pub orig_resource_owner: String,
    pub target_user_id: String,
    pub target_resource_owner: String,
    pub target_login_name: String,
    /// Roles the target holds through any membership.
    pub target_roles: Vec<String>,
    /// The target's `LOGIN_AS` metadata value.
    pub target_login_as: Option<String>,
    pub default_org_id: String,
    pub requested_org_id: Option<String>,
    /// Orgs listed in the requested org's `GRANTED_ORGS` metadata.
    pub granted_org_ids: Vec<String>,
}

impl LoginAsCheck {
    /// A target with membership roles or the `LOGIN_AS` flag cannot be
    /// impersonated.
    pub fn target_is_privileged(&self) -> bool {
        !self.target_roles.is_empty() || metadata::login_as_enabled(self.target_login_as.as_deref())
    }

    /// The first rule the attempt breaks, if any.
    pub fn violation(&self) -> Option<DomainError> {
        if self.orig_user_id != self.target_user_id
            && self.orig_resource_owner != self.default_org_id
            && self.orig_resource_owner != self.target_resource_owner
        {
            return Some(DomainError::permission_denied(
                "AUTH-Bss7s",
                "Orig and target users belong to different orgs",
            ));
        }
        if self.target_is_privileged() {
            return Some(DomainError::permission_denied(
                "AUTH-Bds7d",
                "Selected user has privileges",
            ));
        }
        if let Some(requested) = self.requested_org_id.as_deref()
            && requested != self.target_resource_owner
            && !self.granted_org_ids.contains(&self.target_resource_owner)
        {
            return Some(DomainError::permission_denied(
                "AUTH-Gr4nT",
                "Errors.AuthRequest.OrgNotGranted",
            ));
        }
        None
    }
}
