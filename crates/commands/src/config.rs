//! Settings the command layer is constructed with.

use std::time::Duration;

use domain::org::ORG_OWNER_ROLE;
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Organization roles known to the instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMappings {
    /// Role granted to whoever creates an organization.
    pub org_owner_role: String,
    pub org_roles: Vec<String>,
}

impl Default for RoleMappings {
    fn default() -> Self {
        Self {
            org_owner_role: ORG_OWNER_ROLE.to_string(),
            org_roles: [
                ORG_OWNER_ROLE,
                "ORG_OWNER_VIEWER",
                "ORG_USER_MANAGER",
                "ORG_PROJECT_CREATOR",
            ]
            .map(str::to_string)
            .to_vec(),
        }
    }
}

impl RoleMappings {
    pub fn is_known(&self, role: &str) -> bool {
        self.org_roles.iter().any(|known| known == role)
    }

    pub fn has_owner_role(&self) -> bool {
        self.is_known(&self.org_owner_role)
    }
}

#[derive(Debug, Clone)]
pub struct CommandsConfig {
    /// Domain under which organization domains are derived.
    pub instance_domain: String,
    /// Resource owner of instance-level aggregates such as key pairs.
    pub instance_id: String,
    /// The instance's default organization, which cannot be removed.
    pub default_org_id: String,
    /// Domain policy: logins must be qualified with an org domain.
    pub user_login_must_be_domain: bool,
    pub initial_code_expiry: Duration,
    pub password_min_length: usize,
    /// Failed password checks before an auth request fails; 0 disables the
    /// limit.
    pub max_password_attempts: u32,
    pub roles: RoleMappings,
    pub retry: RetryPolicy,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            instance_domain: "localhost".to_string(),
            instance_id: "instance".to_string(),
            default_org_id: String::new(),
            user_login_must_be_domain: false,
            initial_code_expiry: Duration::from_secs(72 * 3600),
            password_min_length: 8,
            max_password_attempts: 5,
            roles: RoleMappings::default(),
            retry: RetryPolicy::default(),
        }
    }
}
