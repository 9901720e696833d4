//! Login flow steps.

use serde::{Deserialize, Serialize};

/// The step an authentication request is at.
///
/// Step transitions:
/// ```text
/// Started ──► AwaitingUsername ──► AwaitingCredential ──► AwaitingSecondFactor
///    │                                  ▲     │                   │
///    └──────────────────────────────────┘     ▼                   ▼
///                                        AwaitingConsent ◄────────┘
///                                             │
///                                             ▼
///                                         Completed
///
/// any non-terminal step ──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AuthRequestStep {
    /// No events yet.
    #[default]
    Unspecified,
    Started,
    AwaitingUsername,
    AwaitingCredential,
    AwaitingSecondFactor,
    AwaitingConsent,
    /// Terminal. Only a code can still be issued.
    Completed,
    /// Terminal.
    Failed,
}

impl AuthRequestStep {
    pub fn exists(&self) -> bool {
        !matches!(self, AuthRequestStep::Unspecified)
    }

    /// Returns true if a user can be selected or entered at this step.
    pub fn can_select_user(&self) -> bool {
        matches!(
            self,
            AuthRequestStep::Started
                | AuthRequestStep::AwaitingUsername
                | AuthRequestStep::AwaitingCredential
        )
    }

    pub fn can_check_login_name(&self) -> bool {
        matches!(
            self,
            AuthRequestStep::Started | AuthRequestStep::AwaitingUsername
        )
    }

    pub fn can_check_credential(&self) -> bool {
        matches!(self, AuthRequestStep::AwaitingCredential)
    }

    pub fn can_check_second_factor(&self) -> bool {
        matches!(self, AuthRequestStep::AwaitingSecondFactor)
    }

    pub fn can_give_consent(&self) -> bool {
        matches!(self, AuthRequestStep::AwaitingConsent)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AuthRequestStep::Completed | AuthRequestStep::Failed)
    }

    /// Returns the step name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthRequestStep::Unspecified => "Unspecified",
            AuthRequestStep::Started => "Started",
            AuthRequestStep::AwaitingUsername => "AwaitingUsername",
            AuthRequestStep::AwaitingCredential => "AwaitingCredential",
            AuthRequestStep::AwaitingSecondFactor => "AwaitingSecondFactor",
            AuthRequestStep::AwaitingConsent => "AwaitingConsent",
            AuthRequestStep::Completed => "Completed",
            AuthRequestStep::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for AuthRequestStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_steps_accept_no_checks() {
        for step in [AuthRequestStep::Completed, AuthRequestStep::Failed] {
            assert!(step.is_terminal());
            assert!(!step.can_select_user());
            assert!(!step.can_check_credential());
        }
    }

    #[test]
    fn login_name_only_before_credential() {
        assert!(AuthRequestStep::Started.can_check_login_name());
        assert!(AuthRequestStep::AwaitingUsername.can_check_login_name());
        assert!(!AuthRequestStep::AwaitingCredential.can_check_login_name());
    }
}
