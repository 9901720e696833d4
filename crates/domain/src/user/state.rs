//! User lifecycle.

use serde::{Deserialize, Serialize};

/// The state of a user.
///
/// State transitions:
/// ```text
/// Unspecified ──► Active ◄──► Initial        (initial code added / checked)
///                   │  ▲
///                   ▼  │
///            Inactive  Locked                (deactivate/reactivate, lock/unlock)
///
/// any live state ──► Removed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum UserState {
    /// No events yet.
    #[default]
    Unspecified,
    /// Waiting for the initialization code to be verified.
    Initial,
    Active,
    Inactive,
    Locked,
    /// Terminal.
    Removed,
}

impl UserState {
    pub fn exists(&self) -> bool {
        !matches!(self, UserState::Unspecified | UserState::Removed)
    }

    pub fn can_deactivate(&self) -> bool {
        matches!(self, UserState::Active | UserState::Locked)
    }

    pub fn can_reactivate(&self) -> bool {
        matches!(self, UserState::Inactive)
    }

    pub fn can_lock(&self) -> bool {
        matches!(self, UserState::Active | UserState::Initial)
    }

    pub fn can_unlock(&self) -> bool {
        matches!(self, UserState::Locked)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            UserState::Unspecified => "Unspecified",
            UserState::Initial => "Initial",
            UserState::Active => "Active",
            UserState::Inactive => "Inactive",
            UserState::Locked => "Locked",
            UserState::Removed => "Removed",
        }
    }
}

impl std::fmt::Display for UserState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_users_cannot_be_deactivated() {
        assert!(!UserState::Initial.can_deactivate());
        assert!(UserState::Active.can_deactivate());
        assert!(UserState::Locked.can_deactivate());
        assert!(!UserState::Inactive.can_deactivate());
    }

    #[test]
    fn removed_users_do_not_exist() {
        assert!(!UserState::Removed.exists());
        assert!(UserState::Locked.exists());
        assert!(!UserState::Removed.can_lock());
    }
}
