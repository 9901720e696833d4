//! Organization lifecycle.

use serde::{Deserialize, Serialize};

/// The state of an organization.
///
/// State transitions:
/// ```text
/// Unspecified ──► Active ◄──► Inactive
///                    │            │
///                    └────────────┴──► Removed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrgState {
    /// No events yet.
    #[default]
    Unspecified,
    Active,
    Inactive,
    /// Terminal.
    Removed,
}

impl OrgState {
    /// Returns true for organizations that were added and not removed.
    pub fn exists(&self) -> bool {
        matches!(self, OrgState::Active | OrgState::Inactive)
    }

    pub fn can_deactivate(&self) -> bool {
        matches!(self, OrgState::Active)
    }

    pub fn can_reactivate(&self) -> bool {
        matches!(self, OrgState::Inactive)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgState::Unspecified => "Unspecified",
            OrgState::Active => "Active",
            OrgState::Inactive => "Inactive",
            OrgState::Removed => "Removed",
        }
    }
}

impl std::fmt::Display for OrgState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_active_and_inactive_exist() {
        assert!(!OrgState::Unspecified.exists());
        assert!(OrgState::Active.exists());
        assert!(OrgState::Inactive.exists());
        assert!(!OrgState::Removed.exists());
    }

    #[test]
    fn deactivate_and_reactivate_are_exclusive() {
        assert!(OrgState::Active.can_deactivate());
        assert!(!OrgState::Active.can_reactivate());
        assert!(OrgState::Inactive.can_reactivate());
        assert!(!OrgState::Inactive.can_deactivate());
        assert!(!OrgState::Removed.can_reactivate());
    }
}
