use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{EventStoreError, Result};

/// Whether a unique-constraint claim reserves or frees its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintAction {
    Add,
    Remove,
}

/// A claim on a globally unique `(namespace, key)` pair.
///
/// Claims are pushed together with events and applied in the same
/// atomic step, so an append and its uniqueness check succeed or fail
/// together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueConstraint {
    pub namespace: String,
    pub key: String,
    pub action: ConstraintAction,
    /// Localizable message reported when an `add` claim collides.
    pub message_key: String,
}

impl UniqueConstraint {
    /// Claims `key` in `namespace`.
    pub fn add(
        namespace: impl Into<String>,
        key: impl Into<String>,
        message_key: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
            action: ConstraintAction::Add,
            message_key: message_key.into(),
        }
    }

    /// Releases `key` in `namespace` for reuse.
    pub fn remove(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
            action: ConstraintAction::Remove,
            message_key: String::new(),
        }
    }

    pub fn is_add(&self) -> bool {
        self.action == ConstraintAction::Add
    }
}

impl std::fmt::Display for UniqueConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.namespace, self.key)
    }
}

/// Set of active unique-constraint entries.
///
/// Backends without transactional storage apply a push's claims to a clone
/// of the ledger and swap it in only when the whole push succeeds.
#[derive(Debug, Clone, Default)]
pub struct ConstraintLedger {
    active: HashSet<(String, String)>,
}

impl ConstraintLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `(namespace, key)` has an active claim.
    pub fn is_claimed(&self, namespace: &str, key: &str) -> bool {
        self.active
            .contains(&(namespace.to_string(), key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Applies claims in order.
    ///
    /// Fails on the first `add` whose key is already active. Removing an
    /// inactive key is a no-op. On failure the ledger may be partially
    /// modified, so callers apply to a staged copy.
    pub fn apply(&mut self, constraints: &[UniqueConstraint]) -> Result<()> {
        for constraint in constraints {
            let entry = (constraint.namespace.clone(), constraint.key.clone());
            match constraint.action {
                ConstraintAction::Add => {
                    if !self.active.insert(entry) {
                        return Err(EventStoreError::UniqueConstraintViolation {
                            namespace: constraint.namespace.clone(),
                            key: constraint.key.clone(),
                            message_key: constraint.message_key.clone(),
                        });
                    }
                }
                ConstraintAction::Remove => {
                    self.active.remove(&entry);
                }
            }
        }
        Ok(())
    }
}
