use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of an aggregate instance or of the organization owning it.
///
/// Identifiers are opaque strings so that externally assigned ids
/// (e.g. `"org1"`) and generated ids share one type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(String);

impl AggregateId {
    /// Creates a new random aggregate ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Creates an aggregate ID from an existing value.
    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for AggregateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AggregateId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AggregateId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<Uuid> for AggregateId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.simple().to_string())
    }
}

impl From<AggregateId> for String {
    fn from(id: AggregateId) -> Self {
        id.0
    }
}

impl AsRef<str> for AggregateId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_id_new_creates_unique_ids() {
        let id1 = AggregateId::new();
        let id2 = AggregateId::new();
        assert_ne!(id1, id2);
        assert!(!id1.is_blank());
    }

    #[test]
    fn aggregate_id_from_str_preserves_value() {
        let id = AggregateId::from("org1");
        assert_eq!(id.as_str(), "org1");
        assert_eq!(id.to_string(), "org1");
    }

    #[test]
    fn blank_ids_are_detected() {
        assert!(AggregateId::from("  ").is_blank());
        assert!(AggregateId::default().is_blank());
    }

    #[test]
    fn aggregate_id_serializes_as_plain_string() {
        let id = AggregateId::from("user1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"user1\"");
        let deserialized: AggregateId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }
}
