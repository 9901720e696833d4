use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::AggregateId;

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-aggregate sequence number, used for optimistic concurrency control.
///
/// The first event of an aggregate has version 1 and every later event
/// increments it by exactly one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version (0) of an aggregate without events.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the version (1) of the first event.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Global position of an event in the append log.
///
/// Positions are assigned at commit time and strictly increase across all
/// aggregates. Projections use them as their catch-up cursor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Position(i64);

impl Position {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// The position before the first event of the log.
    pub fn initial() -> Self {
        Self(0)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Version the writer expects an aggregate to be at when its events are pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExpectedVersion {
    /// No concurrency check.
    #[default]
    Any,
    /// The aggregate must not have any events yet.
    NoStream,
    /// The aggregate must be exactly at this version.
    Exact(Version),
}

impl ExpectedVersion {
    /// Expectation matching the version a command observed while loading.
    pub fn observed(version: Version) -> Self {
        if version == Version::initial() {
            Self::NoStream
        } else {
            Self::Exact(version)
        }
    }

    /// Returns true if an aggregate currently at `current` satisfies the expectation.
    pub fn matches(&self, current: Version) -> bool {
        match self {
            Self::Any => true,
            Self::NoStream => current == Version::initial(),
            Self::Exact(expected) => current == *expected,
        }
    }
}

impl std::fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::NoStream => f.write_str("no stream"),
            Self::Exact(version) => write!(f, "{version}"),
        }
    }
}

/// A committed event together with its storage metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique identifier for this event.
    pub event_id: EventId,

    /// The type of the event (e.g., "org.added", "user.human.added").
    pub event_type: String,

    /// The aggregate this event belongs to.
    pub aggregate_id: AggregateId,

    /// The type of aggregate (e.g., "org", "user").
    pub aggregate_type: String,

    /// The organization owning the aggregate.
    pub resource_owner: AggregateId,

    /// The version of the aggregate after this event.
    pub version: Version,

    /// The global position assigned when the event was committed.
    pub position: Position,

    /// When the event was committed.
    pub timestamp: DateTime<Utc>,

    /// Identity of whoever issued the command.
    pub editor: String,

    /// The event payload as JSON.
    pub payload: serde_json::Value,

    /// Additional metadata about the event.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelope {
    /// Deserializes the payload into a typed event.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// An event that has not been committed yet.
///
/// Versions, positions and timestamps are assigned by the store when the
/// push commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingEvent {
    pub event_type: String,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub resource_owner: AggregateId,
    pub editor: String,
    pub payload: serde_json::Value,
    pub metadata: HashMap<String, serde_json::Value>,
    pub expected_version: ExpectedVersion,
}

impl PendingEvent {
    /// Creates a pending event with no concurrency expectation.
    pub fn new(
        aggregate_type: impl Into<String>,
        aggregate_id: AggregateId,
        resource_owner: AggregateId,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            resource_owner,
            editor: String::new(),
            payload,
            metadata: HashMap::new(),
            expected_version: ExpectedVersion::Any,
        }
    }

    /// Creates a pending event from a serializable payload.
    pub fn from_payload<T: Serialize>(
        aggregate_type: impl Into<String>,
        aggregate_id: AggregateId,
        resource_owner: AggregateId,
        event_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            aggregate_type,
            aggregate_id,
            resource_owner,
            event_type,
            serde_json::to_value(payload)?,
        ))
    }

    /// Sets the editor recorded with the event.
    pub fn editor(mut self, editor: impl Into<String>) -> Self {
        self.editor = editor.into();
        self
    }

    /// Sets the version the aggregate must be at for the push to succeed.
    pub fn expect(mut self, expected: ExpectedVersion) -> Self {
        self.expected_version = expected;
        self
    }

    /// Adds a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Turns the pending event into a committed envelope.
    pub(crate) fn commit(
        self,
        version: Version,
        position: Position,
        timestamp: DateTime<Utc>,
    ) -> EventEnvelope {
        EventEnvelope {
            event_id: EventId::new(),
            event_type: self.event_type,
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type,
            resource_owner: self.resource_owner,
            version,
            position,
            timestamp,
            editor: self.editor,
            payload: self.payload,
            metadata: self.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_new_creates_unique_ids() {
        let id1 = EventId::new();
        let id2 = EventId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn version_ordering() {
        let v1 = Version::new(1);
        let v2 = Version::new(2);
        assert!(v1 < v2);
        assert_eq!(v1.next(), v2);
        assert_eq!(Version::initial().next(), Version::first());
    }

    #[test]
    fn expected_version_matching() {
        assert!(ExpectedVersion::Any.matches(Version::new(7)));
        assert!(ExpectedVersion::NoStream.matches(Version::initial()));
        assert!(!ExpectedVersion::NoStream.matches(Version::first()));
        assert!(ExpectedVersion::Exact(Version::new(3)).matches(Version::new(3)));
        assert!(!ExpectedVersion::Exact(Version::new(3)).matches(Version::new(4)));
    }

    #[test]
    fn observed_version_of_new_aggregate_expects_no_stream() {
        assert_eq!(
            ExpectedVersion::observed(Version::initial()),
            ExpectedVersion::NoStream
        );
        assert_eq!(
            ExpectedVersion::observed(Version::new(2)),
            ExpectedVersion::Exact(Version::new(2))
        );
    }

    #[test]
    fn pending_event_commit_keeps_payload_and_assigns_storage_fields() {
        let pending = PendingEvent::new(
            "org",
            AggregateId::from("org1"),
            AggregateId::from("org1"),
            "org.added",
            serde_json::json!({"name": "Org"}),
        )
        .editor("user1")
        .metadata("correlation_id", serde_json::json!("123"));

        let envelope = pending.commit(Version::first(), Position::new(9), Utc::now());

        assert_eq!(envelope.event_type, "org.added");
        assert_eq!(envelope.aggregate_id.as_str(), "org1");
        assert_eq!(envelope.version, Version::first());
        assert_eq!(envelope.position, Position::new(9));
        assert_eq!(envelope.editor, "user1");
        assert_eq!(envelope.payload["name"], "Org");
        assert_eq!(
            envelope.metadata.get("correlation_id"),
            Some(&serde_json::json!("123"))
        );
    }
}
