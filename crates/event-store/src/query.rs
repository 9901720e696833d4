use chrono::{DateTime, Utc};

use crate::{AggregateId, EventEnvelope, Position, Version};

/// Builder for constructing event filters.
///
/// Results are always ordered by global position. Every criterion that is
/// set must match; list criteria match any of their values.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    /// Filter by aggregate types (any of these).
    pub aggregate_types: Option<Vec<String>>,

    /// Filter by aggregate IDs (any of these).
    pub aggregate_ids: Option<Vec<AggregateId>>,

    /// Filter by owning organization.
    pub resource_owner: Option<AggregateId>,

    /// Filter by event types (any of these).
    pub event_types: Option<Vec<String>>,

    /// Filter by minimum version (inclusive).
    pub from_version: Option<Version>,

    /// Filter by maximum version (inclusive).
    pub to_version: Option<Version>,

    /// Only events committed after this position (exclusive).
    pub after_position: Option<Position>,

    /// Filter by events after this timestamp (inclusive).
    pub from_timestamp: Option<DateTime<Utc>>,

    /// Filter by events before this timestamp (inclusive).
    pub to_timestamp: Option<DateTime<Utc>>,

    /// Maximum number of events to return.
    pub limit: Option<usize>,

    /// Number of events to skip.
    pub offset: Option<usize>,
}

impl EventQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for a single aggregate.
    pub fn for_aggregate(aggregate_type: impl Into<String>, aggregate_id: AggregateId) -> Self {
        Self::new()
            .aggregate_type(aggregate_type)
            .aggregate_id(aggregate_id)
    }

    /// Creates a query for events of a specific type.
    pub fn for_event_type(event_type: impl Into<String>) -> Self {
        Self::new().event_type(event_type)
    }

    /// Filters by aggregate type.
    pub fn aggregate_type(mut self, aggregate_type: impl Into<String>) -> Self {
        self.aggregate_types
            .get_or_insert_with(Vec::new)
            .push(aggregate_type.into());
        self
    }

    /// Filters by aggregate ID.
    pub fn aggregate_id(mut self, id: AggregateId) -> Self {
        self.aggregate_ids.get_or_insert_with(Vec::new).push(id);
        self
    }

    /// Filters by owning organization.
    pub fn resource_owner(mut self, owner: AggregateId) -> Self {
        self.resource_owner = Some(owner);
        self
    }

    /// Filters by event type.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_types
            .get_or_insert_with(Vec::new)
            .push(event_type.into());
        self
    }

    /// Filters by multiple event types (any of these).
    pub fn event_types(mut self, event_types: Vec<String>) -> Self {
        self.event_types = Some(event_types);
        self
    }

    /// Filters to events starting from this version (inclusive).
    pub fn from_version(mut self, version: Version) -> Self {
        self.from_version = Some(version);
        self
    }

    /// Filters to events up to this version (inclusive).
    pub fn to_version(mut self, version: Version) -> Self {
        self.to_version = Some(version);
        self
    }

    /// Filters to events committed after this position.
    pub fn after_position(mut self, position: Position) -> Self {
        self.after_position = Some(position);
        self
    }

    /// Filters to events after this timestamp (inclusive).
    pub fn from_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.from_timestamp = Some(timestamp);
        self
    }

    /// Filters to events before this timestamp (inclusive).
    pub fn to_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.to_timestamp = Some(timestamp);
        self
    }

    /// Limits the number of events returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips this many events before returning results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if the event satisfies every criterion except paging.
    pub fn matches(&self, event: &EventEnvelope) -> bool {
        if let Some(ref types) = self.aggregate_types
            && !types.contains(&event.aggregate_type)
        {
            return false;
        }
        if let Some(ref ids) = self.aggregate_ids
            && !ids.contains(&event.aggregate_id)
        {
            return false;
        }
        if let Some(ref owner) = self.resource_owner
            && &event.resource_owner != owner
        {
            return false;
        }
        if let Some(ref types) = self.event_types
            && !types.contains(&event.event_type)
        {
            return false;
        }
        if let Some(from) = self.from_version
            && event.version < from
        {
            return false;
        }
        if let Some(to) = self.to_version
            && event.version > to
        {
            return false;
        }
        if let Some(after) = self.after_position
            && event.position <= after
        {
            return false;
        }
        if let Some(from) = self.from_timestamp
            && event.timestamp < from
        {
            return false;
        }
        if let Some(to) = self.to_timestamp
            && event.timestamp > to
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_for_aggregate() {
        let id = AggregateId::from("org1");
        let query = EventQuery::for_aggregate("org", id.clone());

        assert_eq!(query.aggregate_ids, Some(vec![id]));
        assert_eq!(query.aggregate_types, Some(vec!["org".to_string()]));
        assert!(query.event_types.is_none());
    }

    #[test]
    fn repeated_criteria_accumulate() {
        let query = EventQuery::new()
            .aggregate_type("org")
            .aggregate_type("user")
            .event_type("org.added")
            .event_type("user.human.added");

        assert_eq!(
            query.aggregate_types,
            Some(vec!["org".to_string(), "user".to_string()])
        );
        assert_eq!(query.event_types.map(|t| t.len()), Some(2));
    }

    #[test]
    fn query_builder_chain() {
        let query = EventQuery::new()
            .resource_owner(AggregateId::from("org1"))
            .from_version(Version::new(1))
            .to_version(Version::new(10))
            .after_position(Position::new(4))
            .limit(100)
            .offset(0);

        assert_eq!(query.resource_owner, Some(AggregateId::from("org1")));
        assert_eq!(query.from_version, Some(Version::new(1)));
        assert_eq!(query.to_version, Some(Version::new(10)));
        assert_eq!(query.after_position, Some(Position::new(4)));
        assert_eq!(query.limit, Some(100));
        assert_eq!(query.offset, Some(0));
    }
}
