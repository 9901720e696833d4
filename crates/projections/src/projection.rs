//! Core projection trait and the row bookkeeping shared by the views.

use std::collections::HashMap;

use async_trait::async_trait;
use event_store::{EventEnvelope, Position, Version};

use crate::Result;

/// A projection that processes events and updates a read model.
///
/// Delivery is at-least-once: after a crash the processor replays events
/// past the last checkpoint, so `handle` must tolerate redelivery.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Returns the name of this projection, also its checkpoint and lock key.
    fn name(&self) -> &'static str;

    /// Handles a single event, updating the projection's read model.
    async fn handle(&self, event: &EventEnvelope) -> Result<()>;

    /// Returns the log position of the last event handled.
    async fn position(&self) -> Position;

    /// Resets the projection to its initial state.
    async fn reset(&self) -> Result<()>;
}

/// A read model providing query access to denormalized data.
pub trait ReadModel: Send + Sync {
    /// Returns the name of this read model.
    fn name(&self) -> &'static str;

    /// Returns the number of entries in this read model.
    fn count(&self) -> usize;
}

/// A row derived from the events of one aggregate.
pub trait Row {
    /// Version of the last event of the aggregate applied to the row.
    fn sequence(&self) -> Version;
}

/// Rows keyed by aggregate id plus the position the table has seen.
#[derive(Debug)]
pub(crate) struct Table<R> {
    pub rows: HashMap<String, R>,
    pub position: Position,
}

impl<R> Default for Table<R> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
            position: Position::initial(),
        }
    }
}

impl<R: Row> Table<R> {
    /// True if the row already reflects `event`, making it a redelivery.
    pub fn is_applied(&self, event: &EventEnvelope) -> bool {
        self.rows
            .get(event.aggregate_id.as_str())
            .is_some_and(|row| row.sequence() >= event.version)
    }

    pub fn advance(&mut self, position: Position) {
        self.position = self.position.max(position);
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.position = Position::initial();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(Version);

    impl Row for Counter {
        fn sequence(&self) -> Version {
            self.0
        }
    }

    fn envelope(version: i64) -> EventEnvelope {
        EventEnvelope {
            event_id: event_store::EventId::new(),
            event_type: "org.added".to_string(),
            aggregate_id: "org1".into(),
            aggregate_type: "org".to_string(),
            resource_owner: "org1".into(),
            version: Version::new(version),
            position: Position::new(version),
            timestamp: chrono::Utc::now(),
            editor: "test".to_string(),
            payload: serde_json::Value::Null,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn applied_events_are_detected_by_sequence() {
        let mut table = Table::default();
        assert!(!table.is_applied(&envelope(1)));

        table.rows.insert("org1".to_string(), Counter(Version::new(2)));
        assert!(table.is_applied(&envelope(1)));
        assert!(table.is_applied(&envelope(2)));
        assert!(!table.is_applied(&envelope(3)));
    }

    #[test]
    fn position_never_moves_back() {
        let mut table: Table<Counter> = Table::default();
        table.advance(Position::new(5));
        table.advance(Position::new(3));
        assert_eq!(table.position, Position::new(5));

        table.clear();
        assert_eq!(table.position, Position::initial());
    }
}
