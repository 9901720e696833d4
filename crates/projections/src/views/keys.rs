//! Public signing keys.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{Aggregate, KeyPair, KeyPairEvent, KeyUsage};
use event_store::{EventEnvelope, Position, Version};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ReadModel, Row, Table};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicKeyRow {
    pub id: String,
    pub algorithm: String,
    pub usage: KeyUsage,
    pub public_key: String,
    pub expiry: DateTime<Utc>,
    pub sequence: Version,
}

impl PublicKeyRow {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }
}

impl Row for PublicKeyRow {
    fn sequence(&self) -> Version {
        self.sequence
    }
}

#[derive(Clone, Default)]
pub struct KeysView {
    state: Arc<RwLock<Table<PublicKeyRow>>>,
}

impl KeysView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key_id: &str) -> Option<PublicKeyRow> {
        self.state.read().await.rows.get(key_id).cloned()
    }
}

#[async_trait]
impl Projection for KeysView {
    fn name(&self) -> &'static str {
        "keys"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        let mut table = self.state.write().await;
        if envelope.aggregate_type == KeyPair::aggregate_type() && !table.is_applied(envelope) {
            let KeyPairEvent::KeyPairAdded(data) = envelope.payload_as()?;
            let id = envelope.aggregate_id.to_string();
            table.rows.insert(
                id.clone(),
                PublicKeyRow {
                    id,
                    algorithm: data.algorithm,
                    usage: data.usage,
                    public_key: data.public_key,
                    expiry: data.expiry,
                    sequence: envelope.version,
                },
            );
        }
        table.advance(envelope.position);
        Ok(())
    }

    async fn position(&self) -> Position {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        self.state.write().await.clear();
        Ok(())
    }
}

impl ReadModel for KeysView {
    fn name(&self) -> &'static str {
        "keys"
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.rows.len()).unwrap_or(0)
    }
}
