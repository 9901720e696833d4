//! Authentication requests, folded exactly as the write side folds them.

use std::sync::Arc;

use async_trait::async_trait;
use domain::{Aggregate, AuthRequest};
use event_store::{EventEnvelope, Position, Version};
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ReadModel, Row, Table};

impl Row for AuthRequest {
    fn sequence(&self) -> Version {
        self.version()
    }
}

#[derive(Clone, Default)]
pub struct AuthRequestsView {
    state: Arc<RwLock<Table<AuthRequest>>>,
}

impl AuthRequestsView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<AuthRequest> {
        self.state
            .read()
            .await
            .rows
            .get(id)
            .filter(|request| request.exists())
            .cloned()
    }
}

#[async_trait]
impl Projection for AuthRequestsView {
    fn name(&self) -> &'static str {
        "auth_requests"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        let mut table = self.state.write().await;
        if envelope.aggregate_type == AuthRequest::aggregate_type() && !table.is_applied(envelope)
        {
            table
                .rows
                .entry(envelope.aggregate_id.to_string())
                .or_default()
                .apply_envelope(envelope)?;
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

impl ReadModel for AuthRequestsView {
    fn name(&self) -> &'static str {
        "auth_requests"
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.rows.len()).unwrap_or(0)
    }
}
