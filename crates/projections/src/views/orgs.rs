//! Organizations read model.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{Aggregate, Org, OrgEvent, OrgState};
use event_store::{EventEnvelope, Position, Version};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ReadModel, Row, Table};
use crate::search::{self, SearchQuery, SearchRequest, SearchResult, Searchable};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrgRow {
    pub id: String,
    pub name: String,
    pub state: OrgState,
    pub primary_domain: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub creation_date: DateTime<Utc>,
    pub change_date: DateTime<Utc>,
    pub sequence: Version,
}

impl Row for OrgRow {
    fn sequence(&self) -> Version {
        self.sequence
    }
}

/// Columns orgs can be searched and sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgColumn {
    Id,
    Name,
    PrimaryDomain,
    State,
}

impl Searchable<OrgColumn> for OrgRow {
    fn key(&self) -> &str {
        &self.id
    }

    fn column(&self, column: OrgColumn) -> Cow<'_, str> {
        match column {
            OrgColumn::Id => Cow::Borrowed(self.id.as_str()),
            OrgColumn::Name => Cow::Borrowed(self.name.as_str()),
            OrgColumn::PrimaryDomain => {
                Cow::Borrowed(self.primary_domain.as_deref().unwrap_or_default())
            }
            OrgColumn::State => Cow::Borrowed(self.state.as_str()),
        }
    }
}

/// Read model of every organization.
///
/// Removed orgs stay as tombstones so a redelivered creation event cannot
/// bring them back; lookups and searches skip them.
#[derive(Clone, Default)]
pub struct OrgsView {
    state: Arc<RwLock<Table<OrgRow>>>,
}

impl OrgsView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, org_id: &str) -> Option<OrgRow> {
        self.state
            .read()
            .await
            .rows
            .get(org_id)
            .filter(|row| row.state.exists())
            .cloned()
    }

    pub async fn search(
        &self,
        queries: &[SearchQuery<OrgColumn>],
        request: &SearchRequest<OrgColumn>,
    ) -> SearchResult<OrgRow> {
        let table = self.state.read().await;
        let live = table.rows.values().filter(|row| row.state.exists());
        search::search(live, queries, request, table.position)
    }
}

fn apply(row: &mut OrgRow, event: OrgEvent) {
    match event {
        OrgEvent::OrgChanged(data) => row.name = data.name,
        OrgEvent::OrgDeactivated => row.state = OrgState::Inactive,
        OrgEvent::OrgReactivated => row.state = OrgState::Active,
        OrgEvent::OrgRemoved(_) => row.state = OrgState::Removed,
        OrgEvent::DomainPrimarySet(data) => row.primary_domain = Some(data.domain),
        OrgEvent::DomainRemoved(data) => {
            if row.primary_domain.as_deref() == Some(data.domain.as_str()) {
                row.primary_domain = None;
            }
        }
        OrgEvent::MetadataSet(data) => {
            row.metadata.insert(data.key, data.value);
        }
        OrgEvent::MetadataRemoved(data) => {
            row.metadata.remove(&data.key);
        }
        _ => {}
    }
}

#[async_trait]
impl Projection for OrgsView {
    fn name(&self) -> &'static str {
        "orgs"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        let mut table = self.state.write().await;
        if envelope.aggregate_type != Org::aggregate_type() || table.is_applied(envelope) {
            table.advance(envelope.position);
            return Ok(());
        }

        let event: OrgEvent = envelope.payload_as()?;
        let id = envelope.aggregate_id.to_string();
        match event {
            OrgEvent::OrgAdded(data) => {
                table.rows.insert(
                    id.clone(),
                    OrgRow {
                        id,
                        name: data.name,
                        state: OrgState::Active,
                        primary_domain: None,
                        metadata: BTreeMap::new(),
                        creation_date: envelope.timestamp,
                        change_date: envelope.timestamp,
                        sequence: envelope.version,
                    },
                );
            }
            event => {
                if let Some(row) = table.rows.get_mut(&id) {
                    apply(row, event);
                    row.change_date = envelope.timestamp;
                    row.sequence = envelope.version;
                }
            }
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

impl ReadModel for OrgsView {
    fn name(&self) -> &'static str {
        "orgs"
    }

    fn count(&self) -> usize {
        self.state
            .try_read()
            .map(|s| s.rows.values().filter(|row| row.state.exists()).count())
            .unwrap_or(0)
    }
}
