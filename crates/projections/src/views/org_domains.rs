//! Domains registered on organizations.

use std::sync::Arc;

use async_trait::async_trait;
use domain::org::OrgDomain;
use domain::{Aggregate, Org, OrgEvent};
use event_store::{EventEnvelope, Position, Version};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ReadModel, Row, Table};

/// The domains of one organization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrgDomainsRow {
    pub org_id: String,
    pub domains: Vec<OrgDomain>,
    pub removed: bool,
    pub sequence: Version,
}

impl OrgDomainsRow {
    pub fn primary(&self) -> Option<&str> {
        self.domains
            .iter()
            .find(|d| d.primary)
            .map(|d| d.domain.as_str())
    }

    pub fn verified(&self) -> impl Iterator<Item = &str> {
        self.domains
            .iter()
            .filter(|d| d.verified)
            .map(|d| d.domain.as_str())
    }
}

impl Row for OrgDomainsRow {
    fn sequence(&self) -> Version {
        self.sequence
    }
}

#[derive(Clone, Default)]
pub struct OrgDomainsView {
    state: Arc<RwLock<Table<OrgDomainsRow>>>,
}

impl OrgDomainsView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn domains_of(&self, org_id: &str) -> Option<OrgDomainsRow> {
        self.state
            .read()
            .await
            .rows
            .get(org_id)
            .filter(|row| !row.removed)
            .cloned()
    }

    /// The organization that verified `domain`, compared case-insensitively.
    pub async fn owner_of(&self, domain: &str) -> Option<String> {
        let domain = domain.trim().to_lowercase();
        self.state
            .read()
            .await
            .rows
            .values()
            .filter(|row| !row.removed)
            .find(|row| row.verified().any(|d| d.to_lowercase() == domain))
            .map(|row| row.org_id.clone())
    }
}

fn apply(row: &mut OrgDomainsRow, event: OrgEvent) {
    match event {
        OrgEvent::DomainAdded(data) => {
            if !row.domains.iter().any(|d| d.domain == data.domain) {
                row.domains.push(OrgDomain::new(data.domain));
            }
        }
        OrgEvent::DomainVerified(data) => {
            if let Some(domain) = row.domains.iter_mut().find(|d| d.domain == data.domain) {
                domain.verified = true;
            }
        }
        OrgEvent::DomainPrimarySet(data) => {
            for domain in &mut row.domains {
                domain.primary = domain.domain == data.domain;
            }
        }
        OrgEvent::DomainRemoved(data) => row.domains.retain(|d| d.domain != data.domain),
        OrgEvent::OrgRemoved(_) => {
            row.removed = true;
            row.domains.clear();
        }
        _ => {}
    }
}

#[async_trait]
impl Projection for OrgDomainsView {
    fn name(&self) -> &'static str {
        "org_domains"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        let mut table = self.state.write().await;
        if envelope.aggregate_type == Org::aggregate_type() && !table.is_applied(envelope) {
            let event: OrgEvent = envelope.payload_as()?;
            let org_id = envelope.aggregate_id.to_string();
            let row = table
                .rows
                .entry(org_id.clone())
                .or_insert_with(|| OrgDomainsRow {
                    org_id,
                    domains: Vec::new(),
                    removed: false,
                    sequence: Version::initial(),
                });
            apply(row, event);
            row.sequence = envelope.version;
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

impl ReadModel for OrgDomainsView {
    fn name(&self) -> &'static str {
        "org_domains"
    }

    fn count(&self) -> usize {
        self.state
            .try_read()
            .map(|s| s.rows.values().map(|row| row.domains.len()).sum())
            .unwrap_or(0)
    }
}
