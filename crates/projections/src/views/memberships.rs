//! Organization memberships and their roles.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use domain::{Aggregate, Org, OrgEvent, User, UserEvent};
use event_store::{EventEnvelope, Position, Version};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ReadModel, Row, Table};

/// A user's roles in one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Membership {
    pub org_id: String,
    pub user_id: String,
    pub roles: Vec<String>,
}

/// Members of one organization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrgMembersRow {
    pub members: BTreeMap<String, Vec<String>>,
    pub sequence: Version,
}

impl Row for OrgMembersRow {
    fn sequence(&self) -> Version {
        self.sequence
    }
}

#[derive(Clone, Default)]
pub struct MembershipsView {
    state: Arc<RwLock<Table<OrgMembersRow>>>,
}

impl MembershipsView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn of_user(&self, user_id: &str) -> Vec<Membership> {
        let table = self.state.read().await;
        let mut memberships: Vec<_> = table
            .rows
            .iter()
            .filter_map(|(org_id, row)| {
                row.members.get(user_id).map(|roles| Membership {
                    org_id: org_id.clone(),
                    user_id: user_id.to_string(),
                    roles: roles.clone(),
                })
            })
            .collect();
        memberships.sort_by(|a, b| a.org_id.cmp(&b.org_id));
        memberships
    }

    pub async fn of_org(&self, org_id: &str) -> Vec<Membership> {
        self.state
            .read()
            .await
            .rows
            .get(org_id)
            .map(|row| {
                row.members
                    .iter()
                    .map(|(user_id, roles)| Membership {
                        org_id: org_id.to_string(),
                        user_id: user_id.clone(),
                        roles: roles.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn is_member_anywhere(&self, user_id: &str) -> bool {
        self.state
            .read()
            .await
            .rows
            .values()
            .any(|row| row.members.contains_key(user_id))
    }

    /// Every user holding at least one membership.
    pub async fn member_ids(&self) -> HashSet<String> {
        self.state
            .read()
            .await
            .rows
            .values()
            .flat_map(|row| row.members.keys().cloned())
            .collect()
    }

    async fn apply_org_event(&self, envelope: &EventEnvelope) -> Result<()> {
        let mut table = self.state.write().await;
        if !table.is_applied(envelope) {
            let event: OrgEvent = envelope.payload_as()?;
            let row = table
                .rows
                .entry(envelope.aggregate_id.to_string())
                .or_default();
            match event {
                OrgEvent::MemberAdded(data) | OrgEvent::MemberChanged(data) => {
                    row.members.insert(data.user_id, data.roles);
                }
                OrgEvent::MemberRemoved(data) => {
                    row.members.remove(&data.user_id);
                }
                OrgEvent::OrgRemoved(_) => row.members.clear(),
                _ => {}
            }
            row.sequence = envelope.version;
        }
        table.advance(envelope.position);
        Ok(())
    }

    /// A removed user loses every membership.
    async fn apply_user_event(&self, envelope: &EventEnvelope) -> Result<()> {
        let mut table = self.state.write().await;
        let event: UserEvent = envelope.payload_as()?;
        if let UserEvent::UserRemoved(_) = event {
            let user_id = envelope.aggregate_id.as_str();
            for row in table.rows.values_mut() {
                row.members.remove(user_id);
            }
        }
        table.advance(envelope.position);
        Ok(())
    }
}

#[async_trait]
impl Projection for MembershipsView {
    fn name(&self) -> &'static str {
        "memberships"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        if envelope.aggregate_type == Org::aggregate_type() {
            self.apply_org_event(envelope).await
        } else if envelope.aggregate_type == User::aggregate_type() {
            self.apply_user_event(envelope).await
        } else {
            self.state.write().await.advance(envelope.position);
            Ok(())
        }
    }

    async fn position(&self) -> Position {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        self.state.write().await.clear();
        Ok(())
    }
}

impl ReadModel for MembershipsView {
    fn name(&self) -> &'static str {
        "memberships"
    }

    fn count(&self) -> usize {
        self.state
            .try_read()
            .map(|s| s.rows.values().map(|row| row.members.len()).sum())
            .unwrap_or(0)
    }
}
