//! Users read model.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::user::{IdpLinkRef, UserType};
use domain::{Aggregate, Org, OrgEvent, User, UserEvent, UserState};
use event_store::{EventEnvelope, Position, Version};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ReadModel, Row, Table};
use crate::search::{self, SearchQuery, SearchRequest, SearchResult, Searchable};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRow {
    pub id: String,
    pub resource_owner: String,
    pub user_type: UserType,
    pub username: String,
    pub user_login_must_be_domain: bool,
    pub state: UserState,
    /// Empty for machine users.
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    pub preferred_language: Option<String>,
    pub email: String,
    pub email_verified: bool,
    pub idp_links: Vec<IdpLinkRef>,
    pub metadata: BTreeMap<String, String>,
    pub creation_date: DateTime<Utc>,
    pub change_date: DateTime<Utc>,
    pub sequence: Version,
}

impl UserRow {
    pub fn is_human(&self) -> bool {
        self.user_type == UserType::Human
    }
}

impl Row for UserRow {
    fn sequence(&self) -> Version {
        self.sequence
    }
}

/// Columns users can be searched and sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserColumn {
    Id,
    ResourceOwner,
    Username,
    UserType,
    State,
    FirstName,
    LastName,
    DisplayName,
    Email,
}

impl Searchable<UserColumn> for UserRow {
    fn key(&self) -> &str {
        &self.id
    }

    fn column(&self, column: UserColumn) -> Cow<'_, str> {
        let value: &str = match column {
            UserColumn::Id => &self.id,
            UserColumn::ResourceOwner => &self.resource_owner,
            UserColumn::Username => &self.username,
            UserColumn::UserType => self.user_type.as_str(),
            UserColumn::State => self.state.as_str(),
            UserColumn::FirstName => &self.first_name,
            UserColumn::LastName => &self.last_name,
            UserColumn::DisplayName => &self.display_name,
            UserColumn::Email => &self.email,
        };
        Cow::Borrowed(value)
    }
}

/// Read model of human and machine users.
///
/// Removed users are kept as tombstones and skipped by lookups.
#[derive(Clone, Default)]
pub struct UsersView {
    state: Arc<RwLock<Table<UserRow>>>,
}

impl UsersView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, user_id: &str) -> Option<UserRow> {
        self.state
            .read()
            .await
            .rows
            .get(user_id)
            .filter(|row| row.state.exists())
            .cloned()
    }

    /// Live users matching `filter`, in no particular order.
    pub async fn find(&self, filter: impl Fn(&UserRow) -> bool) -> Vec<UserRow> {
        self.state
            .read()
            .await
            .rows
            .values()
            .filter(|row| row.state.exists() && filter(row))
            .cloned()
            .collect()
    }

    /// Searches live users that also pass `filter`.
    pub async fn search(
        &self,
        queries: &[SearchQuery<UserColumn>],
        request: &SearchRequest<UserColumn>,
        filter: impl Fn(&UserRow) -> bool,
    ) -> SearchResult<UserRow> {
        let table = self.state.read().await;
        let live = table
            .rows
            .values()
            .filter(|row| row.state.exists() && filter(row));
        search::search(live, queries, request, table.position)
    }

    async fn apply_user_event(&self, envelope: &EventEnvelope) -> Result<()> {
        let mut table = self.state.write().await;
        if !table.is_applied(envelope) {
            let event: UserEvent = envelope.payload_as()?;
            let id = envelope.aggregate_id.to_string();
            match event {
                UserEvent::HumanAdded(data) => {
                    let mut row = new_row(envelope, UserType::Human, data.username);
                    row.user_login_must_be_domain = data.user_login_must_be_domain;
                    row.first_name = data.first_name;
                    row.last_name = data.last_name;
                    row.display_name = data.display_name;
                    row.preferred_language = data.preferred_language;
                    row.email = data.email;
                    table.rows.insert(id, row);
                }
                UserEvent::MachineAdded(data) => {
                    let mut row = new_row(envelope, UserType::Machine, data.username);
                    row.user_login_must_be_domain = data.user_login_must_be_domain;
                    row.display_name = data.name;
                    table.rows.insert(id, row);
                }
                event => {
                    if let Some(row) = table.rows.get_mut(&id) {
                        apply(row, event);
                        row.change_date = envelope.timestamp;
                        row.sequence = envelope.version;
                    }
                }
            }
        }
        table.advance(envelope.position);
        Ok(())
    }

    /// Removing an organization removes its users with it.
    async fn apply_org_event(&self, envelope: &EventEnvelope) -> Result<()> {
        let mut table = self.state.write().await;
        let event: OrgEvent = envelope.payload_as()?;
        if let OrgEvent::OrgRemoved(_) = event {
            let org_id = envelope.aggregate_id.as_str();
            for row in table.rows.values_mut() {
                if row.resource_owner == org_id {
                    row.state = UserState::Removed;
                    row.change_date = envelope.timestamp;
                }
            }
        }
        table.advance(envelope.position);
        Ok(())
    }
}

fn new_row(envelope: &EventEnvelope, user_type: UserType, username: String) -> UserRow {
    UserRow {
        id: envelope.aggregate_id.to_string(),
        resource_owner: envelope.resource_owner.to_string(),
        user_type,
        username,
        user_login_must_be_domain: false,
        state: UserState::Active,
        first_name: String::new(),
        last_name: String::new(),
        display_name: String::new(),
        preferred_language: None,
        email: String::new(),
        email_verified: false,
        idp_links: Vec::new(),
        metadata: BTreeMap::new(),
        creation_date: envelope.timestamp,
        change_date: envelope.timestamp,
        sequence: envelope.version,
    }
}

fn apply(row: &mut UserRow, event: UserEvent) {
    match event {
        UserEvent::UsernameChanged(data) => row.username = data.username,
        UserEvent::HumanEmailChanged(data) => {
            row.email = data.email;
            row.email_verified = false;
        }
        UserEvent::HumanEmailVerified => row.email_verified = true,
        UserEvent::HumanInitialCodeAdded(_) => row.state = UserState::Initial,
        UserEvent::HumanInitializedCheckSucceeded
        | UserEvent::UserReactivated
        | UserEvent::UserUnlocked => row.state = UserState::Active,
        UserEvent::UserDeactivated => row.state = UserState::Inactive,
        UserEvent::UserLocked => row.state = UserState::Locked,
        UserEvent::UserRemoved(_) => row.state = UserState::Removed,
        UserEvent::IdpLinkAdded(data) => row.idp_links.push(IdpLinkRef {
            idp_id: data.idp_id,
            external_user_id: data.external_user_id,
        }),
        UserEvent::IdpLinkRemoved(link) => row.idp_links.retain(|l| *l != link),
        UserEvent::MetadataSet(data) => {
            row.metadata.insert(data.key, data.value);
        }
        UserEvent::MetadataRemoved(data) => {
            row.metadata.remove(&data.key);
        }
        _ => {}
    }
}

#[async_trait]
impl Projection for UsersView {
    fn name(&self) -> &'static str {
        "users"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        if envelope.aggregate_type == User::aggregate_type() {
            self.apply_user_event(envelope).await
        } else if envelope.aggregate_type == Org::aggregate_type() {
            self.apply_org_event(envelope).await
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

impl ReadModel for UsersView {
    fn name(&self) -> &'static str {
        "users"
    }

    fn count(&self) -> usize {
        self.state
            .try_read()
            .map(|s| s.rows.values().filter(|row| row.state.exists()).count())
            .unwrap_or(0)
    }
}
