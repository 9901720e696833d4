//! Lookups and searches served from the read models.

use std::collections::BTreeSet;

use domain::metadata::{self, GRANTED_ORGS, LOGIN_AS};
use domain::{AuthRequest, UserState};

use crate::search::{SearchQuery, SearchRequest, SearchResult, TextMethod};
use crate::views::{
    Membership, OrgColumn, OrgDomainsRow, OrgRow, PublicKeyRow, ReadModels, UserColumn, UserRow,
};

/// Page size of the login-as user picker.
pub const LOGIN_AS_PAGE_SIZE: usize = 10;

/// Upper bound of [`Queries::login_names`].
pub const LOGIN_NAMES_LIMIT: usize = 1000;

/// Read-only query surface over [`ReadModels`].
///
/// Results are eventually consistent: they reflect the log up to the
/// position each view has processed.
#[derive(Clone, Default)]
pub struct Queries {
    models: ReadModels,
}

impl Queries {
    pub fn new(models: ReadModels) -> Self {
        Self { models }
    }

    pub fn models(&self) -> &ReadModels {
        &self.models
    }

    pub async fn org_by_id(&self, org_id: &str) -> Option<OrgRow> {
        self.models.orgs.get(org_id).await
    }

    /// The organization that verified `domain`.
    pub async fn org_by_domain(&self, domain: &str) -> Option<OrgRow> {
        let org_id = self.models.org_domains.owner_of(domain).await?;
        self.models.orgs.get(&org_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn search_orgs(
        &self,
        queries: &[SearchQuery<OrgColumn>],
        request: &SearchRequest<OrgColumn>,
    ) -> SearchResult<OrgRow> {
        self.models.orgs.search(queries, request).await
    }

    pub async fn org_domains(&self, org_id: &str) -> Option<OrgDomainsRow> {
        self.models.org_domains.domains_of(org_id).await
    }

    pub async fn org_metadata_by_key(&self, org_id: &str, key: &str) -> Option<String> {
        self.org_by_id(org_id).await?.metadata.get(key).cloned()
    }

    /// Orgs listed in the `GRANTED_ORGS` metadata of `org_id`.
    pub async fn org_granted_org_ids(&self, org_id: &str) -> Vec<String> {
        self.org_metadata_by_key(org_id, GRANTED_ORGS)
            .await
            .map(|value| metadata::parse_granted_org_ids(&value))
            .unwrap_or_default()
    }

    pub async fn user_by_id(&self, user_id: &str) -> Option<UserRow> {
        self.models.users.get(user_id).await
    }

    /// Resolves a login name, compared case-insensitively.
    ///
    /// Users whose org scopes logins to its domains are found by
    /// `username@domain` for every verified domain of the org, all others
    /// by their bare username.
    #[tracing::instrument(skip(self))]
    pub async fn user_by_login_name(&self, login_name: &str) -> Option<UserRow> {
        let wanted = login_name.trim().to_lowercase();
        let candidates = self
            .models
            .users
            .find(|row| {
                let username = row.username.to_lowercase();
                wanted == username || wanted.starts_with(&format!("{username}@"))
            })
            .await;

        for user in candidates {
            let names = self.login_names_of(&user).await;
            if names.iter().any(|name| name.to_lowercase() == wanted) {
                return Some(user);
            }
        }
        None
    }

    #[tracing::instrument(skip(self))]
    pub async fn search_users(
        &self,
        queries: &[SearchQuery<UserColumn>],
        request: &SearchRequest<UserColumn>,
    ) -> SearchResult<UserRow> {
        self.models.users.search(queries, request, |_| true).await
    }

    pub async fn users_of_org(&self, org_id: &str) -> Vec<UserRow> {
        let mut users = self
            .models
            .users
            .find(|row| row.resource_owner == org_id)
            .await;
        users.sort_by(|a, b| a.username.cmp(&b.username));
        users
    }

    pub async fn user_metadata_by_key(&self, user_id: &str, key: &str) -> Option<String> {
        self.user_by_id(user_id).await?.metadata.get(key).cloned()
    }

    pub async fn memberships(&self, user_id: &str) -> Vec<Membership> {
        self.models.memberships.of_user(user_id).await
    }

    /// Distinct roles the user holds across all memberships.
    pub async fn user_roles(&self, user_id: &str) -> Vec<String> {
        self.memberships(user_id)
            .await
            .into_iter()
            .flat_map(|membership| membership.roles)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// True if the user holds no membership role and has not switched on
    /// the `LOGIN_AS` flag.
    pub async fn is_user_without_privileges(&self, user_id: &str) -> bool {
        if !self.user_roles(user_id).await.is_empty() {
            return false;
        }
        let flag = self.user_metadata_by_key(user_id, LOGIN_AS).await;
        !metadata::login_as_enabled(flag.as_deref())
    }

    /// One page of the users an operator may act as.
    ///
    /// Humans that are not inactive and hold no membership. With an org,
    /// the page is limited to users of that org and of the orgs it lists in
    /// `GRANTED_ORGS`. A non-empty `search` matches display name or email.
    /// Sorted by username.
    #[tracing::instrument(skip(self))]
    pub async fn search_users_for_login_as(
        &self,
        org_id: &str,
        search: &str,
        page: usize,
    ) -> SearchResult<UserRow> {
        let members = self.models.memberships.member_ids().await;
        let allowed_orgs: Option<Vec<String>> = if org_id.is_empty() {
            None
        } else {
            let mut orgs = self.org_granted_org_ids(org_id).await;
            orgs.push(org_id.to_string());
            Some(orgs)
        };

        let mut queries = Vec::new();
        let search = search.trim();
        if !search.is_empty() {
            queries.push(SearchQuery::Or(vec![
                SearchQuery::text(UserColumn::DisplayName, TextMethod::ContainsIgnoreCase, search),
                SearchQuery::text(UserColumn::Email, TextMethod::ContainsIgnoreCase, search),
            ]));
        }
        let request = SearchRequest::page(page * LOGIN_AS_PAGE_SIZE, LOGIN_AS_PAGE_SIZE)
            .sorted_by(UserColumn::Username, true);

        self.models
            .users
            .search(&queries, &request, |row| {
                row.is_human()
                    && row.state != UserState::Inactive
                    && !members.contains(&row.id)
                    && allowed_orgs
                        .as_ref()
                        .is_none_or(|orgs| orgs.contains(&row.resource_owner))
            })
            .await
    }

    /// Login names of the org's unprivileged humans, as shown by the
    /// login-as picker: the preferred login name, followed by the email when
    /// it is verified.
    pub async fn login_names(&self, org_id: &str) -> Vec<String> {
        let mut names = Vec::new();
        for user in self.users_of_org(org_id).await {
            if !user.is_human() || !self.is_user_without_privileges(&user.id).await {
                continue;
            }
            let mut parts = vec![self.preferred_login_name(&user).await];
            if user.email_verified && !user.email.is_empty() {
                parts.push(user.email.clone());
            }
            names.push(parts.join(" / "));
        }
        names.sort();
        names.truncate(LOGIN_NAMES_LIMIT);
        names
    }

    /// `username@primary domain` when the org scopes logins to its
    /// domains, otherwise the bare username.
    pub async fn preferred_login_name(&self, user: &UserRow) -> String {
        if !user.user_login_must_be_domain {
            return user.username.clone();
        }
        match self.org_domains(&user.resource_owner).await {
            Some(domains) => match domains.primary() {
                Some(primary) => format!("{}@{primary}", user.username),
                None => user.username.clone(),
            },
            None => user.username.clone(),
        }
    }

    async fn login_names_of(&self, user: &UserRow) -> Vec<String> {
        if !user.user_login_must_be_domain {
            return vec![user.username.clone()];
        }
        self.org_domains(&user.resource_owner)
            .await
            .map(|domains| {
                domains
                    .verified()
                    .map(|domain| format!("{}@{domain}", user.username))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn auth_request_by_id(&self, id: &str) -> Option<AuthRequest> {
        self.models.auth_requests.get(id).await
    }

    pub async fn public_key_by_id(&self, key_id: &str) -> Option<PublicKeyRow> {
        self.models.keys.get(key_id).await
    }
}
