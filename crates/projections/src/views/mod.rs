//! Read model views for the query side.

pub mod auth_requests;
pub mod keys;
pub mod memberships;
pub mod org_domains;
pub mod orgs;
pub mod users;

pub use auth_requests::AuthRequestsView;
pub use keys::{KeysView, PublicKeyRow};
pub use memberships::{Membership, MembershipsView};
pub use org_domains::{OrgDomainsRow, OrgDomainsView};
pub use orgs::{OrgColumn, OrgRow, OrgsView};
pub use users::{UserColumn, UserRow, UsersView};

use crate::projection::Projection;

/// Every view of the query side, sharing state with the clones handed to
/// the processor.
#[derive(Clone, Default)]
pub struct ReadModels {
    pub orgs: OrgsView,
    pub org_domains: OrgDomainsView,
    pub users: UsersView,
    pub memberships: MembershipsView,
    pub auth_requests: AuthRequestsView,
    pub keys: KeysView,
}

impl ReadModels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn projections(&self) -> Vec<Box<dyn Projection>> {
        vec![
            Box::new(self.orgs.clone()),
            Box::new(self.org_domains.clone()),
            Box::new(self.users.clone()),
            Box::new(self.memberships.clone()),
            Box::new(self.auth_requests.clone()),
            Box::new(self.keys.clone()),
        ]
    }
}
