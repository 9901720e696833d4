//! Organization aggregate and related types.

mod aggregate;
mod events;
mod state;
mod value_objects;

pub use aggregate::Org;
pub use events::{
    DomainData, DomainRemovedData, MemberData, MemberRemovedData, OrgAddedData, OrgChangedData,
    OrgEvent, OrgRemovedData,
};
pub use state::OrgState;
pub use value_objects::{ORG_OWNER_ROLE, OrgDomain, org_domain_for};
