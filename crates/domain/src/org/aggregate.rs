//! Organization aggregate implementation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, AggregateRoot, SnapshotCapable};
use crate::error::DomainError;
use crate::metadata::{self, MetadataRemovedData, MetadataSetData};
use crate::user::IdpLinkRef;

use super::events::{
    DomainRemovedData, MemberData, MemberRemovedData, OrgChangedData, OrgRemovedData,
};
use super::{OrgDomain, OrgEvent, OrgState, org_domain_for};

/// Organization aggregate root.
///
/// Owns the organization's name, its domains, its members and its metadata.
/// Users live in their own aggregates and only reference the organization
/// through their resource owner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Org {
    root: AggregateRoot,
    name: String,
    state: OrgState,
    domains: Vec<OrgDomain>,
    /// Member roles keyed by user id.
    members: BTreeMap<String, Vec<String>>,
    metadata: BTreeMap<String, String>,
}

impl Aggregate for Org {
    type Event = OrgEvent;

    fn aggregate_type() -> &'static str {
        "org"
    }

    fn root(&self) -> &AggregateRoot {
        &self.root
    }

    fn root_mut(&mut self) -> &mut AggregateRoot {
        &mut self.root
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            OrgEvent::OrgAdded(data) => {
                self.name = data.name;
                self.state = OrgState::Active;
            }
            OrgEvent::OrgChanged(data) => self.name = data.name,
            OrgEvent::OrgDeactivated => self.state = OrgState::Inactive,
            OrgEvent::OrgReactivated => self.state = OrgState::Active,
            OrgEvent::OrgRemoved(_) => self.state = OrgState::Removed,
            OrgEvent::DomainAdded(data) => self.domains.push(OrgDomain::new(data.domain)),
            OrgEvent::DomainVerified(data) => {
                if let Some(domain) = self.domain_mut(&data.domain) {
                    domain.verified = true;
                }
            }
            OrgEvent::DomainPrimarySet(data) => self.apply_primary_domain(&data.domain),
            OrgEvent::DomainRemoved(data) => self.domains.retain(|d| d.domain != data.domain),
            OrgEvent::MemberAdded(data) | OrgEvent::MemberChanged(data) => {
                self.members.insert(data.user_id, data.roles);
            }
            OrgEvent::MemberRemoved(data) => {
                self.members.remove(&data.user_id);
            }
            OrgEvent::MetadataSet(data) => {
                self.metadata.insert(data.key, data.value);
            }
            OrgEvent::MetadataRemoved(data) => {
                self.metadata.remove(&data.key);
            }
        }
    }

    fn exists(&self) -> bool {
        self.state.exists()
    }
}

impl SnapshotCapable for Org {
    fn snapshot_interval() -> usize {
        50
    }
}

// Query methods
impl Org {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> OrgState {
        self.state
    }

    pub fn domains(&self) -> &[OrgDomain] {
        &self.domains
    }

    pub fn domain(&self, domain: &str) -> Option<&OrgDomain> {
        self.domains.iter().find(|d| d.domain == domain)
    }

    pub fn primary_domain(&self) -> Option<&str> {
        self.domains
            .iter()
            .find(|d| d.primary)
            .map(|d| d.domain.as_str())
    }

    /// Domains holding a claim in the domain ledger.
    pub fn verified_domains(&self) -> impl Iterator<Item = &str> {
        self.domains
            .iter()
            .filter(|d| d.verified)
            .map(|d| d.domain.as_str())
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.contains_key(user_id)
    }

    pub fn member_roles(&self, user_id: &str) -> Option<&[String]> {
        self.members.get(user_id).map(Vec::as_slice)
    }

    pub fn members(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.members
            .iter()
            .map(|(user, roles)| (user.as_str(), roles.as_slice()))
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

// Command methods
impl Org {
    /// Creates the organization together with its derived, verified,
    /// primary domain.
    pub fn add(&self, name: &str, instance_domain: &str) -> Result<Vec<OrgEvent>, DomainError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::invalid_argument(
                "ORG-mruNY",
                "Errors.Invalid.Argument",
            ));
        }
        if self.state != OrgState::Unspecified {
            return Err(DomainError::already_exists(
                "ORG-Bv8Ms",
                "Errors.Org.AlreadyExisting",
            ));
        }

        let domain = org_domain_for(name, instance_domain);
        Ok(vec![
            OrgEvent::added(name),
            OrgEvent::domain_added(domain.clone()),
            OrgEvent::domain_verified(domain.clone()),
            OrgEvent::domain_primary_set(domain),
        ])
    }

    /// Renames the organization and moves its derived domain along.
    ///
    /// The derived domain is only replaced when the old one is still
    /// registered; primary status follows it.
    pub fn change_name(
        &self,
        name: &str,
        instance_domain: &str,
    ) -> Result<Vec<OrgEvent>, DomainError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::invalid_argument("ORG-BwR9a", "Errors.Org.Invalid"));
        }
        self.ensure_exists()?;
        if self.name == name {
            return Err(DomainError::precondition_failed(
                "ORG-4VSdf",
                "Errors.Org.NotChanged",
            ));
        }

        let mut events = vec![OrgEvent::OrgChanged(OrgChangedData {
            old_name: self.name.clone(),
            name: name.to_string(),
        })];

        let old_domain = org_domain_for(&self.name, instance_domain);
        let new_domain = org_domain_for(name, instance_domain);
        if old_domain == new_domain || self.domain(&new_domain).is_some() {
            return Ok(events);
        }

        events.push(OrgEvent::domain_added(new_domain.clone()));
        events.push(OrgEvent::domain_verified(new_domain.clone()));
        if let Some(old) = self.domain(&old_domain) {
            if old.primary {
                events.push(OrgEvent::domain_primary_set(new_domain));
            }
            events.push(OrgEvent::DomainRemoved(DomainRemovedData {
                domain: old_domain,
                was_verified: old.verified,
            }));
        }
        Ok(events)
    }

    pub fn deactivate(&self) -> Result<Vec<OrgEvent>, DomainError> {
        self.ensure_exists()?;
        if !self.state.can_deactivate() {
            return Err(DomainError::precondition_failed(
                "ORG-Dbs2g",
                "Errors.Org.AlreadyDeactivated",
            ));
        }
        Ok(vec![OrgEvent::OrgDeactivated])
    }

    pub fn reactivate(&self) -> Result<Vec<OrgEvent>, DomainError> {
        self.ensure_exists()?;
        if !self.state.can_reactivate() {
            return Err(DomainError::precondition_failed(
                "ORG-bfnrh",
                "Errors.Org.NotInactive",
            ));
        }
        Ok(vec![OrgEvent::OrgReactivated])
    }

    /// Removes the organization, releasing its name, its verified domains
    /// and the usernames and IdP links of its users.
    pub fn remove(
        &self,
        usernames: Vec<String>,
        user_login_must_be_domain: bool,
        idp_links: Vec<IdpLinkRef>,
    ) -> Result<Vec<OrgEvent>, DomainError> {
        self.ensure_exists()?;
        Ok(vec![OrgEvent::OrgRemoved(OrgRemovedData {
            name: self.name.clone(),
            usernames,
            user_login_must_be_domain,
            domains: self.verified_domains().map(str::to_string).collect(),
            idp_links,
        })])
    }

    pub fn add_domain(&self, domain: &str) -> Result<Vec<OrgEvent>, DomainError> {
        let domain = domain.trim();
        if domain.is_empty() {
            return Err(DomainError::invalid_argument(
                "ORG-R24hb",
                "Errors.Org.Domain.Invalid",
            ));
        }
        self.ensure_exists()?;
        if self.domain(domain).is_some() {
            return Err(DomainError::already_exists(
                "ORG-i2Krv",
                "Errors.Org.Domain.AlreadyExists",
            ));
        }
        Ok(vec![OrgEvent::domain_added(domain)])
    }

    pub fn verify_domain(&self, domain: &str) -> Result<Vec<OrgEvent>, DomainError> {
        let existing = self.existing_domain(domain)?;
        if existing.verified {
            return Err(DomainError::precondition_failed(
                "ORG-yKD5w",
                "Errors.Org.Domain.AlreadyVerified",
            ));
        }
        Ok(vec![OrgEvent::domain_verified(domain)])
    }

    pub fn set_primary_domain(&self, domain: &str) -> Result<Vec<OrgEvent>, DomainError> {
        let existing = self.existing_domain(domain)?;
        if !existing.verified {
            return Err(DomainError::precondition_failed(
                "ORG-Ggd32",
                "Errors.Org.Domain.NotVerified",
            ));
        }
        if existing.primary {
            return Err(DomainError::precondition_failed(
                "ORG-2Ofx7",
                "Errors.Org.Domain.AlreadyPrimary",
            ));
        }
        Ok(vec![OrgEvent::domain_primary_set(domain)])
    }

    pub fn remove_domain(&self, domain: &str) -> Result<Vec<OrgEvent>, DomainError> {
        let existing = self.existing_domain(domain)?;
        if existing.primary {
            return Err(DomainError::precondition_failed(
                "ORG-Sjdi4",
                "Errors.Org.PrimaryDomainNotDeletable",
            ));
        }
        Ok(vec![OrgEvent::DomainRemoved(DomainRemovedData {
            domain: existing.domain.clone(),
            was_verified: existing.verified,
        })])
    }

    pub fn add_member(&self, user_id: &str, roles: Vec<String>) -> Result<Vec<OrgEvent>, DomainError> {
        validate_member(user_id, &roles)?;
        self.ensure_exists()?;
        if self.is_member(user_id) {
            return Err(DomainError::already_exists(
                "Org-PtXi1",
                "Errors.Org.Member.AlreadyExists",
            ));
        }
        Ok(vec![OrgEvent::member_added(user_id, roles)])
    }

    pub fn change_member(
        &self,
        user_id: &str,
        roles: Vec<String>,
    ) -> Result<Vec<OrgEvent>, DomainError> {
        validate_member(user_id, &roles)?;
        let current = self.existing_member(user_id)?;
        if current == roles.as_slice() {
            return Err(DomainError::precondition_failed(
                "Org-LiaZi",
                "Errors.Org.Member.RolesNotChanged",
            ));
        }
        Ok(vec![OrgEvent::MemberChanged(MemberData {
            user_id: user_id.to_string(),
            roles,
        })])
    }

    pub fn remove_member(&self, user_id: &str) -> Result<Vec<OrgEvent>, DomainError> {
        self.existing_member(user_id)?;
        Ok(vec![OrgEvent::MemberRemoved(MemberRemovedData {
            user_id: user_id.to_string(),
        })])
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<Vec<OrgEvent>, DomainError> {
        metadata::check_set(&self.metadata, key, value)?;
        self.ensure_exists()?;
        Ok(vec![OrgEvent::MetadataSet(MetadataSetData {
            key: key.to_string(),
            value: value.to_string(),
        })])
    }

    pub fn remove_metadata(&self, key: &str) -> Result<Vec<OrgEvent>, DomainError> {
        self.ensure_exists()?;
        metadata::check_remove(&self.metadata, key)?;
        Ok(vec![OrgEvent::MetadataRemoved(MetadataRemovedData {
            key: key.to_string(),
        })])
    }

    fn ensure_exists(&self) -> Result<(), DomainError> {
        if self.state.exists() {
            Ok(())
        } else {
            Err(DomainError::not_found("ORG-1MRds", "Errors.Org.NotFound"))
        }
    }

    fn existing_domain(&self, domain: &str) -> Result<&OrgDomain, DomainError> {
        self.ensure_exists()?;
        self.domain(domain.trim())
            .ok_or_else(|| DomainError::not_found("ORG-Sjdi3", "Errors.Org.Domain.NotFound"))
    }

    fn existing_member(&self, user_id: &str) -> Result<&[String], DomainError> {
        self.ensure_exists()?;
        self.member_roles(user_id)
            .ok_or_else(|| DomainError::not_found("Org-D8JxR", "Errors.Org.Member.NotFound"))
    }
}

// Apply event helpers
impl Org {
    fn domain_mut(&mut self, domain: &str) -> Option<&mut OrgDomain> {
        self.domains.iter_mut().find(|d| d.domain == domain)
    }

    fn apply_primary_domain(&mut self, domain: &str) {
        for existing in &mut self.domains {
            existing.primary = existing.domain == domain;
        }
    }
}

fn validate_member(user_id: &str, roles: &[String]) -> Result<(), DomainError> {
    if user_id.trim().is_empty() || roles.is_empty() {
        return Err(DomainError::invalid_argument(
            "Org-4Mlfs",
            "Errors.Org.MemberInvalid",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::org::ORG_OWNER_ROLE;

    fn active_org(name: &str) -> Org {
        let mut org = Org::default();
        let events = org.add(name, "tld").unwrap();
        org.apply_events(events);
        org
    }

    #[test]
    fn add_creates_verified_primary_domain() {
        let org = active_org(" Org ");

        assert_eq!(org.name(), "Org");
        assert_eq!(org.state(), OrgState::Active);
        assert_eq!(org.primary_domain(), Some("org.tld"));
        assert_eq!(org.verified_domains().collect::<Vec<_>>(), vec!["org.tld"]);
    }

    #[test]
    fn add_rejects_blank_name() {
        let err = Org::default().add("  ", "tld").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.id(), "ORG-mruNY");
        assert_eq!(err.message_key(), "Errors.Invalid.Argument");
    }

    #[test]
    fn change_name_moves_primary_domain() {
        let org = active_org("org");

        let events = org.change_name("org2", "tld").unwrap();
        let types: Vec<&str> = events
            .iter()
            .map(crate::aggregate::DomainEvent::event_type)
            .collect();
        assert_eq!(
            types,
            vec![
                "org.changed",
                "org.domain.added",
                "org.domain.verified",
                "org.domain.primary.set",
                "org.domain.removed",
            ]
        );
        assert!(matches!(
            &events[4],
            OrgEvent::DomainRemoved(data) if data.domain == "org.tld" && data.was_verified
        ));

        let mut changed = org.clone();
        changed.apply_events(events);
        assert_eq!(changed.primary_domain(), Some("org2.tld"));
        assert!(changed.domain("org.tld").is_none());
    }

    #[test]
    fn change_name_to_same_trimmed_name_fails() {
        let org = active_org("org");
        let err = org.change_name(" org ", "tld").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    }

    #[test]
    fn change_name_of_missing_org_fails() {
        let err = Org::default().change_name("org", "tld").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(
            Org::default().change_name("", "tld").unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn change_name_with_same_derived_domain_only_renames() {
        let org = active_org("org");
        let events = org.change_name("ORG", "tld").unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn deactivate_twice_fails() {
        let mut org = active_org("org");
        org.apply_events(org.deactivate().unwrap());
        assert_eq!(org.state(), OrgState::Inactive);

        let err = org.deactivate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        org.apply_events(org.reactivate().unwrap());
        assert_eq!(
            org.reactivate().unwrap_err().kind(),
            ErrorKind::PreconditionFailed
        );
    }

    #[test]
    fn removed_org_no_longer_exists() {
        let mut org = active_org("org");
        let events = org.remove(vec!["alice".into()], false, vec![]).unwrap();
        assert!(matches!(
            &events[0],
            OrgEvent::OrgRemoved(data) if data.domains == vec!["org.tld".to_string()]
        ));
        org.apply_events(events);

        assert!(!org.exists());
        assert_eq!(org.deactivate().unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn primary_domain_cannot_be_removed() {
        let org = active_org("org");
        let err = org.remove_domain("org.tld").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    }

    #[test]
    fn domain_lifecycle() {
        let mut org = active_org("org");
        org.apply_events(org.add_domain("acme.com").unwrap());
        assert_eq!(
            org.set_primary_domain("acme.com").unwrap_err().kind(),
            ErrorKind::PreconditionFailed
        );
        org.apply_events(org.verify_domain("acme.com").unwrap());
        org.apply_events(org.set_primary_domain("acme.com").unwrap());
        assert_eq!(org.primary_domain(), Some("acme.com"));

        let events = org.remove_domain("org.tld").unwrap();
        org.apply_events(events);
        assert_eq!(org.domains().len(), 1);
        assert_eq!(
            org.add_domain("acme.com").unwrap_err().kind(),
            ErrorKind::AlreadyExists
        );
    }

    #[test]
    fn member_lifecycle() {
        let mut org = active_org("org");
        org.apply_events(
            org.add_member("user1", vec![ORG_OWNER_ROLE.to_string()])
                .unwrap(),
        );
        assert!(org.is_member("user1"));
        assert_eq!(
            org.add_member("user1", vec!["ORG_USER".into()])
                .unwrap_err()
                .kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            org.change_member("user1", vec![ORG_OWNER_ROLE.to_string()])
                .unwrap_err()
                .kind(),
            ErrorKind::PreconditionFailed
        );

        org.apply_events(org.remove_member("user1").unwrap());
        assert!(!org.is_member("user1"));
        assert_eq!(
            org.remove_member("user1").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            org.add_member("user2", vec![]).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn metadata_set_and_remove() {
        let mut org = active_org("org");
        org.apply_events(org.set_metadata("GRANTED_ORGS", "org2,org3").unwrap());
        assert_eq!(org.metadata("GRANTED_ORGS"), Some("org2,org3"));

        org.apply_events(org.remove_metadata("GRANTED_ORGS").unwrap());
        assert_eq!(org.metadata("GRANTED_ORGS"), None);
    }
}
