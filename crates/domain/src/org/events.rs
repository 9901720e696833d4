//! Organization domain events.

use event_store::UniqueConstraint;
use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregateRef, DomainEvent};
use crate::constraints;
use crate::metadata::{MetadataRemovedData, MetadataSetData};
use crate::user::IdpLinkRef;

/// Events that can occur on an organization aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrgEvent {
    #[serde(rename = "org.added")]
    OrgAdded(OrgAddedData),

    #[serde(rename = "org.changed")]
    OrgChanged(OrgChangedData),

    #[serde(rename = "org.deactivated")]
    OrgDeactivated,

    #[serde(rename = "org.reactivated")]
    OrgReactivated,

    #[serde(rename = "org.removed")]
    OrgRemoved(OrgRemovedData),

    #[serde(rename = "org.domain.added")]
    DomainAdded(DomainData),

    #[serde(rename = "org.domain.verified")]
    DomainVerified(DomainData),

    #[serde(rename = "org.domain.primary.set")]
    DomainPrimarySet(DomainData),

    #[serde(rename = "org.domain.removed")]
    DomainRemoved(DomainRemovedData),

    #[serde(rename = "org.member.added")]
    MemberAdded(MemberData),

    #[serde(rename = "org.member.changed")]
    MemberChanged(MemberData),

    #[serde(rename = "org.member.removed")]
    MemberRemoved(MemberRemovedData),

    #[serde(rename = "org.metadata.set")]
    MetadataSet(MetadataSetData),

    #[serde(rename = "org.metadata.removed")]
    MetadataRemoved(MetadataRemovedData),
}

impl DomainEvent for OrgEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrgEvent::OrgAdded(_) => "org.added",
            OrgEvent::OrgChanged(_) => "org.changed",
            OrgEvent::OrgDeactivated => "org.deactivated",
            OrgEvent::OrgReactivated => "org.reactivated",
            OrgEvent::OrgRemoved(_) => "org.removed",
            OrgEvent::DomainAdded(_) => "org.domain.added",
            OrgEvent::DomainVerified(_) => "org.domain.verified",
            OrgEvent::DomainPrimarySet(_) => "org.domain.primary.set",
            OrgEvent::DomainRemoved(_) => "org.domain.removed",
            OrgEvent::MemberAdded(_) => "org.member.added",
            OrgEvent::MemberChanged(_) => "org.member.changed",
            OrgEvent::MemberRemoved(_) => "org.member.removed",
            OrgEvent::MetadataSet(_) => "org.metadata.set",
            OrgEvent::MetadataRemoved(_) => "org.metadata.removed",
        }
    }

    fn unique_constraints(&self, target: &AggregateRef) -> Vec<UniqueConstraint> {
        let org_id = target.id.as_str();
        match self {
            OrgEvent::OrgAdded(data) => vec![constraints::add_org_name(&data.name)],
            OrgEvent::OrgChanged(data) => vec![
                constraints::remove_org_name(&data.old_name),
                constraints::add_org_name(&data.name),
            ],
            OrgEvent::DomainVerified(data) => vec![constraints::add_org_domain(&data.domain)],
            OrgEvent::DomainRemoved(data) if data.was_verified => {
                vec![constraints::remove_org_domain(&data.domain)]
            }
            OrgEvent::MemberAdded(data) => vec![constraints::add_member(org_id, &data.user_id)],
            OrgEvent::MemberRemoved(data) => {
                vec![constraints::remove_member(org_id, &data.user_id)]
            }
            OrgEvent::OrgRemoved(data) => {
                let mut claims = vec![constraints::remove_org_name(&data.name)];
                claims.extend(data.usernames.iter().map(|username| {
                    constraints::remove_username(username, org_id, data.user_login_must_be_domain)
                }));
                claims.extend(
                    data.domains
                        .iter()
                        .map(|domain| constraints::remove_org_domain(domain)),
                );
                claims.extend(data.idp_links.iter().map(|link| {
                    constraints::remove_idp_link(&link.idp_id, &link.external_user_id)
                }));
                claims
            }
            _ => Vec::new(),
        }
    }
}

impl OrgEvent {
    pub fn added(name: impl Into<String>) -> Self {
        OrgEvent::OrgAdded(OrgAddedData { name: name.into() })
    }

    pub fn domain_added(domain: impl Into<String>) -> Self {
        OrgEvent::DomainAdded(DomainData {
            domain: domain.into(),
        })
    }

    pub fn domain_verified(domain: impl Into<String>) -> Self {
        OrgEvent::DomainVerified(DomainData {
            domain: domain.into(),
        })
    }

    pub fn domain_primary_set(domain: impl Into<String>) -> Self {
        OrgEvent::DomainPrimarySet(DomainData {
            domain: domain.into(),
        })
    }

    pub fn member_added(user_id: impl Into<String>, roles: Vec<String>) -> Self {
        OrgEvent::MemberAdded(MemberData {
            user_id: user_id.into(),
            roles,
        })
    }
}

/// Data for org.added event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrgAddedData {
    pub name: String,
}

/// Data for org.changed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrgChangedData {
    /// Name before the change, released from the name ledger.
    pub old_name: String,
    pub name: String,
}

/// Data for org.removed event.
///
/// Carries every claim the organization still holds so they are released
/// in the same push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrgRemovedData {
    pub name: String,
    /// Usernames of the organization's users.
    #[serde(default)]
    pub usernames: Vec<String>,
    #[serde(default)]
    pub user_login_must_be_domain: bool,
    /// Verified domains.
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub idp_links: Vec<IdpLinkRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainData {
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRemovedData {
    pub domain: String,
    /// Verified domains hold a claim that has to be released.
    pub was_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberData {
    pub user_id: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRemovedData {
    pub user_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::org::Org;
    use common::AggregateId;

    fn target() -> AggregateRef {
        AggregateRef::of::<Org>(AggregateId::from("org2"), AggregateId::from("org2"))
    }

    #[test]
    fn payload_type_matches_event_type() {
        let event = OrgEvent::domain_primary_set("org.tld");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
        assert_eq!(json["data"]["domain"], "org.tld");

        let json = serde_json::to_value(OrgEvent::OrgDeactivated).unwrap();
        assert_eq!(json["type"], "org.deactivated");
        let back: OrgEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, OrgEvent::OrgDeactivated);
    }

    #[test]
    fn rename_releases_old_name_before_claiming_new() {
        let event = OrgEvent::OrgChanged(OrgChangedData {
            old_name: "org".into(),
            name: "org2".into(),
        });
        let claims: Vec<String> = event
            .unique_constraints(&target())
            .iter()
            .map(|c| format!("{}{}", if c.is_add() { "+" } else { "-" }, c))
            .collect();
        assert_eq!(claims, vec!["-org-name:org", "+org-name:org2"]);
    }

    #[test]
    fn only_verified_domains_release_claims() {
        let unverified = OrgEvent::DomainRemoved(DomainRemovedData {
            domain: "a.tld".into(),
            was_verified: false,
        });
        assert!(unverified.unique_constraints(&target()).is_empty());
        assert!(
            OrgEvent::domain_added("a.tld")
                .unique_constraints(&target())
                .is_empty()
        );
    }

    #[test]
    fn member_claim_is_scoped_to_org() {
        let claims = OrgEvent::member_added("user1", vec!["ORG_OWNER".into()])
            .unique_constraints(&target());
        assert_eq!(claims[0].to_string(), "member:org2/user1");
    }

    #[test]
    fn removal_releases_all_held_claims() {
        let event = OrgEvent::OrgRemoved(OrgRemovedData {
            name: "org".into(),
            usernames: vec!["alice".into()],
            user_login_must_be_domain: true,
            domains: vec!["org.tld".into()],
            idp_links: vec![IdpLinkRef {
                idp_id: "idp1".into(),
                external_user_id: "ext1".into(),
            }],
        });
        let claims: Vec<String> = event
            .unique_constraints(&target())
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            claims,
            vec![
                "org-name:org",
                "username:org2/alice",
                "org-domain:org.tld",
                "user-idp-link:idp1/ext1",
            ]
        );
    }
}
