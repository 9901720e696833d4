//! Unique-constraint claims used by the identity aggregates.
//!
//! A claim is a `(namespace, key)` pair. The key shapes live here so every
//! event that adds a claim and every event that releases it agree on them.

use event_store::UniqueConstraint;

pub const ORG_NAME: &str = "org-name";
pub const ORG_DOMAIN: &str = "org-domain";
pub const MEMBER: &str = "member";
pub const USERNAME: &str = "username";
pub const USER_IDP_LINK: &str = "user-idp-link";

pub fn add_org_name(name: &str) -> UniqueConstraint {
    UniqueConstraint::add(ORG_NAME, name, "Errors.Org.AlreadyExists")
}

pub fn remove_org_name(name: &str) -> UniqueConstraint {
    UniqueConstraint::remove(ORG_NAME, name)
}

pub fn add_org_domain(domain: &str) -> UniqueConstraint {
    UniqueConstraint::add(ORG_DOMAIN, domain, "Errors.Org.Domain.AlreadyExists")
}

pub fn remove_org_domain(domain: &str) -> UniqueConstraint {
    UniqueConstraint::remove(ORG_DOMAIN, domain)
}

fn member_key(org_id: &str, user_id: &str) -> String {
    format!("{org_id}/{user_id}")
}

pub fn add_member(org_id: &str, user_id: &str) -> UniqueConstraint {
    UniqueConstraint::add(
        MEMBER,
        member_key(org_id, user_id),
        "Errors.Org.Member.AlreadyExists",
    )
}

pub fn remove_member(org_id: &str, user_id: &str) -> UniqueConstraint {
    UniqueConstraint::remove(MEMBER, member_key(org_id, user_id))
}

/// Key a username is claimed under.
///
/// Scoped to the owning organization when logins must carry the org
/// domain, global otherwise.
pub fn username_key(username: &str, resource_owner: &str, user_login_must_be_domain: bool) -> String {
    if user_login_must_be_domain {
        format!("{resource_owner}/{username}")
    } else {
        username.to_string()
    }
}

pub fn add_username(
    username: &str,
    resource_owner: &str,
    user_login_must_be_domain: bool,
) -> UniqueConstraint {
    UniqueConstraint::add(
        USERNAME,
        username_key(username, resource_owner, user_login_must_be_domain),
        "Errors.User.AlreadyExists",
    )
}

pub fn remove_username(
    username: &str,
    resource_owner: &str,
    user_login_must_be_domain: bool,
) -> UniqueConstraint {
    UniqueConstraint::remove(
        USERNAME,
        username_key(username, resource_owner, user_login_must_be_domain),
    )
}

fn idp_link_key(idp_id: &str, external_user_id: &str) -> String {
    format!("{idp_id}/{external_user_id}")
}

pub fn add_idp_link(idp_id: &str, external_user_id: &str) -> UniqueConstraint {
    UniqueConstraint::add(
        USER_IDP_LINK,
        idp_link_key(idp_id, external_user_id),
        "Errors.User.ExternalIDP.AlreadyExists",
    )
}

pub fn remove_idp_link(idp_id: &str, external_user_id: &str) -> UniqueConstraint {
    UniqueConstraint::remove(USER_IDP_LINK, idp_link_key(idp_id, external_user_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_key_depends_on_domain_policy() {
        assert_eq!(username_key("alice", "org1", true), "org1/alice");
        assert_eq!(username_key("alice", "org1", false), "alice");
    }

    #[test]
    fn add_and_remove_share_keys() {
        let added = add_member("org2", "user1");
        let removed = remove_member("org2", "user1");
        assert_eq!(added.to_string(), "member:org2/user1");
        assert_eq!(added.key, removed.key);
        assert!(added.is_add());
        assert!(!removed.is_add());
    }
}
