//! Value objects for the organization aggregate.

use serde::{Deserialize, Serialize};

/// Role granted to the creator of an organization.
pub const ORG_OWNER_ROLE: &str = "ORG_OWNER";

/// A domain registered on an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgDomain {
    pub domain: String,
    pub verified: bool,
    pub primary: bool,
}

impl OrgDomain {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            verified: false,
            primary: false,
        }
    }
}

/// Derives the domain an organization gets under the instance domain.
///
/// The name is lowercased, spaces become dashes and everything outside
/// `[a-z0-9-]` is dropped.
pub fn org_domain_for(name: &str, instance_domain: &str) -> String {
    let label: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' { '-' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect();
    format!("{label}.{instance_domain}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_domain_from_name() {
        assert_eq!(org_domain_for("Org", "tld"), "org.tld");
        assert_eq!(org_domain_for("My Org", "tld"), "my-org.tld");
        assert_eq!(org_domain_for("Acme & Co.", "example.com"), "acme--co.example.com");
        assert_eq!(org_domain_for(" Ünïcode 42 ", "tld"), "ncode-42.tld");
    }
}
