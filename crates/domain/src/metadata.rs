//! Key/value metadata shared by organizations and users.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Data for the metadata set events of organizations and users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataSetData {
    pub key: String,
    pub value: String,
}

/// Data for the metadata removed events of organizations and users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRemovedData {
    pub key: String,
}

/// User metadata key that marks a user as privileged for login-as.
pub const LOGIN_AS: &str = "LOGIN_AS";

/// Org metadata key listing, comma separated, the orgs whose users may be
/// impersonated from it.
pub const GRANTED_ORGS: &str = "GRANTED_ORGS";

/// Returns true if a `LOGIN_AS` value switches the flag on.
pub fn login_as_enabled(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case("ON"))
}

/// Splits a `GRANTED_ORGS` value into org ids.
pub fn parse_granted_org_ids(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// Checks that `key` may be set to `value`.
pub fn check_set(current: &BTreeMap<String, String>, key: &str, value: &str) -> Result<(), DomainError> {
    if key.trim().is_empty() || value.is_empty() {
        return Err(DomainError::invalid_argument(
            "META-2m00f",
            "Errors.Metadata.Invalid",
        ));
    }
    if current.get(key).is_some_and(|existing| existing == value) {
        return Err(DomainError::precondition_failed(
            "META-Lf9dF",
            "Errors.Metadata.NotChanged",
        ));
    }
    Ok(())
}

/// Checks that `key` is present and can be removed.
pub fn check_remove(current: &BTreeMap<String, String>, key: &str) -> Result<(), DomainError> {
    if key.trim().is_empty() {
        return Err(DomainError::invalid_argument(
            "META-2n0fs",
            "Errors.Metadata.Invalid",
        ));
    }
    if !current.contains_key(key) {
        return Err(DomainError::not_found("META-ekw1n", "Errors.Metadata.NotFound"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn unchanged_value_is_rejected() {
        let mut current = BTreeMap::new();
        current.insert("LOGIN_AS".to_string(), "ON".to_string());

        assert!(check_set(&current, "LOGIN_AS", "OFF").is_ok());
        assert_eq!(
            check_set(&current, "LOGIN_AS", "ON").unwrap_err().kind(),
            ErrorKind::PreconditionFailed
        );
        assert_eq!(
            check_set(&current, " ", "x").unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn granted_orgs_are_trimmed() {
        assert_eq!(parse_granted_org_ids(" org2, ,org3 "), vec!["org2", "org3"]);
        assert!(parse_granted_org_ids("").is_empty());
    }

    #[test]
    fn login_as_flag_is_case_insensitive() {
        assert!(login_as_enabled(Some("on")));
        assert!(!login_as_enabled(Some("OFF")));
        assert!(!login_as_enabled(None));
    }

    #[test]
    fn removing_unknown_key_is_not_found() {
        let current = BTreeMap::new();
        assert_eq!(
            check_remove(&current, "GRANTED_ORGS").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }
}
