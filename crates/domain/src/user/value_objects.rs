//! Value objects for the user aggregate.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Human,
    Machine,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Human => "human",
            UserType::Machine => "machine",
        }
    }
}

/// Personal data of a human user.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Profile {
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    #[serde(default)]
    pub preferred_language: Option<String>,
}

impl Profile {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            display_name: String::new(),
            preferred_language: None,
        }
    }

    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Trims the names and fills in a missing display name.
    pub(crate) fn normalized(self) -> Result<Self, DomainError> {
        let first_name = self.first_name.trim().to_string();
        let last_name = self.last_name.trim().to_string();
        if first_name.is_empty() || last_name.is_empty() {
            return Err(DomainError::invalid_argument(
                "USER-UCej2",
                "Errors.User.Profile.Invalid",
            ));
        }
        let display_name = match self.display_name.trim() {
            "" => format!("{first_name} {last_name}"),
            name => name.to_string(),
        };
        Ok(Self {
            first_name,
            last_name,
            display_name,
            preferred_language: self.preferred_language,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Email {
    pub address: String,
    pub verified: bool,
}

/// Checks the shape of an email address and returns it trimmed.
pub fn validate_email(address: &str) -> Result<String, DomainError> {
    let address = address.trim();
    let valid = match address.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !address.contains(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(address.to_string())
    } else {
        Err(DomainError::invalid_argument(
            "EMAIL-599BI",
            "Errors.User.Email.Invalid",
        ))
    }
}

/// Name and description of a machine user.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MachineProfile {
    pub name: String,
    pub description: String,
}

/// A pending initialization code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitCode {
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expiry_secs: u64,
}

impl InitCode {
    pub fn new(code: impl Into<String>, created_at: DateTime<Utc>, expiry_secs: u64) -> Self {
        Self {
            code: code.into(),
            created_at,
            expiry_secs,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let Some(ttl) = i64::try_from(self.expiry_secs)
            .ok()
            .and_then(Duration::try_seconds)
        else {
            return false;
        };
        self.created_at
            .checked_add_signed(ttl)
            .is_some_and(|expires_at| now > expires_at)
    }
}

/// Stored password state. The hash is produced outside the domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Password {
    pub hash: String,
    pub change_required: bool,
}

/// Reference to a link between a user and an external identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdpLinkRef {
    pub idp_id: String,
    pub external_user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdpLink {
    pub idp_id: String,
    pub external_user_id: String,
    pub display_name: String,
}

impl IdpLink {
    pub fn to_ref(&self) -> IdpLinkRef {
        IdpLinkRef {
            idp_id: self.idp_id.clone(),
            external_user_id: self.external_user_id.clone(),
        }
    }
}

/// Everything needed to add a human user in one push.
#[derive(Debug, Clone)]
pub struct NewHuman {
    pub username: String,
    pub profile: Profile,
    pub email: String,
    pub email_verified: bool,
    /// Hash of the initial password, if one was set.
    pub password: Option<Password>,
    /// Initialization code, sent when the user must confirm email or password.
    pub init_code: Option<InitCode>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert_eq!(validate_email(" a@b.ch ").unwrap(), "a@b.ch");
        assert!(validate_email("ab.ch").is_err());
        assert!(validate_email("@b.ch").is_err());
        assert!(validate_email("a@").is_err());
        assert!(validate_email("a b@c.ch").is_err());
    }

    #[test]
    fn profile_gets_default_display_name() {
        let profile = Profile::new(" Jane ", "Doe").normalized().unwrap();
        assert_eq!(profile.first_name, "Jane");
        assert_eq!(profile.display_name, "Jane Doe");
        assert!(Profile::new("", "Doe").normalized().is_err());
    }

    #[test]
    fn init_code_expiry() {
        let created = Utc::now();
        let code = InitCode::new("ABC", created, 60);
        assert!(!code.is_expired(created + Duration::seconds(60)));
        assert!(code.is_expired(created + Duration::seconds(61)));
    }
}
