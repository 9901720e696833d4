//! Signing key pairs published for token verification.
//!
//! Only the public half and its validity window are recorded; the private
//! key never enters the event log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, AggregateRoot, DomainEvent, SnapshotCapable};
use crate::error::DomainError;

/// What a key is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyUsage {
    #[default]
    Signing,
    Encryption,
}

impl KeyUsage {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyUsage::Signing => "signing",
            KeyUsage::Encryption => "encryption",
        }
    }
}

impl std::fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum KeyPairEvent {
    #[serde(rename = "key_pair.added")]
    KeyPairAdded(KeyPairAddedData),
}

impl DomainEvent for KeyPairEvent {
    fn event_type(&self) -> &'static str {
        match self {
            KeyPairEvent::KeyPairAdded(_) => "key_pair.added",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyPairAddedData {
    pub algorithm: String,
    pub usage: KeyUsage,
    /// PEM or JWK encoded public key.
    pub public_key: String,
    pub expiry: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyPair {
    root: AggregateRoot,
    algorithm: String,
    usage: KeyUsage,
    public_key: String,
    expiry: Option<DateTime<Utc>>,
}

impl Aggregate for KeyPair {
    type Event = KeyPairEvent;

    fn aggregate_type() -> &'static str {
        "key_pair"
    }

    fn root(&self) -> &AggregateRoot {
        &self.root
    }

    fn root_mut(&mut self) -> &mut AggregateRoot {
        &mut self.root
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            KeyPairEvent::KeyPairAdded(data) => {
                self.algorithm = data.algorithm;
                self.usage = data.usage;
                self.public_key = data.public_key;
                self.expiry = Some(data.expiry);
            }
        }
    }

    fn exists(&self) -> bool {
        self.expiry.is_some()
    }
}

impl SnapshotCapable for KeyPair {}

impl KeyPair {
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn usage(&self) -> KeyUsage {
        self.usage
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }

    pub fn add(
        &self,
        algorithm: &str,
        usage: KeyUsage,
        public_key: &str,
        expiry: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<KeyPairEvent>, DomainError> {
        if algorithm.trim().is_empty() || public_key.trim().is_empty() {
            return Err(DomainError::invalid_argument(
                "KEY-d9Fgs",
                "Errors.KeyPair.Invalid",
            ));
        }
        if expiry <= now {
            return Err(DomainError::invalid_argument(
                "KEY-Ex9pd",
                "Errors.KeyPair.Expired",
            ));
        }
        if self.exists() {
            return Err(DomainError::already_exists(
                "KEY-4mSd1",
                "Errors.KeyPair.AlreadyExists",
            ));
        }
        Ok(vec![KeyPairEvent::KeyPairAdded(KeyPairAddedData {
            algorithm: algorithm.trim().to_string(),
            usage,
            public_key: public_key.to_string(),
            expiry,
        })])
    }
}
