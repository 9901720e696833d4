//! Secret and credential capabilities injected into [`Commands`](crate::Commands).

use std::collections::HashMap;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Produces one-time secrets such as initialization and authorization codes.
pub trait SecretGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Turns passwords into stored hashes and checks them.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> String;

    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// Verifies a second factor presented by a user.
#[async_trait]
pub trait SecondFactorVerifier: Send + Sync {
    async fn verify(&self, user_id: &str, code: &str) -> bool;
}

/// Uppercase alphanumeric codes drawn from random UUIDs.
#[derive(Debug, Clone)]
pub struct RandomSecretGenerator {
    length: usize,
}

impl RandomSecretGenerator {
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(1),
        }
    }
}

impl Default for RandomSecretGenerator {
    fn default() -> Self {
        Self::new(8)
    }
}

impl SecretGenerator for RandomSecretGenerator {
    fn generate(&self) -> String {
        let mut secret = String::with_capacity(self.length);
        while secret.len() < self.length {
            secret.push_str(&Uuid::new_v4().simple().to_string().to_uppercase());
        }
        secret.truncate(self.length);
        secret
    }
}

/// Salted SHA-256 hashes in the form `sha256$<salt>$<hex digest>`.
#[derive(Debug, Clone, Default)]
pub struct Sha256PasswordHasher;

impl Sha256PasswordHasher {
    fn digest(salt: &str, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(password.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl PasswordHasher for Sha256PasswordHasher {
    fn hash(&self, password: &str) -> String {
        let salt = Uuid::new_v4().simple().to_string();
        let digest = Self::digest(&salt, password);
        format!("sha256${salt}${digest}")
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        let mut parts = hash.splitn(3, '$');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("sha256"), Some(salt), Some(digest)) => Self::digest(salt, password) == digest,
            _ => false,
        }
    }
}

/// Second factors registered up front, per user.
#[derive(Debug, Clone, Default)]
pub struct StaticSecondFactorVerifier {
    codes: HashMap<String, String>,
}

impl StaticSecondFactorVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_code(mut self, user_id: impl Into<String>, code: impl Into<String>) -> Self {
        self.codes.insert(user_id.into(), code.into());
        self
    }
}

#[async_trait]
impl SecondFactorVerifier for StaticSecondFactorVerifier {
    async fn verify(&self, user_id: &str, code: &str) -> bool {
        self.codes.get(user_id).is_some_and(|expected| expected == code)
    }
}
