//! Cache of public signing keys used to verify tokens.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::RwLock;

use crate::views::{KeysView, PublicKeyRow};

struct CachedKey {
    key: PublicKeyRow,
    fetched_at: Instant,
}

/// Public keys by id, refreshed from the keys view once older than
/// `max_age`.
///
/// Constructed once by the server and shared by reference.
pub struct PublicKeyCache {
    keys: KeysView,
    max_age: Duration,
    reject_expired: bool,
    entries: RwLock<HashMap<String, CachedKey>>,
}

impl PublicKeyCache {
    pub fn new(keys: KeysView, max_age: Duration) -> Self {
        Self {
            keys,
            max_age,
            reject_expired: true,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Also serve keys past their expiry, e.g. to verify old tokens.
    pub fn allow_expired(mut self) -> Self {
        self.reject_expired = false;
        self
    }

    pub async fn get(&self, key_id: &str) -> Option<PublicKeyRow> {
        let cached = self
            .entries
            .read()
            .await
            .get(key_id)
            .filter(|entry| entry.fetched_at.elapsed() < self.max_age)
            .map(|entry| entry.key.clone());

        let key = match cached {
            Some(key) => key,
            None => {
                let key = self.keys.get(key_id).await?;
                tracing::debug!(key_id, "public key cache refreshed");
                self.entries.write().await.insert(
                    key_id.to_string(),
                    CachedKey {
                        key: key.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                key
            }
        };

        if self.reject_expired && key.is_expired(Utc::now()) {
            self.invalidate(key_id).await;
            return None;
        }
        Some(key)
    }

    pub async fn invalidate(&self, key_id: &str) {
        self.entries.write().await.remove(key_id);
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::Projection;
    use chrono::{DateTime, Duration as ChronoDuration};
    use common::AggregateId;
    use domain::KeyPairEvent;
    use domain::key_pair::KeyPairAddedData;
    use domain::KeyUsage;
    use event_store::{EventEnvelope, EventId, Position, Version};
    use std::collections::HashMap as Map;

    fn key_added(id: &str, expiry: DateTime<Utc>) -> EventEnvelope {
        let event = KeyPairEvent::KeyPairAdded(KeyPairAddedData {
            algorithm: "RS256".into(),
            usage: KeyUsage::Signing,
            public_key: "-----BEGIN PUBLIC KEY-----".into(),
            expiry,
        });
        EventEnvelope {
            event_id: EventId::new(),
            event_type: "key_pair.added".into(),
            aggregate_id: AggregateId::from(id),
            aggregate_type: "key_pair".into(),
            resource_owner: AggregateId::from("instance"),
            version: Version::new(1),
            position: Position::new(1),
            timestamp: Utc::now(),
            editor: "system".into(),
            payload: serde_json::to_value(&event).unwrap(),
            metadata: Map::new(),
        }
    }

    #[tokio::test]
    async fn serves_cached_key_within_max_age() {
        let view = KeysView::new();
        view.handle(&key_added("k1", Utc::now() + ChronoDuration::hours(1)))
            .await
            .unwrap();
        let cache = PublicKeyCache::new(view.clone(), Duration::from_secs(60));

        assert!(cache.get("k1").await.is_some());
        view.reset().await.unwrap();
        assert!(cache.get("k1").await.is_some());

        cache.invalidate("k1").await;
        assert!(cache.get("k1").await.is_none());
    }

    #[tokio::test]
    async fn stale_entries_are_refetched() {
        let view = KeysView::new();
        view.handle(&key_added("k1", Utc::now() + ChronoDuration::hours(1)))
            .await
            .unwrap();
        let cache = PublicKeyCache::new(view.clone(), Duration::ZERO);

        assert!(cache.get("k1").await.is_some());
        view.reset().await.unwrap();
        assert!(cache.get("k1").await.is_none());
    }

    #[tokio::test]
    async fn expired_keys_are_rejected_unless_allowed() {
        let view = KeysView::new();
        view.handle(&key_added("old", Utc::now() - ChronoDuration::minutes(1)))
            .await
            .unwrap();

        let strict = PublicKeyCache::new(view.clone(), Duration::from_secs(60));
        assert!(strict.get("old").await.is_none());
        assert_eq!(strict.len().await, 0);

        let lenient = PublicKeyCache::new(view, Duration::from_secs(60)).allow_expired();
        assert!(lenient.get("old").await.is_some());
    }
}
