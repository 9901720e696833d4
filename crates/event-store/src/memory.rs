use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    AggregateId, CheckpointStore, ConstraintLedger, EventEnvelope, EventQuery, EventStoreError,
    LockResult, Position, ProjectionLocker, RenewalResult, Result, Snapshot, Version,
    lock::{lease_expiry, new_lease_token},
    store::{EventStore, EventStream, PushRequest, record_push, validate_push},
};

type AggregateKey = (String, AggregateId);

#[derive(Default)]
struct Log {
    events: Vec<EventEnvelope>,
    versions: HashMap<AggregateKey, Version>,
    ledger: ConstraintLedger,
}

#[derive(Debug, Clone)]
struct Lease {
    owner: String,
    token: String,
    expires_at: DateTime<Utc>,
}

/// In-memory event store for tests and single-process deployments.
///
/// A push runs entirely under one write lock without suspending, which
/// makes it atomic and serializes it against every other push.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    log: Arc<RwLock<Log>>,
    snapshots: Arc<RwLock<HashMap<AggregateKey, Snapshot>>>,
    checkpoints: Arc<RwLock<HashMap<String, Position>>>,
    leases: Arc<RwLock<HashMap<String, Lease>>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.log.read().await.events.len()
    }

    /// Clears all events, claims, snapshots, checkpoints and leases.
    pub async fn clear(&self) {
        *self.log.write().await = Log::default();
        self.snapshots.write().await.clear();
        self.checkpoints.write().await.clear();
        self.leases.write().await.clear();
    }

    async fn push_batch(&self, request: PushRequest) -> Result<Vec<EventEnvelope>> {
        let expectations = validate_push(&request)?;

        let mut guard = self.log.write().await;
        let log = &mut *guard;

        for expectation in &expectations {
            let key = (
                expectation.aggregate_type.clone(),
                expectation.aggregate_id.clone(),
            );
            let current = log.versions.get(&key).copied().unwrap_or_default();
            if !expectation.expected.matches(current) {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_type: expectation.aggregate_type.clone(),
                    aggregate_id: expectation.aggregate_id.clone(),
                    expected: expectation.expected,
                    actual: current,
                });
            }
        }

        let mut staged = log.ledger.clone();
        staged.apply(&request.constraints)?;

        let timestamp = Utc::now();
        let mut position = log
            .events
            .last()
            .map(|e| e.position)
            .unwrap_or_default();
        let mut committed = Vec::with_capacity(request.events.len());
        for event in request.events {
            let key = (event.aggregate_type.clone(), event.aggregate_id.clone());
            let version = log.versions.get(&key).copied().unwrap_or_default().next();
            log.versions.insert(key, version);
            position = position.next();
            committed.push(event.commit(version, position, timestamp));
        }

        log.events.extend(committed.iter().cloned());
        log.ledger = staged;

        Ok(committed)
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn push(&self, request: PushRequest) -> Result<Vec<EventEnvelope>> {
        let result = self.push_batch(request).await;
        record_push(&result);
        result
    }

    async fn filter(&self, query: EventQuery) -> Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;
        let matching = log.events.iter().filter(|e| query.matches(e)).cloned();

        let offset = query.offset.unwrap_or(0);
        let events = match query.limit {
            Some(limit) => matching.skip(offset).take(limit).collect(),
            None => matching.skip(offset).collect(),
        };
        Ok(events)
    }

    async fn events_for_aggregate(
        &self,
        aggregate_type: &str,
        aggregate_id: &AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        self.events_for_aggregate_from_version(aggregate_type, aggregate_id, Version::first())
            .await
    }

    async fn events_for_aggregate_from_version(
        &self,
        aggregate_type: &str,
        aggregate_id: &AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;
        Ok(log
            .events
            .iter()
            .filter(|e| {
                e.aggregate_type == aggregate_type
                    && &e.aggregate_id == aggregate_id
                    && e.version >= from_version
            })
            .cloned()
            .collect())
    }

    async fn aggregate_version(
        &self,
        aggregate_type: &str,
        aggregate_id: &AggregateId,
    ) -> Result<Option<Version>> {
        let log = self.log.read().await;
        Ok(log
            .versions
            .get(&(aggregate_type.to_string(), aggregate_id.clone()))
            .copied())
    }

    async fn events_since(&self, position: Position, limit: usize) -> Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;
        // positions are dense and start at 1, so the index of `position + 1` is `position`
        let start = usize::try_from(position.as_i64()).unwrap_or(0);
        Ok(log.events.iter().skip(start).take(limit).cloned().collect())
    }

    async fn latest_position(&self) -> Result<Position> {
        let log = self.log.read().await;
        Ok(log.events.last().map(|e| e.position).unwrap_or_default())
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::stream;

        let events = self.log.read().await.events.clone();
        let stream = stream::iter(events.into_iter().map(Ok));
        Ok(Box::pin(stream))
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        let mut snapshots = self.snapshots.write().await;
        snapshots.insert(
            (snapshot.aggregate_type.clone(), snapshot.aggregate_id.clone()),
            snapshot,
        );
        Ok(())
    }

    async fn get_snapshot(
        &self,
        aggregate_type: &str,
        aggregate_id: &AggregateId,
    ) -> Result<Option<Snapshot>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots
            .get(&(aggregate_type.to_string(), aggregate_id.clone()))
            .cloned())
    }

    async fn is_claimed(&self, namespace: &str, key: &str) -> Result<bool> {
        Ok(self.log.read().await.ledger.is_claimed(namespace, key))
    }
}

#[async_trait]
impl CheckpointStore for InMemoryEventStore {
    async fn load_checkpoint(&self, projection: &str) -> Result<Position> {
        let checkpoints = self.checkpoints.read().await;
        Ok(checkpoints.get(projection).copied().unwrap_or_default())
    }

    async fn save_checkpoint(&self, projection: &str, position: Position) -> Result<()> {
        self.checkpoints
            .write()
            .await
            .insert(projection.to_string(), position);
        Ok(())
    }
}

#[async_trait]
impl ProjectionLocker for InMemoryEventStore {
    async fn try_acquire(
        &self,
        projection: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<LockResult> {
        let mut leases = self.leases.write().await;
        let now = Utc::now();

        if let Some(lease) = leases.get(projection)
            && lease.expires_at > now
            && lease.owner != owner
        {
            return Ok(LockResult::Held {
                current_owner: Some(lease.owner.clone()),
            });
        }

        let lease = Lease {
            owner: owner.to_string(),
            token: new_lease_token(),
            expires_at: lease_expiry(now, ttl),
        };
        let lease_token = lease.token.clone();
        leases.insert(projection.to_string(), lease);

        Ok(LockResult::Acquired {
            lease_token,
            lease_duration: ttl,
        })
    }

    async fn renew(
        &self,
        projection: &str,
        lease_token: &str,
        ttl: Duration,
    ) -> Result<RenewalResult> {
        let mut leases = self.leases.write().await;
        let now = Utc::now();

        match leases.get_mut(projection) {
            Some(lease) if lease.token == lease_token && lease.expires_at > now => {
                lease.expires_at = lease_expiry(now, ttl);
                Ok(RenewalResult::Renewed {
                    lease_duration: ttl,
                })
            }
            _ => Ok(RenewalResult::Lost),
        }
    }

    async fn release(&self, projection: &str, lease_token: &str) -> Result<bool> {
        let mut leases = self.leases.write().await;
        match leases.get(projection) {
            Some(lease) if lease.token == lease_token => {
                leases.remove(projection);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
