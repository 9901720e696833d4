//! Projection processor feeding the append log to read models.

use std::sync::Arc;
use std::time::Duration;

use event_store::{EventBackend, LockResult, Position, RenewalResult};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::Result;
use crate::error::ProjectionError;
use crate::projection::Projection;

/// Settings of a [`ProjectionProcessor`].
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Maximum number of events fetched per batch.
    pub batch_size: usize,
    /// Pause between catch-up rounds in [`ProjectionProcessor::run`].
    pub interval: Duration,
    /// Lease granted by each lock acquisition or renewal.
    pub lock_ttl: Duration,
    /// Identity recorded as the lock owner.
    pub owner: String,
    /// Prefix of checkpoint and lock keys. Processes that keep their views
    /// in memory use distinct scopes so they do not share cursors.
    pub scope: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            interval: Duration::from_millis(500),
            lock_ttl: Duration::from_secs(30),
            owner: format!("projections-{}", std::process::id()),
            scope: String::new(),
        }
    }
}

impl ProcessorConfig {
    fn key(&self, projection: &str) -> String {
        if self.scope.is_empty() {
            projection.to_string()
        } else {
            format!("{}:{projection}", self.scope)
        }
    }
}

/// Delivers committed events to projections.
///
/// Each round, per projection: acquire its lock, resume from the stored
/// checkpoint, apply `events_since` batches, persist the checkpoint after
/// every batch, renew the lease between batches and release at the end.
/// A projection whose lock is held elsewhere is skipped for the round.
pub struct ProjectionProcessor<S: EventBackend + ?Sized> {
    store: Arc<S>,
    projections: Vec<Box<dyn Projection>>,
    config: ProcessorConfig,
}

impl<S: EventBackend + ?Sized> ProjectionProcessor<S> {
    pub fn new(store: Arc<S>, config: ProcessorConfig) -> Self {
        Self {
            store,
            projections: Vec::new(),
            config,
        }
    }

    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
    }

    pub fn with_projections(mut self, projections: Vec<Box<dyn Projection>>) -> Self {
        self.projections.extend(projections);
        self
    }

    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Brings every projection up to the end of the log.
    ///
    /// Returns the number of events applied in this round.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<usize> {
        let mut applied = 0;
        for projection in &self.projections {
            applied += self.catch_up(projection.as_ref()).await?;
        }
        if applied > 0 {
            tracing::debug!(events_applied = applied, "catch-up complete");
        }
        Ok(applied)
    }

    /// Resets every projection and its checkpoint, then replays the log.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<usize> {
        for projection in &self.projections {
            projection.reset().await?;
            self.store
                .save_checkpoint(&self.config.key(projection.name()), Position::initial())
                .await?;
        }
        let applied = self.run_catch_up().await?;
        tracing::info!(events_applied = applied, "projections rebuilt");
        Ok(applied)
    }

    /// Runs catch-up rounds on the configured interval until `shutdown`
    /// turns true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            projections = self.projections.len(),
            owner = %self.config.owner,
            "projection processor started"
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.run_catch_up().await {
                        tracing::error!(error = %err, "projection catch-up failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("projection processor stopped");
    }

    async fn catch_up(&self, projection: &dyn Projection) -> Result<usize> {
        let key = self.config.key(projection.name());
        let lock = self
            .store
            .try_acquire(&key, &self.config.owner, self.config.lock_ttl)
            .await?;
        let LockResult::Acquired { lease_token, .. } = lock else {
            metrics::counter!("projections_lock_contended_total").increment(1);
            tracing::debug!(projection = %key, "projection locked by another instance");
            return Ok(0);
        };

        let outcome = self.apply_batches(projection, &key, &lease_token).await;
        match self.store.release(&key, &lease_token).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(projection = %key, "lease expired before release"),
            Err(err) => tracing::warn!(projection = %key, error = %err, "failed to release lease"),
        }
        outcome
    }

    async fn apply_batches(
        &self,
        projection: &dyn Projection,
        key: &str,
        lease_token: &str,
    ) -> Result<usize> {
        let batch_size = self.config.batch_size.max(1);
        // A view that lost its state restarts from its own position;
        // redelivered events are skipped by sequence.
        let checkpoint = self.store.load_checkpoint(key).await?;
        let mut position = checkpoint.min(projection.position().await);
        let mut applied = 0;

        loop {
            let events = self.store.events_since(position, batch_size).await?;
            let Some(last) = events.last().map(|event| event.position) else {
                break;
            };
            for event in &events {
                projection.handle(event).await?;
            }
            self.store.save_checkpoint(key, last).await?;
            metrics::counter!("projections_events_processed", "projection" => projection.name())
                .increment(events.len() as u64);
            applied += events.len();
            position = last;

            if events.len() < batch_size {
                break;
            }
            if let RenewalResult::Lost = self
                .store
                .renew(key, lease_token, self.config.lock_ttl)
                .await?
            {
                return Err(ProjectionError::LockLost(key.to_string()));
            }
        }
        Ok(applied)
    }
}
