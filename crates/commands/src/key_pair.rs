use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{AggregateRef, DomainError, KeyPair, KeyUsage, ObjectDetails};
use event_store::EventStore;

use crate::context::CommandContext;
use crate::service::{Commands, details};

impl<S: EventStore + ?Sized> Commands<S> {
    /// Publishes the public half of a signing or encryption key.
    #[tracing::instrument(skip(self, ctx, public_key))]
    pub async fn add_key_pair(
        &self,
        ctx: &CommandContext,
        algorithm: &str,
        usage: KeyUsage,
        public_key: &str,
        expiry: DateTime<Utc>,
    ) -> Result<ObjectDetails, DomainError> {
        let id = AggregateId::new();
        self.config
            .retry
            .run("add_key_pair", ctx.timeout, || async {
                let key: KeyPair = self.handler.load(&id).await?;
                let events = key.add(algorithm, usage, public_key, expiry, Utc::now())?;
                let target = AggregateRef::of::<KeyPair>(
                    id.clone(),
                    AggregateId::from(self.config.instance_id.as_str()),
                );
                let result = self.handler.commit(&target, &ctx.editor, key, events).await?;
                tracing::info!(key_id = %id, usage = usage.as_str(), "key pair added");
                details(&result)
            })
            .await
    }
}
