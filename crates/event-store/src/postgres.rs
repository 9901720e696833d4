use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, CheckpointStore, ConstraintAction, EventEnvelope, EventId, EventQuery,
    EventStoreError, LockResult, Position, ProjectionLocker, RenewalResult, Result, Snapshot,
    Version,
    lock::{lease_expiry, new_lease_token},
    store::{EventStore, EventStream, PushRequest, record_push, validate_push},
};

/// Advisory lock taken by every push transaction.
///
/// Serializing pushes keeps positions committing in ascending order, so a
/// projection reading `position > cursor` never skips a late commit.
const PUSH_LOCK_KEY: i64 = 0x6964_656e_7469_7479;

const EVENT_COLUMNS: &str = "position, id, event_type, aggregate_type, aggregate_id, resource_owner, version, timestamp, editor, payload, metadata";

/// PostgreSQL-backed event store implementation.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Creates a new PostgreSQL event store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` and returns a store using the pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_value(metadata_json)?;

        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            event_type: row.try_get("event_type")?,
            aggregate_id: AggregateId::from(row.try_get::<String, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            resource_owner: AggregateId::from(row.try_get::<String, _>("resource_owner")?),
            version: Version::new(row.try_get("version")?),
            position: Position::new(row.try_get("position")?),
            timestamp: row.try_get("timestamp")?,
            editor: row.try_get("editor")?,
            payload: row.try_get("payload")?,
            metadata,
        })
    }

    async fn push_batch(&self, request: PushRequest) -> Result<Vec<EventEnvelope>> {
        let expectations = validate_push(&request)?;

        // Dropping the transaction on any early return rolls it back.
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(PUSH_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let mut versions: HashMap<(String, AggregateId), Version> = HashMap::new();
        for expectation in &expectations {
            let current: Option<i64> = sqlx::query_scalar(
                "SELECT MAX(version) FROM events WHERE aggregate_type = $1 AND aggregate_id = $2",
            )
            .bind(&expectation.aggregate_type)
            .bind(expectation.aggregate_id.as_str())
            .fetch_one(&mut *tx)
            .await?;

            let actual = Version::new(current.unwrap_or(0));
            if !expectation.expected.matches(actual) {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_type: expectation.aggregate_type.clone(),
                    aggregate_id: expectation.aggregate_id.clone(),
                    expected: expectation.expected,
                    actual,
                });
            }
            versions.insert(
                (
                    expectation.aggregate_type.clone(),
                    expectation.aggregate_id.clone(),
                ),
                actual,
            );
        }

        for constraint in &request.constraints {
            match constraint.action {
                ConstraintAction::Add => {
                    let inserted = sqlx::query(
                        "INSERT INTO unique_constraints (namespace, key) VALUES ($1, $2) ON CONFLICT DO NOTHING",
                    )
                    .bind(&constraint.namespace)
                    .bind(&constraint.key)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();

                    if inserted == 0 {
                        return Err(EventStoreError::UniqueConstraintViolation {
                            namespace: constraint.namespace.clone(),
                            key: constraint.key.clone(),
                            message_key: constraint.message_key.clone(),
                        });
                    }
                }
                ConstraintAction::Remove => {
                    sqlx::query("DELETE FROM unique_constraints WHERE namespace = $1 AND key = $2")
                        .bind(&constraint.namespace)
                        .bind(&constraint.key)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        let timestamp = Utc::now();
        let mut committed = Vec::with_capacity(request.events.len());
        for event in request.events {
            let key = (event.aggregate_type.clone(), event.aggregate_id.clone());
            let version = versions.get(&key).copied().unwrap_or_default().next();
            versions.insert(key, version);

            let mut envelope = event.commit(version, Position::initial(), timestamp);
            let metadata_json = serde_json::to_value(&envelope.metadata)?;

            let position: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO events (id, event_type, aggregate_type, aggregate_id, resource_owner, version, timestamp, editor, payload, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                RETURNING position
                "#,
            )
            .bind(envelope.event_id.as_uuid())
            .bind(&envelope.event_type)
            .bind(&envelope.aggregate_type)
            .bind(envelope.aggregate_id.as_str())
            .bind(envelope.resource_owner.as_str())
            .bind(envelope.version.as_i64())
            .bind(envelope.timestamp)
            .bind(&envelope.editor)
            .bind(&envelope.payload)
            .bind(metadata_json)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_aggregate_version")
                {
                    return EventStoreError::ConcurrencyConflict {
                        aggregate_type: envelope.aggregate_type.clone(),
                        aggregate_id: envelope.aggregate_id.clone(),
                        expected: crate::ExpectedVersion::Exact(Version::new(
                            version.as_i64() - 1,
                        )),
                        actual: version,
                    };
                }
                EventStoreError::Database(e)
            })?;

            envelope.position = Position::new(position);
            committed.push(envelope);
        }

        tx.commit().await?;
        Ok(committed)
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[tracing::instrument(skip(self, request), fields(events = request.events.len()))]
    async fn push(&self, request: PushRequest) -> Result<Vec<EventEnvelope>> {
        let result = self.push_batch(request).await;
        record_push(&result);
        result
    }

    async fn filter(&self, query: EventQuery) -> Result<Vec<EventEnvelope>> {
        let mut sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.aggregate_types.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND aggregate_type = ANY(${param_count})"));
        }
        if query.aggregate_ids.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND aggregate_id = ANY(${param_count})"));
        }
        if query.resource_owner.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND resource_owner = ${param_count}"));
        }
        if query.event_types.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND event_type = ANY(${param_count})"));
        }
        if query.from_version.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND version >= ${param_count}"));
        }
        if query.to_version.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND version <= ${param_count}"));
        }
        if query.after_position.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND position > ${param_count}"));
        }
        if query.from_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND timestamp >= ${param_count}"));
        }
        if query.to_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND timestamp <= ${param_count}"));
        }

        sql.push_str(" ORDER BY position ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(types) = query.aggregate_types {
            sqlx_query = sqlx_query.bind(types);
        }
        if let Some(ids) = query.aggregate_ids {
            sqlx_query = sqlx_query.bind(ids.into_iter().map(String::from).collect::<Vec<_>>());
        }
        if let Some(owner) = query.resource_owner {
            sqlx_query = sqlx_query.bind(String::from(owner));
        }
        if let Some(event_types) = query.event_types {
            sqlx_query = sqlx_query.bind(event_types);
        }
        if let Some(from_version) = query.from_version {
            sqlx_query = sqlx_query.bind(from_version.as_i64());
        }
        if let Some(to_version) = query.to_version {
            sqlx_query = sqlx_query.bind(to_version.as_i64());
        }
        if let Some(after) = query.after_position {
            sqlx_query = sqlx_query.bind(after.as_i64());
        }
        if let Some(from_ts) = query.from_timestamp {
            sqlx_query = sqlx_query.bind(from_ts);
        }
        if let Some(to_ts) = query.to_timestamp {
            sqlx_query = sqlx_query.bind(to_ts);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_event).collect()
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
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE aggregate_type = $1 AND aggregate_id = $2 AND version >= $3 ORDER BY version ASC"
        ))
        .bind(aggregate_type)
        .bind(aggregate_id.as_str())
        .bind(from_version.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn aggregate_version(
        &self,
        aggregate_type: &str,
        aggregate_id: &AggregateId,
    ) -> Result<Option<Version>> {
        let version: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(version) FROM events WHERE aggregate_type = $1 AND aggregate_id = $2",
        )
        .bind(aggregate_type)
        .bind(aggregate_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(version.map(Version::new))
    }

    async fn events_since(&self, position: Position, limit: usize) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE position > $1 ORDER BY position ASC LIMIT $2"
        ))
        .bind(position.as_i64())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn latest_position(&self) -> Result<Position> {
        let position: Option<i64> = sqlx::query_scalar("SELECT MAX(position) FROM events")
            .fetch_one(&self.pool)
            .await?;
        Ok(position.map(Position::new).unwrap_or_default())
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::StreamExt;

        let pool = self.pool.clone();
        let stream = futures_util::stream::once(async move {
            let sql = format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY position ASC");
            sqlx::query(&sql).fetch_all(&pool).await
        })
        .map(|result| match result {
            Ok(rows) => rows.into_iter().map(Self::row_to_event).collect::<Vec<_>>(),
            Err(e) => vec![Err(EventStoreError::Database(e))],
        })
        .flat_map(futures_util::stream::iter);

        Ok(Box::pin(stream))
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (aggregate_type, aggregate_id, version, timestamp, state)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (aggregate_type, aggregate_id) DO UPDATE SET
                version = EXCLUDED.version,
                timestamp = EXCLUDED.timestamp,
                state = EXCLUDED.state
            "#,
        )
        .bind(&snapshot.aggregate_type)
        .bind(snapshot.aggregate_id.as_str())
        .bind(snapshot.version.as_i64())
        .bind(snapshot.timestamp)
        .bind(&snapshot.state)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_snapshot(
        &self,
        aggregate_type: &str,
        aggregate_id: &AggregateId,
    ) -> Result<Option<Snapshot>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT aggregate_type, aggregate_id, version, timestamp, state
            FROM snapshots
            WHERE aggregate_type = $1 AND aggregate_id = $2
            "#,
        )
        .bind(aggregate_type)
        .bind(aggregate_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Snapshot {
                aggregate_id: AggregateId::from(row.try_get::<String, _>("aggregate_id")?),
                aggregate_type: row.try_get("aggregate_type")?,
                version: Version::new(row.try_get("version")?),
                timestamp: row.try_get::<DateTime<Utc>, _>("timestamp")?,
                state: row.try_get("state")?,
            })),
            None => Ok(None),
        }
    }

    async fn is_claimed(&self, namespace: &str, key: &str) -> Result<bool> {
        let claimed: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM unique_constraints WHERE namespace = $1 AND key = $2)",
        )
        .bind(namespace)
        .bind(key)
        .fetch_one(&self.pool)
        .await?;
        Ok(claimed)
    }
}

#[async_trait]
impl CheckpointStore for PostgresEventStore {
    async fn load_checkpoint(&self, projection: &str) -> Result<Position> {
        let position: Option<i64> = sqlx::query_scalar(
            "SELECT position FROM projection_checkpoints WHERE projection = $1",
        )
        .bind(projection)
        .fetch_optional(&self.pool)
        .await?;
        Ok(position.map(Position::new).unwrap_or_default())
    }

    async fn save_checkpoint(&self, projection: &str, position: Position) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO projection_checkpoints (projection, position, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (projection) DO UPDATE SET
                position = EXCLUDED.position,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(projection)
        .bind(position.as_i64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ProjectionLocker for PostgresEventStore {
    async fn try_acquire(
        &self,
        projection: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<LockResult> {
        let now = Utc::now();
        let token = new_lease_token();

        let acquired: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO projection_locks (projection, owner, token, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (projection) DO UPDATE SET
                owner = EXCLUDED.owner,
                token = EXCLUDED.token,
                expires_at = EXCLUDED.expires_at
            WHERE projection_locks.expires_at <= $5 OR projection_locks.owner = EXCLUDED.owner
            RETURNING token
            "#,
        )
        .bind(projection)
        .bind(owner)
        .bind(&token)
        .bind(lease_expiry(now, ttl))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(lease_token) = acquired {
            return Ok(LockResult::Acquired {
                lease_token,
                lease_duration: ttl,
            });
        }

        let current_owner: Option<String> =
            sqlx::query_scalar("SELECT owner FROM projection_locks WHERE projection = $1")
                .bind(projection)
                .fetch_optional(&self.pool)
                .await?;
        Ok(LockResult::Held { current_owner })
    }

    async fn renew(
        &self,
        projection: &str,
        lease_token: &str,
        ttl: Duration,
    ) -> Result<RenewalResult> {
        let now = Utc::now();
        let updated = sqlx::query(
            "UPDATE projection_locks SET expires_at = $3 WHERE projection = $1 AND token = $2 AND expires_at > $4",
        )
        .bind(projection)
        .bind(lease_token)
        .bind(lease_expiry(now, ttl))
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 1 {
            Ok(RenewalResult::Renewed {
                lease_duration: ttl,
            })
        } else {
            Ok(RenewalResult::Lost)
        }
    }

    async fn release(&self, projection: &str, lease_token: &str) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM projection_locks WHERE projection = $1 AND token = $2")
            .bind(projection)
            .bind(lease_token)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted == 1)
    }
}
