//! Bounded retries of commands that lost a race.

use std::future::Future;
use std::time::Duration;

use domain::DomainError;

/// How often a command is re-run after a retryable failure.
///
/// Every attempt reloads its aggregates, so a retry never re-validates
/// against the state that lost. Only concurrency conflicts and lagging
/// read models are retried; uniqueness violations would lose the same race
/// again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Pause before the n-th retry is `backoff * n`.
    pub backoff: Duration,
    /// Deadline of the whole command including retries.
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(20),
            timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Runs `attempt` until it succeeds, fails for good or runs out of
    /// attempts. `timeout` overrides the policy's deadline.
    ///
    /// A command cut off by its deadline is dropped at its current await
    /// point; pushes are atomic, so nothing of it is committed.
    pub async fn run<T, F, Fut>(
        &self,
        command: &'static str,
        timeout: Option<Duration>,
        mut attempt: F,
    ) -> Result<T, DomainError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let attempts = async {
            let mut tries = 0;
            loop {
                tries += 1;
                match attempt().await {
                    Err(err) if err.is_retryable() && tries < max_attempts => {
                        metrics::counter!("commands_retries_total", "command" => command)
                            .increment(1);
                        tracing::debug!(command, attempt = tries, error = %err, "retrying command");
                        tokio::time::sleep(self.backoff * tries).await;
                    }
                    outcome => return outcome,
                }
            }
        };

        let outcome = match timeout.or(self.timeout) {
            Some(limit) => tokio::time::timeout(limit, attempts)
                .await
                .unwrap_or(Err(DomainError::Timeout(limit))),
            None => attempts.await,
        };

        let status = match &outcome {
            Ok(_) => "ok",
            Err(err) => err.kind().as_str(),
        };
        metrics::counter!("commands_executed_total", "command" => command, "status" => status)
            .increment(1);
        if let Err(err) = &outcome {
            tracing::debug!(command, error = %err, "command rejected");
        }
        outcome
    }
}
