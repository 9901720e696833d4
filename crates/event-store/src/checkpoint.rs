use async_trait::async_trait;

use crate::{Position, Result};

/// Persists the log position each projection has fully applied.
///
/// A checkpoint is advanced only after the corresponding read-model write
/// has committed, so a crash replays events rather than skipping them.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Returns the saved position, or `Position::initial()` if none was saved.
    async fn load_checkpoint(&self, projection: &str) -> Result<Position>;

    /// Saves the position a projection has applied up to.
    async fn save_checkpoint(&self, projection: &str, position: Position) -> Result<()>;
}
