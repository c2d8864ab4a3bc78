use async_trait::async_trait;

use crate::domain::entities::SourceSnapshot;
use crate::shared::error::Result;

/// Supplier of the most recent source snapshot, by timestamp. `None` means
/// no snapshot exists yet, which the pipeline treats as fatal.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn latest_snapshot(&self) -> Result<Option<SourceSnapshot>>;
}
