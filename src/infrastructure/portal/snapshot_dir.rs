use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

use crate::application::ports::SnapshotSource;
use crate::domain::entities::SourceSnapshot;
use crate::shared::error::{AppError, Result};

/// Snapshot supplier reading the scraper's export directory. Exports are
/// JSON files whose names sort chronologically (the scraper stamps them
/// with the epoch), so the lexicographically greatest name is the latest.
pub struct SnapshotDir {
    dir: PathBuf,
}

impl SnapshotDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SnapshotSource for SnapshotDir {
    async fn latest_snapshot(&self) -> Result<Option<SourceSnapshot>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut latest: Option<PathBuf> = None;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if latest
                .as_ref()
                .map(|current| path.file_name() > current.file_name())
                .unwrap_or(true)
            {
                latest = Some(path);
            }
        }

        let Some(path) = latest else {
            return Ok(None);
        };
        debug!(path = %path.display(), "reading source snapshot");
        let raw = tokio::fs::read_to_string(&path).await?;
        let snapshot: SourceSnapshot = serde_json::from_str(&raw).map_err(|err| {
            AppError::Serialization(format!("snapshot {} is malformed: {err}", path.display()))
        })?;
        Ok(Some(snapshot))
    }
}
