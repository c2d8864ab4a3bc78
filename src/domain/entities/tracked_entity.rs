use serde_json::Value;

use crate::domain::value_objects::{ContentHash, EntityKind, NaturalKey};

/// One tracked row: the bridge between a source entity and its remote
/// counterpart. `remote_id == None` means never synced, or the remote
/// object was confirmed gone and the row is waiting to self-heal.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedEntity {
    pub kind: EntityKind,
    pub key: NaturalKey,
    pub remote_id: Option<String>,
    pub payload: Value,
    pub source_hash: ContentHash,
    pub last_synced_hash: Option<ContentHash>,
    pub position: Option<i64>,
    pub last_seen_at: i64,
    pub last_synced_at: Option<i64>,
    pub created_at: i64,
}

impl TrackedEntity {
    pub fn needs_sync(&self) -> bool {
        self.last_synced_hash.as_ref() != Some(&self.source_hash)
    }
}

/// Input to the tracking store upsert: source state only. Sync state
/// (remote id, last synced hash) is never written by the upsert path.
#[derive(Debug, Clone)]
pub struct NewTrackedRow {
    pub key: NaturalKey,
    pub payload: Value,
    pub source_hash: ContentHash,
    pub position: Option<i64>,
}
