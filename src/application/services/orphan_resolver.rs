use std::collections::HashSet;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::ports::{list_all, RemoteCollection};
use crate::domain::entities::{OrphanReport, SyncFailure};
use crate::domain::value_objects::{EntityKind, NaturalKey};
use crate::infrastructure::database::TrackingRepository;
use crate::shared::error::Result;
use crate::shared::retry::pace;

/// Deletes what no longer belongs, in both directions: tracked rows whose
/// key left the source snapshot, and remote objects the tracking store has
/// no mapping for. The second pass is what recovers from lost mappings;
/// without it a tracking-store reset would leak remote objects forever.
pub struct OrphanResolver {
    store: TrackingRepository,
    pacing_max_ms: u64,
    cancel: CancellationToken,
}

impl OrphanResolver {
    pub fn new(store: TrackingRepository, pacing_max_ms: u64, cancel: CancellationToken) -> Self {
        Self {
            store,
            pacing_max_ms,
            cancel,
        }
    }

    pub async fn run(
        &self,
        kind: EntityKind,
        remote: &dyn RemoteCollection,
        current_keys: &HashSet<NaturalKey>,
    ) -> Result<OrphanReport> {
        let mut report = OrphanReport::new(kind);
        self.remove_tracked_orphans(kind, remote, current_keys, &mut report)
            .await?;
        if !self.cancel.is_cancelled() {
            self.remove_untracked_remotes(kind, remote, &mut report)
                .await?;
        }
        info!(
            kind = %kind,
            removed_tracked = report.removed_tracked,
            removed_remote = report.removed_remote,
            "orphan passes finished"
        );
        Ok(report)
    }

    /// Tracked-but-absent: rows missing from the current key set lose their
    /// remote object (not-found counts as already gone) and then their
    /// tracked row, regardless of the remote outcome.
    async fn remove_tracked_orphans(
        &self,
        kind: EntityKind,
        remote: &dyn RemoteCollection,
        current_keys: &HashSet<NaturalKey>,
        report: &mut OrphanReport,
    ) -> Result<()> {
        let orphans = self.store.not_in_key_set(kind, current_keys).await?;
        for orphan in orphans {
            if self.cancel.is_cancelled() {
                warn!(kind = %kind, "orphan pass interrupted by cancellation");
                return Ok(());
            }
            pace(self.pacing_max_ms).await;

            if let Some(remote_id) = &orphan.remote_id {
                match remote.delete(remote_id).await {
                    Ok(()) => {}
                    Err(err) if err.is_not_found() => {}
                    Err(err) => {
                        warn!(kind = %kind, key = %orphan.key, error = %err, "remote delete failed");
                        report.errors.push(SyncFailure {
                            key: orphan.key.clone(),
                            message: err.to_string(),
                            details: None,
                        });
                    }
                }
            }
            self.store.delete(kind, &orphan.key).await?;
            report.removed_tracked += 1;
        }
        Ok(())
    }

    /// Untracked-remote: anything the target holds beyond the store's known
    /// remote ids is deleted. Runs after reconciliation so ids created this
    /// run are already visible in the store.
    async fn remove_untracked_remotes(
        &self,
        kind: EntityKind,
        remote: &dyn RemoteCollection,
        report: &mut OrphanReport,
    ) -> Result<()> {
        let known = self.store.remote_ids(kind).await?;
        // Drain the listing before deleting anything; deletions would shift
        // page boundaries under the enumeration.
        let listing = list_all(remote).await?;
        for object in listing {
            if known.contains(&object.id) {
                continue;
            }
            if self.cancel.is_cancelled() {
                warn!(kind = %kind, "remote sweep interrupted by cancellation");
                return Ok(());
            }
            pace(self.pacing_max_ms).await;
            match remote.delete(&object.id).await {
                Ok(()) => report.removed_remote += 1,
                Err(err) if err.is_not_found() => report.removed_remote += 1,
                Err(err) => {
                    warn!(kind = %kind, remote_id = %object.id, error = %err, "sweep delete failed");
                    report.errors.push(SyncFailure {
                        key: NaturalKey::new(object.id.clone()),
                        message: err.to_string(),
                        details: None,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::change_detector::content_hash;
    use crate::application::services::testing::InMemoryCollection;
    use crate::domain::entities::NewTrackedRow;
    use crate::infrastructure::database::ConnectionPool;
    use serde_json::json;

    async fn setup() -> (TrackingRepository, OrphanResolver) {
        let pool = ConnectionPool::from_memory().await.unwrap();
        pool.migrate().await.unwrap();
        let store = TrackingRepository::new(pool.get_pool().clone());
        let resolver = OrphanResolver::new(store.clone(), 0, CancellationToken::new());
        (store, resolver)
    }

    fn row(key: &str) -> NewTrackedRow {
        let payload = json!({"key": key});
        NewTrackedRow {
            key: NaturalKey::new(key),
            source_hash: content_hash(&payload).unwrap(),
            payload,
            position: None,
        }
    }

    #[tokio::test]
    async fn absent_key_is_deleted_remotely_and_locally() {
        let (store, resolver) = setup().await;
        let remote = InMemoryCollection::new();
        let kind = EntityKind::Member;
        store.upsert_many(kind, &[row("A"), row("B")]).await.unwrap();
        remote.seed("r1", json!({})).await;
        remote.seed("r2", json!({})).await;
        store
            .update_sync_state(kind, &NaturalKey::new("A"), None, Some("r1"))
            .await
            .unwrap();
        store
            .update_sync_state(kind, &NaturalKey::new("B"), None, Some("r2"))
            .await
            .unwrap();

        let current: HashSet<NaturalKey> = [NaturalKey::new("A")].into_iter().collect();
        let report = resolver.run(kind, &remote, &current).await.unwrap();

        assert_eq!(report.removed_tracked, 1);
        assert!(report.errors.is_empty());
        assert!(store.get(kind, &NaturalKey::new("B")).await.unwrap().is_none());
        assert!(store.get(kind, &NaturalKey::new("A")).await.unwrap().is_some());
        assert_eq!(remote.ids().await, vec!["r1".to_string()]);
    }

    #[tokio::test]
    async fn already_gone_remote_object_is_not_an_error() {
        let (store, resolver) = setup().await;
        let remote = InMemoryCollection::new();
        let kind = EntityKind::Member;
        store.upsert_many(kind, &[row("B")]).await.unwrap();
        // Tracked remote id points at nothing.
        store
            .update_sync_state(kind, &NaturalKey::new("B"), None, Some("r9"))
            .await
            .unwrap();

        let report = resolver.run(kind, &remote, &HashSet::new()).await.unwrap();
        assert_eq!(report.removed_tracked, 1);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn never_created_orphan_is_deleted_locally_only() {
        let (store, resolver) = setup().await;
        let remote = InMemoryCollection::new();
        let kind = EntityKind::Member;
        store.upsert_many(kind, &[row("B")]).await.unwrap();

        let report = resolver.run(kind, &remote, &HashSet::new()).await.unwrap();
        assert_eq!(report.removed_tracked, 1);
        assert_eq!(remote.write_calls().await, 0);
    }

    #[tokio::test]
    async fn untracked_remote_objects_are_swept() {
        let (store, resolver) = setup().await;
        let remote = InMemoryCollection::new();
        let kind = EntityKind::Team;
        store.upsert_many(kind, &[row("T1")]).await.unwrap();
        store
            .update_sync_state(kind, &NaturalKey::new("T1"), None, Some("r1"))
            .await
            .unwrap();
        // Three known to the remote, one tracked. Page size in the fake is
        // two, so the sweep also exercises pagination.
        remote.seed("r1", json!({})).await;
        remote.seed("x1", json!({})).await;
        remote.seed("x2", json!({})).await;

        let current: HashSet<NaturalKey> = [NaturalKey::new("T1")].into_iter().collect();
        let report = resolver.run(kind, &remote, &current).await.unwrap();

        assert_eq!(report.removed_remote, 2);
        assert_eq!(remote.ids().await, vec!["r1".to_string()]);
    }
}
