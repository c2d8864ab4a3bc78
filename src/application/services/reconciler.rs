use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::application::ports::RemoteCollection;
use crate::domain::entities::{SyncAction, SyncFailure, SyncOutcome, SyncReport, TrackedEntity};
use crate::domain::value_objects::EntityKind;
use crate::infrastructure::database::TrackingRepository;
use crate::shared::error::{AppError, Result};
use crate::shared::retry::{pace, with_backoff, RetryPolicy};

/// Per-entity decision engine: update when a remote id is tracked, create
/// when not, self-heal when the remote object turns out to be gone, skip
/// when hashes already agree. One entity's failure never aborts the batch.
pub struct Reconciler {
    store: TrackingRepository,
    retry: RetryPolicy,
    pacing_max_ms: u64,
    cancel: CancellationToken,
}

impl Reconciler {
    pub fn new(
        store: TrackingRepository,
        retry: RetryPolicy,
        pacing_max_ms: u64,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            retry,
            pacing_max_ms,
            cancel,
        }
    }

    pub async fn run(
        &self,
        kind: EntityKind,
        remote: &dyn RemoteCollection,
        force: bool,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::new(kind);
        report.total = self.store.count(kind).await?;
        let pending = self.store.needing_sync(kind, force).await?;

        info!(
            kind = %kind,
            total = report.total,
            pending = pending.len(),
            "reconciling"
        );

        for entity in &pending {
            if self.cancel.is_cancelled() {
                warn!(kind = %kind, "reconciliation interrupted by cancellation");
                break;
            }
            pace(self.pacing_max_ms).await;

            match self.sync_one(kind, remote, entity).await {
                Ok(outcome) => {
                    match outcome.action {
                        SyncAction::Created => report.created += 1,
                        SyncAction::Updated => report.updated += 1,
                    }
                    report.outcomes.push(outcome);
                }
                Err(err) => {
                    error!(kind = %kind, key = %entity.key, error = %err, "entity sync failed");
                    report.errors.push(failure(entity, err));
                }
            }
        }

        // Everything not written and not failed was skipped, including the
        // tail of a cancelled batch.
        report.skipped = report
            .total
            .saturating_sub(report.created + report.updated + report.errors.len());
        Ok(report)
    }

    async fn sync_one(
        &self,
        kind: EntityKind,
        remote: &dyn RemoteCollection,
        entity: &TrackedEntity,
    ) -> Result<SyncOutcome> {
        if let Some(remote_id) = &entity.remote_id {
            match with_backoff(&self.retry, || remote.update(remote_id, &entity.payload)).await {
                Ok(()) => {
                    self.store
                        .update_sync_state(
                            kind,
                            &entity.key,
                            Some(&entity.source_hash),
                            Some(remote_id),
                        )
                        .await?;
                    return Ok(SyncOutcome {
                        key: entity.key.clone(),
                        remote_id: remote_id.clone(),
                        action: SyncAction::Updated,
                    });
                }
                Err(err) if err.is_not_found() => {
                    // Someone deleted the remote object out-of-band. Clear
                    // the tracked sync state and fall through to create.
                    warn!(kind = %kind, key = %entity.key, remote_id = %remote_id, "remote object gone, recreating");
                    self.store
                        .update_sync_state(kind, &entity.key, None, None)
                        .await?;
                }
                Err(err) => return Err(err),
            }
        }

        let remote_id = with_backoff(&self.retry, || remote.create(&entity.payload)).await?;
        self.store
            .update_sync_state(kind, &entity.key, Some(&entity.source_hash), Some(&remote_id))
            .await?;
        Ok(SyncOutcome {
            key: entity.key.clone(),
            remote_id,
            action: SyncAction::Created,
        })
    }
}

fn failure(entity: &TrackedEntity, err: AppError) -> SyncFailure {
    let details = match &err {
        AppError::RemoteApi { details, .. } => details.clone(),
        _ => None,
    };
    SyncFailure {
        key: entity.key.clone(),
        message: err.to_string(),
        details,
    }
}
