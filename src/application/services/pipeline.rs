use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::ports::{MemberPortal, RemoteCollection, SnapshotSource};
use crate::application::services::catalog::{self, SnapshotBatches};
use crate::application::services::orphan_resolver::OrphanResolver;
use crate::application::services::reconciler::Reconciler;
use crate::application::services::relationship_linker::RelationshipLinker;
use crate::application::services::reverse_sync::ReverseSyncEngine;
use crate::domain::entities::{RunSummary, SyncFailure, SyncReport};
use crate::domain::value_objects::{EntityKind, RelationshipEdge, RelationshipKind};
use crate::infrastructure::database::{PortalStateRepository, TrackingRepository};
use crate::shared::config::SyncSettings;
use crate::shared::error::{AppError, Result};
use crate::shared::retry::RetryPolicy;

/// One remote collection per entity kind. Kinds never share a collection;
/// the untracked-remote sweep would otherwise delete its neighbours.
pub struct RemoteTargets {
    pub members: Arc<dyn RemoteCollection>,
    pub contacts: Arc<dyn RemoteCollection>,
    pub team_lists: Arc<dyn RemoteCollection>,
    pub committee_groups: Arc<dyn RemoteCollection>,
    pub work_history: Arc<dyn RemoteCollection>,
    pub dates: Arc<dyn RemoteCollection>,
    pub customers: Arc<dyn RemoteCollection>,
}

impl RemoteTargets {
    fn for_kind(&self, kind: EntityKind) -> &dyn RemoteCollection {
        match kind {
            EntityKind::Member => self.members.as_ref(),
            EntityKind::Parent => self.contacts.as_ref(),
            EntityKind::Team => self.team_lists.as_ref(),
            EntityKind::Committee => self.committee_groups.as_ref(),
            EntityKind::WorkHistory => self.work_history.as_ref(),
            EntityKind::ImportantDate => self.dates.as_ref(),
            EntityKind::HelpdeskCustomer => self.customers.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub force: bool,
    pub entity_filter: Option<EntityKind>,
}

/// Drives one run end to end: snapshot, change detection, reconciliation,
/// follow-ups, orphan cleanup, reverse sync. Strictly sequential; the
/// cancellation token is honoured between entities, never mid-write.
pub struct SyncPipeline {
    store: TrackingRepository,
    portal_state: PortalStateRepository,
    targets: RemoteTargets,
    source: Arc<dyn SnapshotSource>,
    portal: Option<Arc<dyn MemberPortal>>,
    settings: SyncSettings,
    cancel: CancellationToken,
}

impl SyncPipeline {
    pub fn new(
        store: TrackingRepository,
        portal_state: PortalStateRepository,
        targets: RemoteTargets,
        source: Arc<dyn SnapshotSource>,
        portal: Option<Arc<dyn MemberPortal>>,
        settings: SyncSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            portal_state,
            targets,
            source,
            portal,
            settings,
            cancel,
        }
    }

    pub async fn run(&self, options: &RunOptions) -> Result<RunSummary> {
        let started = Instant::now();
        let mut summary = RunSummary {
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now().timestamp(),
            duration_ms: 0,
            cancelled: false,
            reports: Vec::new(),
            orphans: Vec::new(),
            followup_errors: Vec::new(),
            reverse: None,
        };
        info!(run_id = %summary.run_id, force = options.force, "sync run starting");

        let snapshot = self
            .source
            .latest_snapshot()
            .await?
            .ok_or_else(|| AppError::Configuration("no source snapshot available".into()))?;
        let age_secs = summary.started_at - snapshot.taken_at;
        info!(records = snapshot.records.len(), age_secs, "source snapshot loaded");

        let batches = catalog::build(&snapshot)?;
        let retry = RetryPolicy::new(
            self.settings.max_attempts,
            Duration::from_millis(self.settings.base_delay_ms),
        );
        let reconciler = Reconciler::new(
            self.store.clone(),
            retry.clone(),
            self.settings.pacing_max_ms,
            self.cancel.clone(),
        );
        let resolver = OrphanResolver::new(
            self.store.clone(),
            self.settings.pacing_max_ms,
            self.cancel.clone(),
        );

        for kind in EntityKind::ALL {
            if options
                .entity_filter
                .map(|wanted| wanted != kind)
                .unwrap_or(false)
            {
                continue;
            }
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let rows = batches.rows_for(kind);
            self.store.upsert_many(kind, rows).await?;

            if kind == EntityKind::Parent {
                self.adopt_existing_contacts(&mut summary).await?;
            }

            let remote = self.targets.for_kind(kind);
            let report = reconciler.run(kind, remote, options.force).await?;

            if kind == EntityKind::Member {
                self.push_photos(&report, &batches, &mut summary).await;
            }

            // An empty snapshot for a kind that has tracked rows is almost
            // always a broken scrape; wiping everything requires --force.
            let current_keys = batches.keys_for(kind);
            if current_keys.is_empty() && !options.force && self.store.count(kind).await? > 0 {
                warn!(kind = %kind, "snapshot has no records of this kind, skipping orphan passes");
            } else {
                let orphans = resolver.run(kind, remote, &current_keys).await?;
                summary.orphans.push(orphans);
            }

            summary.reports.push(report);
        }

        let run_all = options.entity_filter.is_none();
        if run_all && !self.cancel.is_cancelled() {
            self.link_families(&batches, &mut summary).await?;
        }

        if let Some(portal) = &self.portal {
            let reverse_in_scope =
                run_all || options.entity_filter == Some(EntityKind::Member);
            if reverse_in_scope && !self.cancel.is_cancelled() {
                let engine = ReverseSyncEngine::new(
                    portal.clone(),
                    self.portal_state.clone(),
                    retry,
                    self.settings.pacing_max_ms,
                    self.cancel.clone(),
                );
                summary.reverse = Some(engine.run(&batches.baseline).await?);
            }
        } else {
            info!("no portal automation configured, reverse sync skipped");
        }

        summary.cancelled = summary.cancelled || self.cancel.is_cancelled();
        summary.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            run_id = %summary.run_id,
            duration_ms = summary.duration_ms,
            errors = summary.has_errors(),
            "sync run finished"
        );
        Ok(summary)
    }

    /// Drift recovery for parents: a contact that exists in the directory
    /// but not in the store is adopted instead of duplicated, provided both
    /// the address and the display name match.
    async fn adopt_existing_contacts(&self, summary: &mut RunSummary) -> Result<()> {
        let linker = RelationshipLinker::new(self.targets.contacts.as_ref());
        for row in self.store.all_for_kind(EntityKind::Parent).await? {
            if row.remote_id.is_some() {
                continue;
            }
            let (Some(email), Some(name)) = (
                row.payload.get("email").and_then(Value::as_str),
                row.payload.get("name").and_then(Value::as_str),
            ) else {
                continue;
            };
            match linker.resolve_identity(email, name).await {
                Ok(Some(remote_id)) => {
                    info!(key = %row.key, remote_id = %remote_id, "adopting existing directory contact");
                    self.store
                        .update_sync_state(EntityKind::Parent, &row.key, None, Some(&remote_id))
                        .await?;
                }
                Ok(None) => {}
                Err(err) => summary.followup_errors.push(SyncFailure {
                    key: row.key.clone(),
                    message: err.to_string(),
                    details: None,
                }),
            }
        }
        Ok(())
    }

    async fn push_photos(
        &self,
        report: &SyncReport,
        batches: &SnapshotBatches,
        summary: &mut RunSummary,
    ) {
        for outcome in &report.outcomes {
            let photo = batches
                .member_extras
                .iter()
                .find(|extras| extras.key == outcome.key)
                .and_then(|extras| extras.photo.as_deref());
            let Some(photo) = photo else {
                continue;
            };
            if let Err(err) = self
                .targets
                .members
                .put_attachment(&outcome.remote_id, photo)
                .await
            {
                warn!(key = %outcome.key, error = %err, "photo upload failed");
                summary.followup_errors.push(SyncFailure {
                    key: outcome.key.clone(),
                    message: err.to_string(),
                    details: None,
                });
            }
        }
    }

    /// Bidirectional family links, written only after both sides were
    /// reconciled so their remote ids exist.
    async fn link_families(
        &self,
        batches: &SnapshotBatches,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let member_linker = RelationshipLinker::new(self.targets.members.as_ref());
        let contact_linker = RelationshipLinker::new(self.targets.contacts.as_ref());

        for extras in &batches.member_extras {
            if extras.parent_keys.is_empty() {
                continue;
            }
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                return Ok(());
            }
            let Some(member_id) = self
                .store
                .get(EntityKind::Member, &extras.key)
                .await?
                .and_then(|row| row.remote_id)
            else {
                continue;
            };

            for parent_key in &extras.parent_keys {
                let Some(parent_id) = self
                    .store
                    .get(EntityKind::Parent, parent_key)
                    .await?
                    .and_then(|row| row.remote_id)
                else {
                    continue;
                };

                let links = [
                    (
                        &contact_linker,
                        parent_id.as_str(),
                        RelationshipEdge::new(member_id.clone(), RelationshipKind::Child),
                    ),
                    (
                        &member_linker,
                        member_id.as_str(),
                        RelationshipEdge::new(parent_id.clone(), RelationshipKind::Parent),
                    ),
                ];
                for (linker, target, edge) in links {
                    if let Err(err) = linker.link(target, std::slice::from_ref(&edge)).await {
                        warn!(target, error = %err, "relationship link failed");
                        summary.followup_errors.push(SyncFailure {
                            key: extras.key.clone(),
                            message: err.to_string(),
                            details: None,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
