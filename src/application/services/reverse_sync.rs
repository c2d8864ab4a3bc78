use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::application::ports::MemberPortal;
use crate::domain::entities::{PendingFieldChange, ReverseSyncReport, SyncFailure};
use crate::domain::value_objects::{NaturalKey, PortalPage};
use crate::infrastructure::database::PortalStateRepository;
use crate::shared::error::{AppError, Result};
use crate::shared::retry::{pace, with_backoff, RetryPolicy};

/// Field values the latest scrape shows per (member, page, field). An edit
/// the portal already reflects needs no push.
pub type PortalBaseline = HashMap<(String, PortalPage, String), String>;

/// Pushes locally edited member fields back to the portal, one member at a
/// time, pages in fixed order, each stage verified by reading the fields
/// back. Any stage failure aborts the member's remaining stages and leaves
/// every one of its changes unmarked, including stages that already wrote.
pub struct ReverseSyncEngine {
    portal: Arc<dyn MemberPortal>,
    state: PortalStateRepository,
    retry: RetryPolicy,
    pacing_max_ms: u64,
    cancel: CancellationToken,
}

impl ReverseSyncEngine {
    pub fn new(
        portal: Arc<dyn MemberPortal>,
        state: PortalStateRepository,
        retry: RetryPolicy,
        pacing_max_ms: u64,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            portal,
            state,
            retry,
            pacing_max_ms,
            cancel,
        }
    }

    pub async fn run(&self, baseline: &PortalBaseline) -> Result<ReverseSyncReport> {
        let mut report = ReverseSyncReport::default();

        let mut by_member: BTreeMap<String, Vec<PendingFieldChange>> = BTreeMap::new();
        for edit in self.state.edits().await? {
            by_member.entry(edit.member_key.clone()).or_default().push(edit);
        }

        for (member, edits) in by_member {
            if self.cancel.is_cancelled() {
                warn!("reverse sync interrupted by cancellation");
                break;
            }

            let pushed = self.state.pushed_values(&member).await?;
            let mut pending = Vec::new();
            let mut satisfied = Vec::new();
            for edit in edits {
                let shown = baseline.get(&(member.clone(), edit.page, edit.field.clone()));
                if shown == Some(&edit.new_value) {
                    // The portal already shows this value; consume the edit
                    // without a push.
                    satisfied.push(edit);
                } else if pushed.get(&(edit.page, edit.field.clone())) != Some(&edit.new_value) {
                    pending.push(edit);
                }
            }
            if pending.is_empty() {
                if !satisfied.is_empty() {
                    self.state.mark_synced(&member, &satisfied).await?;
                }
                continue;
            }

            report.members_total += 1;
            pace(self.pacing_max_ms).await;

            match self.push_member(&member, &pending).await {
                Ok(()) => {
                    // Satisfied edits ride along: they are consumed only
                    // once the member's whole push committed.
                    let mut done = pending.clone();
                    done.extend(satisfied);
                    self.state.mark_synced(&member, &done).await?;
                    report.members_synced += 1;
                    report.fields_synced += pending.len();
                    info!(member = %member, fields = pending.len(), "member pushed to portal");
                }
                Err(err) => {
                    error!(member = %member, error = %err, "portal push failed, member left pending");
                    report.errors.push(SyncFailure {
                        key: NaturalKey::new(member),
                        message: err.to_string(),
                        details: None,
                    });
                }
            }
        }
        Ok(report)
    }

    /// All stages for one member, in fixed order. The `?` is the fail-fast:
    /// a failed stage skips everything after it.
    async fn push_member(&self, member: &str, changes: &[PendingFieldChange]) -> Result<()> {
        let mut by_page: BTreeMap<PortalPage, Vec<PendingFieldChange>> = BTreeMap::new();
        for change in changes {
            by_page.entry(change.page).or_default().push(change.clone());
        }

        for page in PortalPage::ORDERED {
            let Some(batch) = by_page.get(&page) else {
                continue;
            };
            with_backoff(&self.retry, || self.apply_stage(member, page, batch)).await?;
        }
        Ok(())
    }

    /// One stage attempt: write, save, read every changed field back and
    /// compare against the intended value.
    async fn apply_stage(
        &self,
        member: &str,
        page: PortalPage,
        changes: &[PendingFieldChange],
    ) -> Result<()> {
        self.with_session(|| self.portal.write_fields(member, page, changes))
            .await?;

        let fields: Vec<String> = changes.iter().map(|c| c.field.clone()).collect();
        let read_back = self
            .with_session(|| self.portal.read_fields(member, page, &fields))
            .await?;

        for change in changes {
            let actual = read_back.get(&change.field);
            if actual != Some(&change.new_value) {
                return Err(AppError::Verification {
                    field: change.field.clone(),
                    expected: change.new_value.clone(),
                    actual: actual.cloned(),
                });
            }
        }
        Ok(())
    }

    /// Landing on an authentication challenge mid-operation gets one
    /// re-authentication and one retry; after that the stage fails.
    async fn with_session<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match op().await {
            Err(AppError::SessionExpired(context)) => {
                info!(context = %context, "portal session expired, re-authenticating");
                self.portal.login().await?;
                op().await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::testing::ScriptedPortal;
    use crate::infrastructure::database::ConnectionPool;
    use std::time::Duration;

    async fn setup(portal: Arc<ScriptedPortal>) -> (PortalStateRepository, ReverseSyncEngine) {
        let pool = ConnectionPool::from_memory().await.unwrap();
        pool.migrate().await.unwrap();
        let state = PortalStateRepository::new(pool.get_pool().clone());
        let engine = ReverseSyncEngine::new(
            portal,
            state.clone(),
            RetryPolicy::new(2, Duration::from_millis(1)),
            0,
            CancellationToken::new(),
        );
        (state, engine)
    }

    #[tokio::test]
    async fn full_success_marks_every_field_synced() {
        let portal = Arc::new(ScriptedPortal::new());
        let (state, engine) = setup(portal.clone()).await;
        state
            .record_edit("M1", PortalPage::General, "last_name", "Visser-Jansen")
            .await
            .unwrap();
        state
            .record_edit("M1", PortalPage::Financial, "iban", "NL00BANK0123456789")
            .await
            .unwrap();

        let report = engine.run(&PortalBaseline::new()).await.unwrap();
        assert_eq!((report.members_synced, report.fields_synced), (1, 2));
        assert!(state.edits().await.unwrap().is_empty());
        assert_eq!(
            portal
                .saved_value("M1", PortalPage::Financial, "iban")
                .await
                .as_deref(),
            Some("NL00BANK0123456789")
        );

        // Nothing left to push on a second run.
        let report = engine.run(&PortalBaseline::new()).await.unwrap();
        assert_eq!(report.members_total, 0);
    }

    #[tokio::test]
    async fn stages_run_in_fixed_order() {
        let portal = Arc::new(ScriptedPortal::new());
        let (state, engine) = setup(portal.clone()).await;
        // Recorded financial-first; pushed general-first regardless.
        state
            .record_edit("M1", PortalPage::Financial, "iban", "NL00BANK0123456789")
            .await
            .unwrap();
        state
            .record_edit("M1", PortalPage::General, "last_name", "Visser")
            .await
            .unwrap();

        engine.run(&PortalBaseline::new()).await.unwrap();
        let writes = portal.writes().await;
        assert_eq!(
            writes,
            vec![
                ("M1".to_string(), PortalPage::General),
                ("M1".to_string(), PortalPage::Financial),
            ]
        );
    }

    #[tokio::test]
    async fn failed_later_stage_leaves_all_changes_pending() {
        let portal = Arc::new(ScriptedPortal::new());
        let (state, engine) = setup(portal.clone()).await;
        state
            .record_edit("M1", PortalPage::General, "last_name", "Visser")
            .await
            .unwrap();
        state
            .record_edit("M1", PortalPage::Financial, "iban", "NL00BANK0123456789")
            .await
            .unwrap();
        portal.break_page("M1", PortalPage::Financial, 400).await;

        let report = engine.run(&PortalBaseline::new()).await.unwrap();
        assert_eq!(report.members_synced, 0);
        assert_eq!(report.errors.len(), 1);
        // The general stage did write, but nothing is marked synced.
        assert_eq!(
            portal
                .saved_value("M1", PortalPage::General, "last_name")
                .await
                .as_deref(),
            Some("Visser")
        );
        assert_eq!(state.edits().await.unwrap().len(), 2);
        assert!(state.pushed_values("M1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn verification_mismatch_is_a_stage_failure() {
        let portal = Arc::new(ScriptedPortal::new());
        let (state, engine) = setup(portal.clone()).await;
        state
            .record_edit("M1", PortalPage::Contact, "email", "new@example.test")
            .await
            .unwrap();
        portal
            .misreport("M1", PortalPage::Contact, "email", "stale@example.test")
            .await;

        let report = engine.run(&PortalBaseline::new()).await.unwrap();
        assert_eq!(report.members_synced, 0);
        assert!(report.errors[0].message.contains("Verification failed"));
        assert_eq!(state.edits().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn expired_session_gets_one_reauth_and_retry() {
        let portal = Arc::new(ScriptedPortal::new());
        let (state, engine) = setup(portal.clone()).await;
        state
            .record_edit("M1", PortalPage::General, "last_name", "Visser")
            .await
            .unwrap();
        portal.expire_next_writes(1).await;

        let report = engine.run(&PortalBaseline::new()).await.unwrap();
        assert_eq!(report.members_synced, 1);
        assert_eq!(portal.login_calls().await, 1);
    }

    #[tokio::test]
    async fn value_already_shown_by_portal_needs_no_push() {
        let portal = Arc::new(ScriptedPortal::new());
        let (state, engine) = setup(portal.clone()).await;
        state
            .record_edit("M1", PortalPage::Contact, "email", "same@example.test")
            .await
            .unwrap();

        let mut baseline = PortalBaseline::new();
        baseline.insert(
            ("M1".to_string(), PortalPage::Contact, "email".to_string()),
            "same@example.test".to_string(),
        );

        let report = engine.run(&baseline).await.unwrap();
        assert_eq!(report.members_total, 0);
        assert!(portal.writes().await.is_empty());
        // The edit is consumed all the same.
        assert!(state.edits().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn persistent_stage_failure_exhausts_retry_budget() {
        let portal = Arc::new(ScriptedPortal::new());
        let (state, engine) = setup(portal.clone()).await;
        state
            .record_edit("M1", PortalPage::General, "last_name", "Visser")
            .await
            .unwrap();
        portal.break_page("M1", PortalPage::General, 503).await;

        let report = engine.run(&PortalBaseline::new()).await.unwrap();
        assert_eq!(report.errors.len(), 1);
        // Two attempts: the transient failure was retried once.
        assert_eq!(portal.writes().await.len(), 2);
    }
}
