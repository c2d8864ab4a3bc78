use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{EntityKind, NaturalKey};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncFailure {
    pub key: NaturalKey,
    pub message: String,
    pub details: Option<String>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Created,
    Updated,
}

/// A successful write for one entity, exposed so follow-up steps (photo
/// push, relationship linking) can act on just-created or updated rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub key: NaturalKey,
    pub remote_id: String,
    pub action: SyncAction,
}

/// Per-kind reconciliation result. Every entity is accounted for exactly
/// once: total = created + updated + skipped + errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub kind: EntityKind,
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: Vec<SyncFailure>,
    pub outcomes: Vec<SyncOutcome>,
}

impl SyncReport {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            total: 0,
            created: 0,
            updated: 0,
            skipped: 0,
            errors: Vec::new(),
            outcomes: Vec::new(),
        }
    }

    pub fn synced(&self) -> usize {
        self.created + self.updated
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrphanReport {
    pub kind: EntityKind,
    pub removed_tracked: usize,
    pub removed_remote: usize,
    pub errors: Vec<SyncFailure>,
}

impl OrphanReport {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            removed_tracked: 0,
            removed_remote: 0,
            errors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReverseSyncReport {
    pub members_total: usize,
    pub members_synced: usize,
    pub fields_synced: usize,
    pub errors: Vec<SyncFailure>,
}

/// Aggregate of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: i64,
    pub duration_ms: u64,
    pub cancelled: bool,
    pub reports: Vec<SyncReport>,
    pub orphans: Vec<OrphanReport>,
    pub followup_errors: Vec<SyncFailure>,
    pub reverse: Option<ReverseSyncReport>,
}

impl RunSummary {
    pub fn has_errors(&self) -> bool {
        self.reports.iter().any(|r| !r.errors.is_empty())
            || self.orphans.iter().any(|r| !r.errors.is_empty())
            || !self.followup_errors.is_empty()
            || self
                .reverse
                .as_ref()
                .map(|r| !r.errors.is_empty())
                .unwrap_or(false)
    }
}
