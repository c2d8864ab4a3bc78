pub mod pending_change;
pub mod snapshot;
pub mod sync_report;
pub mod tracked_entity;

pub use pending_change::PendingFieldChange;
pub use snapshot::{
    CommitteeRecord, ImportantDateRecord, MemberRecord, ParentRecord, SourceRecord,
    SourceSnapshot, TeamAssignment, TeamRecord,
};
pub use sync_report::{
    OrphanReport, ReverseSyncReport, RunSummary, SyncAction, SyncFailure, SyncOutcome, SyncReport,
};
pub use tracked_entity::{NewTrackedRow, TrackedEntity};
