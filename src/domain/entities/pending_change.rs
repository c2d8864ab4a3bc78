use serde::{Deserialize, Serialize};

use crate::domain::value_objects::PortalPage;

/// One field-level change waiting to flow back to the portal. Ephemeral:
/// computed per run by diffing local edits against the scraped state and
/// the last pushed values, and marked synced only after every stage of the
/// owning member's push commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFieldChange {
    pub member_key: String,
    pub page: PortalPage,
    pub field: String,
    pub new_value: String,
}

impl PendingFieldChange {
    pub fn new(
        member_key: impl Into<String>,
        page: PortalPage,
        field: impl Into<String>,
        new_value: impl Into<String>,
    ) -> Self {
        Self {
            member_key: member_key.into(),
            page,
            field: field.into(),
            new_value: new_value.into(),
        }
    }
}
