use async_trait::async_trait;
use std::collections::HashMap;

use crate::domain::entities::PendingFieldChange;
use crate::domain::value_objects::PortalPage;
use crate::shared::error::Result;

/// The browser-automation collaborator holding the single stateful portal
/// session. An operation that lands on an authentication challenge surfaces
/// `AppError::SessionExpired`; callers re-authenticate once and retry once.
#[async_trait]
pub trait MemberPortal: Send + Sync {
    async fn login(&self) -> Result<()>;

    /// Applies the given field changes on one portal page and saves it.
    async fn write_fields(
        &self,
        member_key: &str,
        page: PortalPage,
        changes: &[PendingFieldChange],
    ) -> Result<()>;

    /// Reads the named fields back from a portal page, post-save.
    async fn read_fields(
        &self,
        member_key: &str,
        page: PortalPage,
        fields: &[String],
    ) -> Result<HashMap<String, String>>;
}
