use async_trait::async_trait;
use serde_json::Value;

use crate::shared::error::Result;

/// An object as returned by a remote listing.
#[derive(Debug, Clone)]
pub struct RemoteObject {
    pub id: String,
    pub body: Value,
}

/// Contract shared by every downstream target collection: directory/CRM,
/// mailing list and helpdesk all speak the same create/update/delete/list
/// shape.
#[async_trait]
pub trait RemoteCollection: Send + Sync {
    /// Writes a new object; success returns the identifier the target
    /// assigned.
    async fn create(&self, payload: &Value) -> Result<String>;

    /// Overwrites an existing object. A missing object surfaces as
    /// `AppError::RemoteNotFound`, which the reconciler turns into
    /// self-heal; every other failure is an ordinary error.
    async fn update(&self, id: &str, payload: &Value) -> Result<()>;

    /// Idempotent from the caller's perspective: deleting an object that is
    /// already gone succeeds.
    async fn delete(&self, id: &str) -> Result<()>;

    async fn fetch(&self, id: &str) -> Result<Value>;

    /// One page of the full listing, 1-based. Termination is an empty page
    /// or an out-of-range error (surfaced as `RemoteNotFound`).
    async fn list_page(&self, page: u32) -> Result<Vec<RemoteObject>>;

    /// Field-level sub-resource write (e.g. a member photo).
    async fn put_attachment(&self, id: &str, data: &[u8]) -> Result<()>;
}

/// Drains the paginated listing, treating an out-of-range page as the end.
pub async fn list_all(remote: &dyn RemoteCollection) -> Result<Vec<RemoteObject>> {
    let mut objects = Vec::new();
    let mut page = 1;
    loop {
        let batch = match remote.list_page(page).await {
            Ok(batch) => batch,
            Err(err) if err.is_not_found() => break,
            Err(err) => return Err(err),
        };
        if batch.is_empty() {
            break;
        }
        objects.extend(batch);
        page += 1;
    }
    Ok(objects)
}
