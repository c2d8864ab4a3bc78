use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::Mutex;

use crate::application::ports::{MemberPortal, RemoteCollection, RemoteObject};
use crate::domain::entities::PendingFieldChange;
use crate::domain::value_objects::PortalPage;
use crate::shared::error::{AppError, Result};

fn api_error(status: u16) -> AppError {
    AppError::RemoteApi {
        status,
        message: format!("scripted status {status}"),
        details: None,
    }
}

#[derive(Default)]
pub struct CallCounts {
    pub creates: u32,
    pub updates: u32,
    pub deletes: u32,
}

#[derive(Default)]
struct CollectionState {
    objects: BTreeMap<String, Value>,
    next_id: u64,
    calls: CallCounts,
    /// ids the remote claims not to know (simulates out-of-band deletion)
    missing: HashSet<String>,
    /// permanent update failures by id, with the scripted status
    broken_updates: HashMap<String, u16>,
    /// the next N calls of any kind fail with 503
    transient_remaining: u32,
    attachments: Vec<(String, Vec<u8>)>,
}

/// In-memory remote target with scripted failure modes.
pub struct InMemoryCollection {
    state: Mutex<CollectionState>,
    page_size: usize,
}

impl InMemoryCollection {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CollectionState::default()),
            page_size: 2,
        }
    }

    pub async fn seed(&self, id: &str, body: Value) {
        self.state
            .lock()
            .await
            .objects
            .insert(id.to_string(), body);
    }

    pub async fn mark_missing(&self, id: &str) {
        let mut state = self.state.lock().await;
        state.objects.remove(id);
        state.missing.insert(id.to_string());
    }

    pub async fn break_updates_for(&self, id: &str, status: u16) {
        self.state
            .lock()
            .await
            .broken_updates
            .insert(id.to_string(), status);
    }

    pub async fn fail_next(&self, calls: u32) {
        self.state.lock().await.transient_remaining = calls;
    }

    pub async fn ids(&self) -> Vec<String> {
        self.state.lock().await.objects.keys().cloned().collect()
    }

    pub async fn object(&self, id: &str) -> Option<Value> {
        self.state.lock().await.objects.get(id).cloned()
    }

    pub async fn attachments(&self) -> Vec<(String, Vec<u8>)> {
        self.state.lock().await.attachments.clone()
    }

    pub async fn write_calls(&self) -> u32 {
        let state = self.state.lock().await;
        state.calls.creates + state.calls.updates + state.calls.deletes
    }

    pub async fn create_calls(&self) -> u32 {
        self.state.lock().await.calls.creates
    }

    fn take_transient(state: &mut CollectionState) -> Result<()> {
        if state.transient_remaining > 0 {
            state.transient_remaining -= 1;
            return Err(api_error(503));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteCollection for InMemoryCollection {
    async fn create(&self, payload: &Value) -> Result<String> {
        let mut state = self.state.lock().await;
        state.calls.creates += 1;
        Self::take_transient(&mut state)?;
        state.next_id += 1;
        let id = format!("r{}", state.next_id);
        state.objects.insert(id.clone(), payload.clone());
        Ok(id)
    }

    async fn update(&self, id: &str, payload: &Value) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.updates += 1;
        Self::take_transient(&mut state)?;
        if let Some(status) = state.broken_updates.get(id) {
            return Err(api_error(*status));
        }
        if state.missing.contains(id) || !state.objects.contains_key(id) {
            return Err(AppError::RemoteNotFound(id.to_string()));
        }
        state.objects.insert(id.to_string(), payload.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.deletes += 1;
        Self::take_transient(&mut state)?;
        state.objects.remove(id);
        Ok(())
    }

    async fn fetch(&self, id: &str) -> Result<Value> {
        let state = self.state.lock().await;
        state
            .objects
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::RemoteNotFound(id.to_string()))
    }

    async fn list_page(&self, page: u32) -> Result<Vec<RemoteObject>> {
        let state = self.state.lock().await;
        let start = (page.saturating_sub(1) as usize) * self.page_size;
        Ok(state
            .objects
            .iter()
            .skip(start)
            .take(self.page_size)
            .map(|(id, body)| RemoteObject {
                id: id.clone(),
                body: body.clone(),
            })
            .collect())
    }

    async fn put_attachment(&self, id: &str, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.objects.contains_key(id) {
            return Err(AppError::RemoteNotFound(id.to_string()));
        }
        state.attachments.push((id.to_string(), data.to_vec()));
        Ok(())
    }
}

#[derive(Default)]
struct PortalState {
    saved: HashMap<(String, PortalPage, String), String>,
    login_calls: u32,
    writes: Vec<(String, PortalPage)>,
    /// pages that always fail with the scripted status
    broken_pages: HashMap<(String, PortalPage), u16>,
    /// the next N writes land on an authentication challenge
    expired_writes: u32,
    /// read-back overrides, for verification-mismatch scenarios
    misreported: HashMap<(String, PortalPage, String), String>,
}

/// Scripted stand-in for the browser-automation collaborator.
#[derive(Default)]
pub struct ScriptedPortal {
    state: Mutex<PortalState>,
}

impl ScriptedPortal {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn break_page(&self, member: &str, page: PortalPage, status: u16) {
        self.state
            .lock()
            .await
            .broken_pages
            .insert((member.to_string(), page), status);
    }

    pub async fn expire_next_writes(&self, count: u32) {
        self.state.lock().await.expired_writes = count;
    }

    pub async fn misreport(&self, member: &str, page: PortalPage, field: &str, value: &str) {
        self.state.lock().await.misreported.insert(
            (member.to_string(), page, field.to_string()),
            value.to_string(),
        );
    }

    pub async fn login_calls(&self) -> u32 {
        self.state.lock().await.login_calls
    }

    pub async fn writes(&self) -> Vec<(String, PortalPage)> {
        self.state.lock().await.writes.clone()
    }

    pub async fn saved_value(&self, member: &str, page: PortalPage, field: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .saved
            .get(&(member.to_string(), page, field.to_string()))
            .cloned()
    }
}

#[async_trait]
impl MemberPortal for ScriptedPortal {
    async fn login(&self) -> Result<()> {
        self.state.lock().await.login_calls += 1;
        Ok(())
    }

    async fn write_fields(
        &self,
        member_key: &str,
        page: PortalPage,
        changes: &[PendingFieldChange],
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.writes.push((member_key.to_string(), page));
        if state.expired_writes > 0 {
            state.expired_writes -= 1;
            return Err(AppError::SessionExpired(format!("{member_key}/{page}")));
        }
        if let Some(status) = state.broken_pages.get(&(member_key.to_string(), page)) {
            return Err(api_error(*status));
        }
        for change in changes {
            state.saved.insert(
                (member_key.to_string(), page, change.field.clone()),
                change.new_value.clone(),
            );
        }
        Ok(())
    }

    async fn read_fields(
        &self,
        member_key: &str,
        page: PortalPage,
        fields: &[String],
    ) -> Result<HashMap<String, String>> {
        let state = self.state.lock().await;
        Ok(fields
            .iter()
            .filter_map(|field| {
                let key = (member_key.to_string(), page, field.clone());
                state
                    .misreported
                    .get(&key)
                    .or_else(|| state.saved.get(&key))
                    .map(|value| (field.clone(), value.clone()))
            })
            .collect())
    }
}
