use std::collections::HashMap;

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::debug;

use crate::application::ports::{list_all, RemoteCollection};
use crate::domain::value_objects::{RelationshipEdge, RelationshipKind};
use crate::shared::error::Result;

/// Maintains the `relationships` list embedded in remote objects. Edges are
/// merged in, never replaced wholesale: the target object may carry edges of
/// other kinds, or manually curated ones, that must survive.
pub struct RelationshipLinker<'a> {
    remote: &'a dyn RemoteCollection,
    // email (lowercased) -> [(remote id, display name)], built on first use
    identity_index: Mutex<Option<HashMap<String, Vec<(String, String)>>>>,
}

impl<'a> RelationshipLinker<'a> {
    pub fn new(remote: &'a dyn RemoteCollection) -> Self {
        Self {
            remote,
            identity_index: Mutex::new(None),
        }
    }

    /// Adds the given edges to the remote object's relationship list.
    /// Returns true when a write was needed, false when every edge was
    /// already present.
    pub async fn link(&self, remote_id: &str, edges: &[RelationshipEdge]) -> Result<bool> {
        let mut body = self.remote.fetch(remote_id).await?;
        let existing = parse_edges(&body);

        let additions: Vec<&RelationshipEdge> = edges
            .iter()
            .filter(|edge| {
                !existing
                    .iter()
                    .any(|e| e.kind == edge.kind && e.related_id == edge.related_id)
            })
            .collect();
        if additions.is_empty() {
            return Ok(false);
        }

        debug!(remote_id, added = additions.len(), "linking relationships");
        let mut merged = existing;
        merged.extend(additions.into_iter().cloned());
        body["relationships"] = edges_to_value(&merged);
        self.remote.update(remote_id, &body).await?;
        Ok(true)
    }

    /// Finds an existing remote record for a real-world identity. Two
    /// records are the same identity only when both the contact address and
    /// the full display name match; a shared address with a different name
    /// is a deliberately separate person.
    pub async fn resolve_identity(
        &self,
        email: &str,
        display_name: &str,
    ) -> Result<Option<String>> {
        let mut guard = self.identity_index.lock().await;
        if guard.is_none() {
            let mut index: HashMap<String, Vec<(String, String)>> = HashMap::new();
            for object in list_all(self.remote).await? {
                let Some(address) = object.body.get("email").and_then(Value::as_str) else {
                    continue;
                };
                let name = object
                    .body
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                index
                    .entry(address.to_lowercase())
                    .or_default()
                    .push((object.id, name.trim().to_string()));
            }
            *guard = Some(index);
        }

        let wanted = display_name.trim();
        let found = guard
            .as_ref()
            .and_then(|index| index.get(&email.to_lowercase()))
            .and_then(|candidates| {
                candidates
                    .iter()
                    .find(|(_, name)| name == wanted)
                    .map(|(id, _)| id.clone())
            });
        Ok(found)
    }
}

fn parse_edges(body: &Value) -> Vec<RelationshipEdge> {
    body.get("relationships")
        .and_then(Value::as_array)
        .map(|edges| {
            edges
                .iter()
                .filter_map(|edge| {
                    let related_id = edge.get("id").and_then(Value::as_str)?;
                    let kind = match edge.get("kind").and_then(Value::as_str)? {
                        "parent" => RelationshipKind::Parent,
                        "child" => RelationshipKind::Child,
                        _ => return None,
                    };
                    Some(RelationshipEdge::new(related_id, kind))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn edges_to_value(edges: &[RelationshipEdge]) -> Value {
    Value::Array(
        edges
            .iter()
            .map(|edge| json!({"id": edge.related_id, "kind": edge.kind.as_str()}))
            .collect(),
    )
}
