use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::application::ports::{RemoteCollection, RemoteObject};
use crate::shared::config::RemoteTargetConfig;
use crate::shared::error::{AppError, Result};

/// reqwest-backed implementation of the remote collection contract. All
/// three downstream targets (directory, mailing list, helpdesk) are plain
/// JSON REST collections behind a bearer token; they differ only in base
/// URL and page size.
pub struct RestCollection {
    client: reqwest::Client,
    base_url: String,
    token: String,
    page_size: u32,
}

impl RestCollection {
    pub fn new(client: reqwest::Client, config: &RemoteTargetConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            page_size: config.page_size,
        }
    }

    fn item_url(&self, id: &str) -> String {
        format!("{}/{}", self.base_url, id)
    }
}

#[async_trait]
impl RemoteCollection for RestCollection {
    async fn create(&self, payload: &Value) -> Result<String> {
        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        let body: Value = response.json().await?;
        object_id(&body)
    }

    async fn update(&self, id: &str, payload: &Value) -> Result<()> {
        let response = self
            .client
            .put(self.item_url(id))
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::RemoteNotFound(id.to_string()));
        }
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.item_url(id))
            .bearer_auth(&self.token)
            .send()
            .await?;
        // Already gone counts as deleted.
        if response.status() == StatusCode::NOT_FOUND || response.status().is_success() {
            return Ok(());
        }
        Err(api_error(response).await)
    }

    async fn fetch(&self, id: &str) -> Result<Value> {
        let response = self
            .client
            .get(self.item_url(id))
            .bearer_auth(&self.token)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::RemoteNotFound(id.to_string()));
        }
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(response.json().await?)
    }

    async fn list_page(&self, page: u32) -> Result<Vec<RemoteObject>> {
        let response = self
            .client
            .get(&self.base_url)
            .bearer_auth(&self.token)
            .query(&[("page", page), ("per_page", self.page_size)])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::RemoteNotFound(format!("page {page}")));
        }
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        let body: Vec<Value> = response.json().await?;
        body.into_iter()
            .map(|item| {
                let id = object_id(&item)?;
                Ok(RemoteObject { id, body: item })
            })
            .collect()
    }

    async fn put_attachment(&self, id: &str, data: &[u8]) -> Result<()> {
        let response = self
            .client
            .put(format!("{}/photo", self.item_url(id)))
            .bearer_auth(&self.token)
            .json(&json!({
                "content_type": "image/jpeg",
                "data": BASE64.encode(data),
            }))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::RemoteNotFound(id.to_string()));
        }
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(())
    }
}

async fn api_error(response: reqwest::Response) -> AppError {
    let status = response.status();
    let details = response.text().await.ok().filter(|body| !body.is_empty());
    AppError::RemoteApi {
        status: status.as_u16(),
        message: status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string(),
        details,
    }
}

fn object_id(body: &Value) -> Result<String> {
    match body.get("id") {
        Some(Value::String(id)) => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(AppError::Serialization(format!(
            "remote response carries no usable id: {body}"
        ))),
    }
}
