use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use std::collections::HashMap;

use crate::application::ports::MemberPortal;
use crate::domain::entities::PendingFieldChange;
use crate::domain::value_objects::PortalPage;
use crate::shared::error::{AppError, Result};

/// Member portal access through the browser-automation sidecar, which owns
/// the actual login flow, page navigation and DOM scraping. This client
/// only speaks the sidecar's small JSON surface; a 401 from any call means
/// the portal session behind it expired.
pub struct HttpPortal {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPortal {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn page_url(&self, member_key: &str, page: PortalPage) -> String {
        format!("{}/members/{member_key}/pages/{page}", self.base_url)
    }
}

#[async_trait]
impl MemberPortal for HttpPortal {
    async fn login(&self) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/session", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AppError::RemoteApi {
                status: response.status().as_u16(),
                message: "portal login failed".to_string(),
                details: response.text().await.ok(),
            });
        }
        Ok(())
    }

    async fn write_fields(
        &self,
        member_key: &str,
        page: PortalPage,
        changes: &[PendingFieldChange],
    ) -> Result<()> {
        let fields: HashMap<&str, &str> = changes
            .iter()
            .map(|change| (change.field.as_str(), change.new_value.as_str()))
            .collect();
        let response = self
            .client
            .post(self.page_url(member_key, page))
            .json(&json!({ "fields": fields }))
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(AppError::SessionExpired(format!(
                "writing {page} page for {member_key}"
            )));
        }
        if !response.status().is_success() {
            return Err(AppError::RemoteApi {
                status: response.status().as_u16(),
                message: format!("portal write on {page} page failed"),
                details: response.text().await.ok(),
            });
        }
        Ok(())
    }

    async fn read_fields(
        &self,
        member_key: &str,
        page: PortalPage,
        fields: &[String],
    ) -> Result<HashMap<String, String>> {
        let response = self
            .client
            .get(self.page_url(member_key, page))
            .query(&[("fields", fields.join(","))])
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(AppError::SessionExpired(format!(
                "reading {page} page for {member_key}"
            )));
        }
        if !response.status().is_success() {
            return Err(AppError::RemoteApi {
                status: response.status().as_u16(),
                message: format!("portal read on {page} page failed"),
                details: response.text().await.ok(),
            });
        }
        Ok(response.json().await?)
    }
}
