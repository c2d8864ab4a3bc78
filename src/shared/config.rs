use serde::{Deserialize, Serialize};

use crate::shared::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub portal: PortalConfig,
    pub directory: RemoteTargetConfig,
    pub mailing_list: RemoteTargetConfig,
    pub helpdesk: RemoteTargetConfig,
    pub sync: SyncSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Directory where the scraper drops snapshot exports, newest wins.
    pub snapshot_dir: String,
    /// Base URL of the browser-automation sidecar. Reverse sync is skipped
    /// when unset.
    pub automation_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteTargetConfig {
    pub base_url: String,
    pub token: String,
    pub page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub pacing_max_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite:data/clubsync.db".to_string(),
                max_connections: 5,
            },
            portal: PortalConfig {
                snapshot_dir: "data/snapshots".to_string(),
                automation_url: None,
            },
            directory: RemoteTargetConfig::default(),
            mailing_list: RemoteTargetConfig::default(),
            helpdesk: RemoteTargetConfig::default(),
            sync: SyncSettings::default(),
        }
    }
}

impl Default for RemoteTargetConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: String::new(),
            page_size: 50,
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            pacing_max_ms: 1_500,
            request_timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// Assembles configuration from the environment, falling back to the
    /// defaults for everything that is tunable rather than required.
    pub fn from_env() -> Self {
        let mut config = AppConfig::default();

        if let Ok(url) = std::env::var("CLUBSYNC_DATABASE_URL") {
            config.database.url = url;
        }
        if let Ok(dir) = std::env::var("CLUBSYNC_SNAPSHOT_DIR") {
            config.portal.snapshot_dir = dir;
        }
        if let Ok(url) = std::env::var("CLUBSYNC_PORTAL_AUTOMATION_URL") {
            config.portal.automation_url = Some(url);
        }

        read_target(&mut config.directory, "CLUBSYNC_DIRECTORY");
        read_target(&mut config.mailing_list, "CLUBSYNC_MAILING_LIST");
        read_target(&mut config.helpdesk, "CLUBSYNC_HELPDESK");

        if let Some(v) = read_u64("CLUBSYNC_MAX_ATTEMPTS") {
            config.sync.max_attempts = v as u32;
        }
        if let Some(v) = read_u64("CLUBSYNC_BASE_DELAY_MS") {
            config.sync.base_delay_ms = v;
        }
        if let Some(v) = read_u64("CLUBSYNC_PACING_MAX_MS") {
            config.sync.pacing_max_ms = v;
        }
        if let Some(v) = read_u64("CLUBSYNC_REQUEST_TIMEOUT_SECS") {
            config.sync.request_timeout_secs = v;
        }

        config
    }

    /// Fails before any remote call is attempted when a required endpoint
    /// or credential is missing.
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(AppError::Configuration("database url is not set".into()));
        }
        if self.portal.snapshot_dir.is_empty() {
            return Err(AppError::Configuration(
                "portal snapshot directory is not set".into(),
            ));
        }
        for (name, target) in [
            ("directory", &self.directory),
            ("mailing list", &self.mailing_list),
            ("helpdesk", &self.helpdesk),
        ] {
            if target.base_url.is_empty() {
                return Err(AppError::Configuration(format!(
                    "{name} base url is not set"
                )));
            }
            if target.token.is_empty() {
                return Err(AppError::Configuration(format!(
                    "{name} API token is not set"
                )));
            }
        }
        if self.sync.max_attempts == 0 {
            return Err(AppError::Configuration(
                "max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn read_target(target: &mut RemoteTargetConfig, prefix: &str) {
    if let Ok(url) = std::env::var(format!("{prefix}_API_URL")) {
        target.base_url = url;
    }
    if let Ok(token) = std::env::var(format!("{prefix}_API_TOKEN")) {
        target.token = token;
    }
    if let Some(size) = read_u64(&format!("{prefix}_PAGE_SIZE")) {
        target.page_size = size as u32;
    }
}

fn read_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
