//! Settings types. Every field has a compiled default so a partial
//! settings file is always valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    pub server: ServerSettings,
    pub reconnect: ReconnectSettings,
    pub banner: BannerSettings,
    pub metadata: MetadataSettings,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub base_url: String,
    pub ws_path: String,
    pub request_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            ws_path: "/ws".into(),
            request_timeout_ms: 10_000,
        }
    }
}

impl ServerSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Push channel URL: the base URL with an `http(s)` scheme swapped for
    /// `ws(s)`, joined with `ws_path`.
    pub fn push_url(&self) -> Result<String> {
        let base = self.base_url.trim_end_matches('/');
        let origin = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if base.starts_with("ws://") || base.starts_with("wss://") {
            base.to_string()
        } else {
            return Err(SettingsError::invalid(
                "server.baseUrl",
                format!("unsupported scheme in {}", self.base_url),
            ));
        };

        if self.ws_path.starts_with('/') {
            Ok(format!("{origin}{}", self.ws_path))
        } else {
            Ok(format!("{origin}/{}", self.ws_path))
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectSettings {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
    pub heartbeat_interval_ms: u64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter_factor: 0.2,
            heartbeat_interval_ms: 30_000,
        }
    }
}

impl ReconnectSettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BannerSettings {
    pub grace_ms: u64,
}

impl Default for BannerSettings {
    fn default() -> Self {
        Self { grace_ms: 3_000 }
    }
}

impl BannerSettings {
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetadataSettings {
    pub default_title: String,
    pub default_avatar: String,
    pub default_description: String,
    pub site_name: String,
    pub default_theme_color: String,
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            default_title: "Doughmination System® Server".into(),
            default_avatar: "https://www.yuri-lover.win/cdn/pfp/fallback_avatar.png".into(),
            default_description: "Member of the Doughmination System®".into(),
            site_name: "Doughmination System®".into(),
            default_theme_color: "#FF69B4".into(),
        }
    }
}
