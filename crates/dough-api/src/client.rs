use std::time::Duration;

use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use dough_core::model::decode_members;
use dough_core::{FrontingEntry, Member, MemberStatus, MentalState};

use crate::error::ApiError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// `GET /api/system` payload. Only the mental state matters to the presence
/// model; the rest is carried for display.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SystemInfo {
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub tag: Option<String>,
    pub mental_state: Option<MentalState>,
}

#[derive(Deserialize)]
struct RawSystemInfo {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tag: Option<String>,
    #[serde(default)]
    mental_state: Option<Value>,
}

#[derive(Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: Option<Value>,
}

#[derive(Deserialize)]
struct AdminResponse {
    #[serde(rename = "isAdmin", default)]
    is_admin: bool,
}

/// Client for the REST endpoints the presence model is seeded from.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    token: Option<SecretString>,
}

impl ApiClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ApiError::Network(format!("invalid base URL {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Network(format!("invalid base URL {base_url}")));
        }
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url,
            token: None,
        })
    }

    /// Attach the opaque session token sent as a bearer credential.
    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ApiError> {
        let url = self.endpoint(segments);
        let mut req = self.http.get(url.clone()).header("accept", "application/json");
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Bearer {}", token.expose_secret()));
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status.as_u16(), body));
        }

        let bytes = resp.bytes().await?;
        debug!(url = %url, bytes = bytes.len(), "fetched");
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// `GET /api/members`: the full, unfiltered collection. Malformed
    /// records are skipped.
    #[instrument(skip(self))]
    pub async fn members(&self) -> Result<Vec<Member>, ApiError> {
        let raw: Vec<Value> = self.get_json(&["api", "members"]).await?;
        let (members, skipped) = decode_members(raw);
        if skipped > 0 {
            warn!(skipped, "skipped malformed member records");
        }
        Ok(members)
    }

    /// `GET /api/fronters`
    #[instrument(skip(self))]
    pub async fn fronters(&self) -> Result<FrontingEntry, ApiError> {
        let raw: Option<FrontingEntry> = self.get_json(&["api", "fronters"]).await?;
        Ok(raw.unwrap_or_default())
    }

    /// `GET /api/system`. A malformed mental state reads as absent.
    #[instrument(skip(self))]
    pub async fn system(&self) -> Result<SystemInfo, ApiError> {
        let raw: RawSystemInfo = self.get_json(&["api", "system"]).await?;
        let mental_state = raw
            .mental_state
            .and_then(|v| serde_json::from_value::<MentalState>(v).ok());
        Ok(SystemInfo {
            id: raw.id,
            name: raw.name,
            description: raw.description,
            tag: raw.tag,
            mental_state,
        })
    }

    /// `GET /api/member/{id}`, by id or case-insensitive name.
    #[instrument(skip(self))]
    pub async fn member(&self, identifier: &str) -> Result<Member, ApiError> {
        self.get_json(&["api", "member", identifier]).await
    }

    /// `GET /api/members/{id}/status`. `Ok(None)` means no status is set.
    #[instrument(skip(self))]
    pub async fn member_status(&self, identifier: &str) -> Result<Option<MemberStatus>, ApiError> {
        let raw: StatusResponse = self
            .get_json(&["api", "members", identifier, "status"])
            .await?;
        Ok(raw.status.and_then(MemberStatus::from_value))
    }

    /// `GET /api/is_admin`
    #[instrument(skip(self))]
    pub async fn is_admin(&self) -> Result<bool, ApiError> {
        let raw: AdminResponse = self.get_json(&["api", "is_admin"]).await?;
        Ok(raw.is_admin)
    }
}
