//! Bilibili live client
//!
//! ## Endpoints
//!
//! ```text
//! GET {live_base}/room/v1/Room/get_info?room_id=ID   → status, title, cover, owner uid
//! GET {api_base}/x/space/acc/info?mid=UID             → owner name
//! GET {api_base}/x/web-interface/nav                  → login state of the cookie
//! ```
//!
//! All endpoints wrap their payload in `{ "code": 0, "data": { ... } }`. A non-zero
//! code is mapped onto [`SourceError`].

use std::fmt::Display;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{instrument, trace};

use crate::config::SourceConfig;
use crate::{EntityId, LiveStatus, RoomSnapshot};

use super::{Identity, LiveSource, SourceError};

/// Upstream placeholder for "never went live"
const EMPTY_LIVE_TIME: &str = "0000-00-00 00:00:00";

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    /// Left untyped until the code is checked; error responses carry `[]` here
    #[serde(default)]
    data: Option<serde_json::Value>,
}

impl Envelope {
    fn reason(&self) -> &str {
        self.message
            .as_deref()
            .filter(|m| !m.is_empty())
            .or(self.msg.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct RoomData {
    uid: u64,
    live_status: i64,
    title: String,
    #[serde(default)]
    user_cover: Option<String>,
    #[serde(default)]
    live_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserData {
    name: String,
}

#[derive(Debug, Deserialize)]
struct NavData {
    #[serde(rename = "isLogin")]
    is_login: bool,
    #[serde(default)]
    mid: Option<u64>,
    #[serde(default)]
    uname: Option<String>,
}

/// [`LiveSource`] backed by the public Bilibili HTTP API
#[derive(Debug, Clone)]
pub struct BilibiliClient {
    /// HTTP client (reused across requests)
    client: Client,
    live_base: String,
    api_base: String,
    cookie: Option<String>,
}

impl BilibiliClient {
    /// Build a client; `proxy` routes every request through the given URL
    pub fn new(config: &SourceConfig, proxy: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone());

        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy).context("invalid proxy URL")?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().context("failed to build HTTP client")?;

        Ok(Self {
            client,
            live_base: config.live_base.trim_end_matches('/').to_string(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            cookie: config.cookie.clone(),
        })
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Envelope, SourceError> {
        trace!("requesting {url}");

        let mut request = self.client.get(url).query(query);
        if let Some(cookie) = &self.cookie {
            request = request.header(header::COOKIE, cookie);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SourceError::NetworkFailure(format!("request to {url} failed: {e}")))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(SourceError::NotFound(format!("{url} returned 404")));
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(SourceError::AuthInvalid(format!(
                    "{url} returned {}",
                    response.status()
                )));
            }
            status if !status.is_success() => {
                return Err(SourceError::NetworkFailure(format!("HTTP error: {status}")));
            }
            _ => {}
        }

        response
            .json::<Envelope>()
            .await
            .map_err(|e| SourceError::NetworkFailure(format!("failed to decode response: {e}")))
    }
}

/// Map a non-zero upstream code onto the error taxonomy
fn classify(code: i64, reason: &str, subject: impl Display) -> SourceError {
    match code {
        -101 => SourceError::AuthInvalid(format!("{subject}: {reason}")),
        -404 | 1 | 60004 => SourceError::NotFound(format!("{subject}: {reason}")),
        _ => SourceError::NetworkFailure(format!(
            "upstream rejected request for {subject}: code {code} ({reason})"
        )),
    }
}

fn unwrap_data<T: DeserializeOwned>(envelope: Envelope, subject: &str) -> Result<T, SourceError> {
    if envelope.code != 0 {
        return Err(classify(envelope.code, envelope.reason(), subject));
    }

    let data = envelope
        .data
        .ok_or_else(|| SourceError::NetworkFailure(format!("{subject}: response without data")))?;

    serde_json::from_value(data)
        .map_err(|e| SourceError::NetworkFailure(format!("{subject}: unexpected payload: {e}")))
}

#[async_trait]
impl LiveSource for BilibiliClient {
    #[instrument(skip(self), fields(entity = %entity))]
    async fn fetch_status(&self, entity: EntityId) -> Result<RoomSnapshot, SourceError> {
        let url = format!("{}/room/v1/Room/get_info", self.live_base);
        let envelope = self
            .get_json(&url, &[("room_id", entity.to_string())])
            .await?;
        let room: RoomData = unwrap_data(envelope, &format!("room {entity}"))?;

        let status = LiveStatus::from_code(room.live_status).ok_or_else(|| {
            SourceError::NetworkFailure(format!(
                "room {entity}: unknown live status {}",
                room.live_status
            ))
        })?;

        Ok(RoomSnapshot {
            entity_id: entity,
            status,
            title: room.title,
            cover_url: room.user_cover.filter(|url| !url.is_empty()),
            host_id: room.uid,
            live_since: room
                .live_time
                .filter(|time| !time.is_empty() && time != EMPTY_LIVE_TIME),
            observed_at: Utc::now(),
        })
    }

    #[instrument(skip(self))]
    async fn fetch_host_name(&self, host_id: u64) -> Result<String, SourceError> {
        let url = format!("{}/x/space/acc/info", self.api_base);
        let envelope = self
            .get_json(&url, &[("mid", host_id.to_string())])
            .await?;
        let user: UserData = unwrap_data(envelope, &format!("user {host_id}"))?;

        Ok(user.name)
    }

    #[instrument(skip(self))]
    async fn verify_credential(&self) -> Result<Identity, SourceError> {
        if self.cookie.is_none() {
            return Err(SourceError::AuthInvalid(String::from("no cookie configured")));
        }

        let url = format!("{}/x/web-interface/nav", self.api_base);
        let envelope = self.get_json(&url, &[]).await?;
        let nav: NavData = unwrap_data(envelope, "credential check")?;

        if !nav.is_login {
            return Err(SourceError::AuthInvalid(String::from("cookie is not logged in")));
        }

        Ok(Identity {
            uid: nav.mid.unwrap_or_default(),
            name: nav.uname.unwrap_or_default(),
        })
    }
}
