//! Notification texts and cover images
//!
//! Whether a notice carries the room cover is decided by the cover fetch: if
//! the download fails the same caption is sent as plain text.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use tracing::{instrument, trace, warn};

use crate::RoomSnapshot;
use crate::storage::TransitionKind;

use super::NotificationMessage;

#[async_trait]
pub trait CoverFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>>;
}

pub struct HttpCoverFetcher {
    client: Client,
}

impl HttpCoverFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build cover HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl CoverFetcher for HttpCoverFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("failed to request cover")?;

        if !response.status().is_success() {
            anyhow::bail!("cover request failed with status {}", response.status());
        }

        let bytes = response.bytes().await.context("failed to read cover body")?;
        if bytes.is_empty() {
            anyhow::bail!("cover is empty");
        }

        trace!("fetched cover ({} bytes)", bytes.len());
        Ok(bytes.to_vec())
    }
}

#[derive(Clone)]
pub struct Renderer {
    covers: Arc<dyn CoverFetcher>,
}

impl Renderer {
    pub fn new(covers: Arc<dyn CoverFetcher>) -> Self {
        Self { covers }
    }

    pub async fn title_change(&self, host_name: &str, snapshot: &RoomSnapshot) -> NotificationMessage {
        let caption = format!(
            "{host_name} changed the stream title!\n\n[{}]",
            snapshot.title
        );
        self.with_cover(caption, snapshot.cover_url.as_deref()).await
    }

    pub async fn transition(
        &self,
        kind: TransitionKind,
        host_name: &str,
        snapshot: &RoomSnapshot,
    ) -> NotificationMessage {
        match kind {
            TransitionKind::LiveStart => {
                let mut caption = String::new();
                if let Some(since) = &snapshot.live_since {
                    caption.push_str(since);
                    caption.push('\n');
                }
                caption.push_str(&format!("{host_name} is live!\n\n[{}]", snapshot.title));

                self.with_cover(caption, snapshot.cover_url.as_deref()).await
            }
            TransitionKind::LiveEnd => NotificationMessage::Text {
                text: format!("{host_name} went offline"),
            },
            TransitionKind::LiveEndViaCycle => NotificationMessage::Text {
                text: format!("{host_name} went offline (replay playlist running)"),
            },
        }
    }

    async fn with_cover(&self, caption: String, cover_url: Option<&str>) -> NotificationMessage {
        let Some(url) = cover_url else {
            return NotificationMessage::Text { text: caption };
        };

        match self.covers.fetch(url).await {
            Ok(image) => NotificationMessage::Image { image, caption },
            Err(e) => {
                warn!("cover unavailable, sending text only: {e:#}");
                NotificationMessage::Text { text: caption }
            }
        }
    }
}
