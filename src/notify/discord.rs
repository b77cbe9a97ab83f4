use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use tracing::{error, instrument, trace};

use crate::DestinationId;
use crate::config::Discord;

use super::{DeliveryError, NotificationMessage, TransportSession};

/// File name the embed refers to via `attachment://`
const COVER_FILE_NAME: &str = "cover.jpg";

/// Bilibili pink
const EMBED_COLOR: u32 = 16475016;

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

/// Discord webhooks, one per destination
pub struct DiscordSession {
    name: String,
    webhooks: HashMap<DestinationId, String>,
    client: Client,
}

impl DiscordSession {
    pub fn new(config: &Discord, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build Discord HTTP client")?;

        Ok(Self {
            name: config.name.clone(),
            webhooks: config.webhooks.clone(),
            client,
        })
    }

    fn build_cover_embed(caption: &str) -> Embed {
        Embed {
            description: Some(caption.to_string()),
            color: Some(EMBED_COLOR),
            image: Some(EmbedImage {
                url: format!("attachment://{COVER_FILE_NAME}"),
            }),
            timestamp: Some(Utc::now().to_rfc3339()),
        }
    }

    async fn post(&self, request: reqwest::RequestBuilder) -> Result<(), DeliveryError> {
        let response = request
            .send()
            .await
            .map_err(|e| DeliveryError::Http(e.to_string()))?;

        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error!("Discord API error response: {}", body);

        Err(DeliveryError::Rejected(format!("HTTP {status}: {body}")))
    }
}

#[async_trait]
impl TransportSession for DiscordSession {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, message), fields(session = %self.name))]
    async fn send(
        &self,
        destination: DestinationId,
        message: &NotificationMessage,
    ) -> Result<(), DeliveryError> {
        let url = self
            .webhooks
            .get(&destination)
            .ok_or(DeliveryError::UnknownDestination(destination))?;

        let request = match message {
            NotificationMessage::Text { text } => {
                let payload = MessageBuilder::new().content(text).build();
                self.client.post(url).json(&payload)
            }
            NotificationMessage::Image { image, caption } => {
                let payload = MessageBuilder::new()
                    .add_embed(Self::build_cover_embed(caption))
                    .build();
                let payload_json = serde_json::to_string(&payload)
                    .map_err(|e| DeliveryError::Http(e.to_string()))?;

                let cover = Part::bytes(image.clone())
                    .file_name(COVER_FILE_NAME)
                    .mime_str("image/jpeg")
                    .map_err(|e| DeliveryError::Http(e.to_string()))?;
                let form = Form::new()
                    .text("payload_json", payload_json)
                    .part("files[0]", cover);

                self.client.post(url).multipart(form)
            }
        };

        self.post(request).await?;

        trace!("webhook message sent to {destination}");
        Ok(())
    }
}
