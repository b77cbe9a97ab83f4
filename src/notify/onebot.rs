//! OneBot HTTP transport
//!
//! Group messages go through `POST {url}/send_group_msg`. Images are inlined
//! as a base64 CQ code in front of the caption.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{instrument, trace};

use crate::DestinationId;
use crate::config::OneBot;

use super::{DeliveryError, NotificationMessage, TransportSession};

#[derive(Debug, Serialize)]
struct GroupMessage<'a> {
    group_id: i64,
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct ActionResponse {
    status: String,
    #[serde(default)]
    retcode: i64,
    #[serde(default)]
    wording: Option<String>,
}

pub struct OneBotSession {
    name: String,
    url: String,
    access_token: Option<String>,
    client: Client,
}

impl OneBotSession {
    pub fn new(config: &OneBot, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build OneBot HTTP client")?;

        Ok(Self {
            name: config.name.clone(),
            url: config.url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            client,
        })
    }

    fn render(message: &NotificationMessage) -> String {
        match message {
            NotificationMessage::Image { image, caption } => format!(
                "[CQ:image,file=base64://{}]\n{}",
                STANDARD.encode(image),
                caption
            ),
            NotificationMessage::Text { text } => text.clone(),
        }
    }
}

#[async_trait]
impl TransportSession for OneBotSession {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, message), fields(session = %self.name))]
    async fn send(
        &self,
        destination: DestinationId,
        message: &NotificationMessage,
    ) -> Result<(), DeliveryError> {
        let body = Self::render(message);
        let mut request = self
            .client
            .post(format!("{}/send_group_msg", self.url))
            .json(&GroupMessage {
                group_id: destination.0,
                message: &body,
            });

        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DeliveryError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DeliveryError::Http(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let action: ActionResponse = response
            .json()
            .await
            .map_err(|e| DeliveryError::Http(format!("invalid response body: {e}")))?;

        if action.status != "ok" {
            return Err(DeliveryError::Rejected(format!(
                "retcode {}: {}",
                action.retcode,
                action.wording.unwrap_or(action.status)
            )));
        }

        trace!("group message sent to {destination}");
        Ok(())
    }
}
