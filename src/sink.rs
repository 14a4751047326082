//! Publishing assets to a messaging channel over a bot HTTP API

use crate::config::SinkConfig;
use crate::error::PublishError;
use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Proof that the sink accepted a publish
///
/// Carries the channel-side message identifier; callers use it for logging
/// only, never for control flow.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Message identifier assigned by the channel
    pub message_id: i64,
}

/// Interface for publishing assets to the destination channel
///
/// Two publish variants back the per-unit ordering rule: the thumbnail image
/// goes out first, then the main asset referencing it.
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Publish a standalone image with a caption
    async fn publish_image(
        &self,
        image: &Path,
        caption: &str,
    ) -> Result<PublishReceipt, PublishError>;

    /// Publish the main asset as a document with a caption
    ///
    /// `thumbnail` attaches a preview image to the document when given.
    async fn publish_document(
        &self,
        document: &Path,
        caption: &str,
        thumbnail: Option<&Path>,
    ) -> Result<PublishReceipt, PublishError>;
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    result: Option<MessageRef>,
}

#[derive(Deserialize)]
struct MessageRef {
    message_id: i64,
}

/// Sink backed by a Telegram-style bot HTTP API
///
/// Publishes with multipart POSTs to `{endpoint}/sendPhoto` and
/// `{endpoint}/sendDocument`. One HTTP client is built at construction and
/// reused for every call; each call is bounded by the configured publish
/// timeout.
///
/// # Examples
///
/// ```no_run
/// use tracklift::config::SinkConfig;
/// use tracklift::sink::{BotApiSink, MediaSink};
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let sink = BotApiSink::new(SinkConfig {
///     endpoint: "https://api.telegram.org/bot<token>".into(),
///     channel: -1_001_234_567,
///     ..SinkConfig::default()
/// })?;
///
/// let receipt = sink
///     .publish_image(Path::new("temp/unit-1/song_thumb.png"), "Metadata:\nYear: 2023")
///     .await?;
/// println!("published as message {}", receipt.message_id);
/// # Ok(())
/// # }
/// ```
pub struct BotApiSink {
    client: reqwest::Client,
    endpoint: String,
    channel: i64,
    timeout: Duration,
}

impl BotApiSink {
    /// Create a sink from its configuration
    ///
    /// Fails only when the underlying HTTP client cannot be constructed.
    pub fn new(config: SinkConfig) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tracklift/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            channel: config.channel,
            timeout: config.publish_timeout,
        })
    }

    async fn file_part(path: &Path) -> Result<multipart::Part, PublishError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PublishError::AssetUnreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("asset")
            .to_string();
        Ok(multipart::Part::bytes(bytes).file_name(file_name))
    }

    fn base_form(&self, caption: &str) -> multipart::Form {
        multipart::Form::new()
            .text("chat_id", self.channel.to_string())
            .text("caption", caption.to_string())
    }

    async fn send(
        &self,
        method: &str,
        form: multipart::Form,
    ) -> Result<PublishReceipt, PublishError> {
        let url = format!("{}/{}", self.endpoint, method);
        let request = self.client.post(&url).multipart(form);

        let response = match tokio::time::timeout(self.timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(PublishError::Transport(e.to_string())),
            Err(_) => {
                return Err(PublishError::TimedOut {
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| PublishError::MalformedResponse(e.to_string()))?;
        match parsed.result {
            Some(message) if parsed.ok => {
                debug!(method, message_id = message.message_id, "publish accepted");
                Ok(PublishReceipt {
                    message_id: message.message_id,
                })
            }
            _ => Err(PublishError::MalformedResponse(
                "response carried no message reference".to_string(),
            )),
        }
    }
}

#[async_trait]
impl MediaSink for BotApiSink {
    async fn publish_image(
        &self,
        image: &Path,
        caption: &str,
    ) -> Result<PublishReceipt, PublishError> {
        let form = self
            .base_form(caption)
            .part("photo", Self::file_part(image).await?);
        self.send("sendPhoto", form).await
    }

    async fn publish_document(
        &self,
        document: &Path,
        caption: &str,
        thumbnail: Option<&Path>,
    ) -> Result<PublishReceipt, PublishError> {
        let mut form = self
            .base_form(caption)
            .part("document", Self::file_part(document).await?);

        // The thumbnail is best-effort all the way down: an unreadable
        // preview never blocks the main asset.
        if let Some(thumb) = thumbnail {
            match Self::file_part(thumb).await {
                Ok(part) => form = form.part("thumbnail", part),
                Err(e) => {
                    warn!(thumbnail = %thumb.display(), error = %e, "skipping unreadable thumbnail");
                }
            }
        }

        self.send("sendDocument", form).await
    }
}
