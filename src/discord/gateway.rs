//! The remote gateway seam.
//!
//! [`DiscordGateway`] is the narrow trait the delivery side talks through:
//! identify, enumerate guilds and text channels, create a channel, send a
//! message, create a thread, attach files. The production implementation
//! is [`crate::discord::rest::RestGateway`]; tests substitute a recorder.
//!
//! [`GatewayError`] carries the one distinction the retry policy needs:
//! rate-limited (wait the server-supplied duration) versus everything else
//! (wait per the backoff schedule).

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::model::{Link, ParsedMessage};

/// The maximum number of rich-link previews Discord accepts on one message.
pub const MAX_EMBEDS_PER_MESSAGE: usize = 10;

/// A failure from a remote gateway call.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// The server throttled us and told us how long to wait.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Server-supplied wait duration
        retry_after: Duration,
    },

    /// The server answered with a non-success HTTP status.
    #[error("HTTP status {status}: {message}")]
    Status {
        /// The HTTP status code
        status: u16,
        /// Response body text, for the log
        message: String,
    },

    /// The request never completed (connection, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A local file to upload could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl GatewayError {
    /// The server-supplied wait, if this is a rate-limit response.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GatewayError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Returns `true` if this is a rate-limit response.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GatewayError::RateLimited { .. })
    }
}

// ============================================================================
// Handles
// ============================================================================

/// A Discord server (guild) the bot belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Guild {
    /// Snowflake id
    pub id: String,
    /// Display name
    pub name: String,
}

/// A text channel on the destination server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelHandle {
    /// Snowflake id
    pub id: String,
    /// Channel name
    pub name: String,
}

/// A message that has been sent, as returned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SentMessage {
    /// Snowflake id of the message
    pub id: String,
    /// Channel the message landed in
    pub channel_id: String,
}

/// A thread created from a root message. Threads are sendable like
/// channels, via their own id.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ThreadHandle {
    /// Snowflake id of the thread
    pub id: String,
    /// Thread name
    pub name: String,
}

/// The identity behind the supplied credential.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BotIdentity {
    /// Snowflake id of the bot user
    pub id: String,
    /// Bot username
    pub username: String,
}

// ============================================================================
// Outgoing payloads
// ============================================================================

/// A rich-link preview in the shape Discord accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedImage>,
}

/// The author block of an embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct EmbedAuthor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

/// An image or thumbnail block of an embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

impl From<&Link> for Embed {
    /// Maps a parsed [`Link`] field-for-field onto an [`Embed`].
    fn from(link: &Link) -> Self {
        let author = if link.service_name.is_some() || link.service_icon.is_some() {
            Some(EmbedAuthor {
                name: link.service_name.clone(),
                icon_url: link.service_icon.clone(),
            })
        } else {
            None
        };

        Embed {
            title: link.title.clone(),
            url: link.title_link.clone(),
            description: link.text.clone(),
            author,
            image: link.image_url.clone().map(|url| EmbedImage { url }),
            thumbnail: link.thumb_url.clone().map(|url| EmbedImage { url }),
        }
    }
}

/// The text-and-previews body of one send call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessagePayload {
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

impl MessagePayload {
    /// Builds the payload for a parsed message.
    ///
    /// A link list longer than [`MAX_EMBEDS_PER_MESSAGE`] is truncated
    /// with a warning; the remote protocol caps previews per message.
    pub fn from_message(message: &ParsedMessage) -> Self {
        let links = message.links();
        if links.len() > MAX_EMBEDS_PER_MESSAGE {
            warn!(
                links = links.len(),
                max = MAX_EMBEDS_PER_MESSAGE,
                "number of links exceeds the Discord max, truncating list"
            );
        }

        MessagePayload {
            content: message.text.clone(),
            embeds: links
                .iter()
                .take(MAX_EMBEDS_PER_MESSAGE)
                .map(Embed::from)
                .collect(),
        }
    }
}

/// One local file to upload onto a sent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    /// Local path written by the downloader
    pub path: PathBuf,
    /// Name Discord should give the attachment
    pub filename: String,
}

// ============================================================================
// The gateway trait
// ============================================================================

/// The remote calls the importer needs from Discord.
///
/// Implementations must be safe to call from the single posting task;
/// nothing here is called concurrently.
#[async_trait]
pub trait DiscordGateway: Send + Sync {
    /// Validates the credential and returns the bot identity.
    async fn identify(&self) -> Result<BotIdentity, GatewayError>;

    /// Lists the guilds the credentialed identity belongs to.
    async fn guilds(&self) -> Result<Vec<Guild>, GatewayError>;

    /// Lists the text channels of a guild.
    async fn text_channels(&self, guild_id: &str) -> Result<Vec<ChannelHandle>, GatewayError>;

    /// Creates a text channel with the given name.
    async fn create_text_channel(
        &self,
        guild_id: &str,
        name: &str,
    ) -> Result<ChannelHandle, GatewayError>;

    /// Sends a message to a channel or thread.
    async fn send_message(
        &self,
        channel_id: &str,
        payload: &MessagePayload,
    ) -> Result<SentMessage, GatewayError>;

    /// Creates a thread anchored at a previously sent message.
    async fn create_thread(
        &self,
        message: &SentMessage,
        name: &str,
    ) -> Result<ThreadHandle, GatewayError>;

    /// Uploads files as attachments onto a previously sent message.
    async fn attach_files(
        &self,
        message: &SentMessage,
        files: &[FileUpload],
    ) -> Result<(), GatewayError>;
}

// ============================================================================
// Tests
// ============================================================================
