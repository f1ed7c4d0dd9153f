//! REST implementation of [`DiscordGateway`] over the Discord HTTP API.
//!
//! One `reqwest::Client`, Bot-token auth on every request, JSON bodies,
//! and a multipart PATCH for attaching files to a sent message. A 429
//! response is classified as [`GatewayError::RateLimited`] carrying the
//! server-supplied wait; any other non-success status becomes
//! [`GatewayError::Status`] with the body text for the log.
//!
//! The base URL is injectable so tests can point the gateway at a local
//! mock server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::gateway::{
    BotIdentity, ChannelHandle, DiscordGateway, FileUpload, GatewayError, Guild, MessagePayload,
    SentMessage, ThreadHandle,
};

/// Production Discord REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://discord.com/api/v10";

/// Wait applied when a 429 response carries no usable retry hint.
const FALLBACK_RATE_LIMIT_WAIT: Duration = Duration::from_secs(5);

/// Discord's channel type id for a guild text channel.
const GUILD_TEXT_CHANNEL: u8 = 0;

/// [`DiscordGateway`] over the Discord REST API.
pub struct RestGateway {
    http: Client,
    token: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct RawChannel {
    id: String,
    name: String,
    #[serde(rename = "type")]
    kind: u8,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

impl RestGateway {
    /// Creates a gateway authenticating with the given bot token.
    pub fn new(token: impl Into<String>) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .user_agent(concat!("slackport/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            token: token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Overrides the API base URL (tests point this at a mock server).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header(AUTHORIZATION, format!("Bot {}", self.token))
    }

    async fn check(response: Response) -> Result<Response, GatewayError> {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let header_wait = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<f64>().ok());
            let wait = match header_wait {
                Some(wait) => Some(wait),
                None => response
                    .json::<RateLimitBody>()
                    .await
                    .ok()
                    .map(|body| body.retry_after),
            };
            return Err(GatewayError::RateLimited {
                retry_after: wait.map_or(FALLBACK_RATE_LIMIT_WAIT, |secs| {
                    Duration::from_secs_f64(secs.max(0.0))
                }),
            });
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::UnexpectedResponse(e.to_string()))
    }
}

#[async_trait]
impl DiscordGateway for RestGateway {
    async fn identify(&self) -> Result<BotIdentity, GatewayError> {
        let response = self.request(Method::GET, "/users/@me").send().await?;
        Self::decode(Self::check(response).await?).await
    }

    async fn guilds(&self) -> Result<Vec<Guild>, GatewayError> {
        let response = self.request(Method::GET, "/users/@me/guilds").send().await?;
        Self::decode(Self::check(response).await?).await
    }

    async fn text_channels(&self, guild_id: &str) -> Result<Vec<ChannelHandle>, GatewayError> {
        let response = self
            .request(Method::GET, &format!("/guilds/{guild_id}/channels"))
            .send()
            .await?;
        let channels: Vec<RawChannel> = Self::decode(Self::check(response).await?).await?;
        Ok(channels
            .into_iter()
            .filter(|c| c.kind == GUILD_TEXT_CHANNEL)
            .map(|c| ChannelHandle {
                id: c.id,
                name: c.name,
            })
            .collect())
    }

    async fn create_text_channel(
        &self,
        guild_id: &str,
        name: &str,
    ) -> Result<ChannelHandle, GatewayError> {
        // Requires the "Manage Channels" permission on the guild.
        let response = self
            .request(Method::POST, &format!("/guilds/{guild_id}/channels"))
            .json(&serde_json::json!({ "name": name, "type": GUILD_TEXT_CHANNEL }))
            .send()
            .await?;
        let channel: RawChannel = Self::decode(Self::check(response).await?).await?;
        debug!(channel = %channel.name, id = %channel.id, "text channel created");
        Ok(ChannelHandle {
            id: channel.id,
            name: channel.name,
        })
    }

    async fn send_message(
        &self,
        channel_id: &str,
        payload: &MessagePayload,
    ) -> Result<SentMessage, GatewayError> {
        let response = self
            .request(Method::POST, &format!("/channels/{channel_id}/messages"))
            .json(payload)
            .send()
            .await?;
        Self::decode(Self::check(response).await?).await
    }

    async fn create_thread(
        &self,
        message: &SentMessage,
        name: &str,
    ) -> Result<ThreadHandle, GatewayError> {
        let response = self
            .request(
                Method::POST,
                &format!("/channels/{}/messages/{}/threads", message.channel_id, message.id),
            )
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;
        Self::decode(Self::check(response).await?).await
    }

    async fn attach_files(
        &self,
        message: &SentMessage,
        files: &[FileUpload],
    ) -> Result<(), GatewayError> {
        let mut form = multipart::Form::new();
        let mut attachments = Vec::with_capacity(files.len());

        for (index, file) in files.iter().enumerate() {
            let bytes = tokio::fs::read(&file.path).await?;
            let part = multipart::Part::bytes(bytes).file_name(file.filename.clone());
            form = form.part(format!("files[{index}]"), part);
            attachments.push(serde_json::json!({
                "id": index,
                "filename": file.filename,
            }));
        }

        form = form.text(
            "payload_json",
            serde_json::json!({ "attachments": attachments }).to_string(),
        );

        let response = self
            .request(
                Method::PATCH,
                &format!("/channels/{}/messages/{}", message.channel_id, message.id),
            )
            .multipart(form)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
