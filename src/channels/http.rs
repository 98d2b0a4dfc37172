//! REST chat platform client.
//!
//! Endpoints (relative to the configured base URL):
//! - `POST /channels/{id}/messages` with `{"sender_id", "text"}`
//! - `GET  /channels/{id}/messages?user_id=&limit=&before=` → `{"messages": [...]}`
//! - `GET  /channels/{id}` → `ChannelInfo`
//!
//! The channel id is percent-encoded as a single path segment.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use reqwest::Url;
use serde::Deserialize;

use crate::channels::client::{ChannelInfo, ChannelMessage, ChatClient, HistoryQuery};
use crate::error::{ChannelError, ConfigError};

/// Connection settings for the chat platform.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub base_url: Url,
    pub token: SecretString,
    pub timeout: Duration,
}

impl ChatConfig {
    pub fn from_env(timeout: Duration) -> Result<Self, ConfigError> {
        let base_url = std::env::var("MARKET_CHAT_BASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("MARKET_CHAT_BASE_URL".into()))?;
        let base_url = Url::parse(&base_url).map_err(|e| ConfigError::InvalidValue {
            key: "MARKET_CHAT_BASE_URL".into(),
            message: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidValue {
                key: "MARKET_CHAT_BASE_URL".into(),
                message: format!("{base_url} cannot carry a path"),
            });
        }
        let token = std::env::var("MARKET_CHAT_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("MARKET_CHAT_TOKEN".into()))?;
        Ok(Self {
            base_url,
            token: SecretString::from(token),
            timeout,
        })
    }
}

/// Empty, `.` or `..` (plain or percent-encoded) would not survive as a
/// path segment of their own.
fn is_dot_segment(id: &str) -> bool {
    let decoded = id.to_ascii_lowercase().replace("%2e", ".");
    matches!(decoded.as_str(), "" | "." | "..")
}

#[derive(Debug, Deserialize)]
struct HistoryPage {
    #[serde(default)]
    messages: Vec<ChannelMessage>,
}

/// Chat platform client over HTTP.
pub struct HttpChatClient {
    base_url: Url,
    token: SecretString,
    client: reqwest::Client,
}

impl HttpChatClient {
    pub fn new(config: &ChatConfig) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChannelError::InvalidResponse(format!("HTTP client: {e}")))?;
        Ok(Self {
            base_url: config.base_url.clone(),
            token: config.token.clone(),
            client,
        })
    }

    /// `{base}/channels/{channel_id}[/messages]`, with the id escaped.
    fn channel_url(&self, channel_id: &str, messages: bool) -> Result<Url, String> {
        if is_dot_segment(channel_id) {
            return Err(format!("invalid channel id {channel_id:?}"));
        }
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| format!("{} cannot carry a path", self.base_url))?;
            segments.pop_if_empty().push("channels").push(channel_id);
            if messages {
                segments.push("messages");
            }
        }
        Ok(url)
    }

    fn history_params(query: &HistoryQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("user_id", query.user_id.clone()),
            ("limit", query.limit.to_string()),
        ];
        if let Some(before) = query.before {
            params.push(("before", before.to_string()));
        }
        params
    }
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn send_message(
        &self,
        channel_id: &str,
        sender_id: &str,
        text: &str,
    ) -> Result<(), ChannelError> {
        let send_err = |reason: String| ChannelError::SendFailed {
            channel: channel_id.into(),
            reason,
        };
        let url = self.channel_url(channel_id, true).map_err(send_err)?;
        let body = serde_json::json!({
            "sender_id": sender_id,
            "text": text,
        });

        let resp = self
            .client
            .post(url)
            .bearer_auth(self.token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| send_err(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            return Err(send_err(format!("HTTP {status}: {err}")));
        }

        tracing::debug!(channel_id, sender_id, "Message sent");
        Ok(())
    }

    async fn fetch_history(
        &self,
        query: &HistoryQuery,
    ) -> Result<Vec<ChannelMessage>, ChannelError> {
        let fetch_err = |reason: String| ChannelError::FetchFailed {
            channel: query.channel_id.clone(),
            reason,
        };

        let url = self.channel_url(&query.channel_id, true).map_err(fetch_err)?;

        let resp = self
            .client
            .get(url)
            .bearer_auth(self.token.expose_secret())
            .query(&Self::history_params(query))
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            return Err(fetch_err(format!("HTTP {status}: {err}")));
        }

        let page: HistoryPage = resp
            .json()
            .await
            .map_err(|e| fetch_err(format!("decode: {e}")))?;
        Ok(page.messages)
    }

    async fn get_channel_info(&self, channel_id: &str) -> Result<ChannelInfo, ChannelError> {
        let info_err = |reason: String| ChannelError::InfoFailed {
            channel: channel_id.into(),
            reason,
        };

        let url = self.channel_url(channel_id, false).map_err(info_err)?;

        let resp = self
            .client
            .get(url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| info_err(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            return Err(info_err(format!("HTTP {status}: {err}")));
        }

        resp.json()
            .await
            .map_err(|e| info_err(format!("decode: {e}")))
    }
}
