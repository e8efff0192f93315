//! Helix API calls, authenticated through the token manager.

use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::token::TokenManager;

pub struct HelixClient {
    tokens: Arc<TokenManager>,
    helix_url: String,
    channel: String,
    /// The channel's user id, resolved once and cached.
    broadcaster_id: RwLock<Option<String>>,
}

impl HelixClient {
    pub fn new(tokens: Arc<TokenManager>, helix_url: &str, channel: &str) -> Self {
        Self {
            tokens,
            helix_url: helix_url.trim_end_matches('/').to_string(),
            channel: channel.to_string(),
            broadcaster_id: RwLock::new(None),
        }
    }

    pub async fn broadcaster_id(&self) -> anyhow::Result<String> {
        if let Some(id) = self.broadcaster_id.read().await.clone() {
            return Ok(id);
        }

        let url = format!("{}/users?login={}", self.helix_url, self.channel);
        let resp = self.tokens.authenticated_request(Method::GET, &url).await?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("users lookup returned {}", status);
        }

        let data: Value = resp.json().await?;
        let id = data["data"]
            .get(0)
            .and_then(|u| u["id"].as_str())
            .ok_or_else(|| anyhow::anyhow!("channel {} not found", self.channel))?
            .to_string();

        info!(channel = %self.channel, id = %id, "Broadcaster id resolved");
        *self.broadcaster_id.write().await = Some(id.clone());
        Ok(id)
    }

    /// Create a clip of the live stream and return its public URL.
    /// Fails when the stream is offline.
    pub async fn create_clip(&self) -> anyhow::Result<String> {
        let broadcaster_id = self.broadcaster_id().await?;
        let url = format!(
            "{}/clips?broadcaster_id={}&has_delay=false",
            self.helix_url, broadcaster_id
        );

        let resp = self.tokens.authenticated_request(Method::POST, &url).await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, "Clip creation failed: {}", body);
            anyhow::bail!("clip creation returned {}", status);
        }

        let data: Value = resp.json().await?;
        let clip_id = data["data"]
            .get(0)
            .and_then(|c| c["id"].as_str())
            .ok_or_else(|| anyhow::anyhow!("no clip id in response"))?;

        Ok(format!("https://clips.twitch.tv/{}", clip_id))
    }
}
