//! Operator notifications over a Discord webhook.
//!
//! All sends are best-effort: a broken webhook must never take the bot down,
//! so failures are logged and swallowed here.

use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

pub struct DiscordNotifier {
    client: Client,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(webhook_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("reqwest client");
        Self {
            client,
            webhook_url: webhook_url.to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.webhook_url.is_empty()
    }

    async fn post(&self, body: serde_json::Value) {
        if !self.is_configured() {
            debug!("Discord webhook not configured, skipping notification");
            return;
        }
        match self.client.post(&self.webhook_url).json(&body).send().await {
            Ok(resp) if !resp.status().is_success() => {
                warn!(status = %resp.status(), "Discord webhook rejected the message");
            }
            Ok(_) => {}
            Err(e) => warn!("Could not reach Discord webhook: {}", e),
        }
    }

    /// Announce a fresh clip in the clips channel.
    pub async fn announce_clip(&self, url: &str, requested_by: &str) {
        self.post(json!({
            "content": format!("🎬 Nuevo clip pedido por **{}**: {}", requested_by, url),
        }))
        .await;
    }

    /// Alert the operator about a credential problem. These are the ones
    /// that need a human.
    pub async fn operator_alert(&self, title: &str, detail: &str) {
        self.post(json!({
            "embeds": [{
                "title": title,
                "description": detail,
                "color": 0xE74C3C,
            }],
        }))
        .await;
    }

    /// Drop the periodic stream summary in the summaries channel.
    pub async fn post_summary(&self, summary: &str) {
        self.post(json!({
            "content": format!("📝 {}", summary),
        }))
        .await;
    }
}
