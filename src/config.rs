use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::tier::Limit;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub twitch: TwitchConfig,
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub community: CommunityConfig,
    #[serde(default)]
    pub emotes: EmotesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TwitchConfig {
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_bot_username")]
    pub bot_username: String,
    /// Resolved from TWITCH_CLIENT_ID at load time; not read from the file.
    #[serde(skip)]
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: String,
    #[serde(default = "default_clip_duration")]
    pub clip_default_duration: u32,
    #[serde(default = "default_clip_min_duration")]
    pub clip_min_duration: u32,
    #[serde(default = "default_clip_max_duration")]
    pub clip_max_duration: u32,
    #[serde(default = "default_clip_cooldown_secs")]
    pub clip_cooldown_secs: u64,
}

impl Default for TwitchConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            bot_username: default_bot_username(),
            client_id: String::new(),
            client_secret: String::new(),
            clip_default_duration: default_clip_duration(),
            clip_min_duration: default_clip_min_duration(),
            clip_max_duration: default_clip_max_duration(),
            clip_cooldown_secs: default_clip_cooldown_secs(),
        }
    }
}

fn default_channel() -> String {
    "teseo".to_string()
}
fn default_bot_username() -> String {
    "manolitozurrapa".to_string()
}
fn default_clip_duration() -> u32 {
    90
}
fn default_clip_min_duration() -> u32 {
    15
}
fn default_clip_max_duration() -> u32 {
    90
}
fn default_clip_cooldown_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct TokenConfig {
    #[serde(default = "default_tokens_path")]
    pub tokens_path: String,
    /// Periodic validation interval (default 30 minutes).
    #[serde(default = "default_validate_interval_secs")]
    pub validate_interval_secs: u64,
    /// Refresh proactively when the token expires within this window.
    #[serde(default = "default_refresh_ahead_secs")]
    pub refresh_ahead_secs: u64,
    #[serde(default = "default_max_refresh_attempts")]
    pub max_refresh_attempts: u32,
    #[serde(default = "default_refresh_retry_delay_secs")]
    pub refresh_retry_delay_secs: u64,
    #[serde(default = "default_validate_url")]
    pub validate_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_helix_url")]
    pub helix_url: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            tokens_path: default_tokens_path(),
            validate_interval_secs: default_validate_interval_secs(),
            refresh_ahead_secs: default_refresh_ahead_secs(),
            max_refresh_attempts: default_max_refresh_attempts(),
            refresh_retry_delay_secs: default_refresh_retry_delay_secs(),
            validate_url: default_validate_url(),
            token_url: default_token_url(),
            helix_url: default_helix_url(),
        }
    }
}

fn default_tokens_path() -> String {
    "data/tokens.json".to_string()
}
fn default_validate_interval_secs() -> u64 {
    30 * 60
}
fn default_refresh_ahead_secs() -> u64 {
    60 * 60
}
fn default_max_refresh_attempts() -> u32 {
    3
}
fn default_refresh_retry_delay_secs() -> u64 {
    5
}
fn default_validate_url() -> String {
    "https://id.twitch.tv/oauth2/validate".to_string()
}
fn default_token_url() -> String {
    "https://id.twitch.tv/oauth2/token".to_string()
}
fn default_helix_url() -> String {
    "https://api.twitch.tv/helix".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AiConfig {
    #[serde(skip)]
    pub api_key: String,
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,
    #[serde(default = "default_ai_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Global (cross-user) cooldown between LLM replies.
    #[serde(default = "default_reply_cooldown_secs")]
    pub reply_cooldown_secs: u64,
    /// Hard cap on reply length sent to chat.
    #[serde(default = "default_response_chars")]
    pub response_chars: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_ai_base_url(),
            model: default_ai_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            reply_cooldown_secs: default_reply_cooldown_secs(),
            response_chars: default_response_chars(),
        }
    }
}

fn default_ai_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_ai_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}
fn default_max_tokens() -> u32 {
    200
}
fn default_temperature() -> f32 {
    0.7
}
fn default_reply_cooldown_secs() -> u64 {
    3
}
fn default_response_chars() -> usize {
    450
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(skip)]
    pub api_key: String,
    #[serde(default = "default_search_url")]
    pub endpoint: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// Global (cross-user) cooldown between searches.
    #[serde(default = "default_search_cooldown_secs")]
    pub global_cooldown_secs: u64,
    /// Per-user lockout after exhausting the search quota.
    #[serde(default = "default_user_cooldown_mins")]
    pub user_cooldown_mins: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: default_search_url(),
            max_results: default_max_results(),
            global_cooldown_secs: default_search_cooldown_secs(),
            user_cooldown_mins: default_user_cooldown_mins(),
        }
    }
}

fn default_search_url() -> String {
    "https://api.search.brave.com/res/v1/web/search".to_string()
}
fn default_max_results() -> u32 {
    5
}
fn default_search_cooldown_secs() -> u64 {
    5
}
fn default_user_cooldown_mins() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DiscordConfig {
    #[serde(skip)]
    pub webhook_url: String,
}

/// Per-tier quota table for one action kind.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct TierTable {
    pub broadcaster: Limit,
    pub reina: Limit,
    pub moderator: Limit,
    pub vip: Limit,
    pub t3: Limit,
    pub t2: Limit,
    pub t1: Limit,
    pub none: Limit,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct LimitsConfig {
    #[serde(default = "default_message_limits")]
    pub messages: TierTable,
    #[serde(default = "default_search_limits")]
    pub searches: TierTable,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            messages: default_message_limits(),
            searches: default_search_limits(),
        }
    }
}

fn default_message_limits() -> TierTable {
    TierTable {
        broadcaster: Limit::Unlimited,
        reina: Limit::Unlimited,
        moderator: Limit::Unlimited,
        vip: Limit::Unlimited,
        t3: Limit::Unlimited,
        t2: Limit::Finite(60),
        t1: Limit::Finite(30),
        none: Limit::Finite(0),
    }
}

fn default_search_limits() -> TierTable {
    TierTable {
        broadcaster: Limit::Unlimited,
        reina: Limit::Finite(150),
        moderator: Limit::Finite(150),
        vip: Limit::Finite(150),
        t3: Limit::Finite(150),
        t2: Limit::Finite(10),
        t1: Limit::Finite(0),
        none: Limit::Finite(0),
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub dir: String,
    #[serde(default = "default_memory_cleanup_secs")]
    pub memory_cleanup_secs: u64,
    #[serde(default = "default_context_path")]
    pub context_path: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
            memory_cleanup_secs: default_memory_cleanup_secs(),
            context_path: default_context_path(),
        }
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}
fn default_memory_cleanup_secs() -> u64 {
    30 * 60
}
fn default_context_path() -> String {
    "CONTEXTO.md".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummaryConfig {
    #[serde(default = "default_summary_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_summary_interval_secs(),
        }
    }
}

fn default_summary_interval_secs() -> u64 {
    30 * 60
}

/// Community role lists, all lowercase login names.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CommunityConfig {
    #[serde(default)]
    pub reina: Vec<String>,
    #[serde(default)]
    pub mods: Vec<String>,
    #[serde(default)]
    pub vips: Vec<String>,
    /// login -> months subscribed.
    #[serde(default)]
    pub subs: HashMap<String, u32>,
    /// login -> subs gifted.
    #[serde(default)]
    pub gifters: HashMap<String, u32>,
    #[serde(default)]
    pub bots: Vec<String>,
    /// Users whose fast quota consumption is also echoed to the daemon log.
    #[serde(default)]
    pub watched_users: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EmotesConfig {
    #[serde(default)]
    pub happy: Vec<String>,
    #[serde(default)]
    pub love: Vec<String>,
    #[serde(default)]
    pub clap: Vec<String>,
    #[serde(default)]
    pub sad: Vec<String>,
    #[serde(default)]
    pub funny: Vec<String>,
}

impl AppConfig {
    /// Load config.toml (missing file means all defaults) and resolve
    /// secrets from the environment.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config: AppConfig = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            AppConfig::default()
        };

        config.twitch.client_id = std::env::var("TWITCH_CLIENT_ID").unwrap_or_default();
        config.twitch.client_secret = std::env::var("TWITCH_CLIENT_SECRET").unwrap_or_default();
        config.ai.api_key = std::env::var("GROQ_API_KEY").unwrap_or_default();
        config.search.api_key = std::env::var("BRAVE_API_KEY").unwrap_or_default();
        config.discord.webhook_url = std::env::var("DISCORD_WEBHOOK_URL").unwrap_or_default();

        if config.twitch.client_id.is_empty() || config.twitch.client_secret.is_empty() {
            anyhow::bail!("TWITCH_CLIENT_ID and TWITCH_CLIENT_SECRET must be set in the environment");
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::Limit;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.twitch.clip_default_duration, 90);
        assert_eq!(config.token.validate_interval_secs, 1800);
        assert_eq!(config.token.refresh_ahead_secs, 3600);
        assert_eq!(config.token.max_refresh_attempts, 3);
        assert_eq!(config.search.user_cooldown_mins, 10);
        assert_eq!(config.limits.messages.t1, Limit::Finite(30));
    }

    #[test]
    fn limits_parse_from_toml() {
        let toml_src = r#"
            [limits.messages]
            broadcaster = "unlimited"
            reina = "unlimited"
            moderator = "unlimited"
            vip = "unlimited"
            t3 = "unlimited"
            t2 = 40
            t1 = 20
            none = 0
        "#;
        let config: AppConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.limits.messages.t2, Limit::Finite(40));
        assert_eq!(config.limits.messages.broadcaster, Limit::Unlimited);
        // untouched table keeps defaults
        assert_eq!(config.limits.searches.t2, Limit::Finite(10));
    }
}
