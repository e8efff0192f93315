//! Turns chat events into replies.
//!
//! All the bot's rules meet here: tier derivation, per-user quotas, the
//! global pacing cooldowns, command parsing and the celebration greetings.
//! The handler never talks to the socket itself; it returns the lines to
//! send and the orchestrator ships them.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{error, info, warn};

use crate::chat::{ChatEvent, ChatUser};
use crate::config::AppConfig;
use crate::lang::{self, Lang, LangMap};
use crate::memory::{MemoryStore, Mood};
use crate::services::ai::AiService;
use crate::services::discord::DiscordNotifier;
use crate::services::search::WebSearch;
use crate::services::twitch::HelixClient;
use crate::summary::{StreamMoment, SummaryTracker};
use crate::tier::{derive_tier, ActionKind, Tier};
use crate::usage::{Decision, DenyReason, UsageTracker, VelocityAlert};

/// "busca el precio del bitcoin" inside a mention routes to web search.
static SEARCH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:busca|búscame|buscame|search)\s+(.+)").unwrap());

/// Clip creation, mockable in tests.
#[async_trait]
pub trait ClipMaker: Send + Sync {
    async fn create_clip(&self) -> anyhow::Result<String>;
}

#[async_trait]
impl ClipMaker for HelixClient {
    async fn create_clip(&self) -> anyhow::Result<String> {
        HelixClient::create_clip(self).await
    }
}

pub struct Handler {
    config: AppConfig,
    usage: Mutex<UsageTracker>,
    memory: Arc<MemoryStore>,
    ai: AiService,
    search: Arc<dyn WebSearch>,
    clips: Arc<dyn ClipMaker>,
    discord: Arc<DiscordNotifier>,
    summary: Arc<SummaryTracker>,
    langs: LangMap,
    last_ai: Mutex<Option<Instant>>,
    last_search: Mutex<Option<Instant>>,
    last_clip: Mutex<Option<Instant>>,
}

impl Handler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AppConfig,
        usage: UsageTracker,
        memory: Arc<MemoryStore>,
        ai: AiService,
        search: Arc<dyn WebSearch>,
        clips: Arc<dyn ClipMaker>,
        discord: Arc<DiscordNotifier>,
        summary: Arc<SummaryTracker>,
    ) -> Self {
        Self {
            config,
            usage: Mutex::new(usage),
            memory,
            ai,
            search,
            clips,
            discord,
            summary,
            langs: LangMap::new(),
            last_ai: Mutex::new(None),
            last_search: Mutex::new(None),
            last_clip: Mutex::new(None),
        }
    }

    /// Process one event and return the chat lines to send.
    pub async fn handle(&self, event: &ChatEvent) -> Vec<String> {
        match event {
            ChatEvent::Connected => vec![lang::online(&self.config.twitch.bot_username)],
            ChatEvent::Privmsg { user, text } => self.on_privmsg(user, text).await,
            ChatEvent::Cheer { user, bits, .. } => {
                self.summary.note(StreamMoment::Cheer {
                    name: user.display_name.clone(),
                    bits: *bits,
                });
                vec![lang::greet_cheer(
                    &user.display_name,
                    *bits,
                    &self.memory.pick_emote(Mood::Clap),
                )]
            }
            ChatEvent::Sub {
                display_name,
                is_resub,
                cumulative_months,
                ..
            } => {
                self.summary.note(StreamMoment::Sub {
                    name: display_name.clone(),
                    is_resub: *is_resub,
                });
                if *is_resub {
                    vec![lang::greet_resub(
                        display_name,
                        *cumulative_months,
                        &self.memory.pick_emote(Mood::Love),
                    )]
                } else {
                    vec![lang::greet_sub(
                        display_name,
                        &self.memory.pick_emote(Mood::Happy),
                    )]
                }
            }
            ChatEvent::SubGift {
                gifter, recipient, ..
            } => {
                self.summary.note(StreamMoment::GiftedSubs {
                    gifter: gifter.clone(),
                    count: 1,
                });
                vec![lang::greet_gift(
                    gifter,
                    recipient,
                    &self.memory.pick_emote(Mood::Love),
                )]
            }
            ChatEvent::MysteryGift { gifter, count } => {
                self.summary.note(StreamMoment::GiftedSubs {
                    gifter: gifter.clone(),
                    count: *count,
                });
                vec![lang::greet_mystery(
                    gifter,
                    *count,
                    &self.memory.pick_emote(Mood::Clap),
                )]
            }
            ChatEvent::Raid { from, viewers } => {
                self.summary.note(StreamMoment::Raid {
                    from: from.clone(),
                    viewers: *viewers,
                });
                vec![lang::greet_raid(
                    from,
                    *viewers,
                    &self.memory.pick_emote(Mood::Happy),
                )]
            }
            ChatEvent::WatchStreak {
                display_name,
                streak,
                ..
            } => vec![lang::greet_streak(
                display_name,
                *streak,
                &self.memory.pick_emote(Mood::Clap),
            )],
            ChatEvent::Disconnected => Vec::new(),
        }
    }

    async fn on_privmsg(&self, user: &ChatUser, text: &str) -> Vec<String> {
        if user.login.eq_ignore_ascii_case(&self.config.twitch.bot_username)
            || self.memory.is_bot(&user.login)
        {
            return Vec::new();
        }

        let tier = derive_tier(user, &self.config.community.reina);
        let mut replies = Vec::new();

        if self.memory.first_message_this_session(&user.login) && self.memory.is_watched(&user.login)
        {
            replies.push(lang::watched_welcome(
                &user.display_name,
                &self.memory.pick_emote(Mood::Happy),
            ));
        }

        let trimmed = text.trim();
        let lower = trimmed.to_lowercase();

        if lower.starts_with("!mismensajes") {
            replies.push(self.usage_report(user, tier, trimmed));
        } else if lower.starts_with("!resumen") {
            replies.push(self.summary_now(tier).await);
        } else if lower.starts_with("!ayudaclip") {
            let t = &self.config.twitch;
            replies.push(lang::clip_help(
                Lang::Es,
                t.clip_min_duration,
                t.clip_max_duration,
                t.clip_default_duration,
            ));
        } else if lower.starts_with("!clip") {
            let args = trimmed.get("!clip".len()..).unwrap_or("");
            replies.push(self.make_clip(user, tier, args).await);
        } else if lower.starts_with("!cuentamealgomanolito") {
            let question = "cuéntame algo interesante, una anécdota o una curiosidad";
            replies.extend(self.ask_model(user, tier, question, Lang::Es).await);
        } else if let Some(question) = self.extract_question(trimmed) {
            let question = question.trim();
            let lang = self.langs.update(&user.login, question);
            if question.is_empty() {
                replies.push(lang::empty_question(Lang::Es).to_string());
            } else if question.to_lowercase().contains("piropo") {
                replies.push(lang::random_piropo(&user.display_name));
            } else if let Some(caps) = SEARCH_RE.captures(question) {
                let query = caps[1].trim().to_string();
                replies.extend(self.ask_with_search(user, tier, question, &query, lang).await);
            } else {
                replies.extend(self.ask_model(user, tier, question, lang).await);
            }
        }

        replies
    }

    /// The two triggers for the conversational path: the command prefix and
    /// a direct mention of the bot. Indices come from an ASCII-only scan of
    /// the original text, so multi-byte characters never shift the cut.
    fn extract_question(&self, trimmed: &str) -> Option<String> {
        const PREFIX: &str = "!oyemanolito";
        if find_ascii_ci(trimmed, PREFIX) == Some(0) {
            return Some(trimmed[PREFIX.len()..].to_string());
        }
        let mention = format!("@{}", self.config.twitch.bot_username);
        if let Some(pos) = find_ascii_ci(trimmed, &mention) {
            let mut cleaned = String::with_capacity(trimmed.len());
            cleaned.push_str(&trimmed[..pos]);
            cleaned.push_str(&trimmed[pos + mention.len()..]);
            return Some(cleaned.trim().to_string());
        }
        None
    }

    fn usage_report(&self, user: &ChatUser, tier: Tier, text: &str) -> String {
        let lang = lang::detect(text);
        let tracker = self.usage.lock().unwrap_or_else(|e| e.into_inner());
        let used = tracker.used(&user.login, ActionKind::Message);
        let limit = tracker.quota(tier, ActionKind::Message).finite();
        lang::usage_report(lang, &user.display_name, used, limit)
    }

    async fn summary_now(&self, tier: Tier) -> String {
        if tier != Tier::Broadcaster {
            return lang::no_permission(Lang::Es).to_string();
        }
        let Some(digest) = self.summary.final_digest() else {
            return lang::nothing_to_summarize().to_string();
        };
        match self.ai.summarize(&digest).await {
            Ok(summary) => summary,
            Err(e) => {
                error!("Could not summarize on demand: {}", e);
                lang::ai_unavailable(Lang::Es).to_string()
            }
        }
    }

    async fn make_clip(&self, user: &ChatUser, tier: Tier, args: &str) -> String {
        if tier == Tier::None {
            return lang::tier_forbidden(Lang::Es).to_string();
        }

        let cooldown = Duration::from_secs(self.config.twitch.clip_cooldown_secs);
        if let Some(remaining) = self.global_cooldown(&self.last_clip, cooldown) {
            return lang::clip_cooldown(Lang::Es, remaining.as_secs().max(1));
        }

        let t = &self.config.twitch;
        let (wanted_secs, title) = crate::helpers::parse_clip_command(
            args,
            t.clip_min_duration,
            t.clip_max_duration,
            t.clip_default_duration,
        );

        match self.clips.create_clip().await {
            Ok(url) => {
                self.touch(&self.last_clip);
                self.summary.note(StreamMoment::Clip {
                    by: user.display_name.clone(),
                    title,
                });
                self.discord.announce_clip(&url, &user.display_name).await;
                info!(user = %user.login, url = %url, wanted_secs, "Clip created");
                lang::clip_created(Lang::Es, &url)
            }
            Err(e) => {
                warn!("Clip creation failed: {}", e);
                lang::clip_failed(Lang::Es).to_string()
            }
        }
    }

    async fn ask_model(
        &self,
        user: &ChatUser,
        tier: Tier,
        question: &str,
        lang: Lang,
    ) -> Vec<String> {
        let cooldown = Duration::from_secs(self.config.ai.reply_cooldown_secs);
        if self.global_cooldown(&self.last_ai, cooldown).is_some() {
            return vec![lang::wait_a_moment(lang).to_string()];
        }

        let decision = self
            .usage
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .authorize(&user.login, tier, ActionKind::Message);
        if let Decision::Deny(reason) = decision {
            return vec![self.deny_reply(reason, ActionKind::Message, lang)];
        }

        let role_note = self.memory.role_note(&user.login);
        let topics = self.memory.context_for(&user.login);
        match self
            .ai
            .answer(
                question,
                &user.display_name,
                role_note.as_deref(),
                topics.as_deref(),
                lang,
            )
            .await
        {
            Ok(reply) => {
                let alert = self
                    .usage
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .record_consumption(&user.login, tier, ActionKind::Message);
                if let Some(alert) = alert {
                    self.report_velocity(&alert).await;
                }
                self.memory.remember(&user.login, question);
                self.summary.note(StreamMoment::Question {
                    user: user.display_name.clone(),
                    text: question.to_string(),
                });
                self.touch(&self.last_ai);
                vec![format!("@{} {}", user.display_name, reply)]
            }
            Err(e) => {
                error!("LLM reply failed: {}", e);
                vec![lang::ai_unavailable(lang).to_string()]
            }
        }
    }

    async fn ask_with_search(
        &self,
        user: &ChatUser,
        tier: Tier,
        question: &str,
        query: &str,
        lang: Lang,
    ) -> Vec<String> {
        let cooldown = Duration::from_secs(self.config.search.global_cooldown_secs);
        if self.global_cooldown(&self.last_search, cooldown).is_some() {
            return vec![lang::wait_a_moment(lang).to_string()];
        }

        let decision = self
            .usage
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .authorize(&user.login, tier, ActionKind::Search);
        if let Decision::Deny(reason) = decision {
            return vec![self.deny_reply(reason, ActionKind::Search, lang)];
        }

        let results = match self.search.search(query).await {
            Ok(results) => results,
            Err(e) => {
                error!("Web search failed: {}", e);
                return vec![lang::ai_unavailable(lang).to_string()];
            }
        };
        if results.is_empty() {
            return vec![lang::nothing_found(lang).to_string()];
        }

        match self.ai.answer_with_search(question, &results, lang).await {
            Ok(reply) => {
                self.usage
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .record_consumption(&user.login, tier, ActionKind::Search);
                self.memory.remember(&user.login, query);
                self.summary.note(StreamMoment::Question {
                    user: user.display_name.clone(),
                    text: query.to_string(),
                });
                self.touch(&self.last_search);
                vec![format!("@{} {}", user.display_name, reply)]
            }
            Err(e) => {
                error!("Search-grounded reply failed: {}", e);
                vec![lang::ai_unavailable(lang).to_string()]
            }
        }
    }

    fn deny_reply(&self, reason: DenyReason, kind: ActionKind, lang: Lang) -> String {
        match (kind, reason) {
            (_, DenyReason::TierForbidden) => lang::tier_forbidden(lang).to_string(),
            (_, DenyReason::CooldownActive { remaining_mins }) => {
                lang::cooldown_active(lang, remaining_mins)
            }
            (ActionKind::Message, DenyReason::LimitReached { limit }) => {
                lang::message_limit_reached(lang, limit)
            }
            (ActionKind::Search, DenyReason::LimitReached { limit }) => {
                lang::search_limit_reached(lang, limit, self.config.search.user_cooldown_mins)
            }
        }
    }

    async fn report_velocity(&self, alert: &VelocityAlert) {
        warn!(
            user = %alert.username,
            used = alert.used,
            limit = alert.limit,
            span_mins = alert.span_mins,
            "User burning through their quota"
        );
        self.discord
            .operator_alert(
                "⚡ Consumo acelerado",
                &format!(
                    "{} lleva {}/{} mensajes en {:.0} minutos",
                    alert.username, alert.used, alert.limit, alert.span_mins
                ),
            )
            .await;
    }

    /// Remaining time if the slot is still cooling down.
    fn global_cooldown(
        &self,
        slot: &Mutex<Option<Instant>>,
        window: Duration,
    ) -> Option<Duration> {
        let guard = slot.lock().unwrap_or_else(|e| e.into_inner());
        match *guard {
            Some(last) if last.elapsed() < window => Some(window - last.elapsed()),
            _ => None,
        }
    }

    fn touch(&self, slot: &Mutex<Option<Instant>>) {
        *slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }
}

/// Byte offset of an ASCII needle in `haystack`, case-insensitively. An
/// ASCII needle can never match mid-character, so the offset is always a
/// char boundary.
fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::services::ai::testing::MockModel;
    use crate::services::ai::{AiService, ChatModel};
    use crate::services::search::SearchResult;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct MockSearch {
        results: Vec<SearchResult>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl WebSearch for MockSearch {
        async fn search(&self, _query: &str) -> anyhow::Result<Vec<SearchResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.results.clone())
        }
    }

    struct MockClipper {
        fail: bool,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ClipMaker for MockClipper {
        async fn create_clip(&self) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("stream offline");
            }
            Ok("https://clips.twitch.tv/AbcDef".to_string())
        }
    }

    struct Fixture {
        handler: Handler,
        model: Arc<MockModel>,
    }

    fn fixture_with(model: Arc<MockModel>, search: MockSearch, clipper: MockClipper) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.data.dir = dir.path().to_string_lossy().into_owned();
        // pacing cooldowns off so tests drive the per-user quota directly
        config.ai.reply_cooldown_secs = 0;
        config.search.global_cooldown_secs = 0;
        config.community.bots = vec!["nightbot".to_string()];
        config.community.watched_users = vec!["habitual".to_string()];
        std::mem::forget(dir);

        let usage = UsageTracker::new(
            config.limits,
            config.search.user_cooldown_mins,
            &config.data.dir,
        );
        let memory = Arc::new(MemoryStore::new(
            config.community.clone(),
            config.emotes.clone(),
        ));
        let ai = AiService::new(
            Arc::clone(&model) as Arc<dyn ChatModel>,
            "Eres Manolito.".to_string(),
            config.ai.response_chars,
        );
        let handler = Handler::new(
            config,
            usage,
            memory,
            ai,
            Arc::new(search),
            Arc::new(clipper),
            Arc::new(DiscordNotifier::new("")),
            Arc::new(SummaryTracker::new()),
        );
        Fixture { handler, model }
    }

    fn fixture(replies: &[&str]) -> Fixture {
        fixture_with(
            MockModel::replying(replies),
            MockSearch {
                results: vec![SearchResult {
                    title: "Resultado".to_string(),
                    url: "https://example.com/a".to_string(),
                    description: "Algo".to_string(),
                }],
                calls: AtomicU32::new(0),
            },
            MockClipper {
                fail: false,
                calls: AtomicU32::new(0),
            },
        )
    }

    fn user(login: &str, badges: &[(&str, &str)], is_mod: bool) -> ChatUser {
        ChatUser {
            login: login.to_string(),
            display_name: login.to_string(),
            badges: badges
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            is_mod,
        }
    }

    fn privmsg(login: &str, badges: &[(&str, &str)], text: &str) -> ChatEvent {
        let is_mod = badges.iter().any(|(name, _)| *name == "moderator");
        ChatEvent::Privmsg {
            user: user(login, badges, is_mod),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn mention_gets_an_answer_addressed_to_the_user() {
        let f = fixture(&["pues depende"]);
        let replies = f
            .handler
            .handle(&privmsg(
                "ana",
                &[("subscriber", "3000")],
                "@manolitozurrapa qué opinas del lunes",
            ))
            .await;
        assert_eq!(replies, vec!["@ana pues depende".to_string()]);
    }

    #[tokio::test]
    async fn command_prefix_works_like_a_mention() {
        let f = fixture(&["respuesta"]);
        let replies = f
            .handler
            .handle(&privmsg("ana", &[("vip", "1")], "!oyemanolito hola qué tal"))
            .await;
        assert_eq!(replies.len(), 1);
        assert!(replies[0].starts_with("@ana "));
    }

    #[tokio::test]
    async fn unsubscribed_users_cannot_talk_to_the_bot() {
        let f = fixture(&["nunca se envía"]);
        let replies = f
            .handler
            .handle(&privmsg("rando", &[], "@manolitozurrapa hola"))
            .await;
        assert_eq!(replies.len(), 1);
        assert!(replies[0].contains("subs"), "got: {}", replies[0]);
        assert!(f.model.prompts.lock().unwrap().is_empty(), "no LLM call");
    }

    #[tokio::test]
    async fn known_bots_are_ignored() {
        let f = fixture(&["nunca"]);
        let replies = f
            .handler
            .handle(&privmsg("nightbot", &[], "@manolitozurrapa hola"))
            .await;
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn t1_user_hits_the_message_limit() {
        let long_script: Vec<String> = (0..40).map(|i| format!("r{}", i)).collect();
        let refs: Vec<&str> = long_script.iter().map(String::as_str).collect();
        let f = fixture(&refs);
        let msg = privmsg("ana", &[("subscriber", "1")], "@manolitozurrapa dime");

        for _ in 0..30 {
            let replies = f.handler.handle(&msg).await;
            assert!(replies[0].starts_with("@ana "));
        }
        let replies = f.handler.handle(&msg).await;
        assert!(replies[0].contains("30"), "limit message, got: {}", replies[0]);
    }

    #[tokio::test]
    async fn search_trigger_routes_to_web_search() {
        let f = fixture(&["según example.com, sí"]);
        let replies = f
            .handler
            .handle(&privmsg(
                "ana",
                &[("moderator", "1")],
                "@manolitozurrapa busca el precio del bitcoin",
            ))
            .await;
        assert_eq!(replies, vec!["@ana según example.com, sí".to_string()]);
        let prompts = f.model.prompts.lock().unwrap();
        assert!(prompts[0].1.contains("example.com"));
    }

    #[tokio::test]
    async fn t1_users_have_no_search_quota() {
        let f = fixture(&["nunca"]);
        let replies = f
            .handler
            .handle(&privmsg(
                "ana",
                &[("subscriber", "1")],
                "@manolitozurrapa busca algo",
            ))
            .await;
        assert!(replies[0].contains("subs"), "got: {}", replies[0]);
    }

    #[tokio::test]
    async fn usage_command_reports_session_numbers() {
        let f = fixture(&["ok"]);
        let ask = privmsg("ana", &[("subscriber", "1")], "@manolitozurrapa hola");
        f.handler.handle(&ask).await;

        let replies = f
            .handler
            .handle(&privmsg("ana", &[("subscriber", "1")], "!mismensajes"))
            .await;
        assert!(replies[0].contains("1/30"), "got: {}", replies[0]);
    }

    #[tokio::test]
    async fn summary_command_is_broadcaster_only() {
        let f = fixture(&["resumen del directo"]);
        let denied = f
            .handler
            .handle(&privmsg("ana", &[("moderator", "1")], "!resumen"))
            .await;
        assert!(denied[0].contains("jefe"), "got: {}", denied[0]);

        // nothing tracked yet
        let empty = f
            .handler
            .handle(&privmsg("teseo", &[("broadcaster", "1")], "!resumen"))
            .await;
        assert!(empty[0].contains("nada"), "got: {}", empty[0]);

        f.handler.summary.note(StreamMoment::Raid {
            from: "otra".to_string(),
            viewers: 5,
        });
        let replies = f
            .handler
            .handle(&privmsg("teseo", &[("broadcaster", "1")], "!resumen"))
            .await;
        assert_eq!(replies, vec!["resumen del directo".to_string()]);
    }

    #[tokio::test]
    async fn clip_command_respects_permissions_and_cooldown() {
        let f = fixture(&[]);
        let denied = f.handler.handle(&privmsg("rando", &[], "!clip")).await;
        assert!(denied[0].contains("subs"));

        let ok = f
            .handler
            .handle(&privmsg("ana", &[("vip", "1")], "!clip 30"))
            .await;
        assert!(ok[0].contains("clips.twitch.tv"), "got: {}", ok[0]);

        let again = f
            .handler
            .handle(&privmsg("ana", &[("vip", "1")], "!clip"))
            .await;
        assert!(again[0].contains("espera"), "got: {}", again[0]);
    }

    #[tokio::test]
    async fn failed_clip_reports_gracefully() {
        let f = fixture_with(
            MockModel::replying(&[]),
            MockSearch {
                results: Vec::new(),
                calls: AtomicU32::new(0),
            },
            MockClipper {
                fail: true,
                calls: AtomicU32::new(0),
            },
        );
        let replies = f
            .handler
            .handle(&privmsg("ana", &[("vip", "1")], "!clip"))
            .await;
        assert!(replies[0].contains("directo"), "got: {}", replies[0]);
    }

    #[tokio::test]
    async fn model_failure_falls_back_without_charging_quota() {
        let f = fixture(&[]); // no scripted replies: every call errors
        let msg = privmsg("ana", &[("subscriber", "1")], "@manolitozurrapa hola");
        let replies = f.handler.handle(&msg).await;
        assert!(replies[0].contains("cerebro"), "got: {}", replies[0]);

        let report = f
            .handler
            .handle(&privmsg("ana", &[("subscriber", "1")], "!mismensajes"))
            .await;
        assert!(report[0].contains("0/30"), "got: {}", report[0]);
    }

    #[tokio::test]
    async fn connected_event_announces_the_bot() {
        let f = fixture(&[]);
        let replies = f.handler.handle(&ChatEvent::Connected).await;
        assert!(replies[0].contains("manolitozurrapa"));
    }

    #[tokio::test]
    async fn sub_events_are_greeted_and_tracked() {
        let f = fixture(&[]);
        let replies = f
            .handler
            .handle(&ChatEvent::Sub {
                login: "ana".to_string(),
                display_name: "Ana".to_string(),
                tier: "1000".to_string(),
                is_resub: false,
                cumulative_months: 1,
            })
            .await;
        assert!(replies[0].contains("Ana"));
        assert!(!f.handler.summary.is_empty());
    }

    #[tokio::test]
    async fn piropo_requests_skip_the_model() {
        let f = fixture(&[]);
        let replies = f
            .handler
            .handle(&privmsg(
                "ana",
                &[("subscriber", "1")],
                "@manolitozurrapa dime un piropo",
            ))
            .await;
        assert!(replies[0].starts_with("@ana "), "got: {}", replies[0]);
        assert!(f.model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn watched_user_is_welcomed_once() {
        let f = fixture(&["hola", "hola"]);
        let msg = privmsg("habitual", &[("subscriber", "3000")], "@manolitozurrapa buenas");
        let first = f.handler.handle(&msg).await;
        assert_eq!(first.len(), 2, "welcome plus answer: {:?}", first);
        let second = f.handler.handle(&msg).await;
        assert_eq!(second.len(), 1);
    }
}
