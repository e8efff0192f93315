//! Session memory: who is who in the community, what each user talked about
//! recently, and which emote fits a mood.
//!
//! Conversation topics are in-memory only and expire on a timer; the roles
//! come straight from configuration and never change at runtime.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::{CommunityConfig, EmotesConfig};

/// How many topics we keep per user.
const TOPICS_PER_USER: usize = 5;

#[derive(Debug, Clone, Copy)]
pub enum Mood {
    Happy,
    Love,
    Clap,
    Sad,
    Funny,
}

#[derive(Debug, Clone)]
struct Topic {
    at: DateTime<Utc>,
    text: String,
}

#[derive(Default)]
struct Inner {
    topics: HashMap<String, Vec<Topic>>,
    seen_this_session: HashSet<String>,
}

pub struct MemoryStore {
    community: CommunityConfig,
    emotes: EmotesConfig,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new(community: CommunityConfig, emotes: EmotesConfig) -> Self {
        Self {
            community,
            emotes,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn is_bot(&self, login: &str) -> bool {
        let login = login.to_lowercase();
        self.community.bots.iter().any(|b| b.eq_ignore_ascii_case(&login))
    }

    pub fn is_watched(&self, login: &str) -> bool {
        self.community
            .watched_users
            .iter()
            .any(|w| w.eq_ignore_ascii_case(login))
    }

    /// One line about this user for the model prompt, when we know them.
    pub fn role_note(&self, login: &str) -> Option<String> {
        let c = &self.community;
        if c.reina.iter().any(|r| r.eq_ignore_ascii_case(login)) {
            return Some(format!("{} es la reina del canal, trátala con cariño", login));
        }
        if c.mods.iter().any(|m| m.eq_ignore_ascii_case(login)) {
            return Some(format!("{} es moderador del canal", login));
        }
        if c.vips.iter().any(|v| v.eq_ignore_ascii_case(login)) {
            return Some(format!("{} es VIP del canal", login));
        }
        if let Some((_, months)) = c
            .subs
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(login))
        {
            return Some(format!("{} lleva {} meses suscrito", login, months));
        }
        if let Some((_, gifted)) = c
            .gifters
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(login))
        {
            return Some(format!("{} ha regalado {} subs a la comunidad", login, gifted));
        }
        None
    }

    /// Store what a user just asked about, keeping the last few entries.
    pub fn remember(&self, login: &str, text: &str) {
        self.remember_at(login, text, Utc::now());
    }

    fn remember_at(&self, login: &str, text: &str, at: DateTime<Utc>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let topics = inner.topics.entry(login.to_lowercase()).or_default();
        topics.push(Topic {
            at,
            text: text.to_string(),
        });
        if topics.len() > TOPICS_PER_USER {
            let drop = topics.len() - TOPICS_PER_USER;
            topics.drain(..drop);
        }
    }

    /// Recent topics for the prompt, oldest first.
    pub fn context_for(&self, login: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let topics = inner.topics.get(&login.to_lowercase())?;
        if topics.is_empty() {
            return None;
        }
        Some(
            topics
                .iter()
                .map(|t| t.text.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// True only for the first message a user sends this session.
    pub fn first_message_this_session(&self, login: &str) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.seen_this_session.insert(login.to_lowercase())
    }

    /// Drop topics older than `max_age`.
    pub fn cleanup(&self, max_age: Duration) {
        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap_or_default();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let before: usize = inner.topics.values().map(Vec::len).sum();
        for topics in inner.topics.values_mut() {
            topics.retain(|t| t.at > cutoff);
        }
        inner.topics.retain(|_, topics| !topics.is_empty());
        let after: usize = inner.topics.values().map(Vec::len).sum();
        if before != after {
            debug!(dropped = before - after, "Expired conversation topics");
        }
    }

    pub fn pick_emote(&self, mood: Mood) -> String {
        let pool = match mood {
            Mood::Happy => &self.emotes.happy,
            Mood::Love => &self.emotes.love,
            Mood::Clap => &self.emotes.clap,
            Mood::Sad => &self.emotes.sad,
            Mood::Funny => &self.emotes.funny,
        };
        pool.choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| "🎉".to_string())
    }
}

/// Expire old topics on an interval until shutdown.
pub fn spawn_cleanup(
    store: std::sync::Arc<MemoryStore>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(mins = interval.as_secs() / 60, "Memory cleanup started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => store.cleanup(interval),
                _ = shutdown.changed() => {
                    info!("Memory cleanup stopped");
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        let community = CommunityConfig {
            reina: vec!["lareina".to_string()],
            mods: vec!["modguy".to_string()],
            vips: vec!["vipgal".to_string()],
            subs: HashMap::from([("fiel".to_string(), 14)]),
            gifters: HashMap::from([("generoso".to_string(), 20)]),
            bots: vec!["nightbot".to_string()],
            watched_users: vec!["habitual".to_string()],
        };
        MemoryStore::new(community, EmotesConfig::default())
    }

    #[test]
    fn remembers_and_caps_topics() {
        let s = store();
        for i in 0..8 {
            s.remember("Ana", &format!("tema {}", i));
        }
        let ctx = s.context_for("ana").unwrap();
        assert!(!ctx.contains("tema 2"), "oldest topics drop off");
        assert!(ctx.contains("tema 3"));
        assert!(ctx.contains("tema 7"));
    }

    #[test]
    fn unknown_user_has_no_context() {
        assert!(store().context_for("nadie").is_none());
    }

    #[test]
    fn cleanup_expires_old_topics() {
        let s = store();
        s.remember_at("ana", "viejo", Utc::now() - chrono::Duration::hours(1));
        s.remember("ana", "reciente");
        s.cleanup(Duration::from_secs(30 * 60));
        let ctx = s.context_for("ana").unwrap();
        assert!(!ctx.contains("viejo"));
        assert!(ctx.contains("reciente"));
    }

    #[test]
    fn role_notes_follow_priority() {
        let s = store();
        assert!(s.role_note("LaReina").unwrap().contains("reina"));
        assert!(s.role_note("modguy").unwrap().contains("moderador"));
        assert!(s.role_note("fiel").unwrap().contains("14 meses"));
        assert!(s.role_note("generoso").unwrap().contains("20 subs"));
        assert!(s.role_note("desconocido").is_none());
    }

    #[test]
    fn bots_and_watched_users_are_recognized() {
        let s = store();
        assert!(s.is_bot("Nightbot"));
        assert!(!s.is_bot("ana"));
        assert!(s.is_watched("Habitual"));
    }

    #[test]
    fn first_message_fires_once_per_session() {
        let s = store();
        assert!(s.first_message_this_session("ana"));
        assert!(!s.first_message_this_session("Ana"));
    }

    #[test]
    fn emote_picker_uses_configured_pool() {
        let s = store();
        let emote = s.pick_emote(Mood::Happy);
        assert!(!emote.is_empty());
    }
}
