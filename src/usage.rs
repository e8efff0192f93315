//! Per-user quota tracking, search cooldowns, and the velocity alert.
//!
//! The tracker owns all usage state for one bot session. Handlers call
//! [`UsageTracker::authorize`] before a quota-consuming action and
//! [`UsageTracker::record_consumption`] after the action succeeded; the two
//! calls are deliberately not atomic with each other (single event-loop
//! handling keeps the window harmless for chat-paced traffic).

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use chrono::{DateTime, Duration, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::LimitsConfig;
use crate::tier::{quota, ActionKind, Limit, Tier};

/// Outcome of a quota check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// User is locked out after exhausting their search quota.
    CooldownActive { remaining_mins: u64 },
    /// The tier's limit for this action kind is zero.
    TierForbidden,
    /// Finite quota fully consumed this session.
    LimitReached { limit: u32 },
}

/// Raised when a user burns through half a finite message quota in under
/// 30 minutes. A heuristic signal, not a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VelocityAlert {
    pub username: String,
    pub used: u32,
    pub limit: u32,
    pub span_mins: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserUsage {
    tier: u32,
    used: u32,
    limit: Limit,
    timestamps: Vec<String>,
    #[serde(default)]
    searches: u32,
}

/// The per-session usage store. A fresh file per process run; never merged
/// with prior sessions.
#[derive(Debug, Serialize, Deserialize)]
struct SessionUsage {
    #[serde(rename = "startedAt")]
    started_at: String,
    users: BTreeMap<String, UserUsage>,
}

pub struct UsageTracker {
    limits: LimitsConfig,
    cooldown_window: Duration,
    session: SessionUsage,
    /// One entry per user at most; absence means "not in cooldown".
    cooldowns: HashMap<String, DateTime<Utc>>,
    path: PathBuf,
}

impl UsageTracker {
    pub fn new(limits: LimitsConfig, cooldown_mins: u64, data_dir: &str) -> Self {
        let started = Local::now();
        let file_name = format!("usage_{}.json", started.format("%Y-%m-%dT%H-%M-%S"));
        let path = PathBuf::from(data_dir).join(file_name);
        if let Err(e) = std::fs::create_dir_all(data_dir) {
            warn!(dir = data_dir, "Could not create data dir: {}", e);
        }
        info!(file = %path.display(), "New usage session");

        Self {
            limits,
            cooldown_window: Duration::minutes(cooldown_mins as i64),
            session: SessionUsage {
                started_at: started.format("%Y-%m-%dT%H:%M:%S").to_string(),
                users: BTreeMap::new(),
            },
            cooldowns: HashMap::new(),
            path,
        }
    }

    pub fn quota(&self, tier: Tier, kind: ActionKind) -> Limit {
        quota(&self.limits, tier, kind)
    }

    pub fn used(&self, username: &str, kind: ActionKind) -> u32 {
        let username = username.to_lowercase();
        match (self.session.users.get(&username), kind) {
            (Some(u), ActionKind::Message) => u.used,
            (Some(u), ActionKind::Search) => u.searches,
            (None, _) => 0,
        }
    }

    /// Decide whether an action may proceed. Order matters: an elapsed
    /// cooldown is cleared (and the search counter reset) before the limit
    /// check, so a user already locked out is never re-triggered into a
    /// fresh cooldown.
    pub fn authorize(&mut self, username: &str, tier: Tier, kind: ActionKind) -> Decision {
        self.authorize_at(username, tier, kind, Utc::now())
    }

    fn authorize_at(
        &mut self,
        username: &str,
        tier: Tier,
        kind: ActionKind,
        now: DateTime<Utc>,
    ) -> Decision {
        let username = username.to_lowercase();

        if kind == ActionKind::Search {
            if let Some(&started) = self.cooldowns.get(&username) {
                let elapsed = now - started;
                if elapsed < self.cooldown_window {
                    let remaining = self.cooldown_window - elapsed;
                    let remaining_mins =
                        (remaining.num_seconds().max(0) as u64).div_ceil(60).max(1);
                    return Decision::Deny(DenyReason::CooldownActive { remaining_mins });
                }
                // Window elapsed: the lazy-expiry path. Clear the entry,
                // reset the counter, and fall through to the normal checks.
                self.cooldowns.remove(&username);
                if let Some(user) = self.session.users.get_mut(&username) {
                    user.searches = 0;
                }
                self.persist();
                info!(user = %username, "Search cooldown expired, counter reset");
            }
        }

        let limit = quota(&self.limits, tier, kind);
        if limit.is_zero() {
            return Decision::Deny(DenyReason::TierForbidden);
        }

        let used = self.used(&username, kind);
        if limit.exhausted_by(used) {
            // Exhausting the search quota is what starts the lockout.
            if kind == ActionKind::Search {
                self.cooldowns.insert(username.clone(), now);
                info!(user = %username, mins = self.cooldown_window.num_minutes(), "Search cooldown started");
            }
            return Decision::Deny(DenyReason::LimitReached {
                limit: limit.finite().unwrap_or(0),
            });
        }

        Decision::Allow
    }

    /// Record one completed, authorized action. Call at most once per
    /// authorized action, only after it actually succeeded.
    pub fn record_consumption(
        &mut self,
        username: &str,
        tier: Tier,
        kind: ActionKind,
    ) -> Option<VelocityAlert> {
        self.record_with_timestamp(username, tier, kind, Local::now().format("%H:%M:%S").to_string())
    }

    fn record_with_timestamp(
        &mut self,
        username: &str,
        tier: Tier,
        kind: ActionKind,
        timestamp: String,
    ) -> Option<VelocityAlert> {
        let username = username.to_lowercase();
        let limit = quota(&self.limits, tier, kind);
        let message_limit = quota(&self.limits, tier, ActionKind::Message);

        let user = self
            .session
            .users
            .entry(username.clone())
            .or_insert_with(|| UserUsage {
                tier: tier.sub_number(),
                used: 0,
                limit: message_limit,
                timestamps: Vec::new(),
                searches: 0,
            });

        match kind {
            ActionKind::Message => {
                user.used += 1;
                user.tier = tier.sub_number();
                user.limit = limit;
                user.timestamps.push(timestamp);
            }
            ActionKind::Search => {
                user.searches += 1;
            }
        }

        self.persist();

        if kind == ActionKind::Message {
            self.velocity_check(&username, message_limit)
        } else {
            None
        }
    }

    /// Fires exactly at half of a finite limit when the first-to-halfth
    /// timestamps span under 30 minutes.
    fn velocity_check(&self, username: &str, limit: Limit) -> Option<VelocityAlert> {
        let limit = limit.finite()?;
        let user = self.session.users.get(username)?;
        let half = limit / 2;
        if half == 0 || user.used != half || user.timestamps.len() < half as usize {
            return None;
        }

        let first = ts_minutes(user.timestamps.first()?)?;
        let last = ts_minutes(user.timestamps.last()?)?;
        let span = last - first;
        if span < 30.0 {
            return Some(VelocityAlert {
                username: username.to_string(),
                used: user.used,
                limit,
                span_mins: span.round().max(0.0) as u32,
            });
        }
        None
    }

    /// Best-effort write of the session file. Quota tracking degrades to
    /// memory-only when the disk is unhappy.
    fn persist(&self) {
        match serde_json::to_string_pretty(&self.session) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    warn!(file = %self.path.display(), "Could not persist usage: {}", e);
                }
            }
            Err(e) => warn!("Could not serialize usage session: {}", e),
        }
    }

    #[cfg(test)]
    fn backdate_cooldown(&mut self, username: &str, mins: i64) {
        if let Some(ts) = self.cooldowns.get_mut(&username.to_lowercase()) {
            *ts -= Duration::minutes(mins);
        }
    }
}

/// Wall-clock "HH:MM:SS" to minutes since midnight.
fn ts_minutes(ts: &str) -> Option<f64> {
    let mut parts = ts.split(':');
    let h: f64 = parts.next()?.parse().ok()?;
    let m: f64 = parts.next()?.parse().ok()?;
    let s: f64 = parts.next()?.parse().ok()?;
    Some(h * 60.0 + m + s / 60.0)
}
