//! Keeps track of what happened on stream so the periodic summary has
//! something to tell.
//!
//! Moments accumulate between summaries; taking a digest drains them, so a
//! quiet half hour produces no summary at all.

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub enum StreamMoment {
    Question { user: String, text: String },
    Sub { name: String, is_resub: bool },
    GiftedSubs { gifter: String, count: u32 },
    Raid { from: String, viewers: u64 },
    Cheer { name: String, bits: u64 },
    Clip { by: String, title: Option<String> },
}

impl StreamMoment {
    fn describe(&self) -> String {
        match self {
            StreamMoment::Question { user, text } => {
                format!("{} preguntó: {}", user, text)
            }
            StreamMoment::Sub { name, is_resub: false } => format!("{} se suscribió", name),
            StreamMoment::Sub { name, is_resub: true } => format!("{} renovó su sub", name),
            StreamMoment::GiftedSubs { gifter, count } => {
                format!("{} regaló {} subs", gifter, count)
            }
            StreamMoment::Raid { from, viewers } => {
                format!("llegó una raid de {} con {} personas", from, viewers)
            }
            StreamMoment::Cheer { name, bits } => format!("{} tiró {} bits", name, bits),
            StreamMoment::Clip { by, title } => match title {
                Some(t) => format!("{} guardó un clip: \"{}\"", by, t),
                None => format!("{} guardó un clip", by),
            },
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    at: DateTime<Utc>,
    moment: StreamMoment,
}

/// How many moments a digest includes at most; chat summaries don't need
/// every single line.
const DIGEST_CAP: usize = 40;

pub struct SummaryTracker {
    started_at: DateTime<Utc>,
    entries: Mutex<Vec<Entry>>,
    /// Mini-summaries already posted this session, kept for the final recap.
    minis: Mutex<Vec<String>>,
    active_users: Mutex<HashSet<String>>,
}

impl Default for SummaryTracker {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            entries: Mutex::new(Vec::new()),
            minis: Mutex::new(Vec::new()),
            active_users: Mutex::new(HashSet::new()),
        }
    }
}

impl SummaryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note(&self, moment: StreamMoment) {
        if let Some(who) = match &moment {
            StreamMoment::Question { user, .. } => Some(user),
            StreamMoment::Sub { name, .. } => Some(name),
            StreamMoment::GiftedSubs { gifter, .. } => Some(gifter),
            StreamMoment::Cheer { name, .. } => Some(name),
            StreamMoment::Clip { by, .. } => Some(by),
            StreamMoment::Raid { .. } => None,
        } {
            self.active_users
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(who.to_lowercase());
        }

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push(Entry {
            at: Utc::now(),
            moment,
        });
        // keep memory bounded on very busy streams
        if entries.len() > DIGEST_CAP * 4 {
            let drop = entries.len() - DIGEST_CAP * 4;
            entries.drain(..drop);
        }
    }

    /// Keep a posted mini-summary for the final recap.
    pub fn record_mini(&self, text: String) {
        self.minis
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(text);
    }

    /// Digest for the final recap: earlier mini-summaries, whatever moments
    /// are still pending, and the session stats line.
    pub fn final_digest(&self) -> Option<String> {
        let minis = self
            .minis
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let pending = self.take_digest();
        if minis.is_empty() && pending.is_none() {
            return None;
        }

        let mins = (Utc::now() - self.started_at).num_minutes().max(0);
        let users = self
            .active_users
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len();

        let mut digest = format!(
            "Sesión de {} minutos con {} personas participando.\n",
            mins, users
        );
        if !minis.is_empty() {
            digest.push_str("Resúmenes anteriores:\n");
            for mini in &minis {
                digest.push_str("- ");
                digest.push_str(mini);
                digest.push('\n');
            }
        }
        if let Some(pending) = pending {
            digest.push_str("Desde el último resumen:\n");
            digest.push_str(&pending);
        }
        Some(digest)
    }

    pub fn is_empty(&self) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }

    /// Drain accumulated moments into one digest for the model, newest-first
    /// trimmed to a sane size. Returns `None` when nothing happened.
    pub fn take_digest(&self) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.is_empty() {
            return None;
        }
        let drained: Vec<Entry> = entries.drain(..).collect();
        drop(entries);

        let skip = drained.len().saturating_sub(DIGEST_CAP);
        let mut lines: Vec<String> = Vec::with_capacity(drained.len() - skip);
        for entry in drained.into_iter().skip(skip) {
            lines.push(format!(
                "[{}] {}",
                entry.at.format("%H:%M"),
                entry.moment.describe()
            ));
        }
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tracker_yields_no_digest() {
        let t = SummaryTracker::new();
        assert!(t.is_empty());
        assert!(t.take_digest().is_none());
    }

    #[test]
    fn digest_drains_moments() {
        let t = SummaryTracker::new();
        t.note(StreamMoment::Sub {
            name: "ana".to_string(),
            is_resub: false,
        });
        t.note(StreamMoment::Raid {
            from: "otra".to_string(),
            viewers: 12,
        });

        let digest = t.take_digest().unwrap();
        assert!(digest.contains("ana se suscribió"));
        assert!(digest.contains("raid de otra con 12 personas"));
        assert!(t.take_digest().is_none(), "taking a digest drains the log");
    }

    #[test]
    fn final_digest_combines_minis_and_pending_moments() {
        let t = SummaryTracker::new();
        assert!(t.final_digest().is_none());

        t.record_mini("primera media hora tranquila".to_string());
        t.note(StreamMoment::Clip {
            by: "Ana".to_string(),
            title: None,
        });

        let digest = t.final_digest().unwrap();
        assert!(digest.contains("1 personas"));
        assert!(digest.contains("primera media hora tranquila"));
        assert!(digest.contains("Ana guardó un clip"));
    }

    #[test]
    fn digest_keeps_only_the_latest_moments() {
        let t = SummaryTracker::new();
        for i in 0..(DIGEST_CAP + 10) {
            t.note(StreamMoment::Cheer {
                name: format!("user{}", i),
                bits: 1,
            });
        }
        let digest = t.take_digest().unwrap();
        assert!(!digest.contains("user0 "));
        assert!(digest.contains(&format!("user{}", DIGEST_CAP + 9)));
        assert_eq!(digest.lines().count(), DIGEST_CAP);
    }
}
