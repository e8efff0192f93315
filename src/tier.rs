//! Viewer privilege tiers and their quota limits.
//!
//! A tier is derived fresh from role/badge data on every message; only the
//! resolved limits are ever stored alongside usage counters.

use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::chat::ChatUser;
use crate::config::LimitsConfig;

/// Privilege class of a viewer, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Broadcaster,
    /// Configured VIP-royalty list, above platform mods by community decree.
    Reina,
    Mod,
    Vip,
    T3,
    T2,
    T1,
    None,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::Broadcaster => "broadcaster",
            Tier::Reina => "reina",
            Tier::Mod => "mod",
            Tier::Vip => "vip",
            Tier::T3 => "T3",
            Tier::T2 => "T2",
            Tier::T1 => "T1",
            Tier::None => "none",
        };
        f.write_str(s)
    }
}

impl Tier {
    /// Numeric sub tier (1..3) for the usage store, 0 for everything else.
    pub fn sub_number(self) -> u32 {
        match self {
            Tier::T1 => 1,
            Tier::T2 => 2,
            Tier::T3 => 3,
            _ => 0,
        }
    }
}

/// Which quota an action draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Message,
    Search,
}

/// A quota limit: a finite count or unlimited.
///
/// Serialized as a number, or `null` for unlimited (matching the session
/// usage store format). Deserializes from a number or the string
/// `"unlimited"` so config.toml can express both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Unlimited,
    Finite(u32),
}

impl Limit {
    pub fn is_zero(self) -> bool {
        self == Limit::Finite(0)
    }

    /// True when `used` has consumed the whole finite quota.
    pub fn exhausted_by(self, used: u32) -> bool {
        match self {
            Limit::Unlimited => false,
            Limit::Finite(n) => used >= n,
        }
    }

    pub fn finite(self) -> Option<u32> {
        match self {
            Limit::Unlimited => None,
            Limit::Finite(n) => Some(n),
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Unlimited => f.write_str("unlimited"),
            Limit::Finite(n) => write!(f, "{}", n),
        }
    }
}

impl Serialize for Limit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Limit::Unlimited => serializer.serialize_none(),
            Limit::Finite(n) => serializer.serialize_u32(*n),
        }
    }
}

impl<'de> Deserialize<'de> for Limit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LimitVisitor;

        impl<'de> de::Visitor<'de> for LimitVisitor {
            type Value = Limit;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative number, null, or \"unlimited\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Limit, E> {
                u32::try_from(v)
                    .map(Limit::Finite)
                    .map_err(|_| E::custom("limit out of range"))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Limit, E> {
                u32::try_from(v)
                    .map(Limit::Finite)
                    .map_err(|_| E::custom("limit must be non-negative"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Limit, E> {
                if v.eq_ignore_ascii_case("unlimited") {
                    Ok(Limit::Unlimited)
                } else {
                    Err(E::custom(format!("unknown limit '{}'", v)))
                }
            }

            fn visit_none<E: de::Error>(self) -> Result<Limit, E> {
                Ok(Limit::Unlimited)
            }

            fn visit_unit<E: de::Error>(self) -> Result<Limit, E> {
                Ok(Limit::Unlimited)
            }
        }

        deserializer.deserialize_any(LimitVisitor)
    }
}

/// Derive the tier of a chat user from badges and the configured royalty
/// list. Highest-priority match wins.
pub fn derive_tier(user: &ChatUser, reina_users: &[String]) -> Tier {
    if user.badge("broadcaster") == Some("1") {
        return Tier::Broadcaster;
    }
    if reina_users.iter().any(|r| r == &user.login) {
        return Tier::Reina;
    }
    if user.is_mod {
        return Tier::Mod;
    }
    if user.badge("vip") == Some("1") {
        return Tier::Vip;
    }
    match user.badge("subscriber") {
        Some("3000") => Tier::T3,
        Some("2000") => Tier::T2,
        Some(_) => Tier::T1,
        None => Tier::None,
    }
}

/// Pure lookup of the configured limit for a tier and action kind.
pub fn quota(limits: &LimitsConfig, tier: Tier, kind: ActionKind) -> Limit {
    let table = match kind {
        ActionKind::Message => &limits.messages,
        ActionKind::Search => &limits.searches,
    };
    match tier {
        Tier::Broadcaster => table.broadcaster,
        Tier::Reina => table.reina,
        Tier::Mod => table.moderator,
        Tier::Vip => table.vip,
        Tier::T3 => table.t3,
        Tier::T2 => table.t2,
        Tier::T1 => table.t1,
        Tier::None => table.none,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimitsConfig;
    use std::collections::HashMap;

    fn user(badges: &[(&str, &str)], is_mod: bool) -> ChatUser {
        ChatUser {
            login: "somebody".to_string(),
            display_name: "Somebody".to_string(),
            badges: badges
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            is_mod,
        }
    }

    #[test]
    fn broadcaster_badge_wins_over_everything() {
        let u = user(&[("broadcaster", "1"), ("subscriber", "3000")], true);
        assert_eq!(derive_tier(&u, &["somebody".to_string()]), Tier::Broadcaster);
    }

    #[test]
    fn reina_list_outranks_mod_and_vip() {
        let u = user(&[("vip", "1")], true);
        assert_eq!(derive_tier(&u, &["somebody".to_string()]), Tier::Reina);
    }

    #[test]
    fn sub_badge_maps_to_tiers() {
        assert_eq!(derive_tier(&user(&[("subscriber", "3000")], false), &[]), Tier::T3);
        assert_eq!(derive_tier(&user(&[("subscriber", "2000")], false), &[]), Tier::T2);
        assert_eq!(derive_tier(&user(&[("subscriber", "12")], false), &[]), Tier::T1);
        assert_eq!(derive_tier(&user(&[], false), &[]), Tier::None);
    }

    #[test]
    fn default_quotas_match_expected_table() {
        let limits = LimitsConfig::default();
        assert_eq!(quota(&limits, Tier::T2, ActionKind::Message), Limit::Finite(60));
        assert_eq!(quota(&limits, Tier::T1, ActionKind::Message), Limit::Finite(30));
        assert_eq!(quota(&limits, Tier::None, ActionKind::Message), Limit::Finite(0));
        assert_eq!(quota(&limits, Tier::Mod, ActionKind::Message), Limit::Unlimited);
        assert_eq!(quota(&limits, Tier::Broadcaster, ActionKind::Search), Limit::Unlimited);
        assert_eq!(quota(&limits, Tier::Reina, ActionKind::Search), Limit::Finite(150));
        assert_eq!(quota(&limits, Tier::T2, ActionKind::Search), Limit::Finite(10));
        assert_eq!(quota(&limits, Tier::T1, ActionKind::Search), Limit::Finite(0));
    }

    #[test]
    fn limit_roundtrips_through_json() {
        let l: Limit = serde_json::from_str("30").unwrap();
        assert_eq!(l, Limit::Finite(30));
        let l: Limit = serde_json::from_str("null").unwrap();
        assert_eq!(l, Limit::Unlimited);
        let l: Limit = serde_json::from_str("\"unlimited\"").unwrap();
        assert_eq!(l, Limit::Unlimited);
        assert_eq!(serde_json::to_string(&Limit::Finite(10)).unwrap(), "10");
        assert_eq!(serde_json::to_string(&Limit::Unlimited).unwrap(), "null");
    }
}
