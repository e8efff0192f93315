//! Outbound integrations: the language model, web search, Helix and the
//! operator's Discord webhook.

pub mod ai;
pub mod discord;
pub mod search;
pub mod twitch;
