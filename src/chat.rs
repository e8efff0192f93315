//! Twitch chat transport: IRC-over-WebSocket client plus message parsing.
//!
//! The client owns the write half behind a mutex and pumps the read half in
//! a background task, translating raw IRC lines into [`ChatEvent`]s on an
//! mpsc channel. PING/PONG is answered inside the pump so callers never see
//! keepalive traffic.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::config::TwitchConfig;

const TWITCH_IRC_URL: &str = "wss://irc-ws.chat.twitch.tv:443";

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Who said something, as Twitch describes them in message tags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatUser {
    pub login: String,
    pub display_name: String,
    /// badge name -> version, e.g. "subscriber" -> "3000".
    pub badges: HashMap<String, String>,
    pub is_mod: bool,
}

impl ChatUser {
    pub fn badge(&self, name: &str) -> Option<&str> {
        self.badges.get(name).map(String::as_str)
    }
}

/// Everything the rest of the bot reacts to.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    Connected,
    Privmsg {
        user: ChatUser,
        text: String,
    },
    Cheer {
        user: ChatUser,
        bits: u64,
        text: String,
    },
    Sub {
        login: String,
        display_name: String,
        tier: String,
        is_resub: bool,
        cumulative_months: u32,
    },
    SubGift {
        gifter: String,
        recipient: String,
        tier: String,
    },
    MysteryGift {
        gifter: String,
        count: u32,
    },
    Raid {
        from: String,
        viewers: u64,
    },
    /// Viewer milestone: consecutive-streams watch streak.
    WatchStreak {
        login: String,
        display_name: String,
        streak: u32,
    },
    /// The socket closed; the orchestrator decides whether to reconnect.
    Disconnected,
}

/// One parsed IRCv3 line.
#[derive(Debug, Clone, Default)]
pub struct IrcMessage {
    pub tags: HashMap<String, String>,
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
    pub trailing: Option<String>,
}

impl IrcMessage {
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    /// Sender login from the prefix (`nick!user@host`).
    pub fn sender(&self) -> Option<&str> {
        self.prefix.as_deref().map(|p| match p.find('!') {
            Some(idx) => &p[..idx],
            None => p,
        })
    }
}

/// IRCv3 tag values escape `;`, spaces, backslashes and newlines.
fn unescape_tag(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Parse one raw IRC line. Returns `None` for empty input.
pub fn parse_line(line: &str) -> Option<IrcMessage> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return None;
    }

    let mut msg = IrcMessage::default();
    let mut rest = line;

    if let Some(stripped) = rest.strip_prefix('@') {
        let (raw_tags, remainder) = stripped.split_once(' ')?;
        for pair in raw_tags.split(';') {
            match pair.split_once('=') {
                Some((k, v)) => {
                    msg.tags.insert(k.to_string(), unescape_tag(v));
                }
                None => {
                    msg.tags.insert(pair.to_string(), String::new());
                }
            }
        }
        rest = remainder;
    }

    if let Some(stripped) = rest.strip_prefix(':') {
        let (prefix, remainder) = stripped.split_once(' ')?;
        msg.prefix = Some(prefix.to_string());
        rest = remainder;
    }

    let (before_trailing, trailing) = match rest.split_once(" :") {
        Some((head, tail)) => (head, Some(tail.to_string())),
        None => (rest, None),
    };
    msg.trailing = trailing;

    let mut parts = before_trailing.split_ascii_whitespace();
    msg.command = parts.next()?.to_string();
    msg.params = parts.map(str::to_string).collect();

    Some(msg)
}

/// Build a [`ChatUser`] from a message's tags and prefix.
fn user_from(msg: &IrcMessage) -> ChatUser {
    let login = msg.sender().unwrap_or_default().to_lowercase();
    let display_name = msg
        .tag("display-name")
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| login.clone());

    let mut badges = HashMap::new();
    if let Some(raw) = msg.tag("badges") {
        for entry in raw.split(',').filter(|e| !e.is_empty()) {
            if let Some((name, version)) = entry.split_once('/') {
                badges.insert(name.to_string(), version.to_string());
            }
        }
    }

    let is_mod = msg.tag("mod") == Some("1") || badges.contains_key("moderator");

    ChatUser {
        login,
        display_name,
        badges,
        is_mod,
    }
}

/// Translate a parsed line into a chat event, if it is one we care about.
pub fn event_from(msg: &IrcMessage) -> Option<ChatEvent> {
    match msg.command.as_str() {
        "PRIVMSG" => {
            let user = user_from(msg);
            let text = msg.trailing.clone().unwrap_or_default();
            if let Some(bits) = msg.tag("bits").and_then(|b| b.parse::<u64>().ok()) {
                return Some(ChatEvent::Cheer { user, bits, text });
            }
            Some(ChatEvent::Privmsg { user, text })
        }
        "USERNOTICE" => {
            let login = msg.tag("login").unwrap_or_default().to_lowercase();
            let display_name = msg
                .tag("display-name")
                .filter(|d| !d.is_empty())
                .unwrap_or(&login)
                .to_string();
            let tier = msg.tag("msg-param-sub-plan").unwrap_or("1000").to_string();
            match msg.tag("msg-id")? {
                "sub" => Some(ChatEvent::Sub {
                    login,
                    display_name,
                    tier,
                    is_resub: false,
                    cumulative_months: 1,
                }),
                "resub" => Some(ChatEvent::Sub {
                    login,
                    display_name,
                    tier,
                    is_resub: true,
                    cumulative_months: msg
                        .tag("msg-param-cumulative-months")
                        .and_then(|m| m.parse().ok())
                        .unwrap_or(1),
                }),
                "subgift" => Some(ChatEvent::SubGift {
                    gifter: display_name,
                    recipient: msg
                        .tag("msg-param-recipient-display-name")
                        .unwrap_or_default()
                        .to_string(),
                    tier,
                }),
                "submysterygift" => Some(ChatEvent::MysteryGift {
                    gifter: display_name,
                    count: msg
                        .tag("msg-param-mass-gift-count")
                        .and_then(|c| c.parse().ok())
                        .unwrap_or(1),
                }),
                "viewermilestone" => Some(ChatEvent::WatchStreak {
                    login,
                    display_name,
                    streak: msg
                        .tag("msg-param-value")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0),
                }),
                "raid" => Some(ChatEvent::Raid {
                    from: msg
                        .tag("msg-param-displayName")
                        .filter(|d| !d.is_empty())
                        .unwrap_or(&display_name)
                        .to_string(),
                    viewers: msg
                        .tag("msg-param-viewerCount")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0),
                }),
                _ => None,
            }
        }
        _ => None,
    }
}

pub struct ChatClient {
    writer: Arc<Mutex<WsSink>>,
    channel: String,
    pump: JoinHandle<()>,
}

impl ChatClient {
    /// Connect, authenticate and join the configured channel. Events arrive
    /// on the returned receiver until the socket closes.
    pub async fn connect(
        config: &TwitchConfig,
        access_token: &str,
    ) -> anyhow::Result<(Self, mpsc::Receiver<ChatEvent>)> {
        info!(channel = %config.channel, "Connecting to Twitch chat");
        let (stream, _) = connect_async(TWITCH_IRC_URL).await?;
        let (mut sink, source) = stream.split();

        sink.send(Message::Text(
            "CAP REQ :twitch.tv/tags twitch.tv/commands twitch.tv/membership".into(),
        ))
        .await?;
        sink.send(Message::Text(format!("PASS oauth:{}", access_token)))
            .await?;
        sink.send(Message::Text(format!("NICK {}", config.bot_username)))
            .await?;
        sink.send(Message::Text(format!("JOIN #{}", config.channel)))
            .await?;

        let writer = Arc::new(Mutex::new(sink));
        let (tx, rx) = mpsc::channel(256);
        let pump = tokio::spawn(Self::pump(source, Arc::clone(&writer), tx));

        Ok((
            Self {
                writer,
                channel: config.channel.clone(),
                pump,
            },
            rx,
        ))
    }

    async fn pump(mut source: WsSource, writer: Arc<Mutex<WsSink>>, tx: mpsc::Sender<ChatEvent>) {
        while let Some(frame) = source.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => continue,
            };

            for line in text.split("\r\n").filter(|l| !l.is_empty()) {
                let Some(msg) = parse_line(line) else { continue };
                match msg.command.as_str() {
                    "PING" => {
                        let pong = format!(
                            "PONG :{}",
                            msg.trailing.as_deref().unwrap_or("tmi.twitch.tv")
                        );
                        if let Err(e) = writer.lock().await.send(Message::Text(pong)).await {
                            warn!("Could not answer PING: {}", e);
                        }
                    }
                    "001" => {
                        info!("Authenticated with Twitch chat");
                        if tx.send(ChatEvent::Connected).await.is_err() {
                            return;
                        }
                    }
                    "NOTICE" => {
                        debug!(notice = ?msg.trailing, "Server notice");
                    }
                    _ => {
                        if let Some(event) = event_from(&msg) {
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        }
        let _ = tx.send(ChatEvent::Disconnected).await;
    }

    /// Send a chat line to the joined channel.
    pub async fn say(&self, text: &str) -> anyhow::Result<()> {
        let line = format!("PRIVMSG #{} :{}", self.channel, text);
        self.writer.lock().await.send(Message::Text(line)).await?;
        Ok(())
    }

    pub async fn close(self) {
        let _ = self.writer.lock().await.send(Message::Close(None)).await;
        self.pump.abort();
    }
}
