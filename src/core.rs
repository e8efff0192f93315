//! Daemon orchestration: wires the token manager, chat transport, handler
//! and the periodic loops together, and owns reconnection and shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::chat::{ChatClient, ChatEvent};
use crate::config::AppConfig;
use crate::handler::Handler;
use crate::memory::{self, MemoryStore};
use crate::services::ai::{AiService, ChatModel, GroqModel};
use crate::services::discord::DiscordNotifier;
use crate::services::search::{BraveSearch, WebSearch};
use crate::services::twitch::HelixClient;
use crate::summary::SummaryTracker;
use crate::token::{TokenEvent, TokenManager, TwitchIdentity};
use crate::usage::UsageTracker;

const DEFAULT_PERSONA: &str =
    "Eres Manolito Zurrapa, el bot descarado del canal de Teseo. Hablas con humor, \
     cercanía y algo de retranca, sin pasarte nunca de la raya.";

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const RECONNECT_ATTEMPTS: u32 = 10;

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let identity = Arc::new(TwitchIdentity::new(
        &config.token,
        &config.twitch.client_id,
        &config.twitch.client_secret,
    ));
    let tokens = Arc::new(TokenManager::new(
        config.token.clone(),
        config.twitch.client_id.clone(),
        identity,
    ));
    // No credential, no daemon.
    tokens.load().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let validation_task = tokens.spawn_auto_validation(shutdown_rx.clone());

    let usage = UsageTracker::new(
        config.limits,
        config.search.user_cooldown_mins,
        &config.data.dir,
    );
    let mem = Arc::new(MemoryStore::new(
        config.community.clone(),
        config.emotes.clone(),
    ));
    let cleanup_task = memory::spawn_cleanup(
        Arc::clone(&mem),
        Duration::from_secs(config.data.memory_cleanup_secs),
        shutdown_rx.clone(),
    );

    let persona = match std::fs::read_to_string(&config.data.context_path) {
        Ok(text) => text,
        Err(_) => {
            info!(path = %config.data.context_path, "No persona file, using the built-in one");
            DEFAULT_PERSONA.to_string()
        }
    };
    let model: Arc<dyn ChatModel> = Arc::new(GroqModel::new(&config.ai));
    let ai = AiService::new(model, persona, config.ai.response_chars);

    let search: Arc<dyn WebSearch> = Arc::new(BraveSearch::new(&config.search));
    let helix = Arc::new(HelixClient::new(
        Arc::clone(&tokens),
        &config.token.helix_url,
        &config.twitch.channel,
    ));
    let discord = Arc::new(DiscordNotifier::new(&config.discord.webhook_url));
    let summary = Arc::new(SummaryTracker::new());

    let handler = Handler::new(
        config.clone(),
        usage,
        Arc::clone(&mem),
        ai.clone(),
        search,
        helix,
        Arc::clone(&discord),
        Arc::clone(&summary),
    );

    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<String>(64);
    let summary_task = spawn_summary_loop(
        ai,
        Arc::clone(&summary),
        Arc::clone(&discord),
        outgoing_tx,
        Duration::from_secs(config.summary.interval_secs),
        shutdown_rx,
    );

    let mut token_events = tokens.subscribe();
    let (mut client, mut chat_rx) = connect_chat(&config, &tokens).await?;

    info!(channel = %config.twitch.channel, "Bot running");

    loop {
        tokio::select! {
            event = chat_rx.recv() => {
                let Some(event) = event else { continue };
                if matches!(event, ChatEvent::Disconnected) {
                    warn!("Chat connection lost, reconnecting");
                    (client, chat_rx) = connect_chat(&config, &tokens).await?;
                    continue;
                }
                for line in handler.handle(&event).await {
                    if let Err(e) = client.say(&line).await {
                        warn!("Could not send chat line: {}", e);
                    }
                }
            }
            Some(line) = outgoing_rx.recv() => {
                if let Err(e) = client.say(&line).await {
                    warn!("Could not send chat line: {}", e);
                }
            }
            result = token_events.recv() => {
                let Ok(event) = result else { continue };
                match event {
                    TokenEvent::Refreshed { .. } => {
                        info!("Token refreshed, reconnecting chat with the new one");
                        client.close().await;
                        (client, chat_rx) = connect_chat(&config, &tokens).await?;
                    }
                    TokenEvent::AuthRequired => {
                        error!("Manual re-authentication required");
                        discord
                            .operator_alert(
                                "🔑 Reautenticación necesaria",
                                "El refresh token ha sido rechazado. Hay que volver a autorizar el bot a mano.",
                            )
                            .await;
                    }
                    TokenEvent::RefreshFailed { error } => {
                        discord
                            .operator_alert("⚠️ Fallo al refrescar el token", &error)
                            .await;
                    }
                    TokenEvent::Dead => {
                        error!("Credential is dead; the bot cannot authenticate");
                        discord
                            .operator_alert(
                                "💀 Token muerto",
                                "La validación periódica no pudo recuperar el token. El bot seguirá intentándolo, pero necesita atención.",
                            )
                            .await;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    client.close().await;
    let _ = tokio::join!(validation_task, cleanup_task, summary_task);
    info!("Bye");
    Ok(())
}

/// Connect to chat with the current access token, retrying a few times
/// before giving up.
async fn connect_chat(
    config: &AppConfig,
    tokens: &Arc<TokenManager>,
) -> anyhow::Result<(ChatClient, mpsc::Receiver<ChatEvent>)> {
    for attempt in 1..=RECONNECT_ATTEMPTS {
        let Some(token) = tokens.access_token().await else {
            anyhow::bail!("no access token available for chat");
        };
        match ChatClient::connect(&config.twitch, &token).await {
            Ok(pair) => return Ok(pair),
            Err(e) => {
                warn!(attempt, "Chat connection failed: {}", e);
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
    anyhow::bail!("could not connect to chat after {} attempts", RECONNECT_ATTEMPTS)
}

/// Every interval, turn the accumulated stream moments into a short summary
/// and post it to chat and Discord. Quiet intervals post nothing.
fn spawn_summary_loop(
    ai: AiService,
    summary: Arc<SummaryTracker>,
    discord: Arc<DiscordNotifier>,
    outgoing: mpsc::Sender<String>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!(mins = interval.as_secs() / 60, "Summary loop started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    info!("Summary loop stopped");
                    return;
                }
            }

            let Some(digest) = summary.take_digest() else { continue };
            match ai.summarize(&digest).await {
                Ok(text) => {
                    summary.record_mini(text.clone());
                    let line = format!("📝 resumen del último rato: {}", text);
                    if outgoing.send(line).await.is_err() {
                        return;
                    }
                    discord.post_summary(&text).await;
                }
                Err(e) => warn!("Periodic summary failed: {}", e),
            }
        }
    })
}
