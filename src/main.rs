mod chat;
mod config;
mod core;
mod handler;
mod helpers;
mod lang;
mod memory;
mod services;
mod summary;
mod tier;
mod token;
mod usage;

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = PathBuf::from("config.toml");

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "--version" | "-V" => {
                println!("zurrabot {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" => {
                println!("zurrabot {}", env!("CARGO_PKG_VERSION"));
                println!("{}\n", env!("CARGO_PKG_DESCRIPTION"));
                println!("Usage: zurrabot [OPTIONS]\n");
                println!("Reads config.toml from the working directory (all keys optional)");
                println!("and secrets from the environment / .env:");
                println!("  TWITCH_CLIENT_ID, TWITCH_CLIENT_SECRET");
                println!("  TWITCH_ACCESS_TOKEN, TWITCH_REFRESH_TOKEN (first-run fallback)");
                println!("  GROQ_API_KEY, BRAVE_API_KEY, DISCORD_WEBHOOK_URL\n");
                println!("Options:");
                println!("  -h, --help       Print help");
                println!("  -V, --version    Print version");
                return Ok(());
            }
            other => {
                eprintln!("Unknown option: '{}'. Try --help.", other);
                std::process::exit(1);
            }
        }
    }

    let config = config::AppConfig::load(&config_path)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(crate::core::run(config))
}
