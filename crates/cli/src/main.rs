mod commands;
mod config;

use std::sync::Arc;

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    secrecy::ExposeSecret,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    botwire_command::{CommandManager, MemoryStore, Parser as CommandParser},
    botwire_wecom::{Bot, Client, Crypt, routes},
};

#[derive(Parser)]
#[command(name = "botwire", about = "botwire — WeCom streaming bot server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file path (defaults to ./botwire.toml when present).
    #[arg(long, global = true, env = "BOTWIRE_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,

    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the callback server (default when no subcommand is provided).
    Serve,
    /// Load and validate the configuration, then exit.
    CheckConfig,
}

fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<config::AppConfig> {
    match &cli.config {
        Some(path) => config::load_config(path),
        None => config::discover_and_load(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    match cli.command {
        Some(Commands::CheckConfig) => {
            let config = load_config(&cli)?;
            println!("config ok: {config:?}");
            Ok(())
        },
        Some(Commands::Serve) | None => serve(&cli).await,
    }
}

async fn serve(cli: &Cli) -> anyhow::Result<()> {
    let mut config = load_config(cli)?;
    if let Some(bind) = &cli.bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let crypt = Crypt::new(
        config.callback.token.expose_secret(),
        config.callback.encoding_aes_key.expose_secret(),
        config.callback.corp_id.clone(),
    )
    .context("invalid callback credentials")?;

    let pipeline = CommandManager::new(commands::builtin_tree)
        .with_parser(CommandParser::with_prefix(config.command.prefix.clone()))
        .with_store(Arc::new(MemoryStore::new()))
        .with_responder(Arc::new(Client::new()));

    let bot = Bot::new(crypt, config.callback.bot_config()).with_pipeline(Arc::new(pipeline));
    let app = routes::router(bot);

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "callback server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
}
