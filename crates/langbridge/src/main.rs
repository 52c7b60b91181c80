use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use langbridge::auth;
use langbridge::config::{Config, redact};
use langbridge::gateway::Gateway;
use langbridge::server::{self, AppState};

#[derive(Parser)]
#[command(
    name = "langbridge",
    version,
    about = "Relay Slack mentions to a Langflow flow"
)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "langbridge.yaml", global = true)]
    config: PathBuf,

    /// Log filter directive, e.g. `debug` or `langbridge=trace`
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Override the bind host
        #[arg(long)]
        host: Option<String>,
        /// Override the bind port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Load and validate the configuration, then print a redacted summary
    CheckConfig,
    /// Print the X-Slack-Signature value for a request body
    Sign {
        /// Value of X-Slack-Request-Timestamp
        #[arg(long)]
        timestamp: String,
        /// File holding the raw request body
        #[arg(long)]
        body_file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let directive = cli.log_level.as_deref().unwrap_or("langbridge=info");
    let filter = EnvFilter::from_default_env()
        .add_directive(directive.parse()?);
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
    }) {
        Command::Serve { host, port } => serve(&cli.config, host, port).await,
        Command::CheckConfig => check_config(&cli.config).await,
        Command::Sign {
            timestamp,
            body_file,
        } => sign(&cli.config, &timestamp, &body_file).await,
    }
}

async fn serve(
    config_path: &Path,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let mut config = Config::resolve(config_path)
        .await
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let gateway = Gateway::from_config(&config)
        .context("Failed to build event gateway")?;
    let state = AppState::from_config(gateway, &config);
    let app = server::build_app(
        state.clone(),
        &config.server.events_path,
        config.server.request_timeout_seconds,
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(
        %addr,
        events_path = %config.server.events_path,
        ack_before_relay = config.server.ack_before_relay,
        "Listening for Slack events"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    // Acknowledged mentions still owe Slack a reply.
    let grace = config.backend.timeout() + config.slack.post_timeout();
    if !state.drain(grace).await {
        bail!("Shut down with background relays still pending");
    }

    info!("Server shut down cleanly");
    Ok(())
}

async fn check_config(config_path: &Path) -> anyhow::Result<()> {
    let config = Config::resolve(config_path)
        .await
        .with_context(|| format!("Invalid config {}", config_path.display()))?;

    println!("config:            {}", config_path.display());
    println!(
        "listen:            {}:{}{}",
        config.server.host, config.server.port, config.server.events_path
    );
    println!("ack before relay:  {}", config.server.ack_before_relay);
    println!("max relays:        {}", config.server.max_in_flight_relays);
    println!("slack api:         {}", config.slack.api_base);
    println!("slack bot token:   {}", redact(&config.slack.bot_token));
    println!("signing secret:    {}", redact(&config.slack.signing_secret));
    println!("verify handshake:  {}", config.slack.verify_url_verification);
    println!("backend url:       {}", config.backend.url);
    println!("backend token:     {}", redact(&config.backend.token));
    println!("answer field:      {}", config.backend.answer_field);
    println!("default text:      {}", config.dispatch.default_text);
    Ok(())
}

async fn sign(config_path: &Path, timestamp: &str, body_file: &Path) -> anyhow::Result<()> {
    let mut config = Config::load(config_path)
        .await
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    config.apply_env(|key| std::env::var(key).ok())?;
    if config.slack.signing_secret.trim().is_empty() {
        bail!("slack.signing_secret is not set (config file or SLACK_SIGNING_SECRET)");
    }

    let body = tokio::fs::read(body_file)
        .await
        .with_context(|| format!("Failed to read {}", body_file.display()))?;
    println!(
        "{}",
        auth::sign(config.slack.signing_secret.as_bytes(), timestamp, &body)
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
