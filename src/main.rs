//! IndieStream operator binary

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use kube::{Client, CustomResourceExt};
use tokio::select;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use indiestream_operator::controller::{run_controller, ControllerState, KubeStore};
use indiestream_operator::crd::Game;
use indiestream_operator::rest_api;
use indiestream_operator::OperatorConfig;

/// IndieStream - Kubernetes operator for cloud-gaming sessions
#[derive(Parser, Debug)]
#[command(name = "indiestream-operator", version, about, long_about = None)]
struct Cli {
    /// Log output format
    #[arg(
        long,
        global = true,
        env = "RUST_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Text
    )]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the Game controller and its HTTP server
    Run(OperatorConfig),

    /// Print the Game CRD manifest and exit
    Crd,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match cli.command {
        Commands::Crd => {
            print!("{}", serde_yaml::to_string(&Game::crd())?);
            return Ok(());
        }
        Commands::Run(config) => config,
    };

    init_logging(cli.log_format);
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        gateway = %format!("{}/{}", config.gateway_namespace, config.gateway_name),
        "Starting IndieStream operator"
    );

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    let shutdown = CancellationToken::new();
    let state = Arc::new(ControllerState {
        store: Arc::new(KubeStore::new(client.clone(), &config.field_manager)),
        config,
        shutdown: shutdown.clone(),
    });

    // Abort in-flight address waits so the controller can drain
    cancel_on_signal(shutdown.clone())?;

    let server_state = state.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = rest_api::run_server(server_state).await {
            error!("HTTP server failed: {}", e);
        }
    });

    let result = run_controller(client, state).await;
    shutdown.cancel();
    let _ = server.await;

    result.context("controller exited with an error")
}

/// Cancel `token` on SIGTERM (how Kubernetes stops pods) or SIGINT
fn cancel_on_signal(token: CancellationToken) -> anyhow::Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("failed to set up SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("failed to set up SIGINT handler")?;
    tokio::spawn(async move {
        select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("Received SIGINT, shutting down"),
        }
        token.cancel();
    });
    Ok(())
}
