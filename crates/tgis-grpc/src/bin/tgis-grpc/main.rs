use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tgis::{Dispatcher, EchoEngine, SharedEngine, ShutdownSignal};
use tgis_grpc::GrpcConfig;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// TGIS gRPC Server
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Host address to bind to
    #[arg(short = 'H', long, env = "TGIS_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "TGIS_PORT")]
    port: Option<u16>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "TGIS_LOG_LEVEL")]
    log_level: Option<String>,

    /// Config file path
    #[arg(short, long, env = "TGIS_CONFIG")]
    config_file: Option<PathBuf>,

    /// Model id reported by ModelInfo
    #[arg(long, env = "TGIS_MODEL_ID")]
    model_id: Option<String>,

    /// Directory holding LoRA adapters
    #[arg(long, env = "TGIS_ADAPTER_CACHE")]
    adapter_cache: Option<PathBuf>,

    /// Delay between generated tokens of the echo engine, in milliseconds
    #[arg(long, env = "TGIS_TOKEN_DELAY_MS", default_value_t = 0)]
    token_delay_ms: u64,

    /// Stop the server after an engine-fatal failure
    #[arg(long, env = "TGIS_TERMINATE_ON_ENGINE_FATAL")]
    terminate_on_engine_fatal: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config_file {
        match GrpcConfig::load_from_file(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!(
                    "Failed to load config file: {}. Using default configuration.",
                    e
                );
                GrpcConfig::default()
            }
        }
    } else {
        GrpcConfig::default()
    };

    // Override with CLI options
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(log_level) = cli.log_level {
        config.log_level = log_level;
    }
    if let Some(model_id) = cli.model_id {
        config.adapter.model_id = model_id;
    }
    if cli.adapter_cache.is_some() {
        config.adapter.adapter_cache = cli.adapter_cache;
    }
    if cli.terminate_on_engine_fatal {
        config.adapter.terminate_on_engine_fatal = true;
    }

    // Initialize logging
    let filter = format!("tgis={0},tgis_grpc={0}", config.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(config_path) = &cli.config_file {
        info!("Configuration file: {}", config_path.display());
    }
    if config.adapter.adapter_cache.is_none() {
        warn!("No adapter cache configured; requests naming an adapter will be rejected");
    }

    let addr = config.socket_addr()?;

    // Initialize engine and dispatcher
    let engine: SharedEngine = Arc::new(
        EchoEngine::from_config(&config.adapter)
            .with_token_delay(Duration::from_millis(cli.token_delay_ms)),
    );
    let shutdown = ShutdownSignal::new();
    let dispatcher = Arc::new(
        Dispatcher::builder(engine)
            .config(config.adapter.clone())
            .shutdown_signal(shutdown.clone())
            .build(),
    );

    // Start server
    info!(
        "Starting server on: {} (model {})",
        addr, config.adapter.model_id
    );
    let listener = TcpListener::bind(addr).await?;
    tgis_grpc::serve(dispatcher, listener, async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C, shutting down"),
            _ = shutdown.triggered() => warn!("Engine is dead, shutting down"),
        }
    })
    .await
}
