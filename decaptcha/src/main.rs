use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use decaptcha::api::{create_router, AppState};
use decaptcha::config::{Config, LogFormat};
use decaptcha::ocr::{EngineProvider, TesseractFactory};
use decaptcha::pipeline::StrategyTable;
use decaptcha::services::SolverService;

#[derive(Parser)]
#[command(name = "decaptcha")]
#[command(about = "Self-hostable CAPTCHA text recognizer")]
struct Args {
    /// Bind host (overrides DECAPTCHA_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides DECAPTCHA_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// JSON strategy table to use instead of the built-in one
    #[arg(long)]
    strategies: Option<String>,

    /// Print the effective strategy table as JSON and exit
    #[arg(long)]
    print_strategies: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    let log_format = std::env::var("LOG_FORMAT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(LogFormat::Text);
    init_tracing(log_format);

    let mut config = Config::from_env();
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(path) = args.strategies {
        config.solver.strategies_path = Some(path);
    }

    if args.print_strategies {
        let table = match &config.solver.strategies_path {
            Some(path) => StrategyTable::load(path)?,
            None => StrategyTable::builtin(),
        };
        println!("{}", serde_json::to_string_pretty(&table)?);
        return Ok(());
    }

    tracing::info!(
        "Initializing recognition engine (languages={}, shared={})...",
        config.ocr.languages,
        config.ocr.reuse_engine
    );
    let factory = Arc::new(TesseractFactory::new(&config.ocr));
    let engines = EngineProvider::new(factory, config.ocr.reuse_engine);
    if !engines.is_available() {
        tracing::warn!("Recognition engine unavailable - every captcha will be answered with an empty solution");
    }

    let solver = SolverService::from_config(&config.solver, engines)?;
    tracing::info!(
        "Strategy table v{} loaded with {} strategies",
        solver.table().version,
        solver.table().len()
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = create_router(AppState::new(config, solver));

    tracing::info!("Decaptcha starting on http://{}", addr);
    tracing::info!("  Solve:        POST http://{}/solve", addr);
    tracing::info!("  Health check: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "decaptcha=info,tower_http=debug".into());

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining in-flight requests...");
}
