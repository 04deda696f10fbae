use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mountwatch::db::JsonStore;
use mountwatch::monitoring::probe::StorageProbe;
use mountwatch::monitoring::{MonitorService, Scheduler};
use mountwatch::notifications::service::NotificationService;
use mountwatch::server::config::ServerConfig;
use mountwatch::services::auth_service;
use mountwatch::services::http_client::{RetryPolicy, RetryingClient};
use mountwatch::version::VERSION;
use mountwatch::web;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "mountwatch.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    // Default to `info` if RUST_LOG is not set.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler.");
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
                error!(error = %e, "Failed to install SIGTERM handler.");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down."),
        _ = terminate => info!("Received SIGTERM, shutting down."),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Manually check for --version before full parsing to keep the output short.
    if std::env::args().any(|arg| arg == "--version") {
        println!("mountwatch version: {VERSION}");
        return Ok(());
    }

    let args = Args::parse();

    // Logging needs `log_dir`, so configuration errors go to stderr.
    let server_config = match ServerConfig::load(args.config.as_deref()) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Failed to load server configuration: {e}");
            return Err(e.into());
        }
    };

    init_logging(&server_config.log_dir);
    info!("Starting mountwatch, version: {}", VERSION);
    if server_config.uses_development_secret() {
        warn!("JWT_SECRET is not set, using the built-in development secret.");
    }

    // --- Store Setup ---
    let store = Arc::new(JsonStore::new(server_config.data_path()));
    store.init()?;
    info!(data_dir = %store.data_dir().display(), "Data store ready.");
    auth_service::ensure_default_password(&store)?;

    // --- Core Services ---
    let client = RetryingClient::new(RetryPolicy::default())?;
    let notifications = Arc::new(NotificationService::new(
        store.clone(),
        client.clone(),
        &server_config.telegram_api_base,
    ));
    let scheduler = Arc::new(Scheduler::new());
    let monitor = Arc::new(MonitorService::new(
        store.clone(),
        scheduler.clone(),
        StorageProbe::new(client),
        notifications,
    ));

    if monitor.resume().await {
        info!("Restored background monitoring from the persisted status.");
    }

    // --- Web Server ---
    let app = web::create_axum_router(store, monitor, server_config.clone());
    let listener = TcpListener::bind(&server_config.listen_addr).await?;
    info!(addr = %server_config.listen_addr, "HTTP server listening.");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    scheduler.shutdown().await;
    if let Err(e) = served {
        error!(error = %e, "HTTP server exited with an error.");
        return Err(e.into());
    }
    info!("mountwatch stopped.");
    Ok(())
}
