use options_signals::api::AppState;
use options_signals::config::Config;
use options_signals::server;
use options_signals::warehouse::duckdb_client::DuckDbWarehouse;
use options_signals::warehouse::Warehouse;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    // Load configuration first so the log format can follow it
    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref().map(std::path::Path::new));

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "options_signals=info,tower_http=info".into());
    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        host = %config.host,
        port = config.port,
        database = ?config.database_path,
        parquet_dir = ?config.parquet_dir,
        "Starting options signals API"
    );

    let warehouse: Arc<dyn Warehouse> = Arc::new(
        DuckDbWarehouse::open(&config)
            .unwrap_or_else(|e| panic!("Failed to open warehouse: {e}")),
    );
    let state = Arc::new(AppState::new(warehouse));

    let app = server::build_router(state, &config);
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!(addr = %addr, "Listening");
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_timeout))
        .await
        .expect("Server error");
}

/// Resolves on Ctrl-C, then arms a watchdog that exits the process if
/// in-flight requests have not drained within `timeout`.
async fn shutdown_signal(timeout: Duration) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!(
        timeout_secs = timeout.as_secs(),
        "Shutdown signal received, draining connections"
    );
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        tracing::warn!("Graceful shutdown timed out, exiting");
        std::process::exit(1);
    });
}
