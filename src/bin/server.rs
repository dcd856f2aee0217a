//! GENIE Connect server: JSON HTTP API for the community board.
//!
//! Usage:
//!   GENIE_DB=/path/to/genie.db GENIE_BIND=127.0.0.1:3741 genie-server
//!
//! Or with args:
//!   genie-server --db /path/to/genie.db --bind 0.0.0.0:3741

use genie_connect_lib::ai_client::AssistantClient;
use genie_connect_lib::db::Database;
use genie_connect_lib::http_server::{router, AppState};
use genie_connect_lib::settings;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_BIND: &str = "0.0.0.0:3741";

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Parse simple args (no clap to keep binary small)
    let args: Vec<String> = std::env::args().collect();
    let mut db_arg: Option<&str> = None;
    let mut bind_arg: Option<&str> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" if i + 1 < args.len() => {
                db_arg = Some(&args[i + 1]);
                i += 2;
            }
            "--bind" if i + 1 < args.len() => {
                bind_arg = Some(&args[i + 1]);
                i += 2;
            }
            "--help" | "-h" => {
                println!("genie-server: GENIE Connect community HTTP API");
                println!();
                println!("Usage: genie-server [--db PATH] [--bind ADDR:PORT]");
                println!();
                println!("Environment variables:");
                println!("  GENIE_DB        Database path");
                println!("  GENIE_BIND      Bind address (default: {})", DEFAULT_BIND);
                println!("  GEMINI_API_KEY  Enables the AI assistant");
                println!("  RUST_LOG        Log filter (default: info)");
                std::process::exit(0);
            }
            other => {
                warn!("Ignoring unknown argument: {}", other);
                i += 1;
            }
        }
    }

    // Settings first: the stored custom db path feeds database discovery
    settings::init(settings::app_data_dir());

    let bind_addr = bind_arg
        .map(|s| s.to_string())
        .or_else(|| std::env::var("GENIE_BIND").ok().filter(|s| !s.is_empty()))
        .unwrap_or_else(|| DEFAULT_BIND.to_string());

    let db_path = settings::find_database(db_arg);
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(parent) {
            error!("Failed to create database directory {}: {}", parent.display(), e);
            std::process::exit(1);
        }
    }

    let db = match Database::new(&db_path) {
        Ok(db) => {
            info!("Database: {}", db.get_path());
            Arc::new(db)
        }
        Err(e) => {
            error!("Failed to open database {}: {}", db_path.display(), e);
            std::process::exit(1);
        }
    };

    let assistant = match AssistantClient::from_settings() {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build AI client: {}", e);
            std::process::exit(1);
        }
    };
    if !assistant.is_configured() {
        warn!("GEMINI_API_KEY is not set; /api/ai will return 500");
    }

    let state = AppState::new(db, assistant, settings::current().ai_requests_per_minute);
    let app = router(state);

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", bind_addr, e);
            std::process::exit(1);
        }
    };

    info!("Listening on {}", bind_addr);
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("Server stopped");
}
