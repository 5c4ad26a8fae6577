mod bootstrap;
mod config;
mod retention;

use std::sync::Arc;

use axum::http::{HeaderValue, Method, header::{AUTHORIZATION, CONTENT_TYPE}};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use fete_api::AppStateInner;
use fete_api::state::AppState;
use fete_db::Database;
use fete_gateway::Dispatcher;
use fete_payments::StripeGateway;

use crate::config::ServerConfig;

const RETENTION_INTERVAL_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fete=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env();
    if let Err(reason) = config.check_jwt_secret() {
        eprintln!("FATAL: {reason}.");
        eprintln!("       Set FETE_JWT_SECRET in your .env file and restart.");
        std::process::exit(1);
    }

    let db = Database::open(&config.db_path)?;
    if let Some(seed) = &config.bootstrap_admin {
        bootstrap::ensure_admin(&db, seed)?;
    }

    if config.stripe_secret_key.is_none() {
        warn!("STRIPE_SECRET_KEY is unset; payment endpoints will fail");
    }
    if config.stripe_webhook_secret.is_none() {
        warn!("STRIPE_WEBHOOK_SECRET is unset; webhooks will be rejected");
    }

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        dispatcher: Dispatcher::new(),
        payments: Arc::new(StripeGateway::new(config.stripe_secret_key.clone())),
        webhook_secret: config.stripe_webhook_secret.clone(),
    });

    if config.chat_retention_days > 0 {
        info!("Chat retention: {} days", config.chat_retention_days);
        tokio::spawn(retention::run_retention_loop(
            state.clone(),
            config.chat_retention_days,
            RETENTION_INTERVAL_SECS,
        ));
    }

    let app = fete_api::router(state)
        .layer(cors_layer(config.client_url.as_deref()))
        .layer(TraceLayer::new_for_http());

    info!("Fete server listening on {}", config.http_addr);

    let listener = tokio::net::TcpListener::bind(config.http_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Pin CORS to the web client's origin when one is configured.
fn cors_layer(client_url: Option<&str>) -> CorsLayer {
    let Some(origin) = client_url.and_then(|url| HeaderValue::from_str(url.trim_end_matches('/')).ok()) else {
        return CorsLayer::permissive();
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true)
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
