use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use courier_api::auth::{AppState, AppStateInner};
use courier_api::payments::SimulatedPayments;
use courier_api::routes;

const DEV_SECRET: &str = "dev-secret-change-me";

/// Placeholder JWT secrets that must not reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[DEV_SECRET, "change-me", "change-me-to-a-random-string"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let production = std::env::var("COURIER_ENV").is_ok_and(|v| v == "production");
    let jwt_secret = std::env::var("COURIER_JWT_SECRET").unwrap_or_default();
    let jwt_secret = if is_placeholder(&jwt_secret) {
        if production {
            eprintln!("FATAL: COURIER_JWT_SECRET is unset or still a placeholder.");
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
        warn!("COURIER_JWT_SECRET unset or a placeholder; using the development secret");
        DEV_SECRET.to_string()
    } else {
        jwt_secret
    };

    let db_path: PathBuf = std::env::var("COURIER_DB_PATH")
        .unwrap_or_else(|_| "courier.db".into())
        .into();
    let host = std::env::var("COURIER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("COURIER_PORT")
        .unwrap_or_else(|_| "8000".into())
        .parse()?;
    let token_ttl_minutes: i64 = std::env::var("COURIER_TOKEN_TTL_MINUTES")
        .unwrap_or_else(|_| "60".into())
        .parse()?;
    let token_ttl = token_ttl(token_ttl_minutes)?;

    // Init database
    let db = courier_db::Database::open(&db_path)?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret,
        token_ttl,
        payments: Box::new(SimulatedPayments),
    });

    let app = routes::router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Courier server listening on {}", addr);
    info!("Access tokens expire after {} minutes", token_ttl_minutes);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn is_placeholder(secret: &str) -> bool {
    secret.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&secret)
}

fn token_ttl(minutes: i64) -> anyhow::Result<chrono::Duration> {
    if minutes <= 0 {
        anyhow::bail!("COURIER_TOKEN_TTL_MINUTES must be positive, got {}", minutes);
    }
    chrono::Duration::try_minutes(minutes)
        .ok_or_else(|| anyhow::anyhow!("COURIER_TOKEN_TTL_MINUTES is too large: {}", minutes))
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
