use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

mod auth;
mod config;
mod db;
mod error;
mod handlers;
mod lifecycle;
mod models;
mod property;
mod schema;
mod store;
mod token_booking;
mod uploads;

use crate::config::AppConfig;
use crate::handlers::AppState;
use crate::lifecycle::TransitionPolicy;
use crate::store::{BookingStore, MemoryStore};
use crate::token_booking::TokenBookingService;
use crate::uploads::UploadStore;

/// Periodically cancels token bookings whose validity window has closed.
fn spawn_expiry_sweep(bookings: Arc<TokenBookingService>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match bookings.expire_stale(chrono::Utc::now()).await {
                Ok(0) => log::debug!("Expiry sweep found nothing to expire"),
                Ok(n) => log::info!("Expiry sweep cancelled {} token booking(s)", n),
                Err(e) => log::error!("Expiry sweep failed: {}", e),
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Received Ctrl+C, shutting down");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let config = AppConfig::load()?;
    log::info!(
        "Loaded config: port={} base_url={} strict_transitions={} validity_days={}",
        config.port,
        config.public_base_url,
        config.strict_transitions,
        config.reservation_validity_days
    );

    let store: Arc<dyn BookingStore> = match config.database_url.as_deref().filter(|u| !u.is_empty()) {
        Some(url) => Arc::new(db::PgStore::new(db::establish_pool(url)?)),
        None => {
            log::warn!("DATABASE_URL not set; bookings are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let bookings = Arc::new(TokenBookingService::new(
        store.clone(),
        TransitionPolicy::from_strict_flag(config.strict_transitions),
        chrono::Duration::days(config.reservation_validity_days),
        config.public_base_url.clone(),
    ));
    let uploads = Arc::new(UploadStore::new(&config.upload_dir, config.max_upload_bytes));
    tokio::fs::create_dir_all(uploads.root()).await?;

    spawn_expiry_sweep(
        bookings.clone(),
        Duration::from_secs(config.sweep_interval_secs),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = AppState {
        config: Arc::new(config),
        store,
        bookings,
        uploads,
    };
    let app = handlers::build_router(state);

    log::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
