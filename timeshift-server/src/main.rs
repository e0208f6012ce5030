//! Time-shift chess server
//!
//! Serves matchmaking, live matches over WebSocket and the persisted match
//! history over REST. Run with: `cargo run --package timeshift-server`

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use timeshift_server::{api, now_ms, Config, GameService, SqliteStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();

    let store = SqliteStore::open(&config.db_path)
        .with_context(|| format!("opening database {}", config.db_path.display()))?;
    tracing::info!(path = %config.db_path.display(), "database ready");

    let service = Arc::new(GameService::new(Arc::new(store), config.rating_k));

    let sweeper = Arc::clone(&service);
    let period = Duration::from_millis(config.sweep_interval_ms.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let ended = sweeper.sweep_timeouts(now_ms());
            if ended > 0 {
                tracing::info!(ended, "sweep ended flagged matches");
            }
        }
    });

    let app = api::router(service);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "time-shift server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
