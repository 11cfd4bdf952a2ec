//! Proactive scheduler host.
//!
//! Runs independently of the gateway process against the same relational
//! store — sqlite's WAL mode tolerates one writer and concurrent readers
//! across processes, which is all a reminder/calendar tick needs. The
//! gateway owns the knowledge graph and interaction loop; this process only
//! reads and marks reminders/events, so there's no single-writer conflict to
//! route around the way the graph's JSON snapshot would require.

use psycho_core::store::RelationalStore;
use psycho_core::{Config, ProactiveScheduler};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[psycho-daemon] .env not loaded: {e} (using system environment)");
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into())))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let relational = Arc::new(
        RelationalStore::new(config.relational_db_path()).expect("open relational store"),
    );

    let tick_interval = Duration::from_secs(config.proactive_scheduler_interval_secs.max(1));
    let scheduler = Arc::new(ProactiveScheduler::new(relational, tick_interval));
    let mut notifications = scheduler.subscribe();

    tracing::info!(
        tick_interval_secs = tick_interval.as_secs(),
        storage_path = %config.storage_path,
        "psycho-daemon started"
    );

    let (handle, stop_tx) = scheduler.clone().start();

    loop {
        tokio::select! {
            notification = notifications.recv() => {
                match notification {
                    Ok(n) => tracing::info!(id = %n.id, kind = ?n.kind, title = %n.title, "notification"),
                    Err(_) => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("CTRL-C received; shutting down daemon");
                let _ = stop_tx.send(());
                break;
            }
        }
    }

    let _ = handle.await;
}
