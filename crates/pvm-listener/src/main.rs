//! pvm-listener entry point.
//!
//! This file is intentionally thin: it sets up tracing, connects the store
//! (bounded retry, fatal on exhaustion), runs migrations, and keeps a broker
//! session alive. All reconciliation logic lives in the library modules.

use std::time::Duration;

use anyhow::Result;
use pvm_broker::ws::WsSession;
use pvm_config::Config;
use pvm_listener::engine::ListenerSession;
use pvm_listener::notify::{Notifier, NullNotifier, WebhookNotifier};
use sqlx::PgPool;
use tracing::{info, warn};

/// Delay between broker reconnect attempts. Unlike the store, the broker may
/// come and go; the engine waits it out indefinitely.
const BROKER_RECONNECT_DELAY: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience).
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cfg = Config::from_env()?;

    // The process cannot run without its store: bounded retry, then fatal.
    let pool = pvm_db::connect_with_retry(
        &cfg.database_url,
        pvm_db::CONNECT_MAX_ATTEMPTS,
        pvm_db::CONNECT_RETRY_DELAY,
    )
    .await?;
    pvm_db::migrate(&pool).await?;
    info!("store ready");

    match cfg.notify_url.clone() {
        Some(endpoint) => {
            run_forever(pool, cfg, WebhookNotifier::new(endpoint)).await;
        }
        None => {
            info!("no notification endpoint configured; settlement notifications disabled");
            run_forever(pool, cfg, NullNotifier).await;
        }
    }

    Ok(())
}

/// Keep one broker session alive at a time, forever.
async fn run_forever<N: Notifier + Clone>(pool: PgPool, cfg: Config, notifier: N) {
    loop {
        let transport = match WsSession::connect(
            &cfg.broker_url,
            cfg.broker_username.as_deref(),
            cfg.broker_password.as_deref(),
        )
        .await
        {
            Ok(t) => t,
            Err(e) => {
                warn!("broker unreachable, retrying: {e:#}");
                tokio::time::sleep(BROKER_RECONNECT_DELAY).await;
                continue;
            }
        };
        info!(broker = %cfg.broker_url, group_id = %cfg.group_id, "connected to broker");

        let mut session = ListenerSession::new(
            pool.clone(),
            transport,
            notifier.clone(),
            cfg.topics.clone(),
            cfg.group_id.clone(),
        );
        match session.run().await {
            Ok(()) => warn!("broker closed the subscription stream; reconnecting"),
            Err(e) => warn!("broker session failed: {e:#}; reconnecting"),
        }
        tokio::time::sleep(BROKER_RECONNECT_DELAY).await;
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
