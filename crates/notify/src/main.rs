//! Quill notification tail
//!
//! Connects to the notification service with `NOTIFY_ACCESS_TOKEN` and logs
//! toasts, unread counts and connection changes until interrupted.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use quill_notify::{NotificationClient, SyncConfig, WebSocketTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = SyncConfig::from_env().context("Failed to load configuration")?;
    tracing::info!(
        url = %config.ws_url,
        max_attempts = config.backoff.max_attempts,
        snapshot_limit = config.initial_snapshot_limit,
        "Starting notification tail"
    );

    let credential = config.credential();
    let client = NotificationClient::builder(WebSocketTransport::new(config.ws_url.clone()))
        .config(config)
        .on_toast(|toast| {
            tracing::info!(
                notification_id = %toast.notification_id,
                title = %toast.title,
                link = toast.action.as_ref().map(|a| a.link.as_str()),
                "{}",
                toast.message
            );
        })
        .spawn();

    client.on(|status| {
        if status.stale {
            tracing::warn!(state = %status.state, "Notification feed is stale");
        }
    })?;
    client
        .subscribe(credential)
        .await
        .context("Set NOTIFY_ACCESS_TOKEN to subscribe to notifications")?;

    let mut feed = client.watch_feed();
    let mut last_unread = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = feed.changed() => {
                if changed.is_err() {
                    break;
                }
                let unread = feed.borrow_and_update().unread_count;
                if last_unread != Some(unread) {
                    tracing::info!(unread, "Unread notifications");
                    last_unread = Some(unread);
                }
            }
        }
    }

    client.teardown().await?;
    tracing::info!("Notification tail stopped");
    Ok(())
}

/// `RUST_LOG` filters, `LOG_FORMAT=json` switches to JSON lines
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json");

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
