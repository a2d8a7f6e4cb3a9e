//! Outbox dispatcher: consumes notification intents and hands them to a
//! delivery backend, off the request path.
//!
//! Wakes on Postgres NOTIFY from the enqueue transaction, with a poll
//! fallback when notifications are missed or the listener drops. A failed
//! delivery is retried at most once before the row is dropped; ticket state
//! never depends on delivery succeeding.

use crate::db::Db;
use crate::error::Result;
use crate::model::Notification;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// Delivery backend seam. Real channel adapters (SMS/WhatsApp gateways)
/// live outside this crate and implement this.
#[async_trait]
pub trait Deliverer: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

/// Delivery backend that just logs. Used by the CLI when no gateway is
/// configured, and handy in tests.
pub struct LogDeliverer;

#[async_trait]
impl Deliverer for LogDeliverer {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        info!(
            identity = %notification.identity,
            code = %notification.ticket_code,
            kind = %notification.kind,
            "delivery (log only): {}",
            notification.message
        );
        Ok(())
    }
}

/// Configuration for the dispatcher loop.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Poll interval fallback when no NOTIFY arrives.
    pub poll_interval: std::time::Duration,
    /// Total delivery attempts per notification (first try + retries).
    pub max_attempts: i32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: std::time::Duration::from_secs(5),
            max_attempts: 2,
        }
    }
}

/// The dispatcher loop: listen for outbox rows, deliver, retire.
pub struct Dispatcher {
    db: Arc<Db>,
    deliverer: Arc<dyn Deliverer>,
    config: DispatchConfig,
    shutdown: Arc<Notify>,
}

impl Dispatcher {
    pub fn new(db: Arc<Db>, deliverer: Arc<dyn Deliverer>, config: DispatchConfig) -> Self {
        Self {
            db,
            deliverer,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Handle for signalling shutdown from another task.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Run the dispatcher loop until shutdown.
    pub async fn run(&self) -> Result<()> {
        let mut listener = sqlx::postgres::PgListener::connect_with(self.db.pool()).await?;
        listener.listen("outbox_ready").await?;

        info!("dispatcher started, listening for notifications");

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("dispatcher shutting down");
                    return Ok(());
                }
                notif = listener.recv() => {
                    match notif {
                        Ok(n) => info!(kind = n.payload(), "notified of outbox row"),
                        Err(e) => warn!("PgListener error: {e}, falling back to poll"),
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            // Drain whatever is pending (whether notified or polling).
            loop {
                match self.process_next().await {
                    Ok(true) => continue,
                    Ok(false) => break,
                    Err(e) => {
                        error!("dispatch error: {e}");
                        break;
                    }
                }
            }
        }
    }

    /// Claim and handle at most one pending notification.
    /// Returns false when the outbox is empty.
    pub async fn process_next(&self) -> Result<bool> {
        let Some(notification) = self.db.claim_notification().await? else {
            return Ok(false);
        };

        match self.deliverer.deliver(&notification).await {
            Ok(()) => {
                info!(
                    id = notification.id,
                    code = %notification.ticket_code,
                    attempt = notification.attempts,
                    "notification delivered"
                );
                self.db.mark_notification_sent(notification.id).await?;
            }
            Err(e) if notification.attempts >= self.config.max_attempts => {
                warn!(
                    id = notification.id,
                    code = %notification.ticket_code,
                    attempts = notification.attempts,
                    "delivery failed, dropping: {e}"
                );
                self.db.mark_notification_dropped(notification.id).await?;
            }
            Err(e) => {
                // Leave the row pending — the next pass retries it.
                warn!(
                    id = notification.id,
                    code = %notification.ticket_code,
                    attempt = notification.attempts,
                    "delivery failed, will retry: {e}"
                );
            }
        }

        Ok(true)
    }
}
