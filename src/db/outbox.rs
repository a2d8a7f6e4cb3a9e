//! Notification outbox rows: append-only intents, claimed one at a time by
//! the dispatcher.
//!
//! Enqueue and NOTIFY happen in one transaction — the dispatcher only wakes
//! for rows that committed.

use crate::error::Result;
use crate::model::{Channel, Notification, NotificationState};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;

impl super::Db {
    /// Append an outbound message intent and wake the dispatcher.
    pub async fn enqueue_notification(
        &self,
        identity: &str,
        ticket_code: &str,
        kind: &str,
        message: &str,
        channel: Channel,
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let row: (i64,) = sqlx::query_as(
            "INSERT INTO notifications (identity, ticket_code, kind, message, channel)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id",
        )
        .bind(identity)
        .bind(ticket_code)
        .bind(kind)
        .bind(message)
        .bind(channel.as_str())
        .fetch_one(&mut *tx)
        .await?;

        // NOTIFY is transactional — only fires on commit
        sqlx::query("SELECT pg_notify('outbox_ready', $1)")
            .bind(kind)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        metrics::outbox_operations().add(1, &[KeyValue::new("operation", "enqueue")]);
        Ok(row.0)
    }

    /// Claim the oldest pending notification, incrementing its attempt
    /// count. SKIP LOCKED keeps concurrent dispatchers off the same row.
    /// Returns None when nothing is pending.
    pub async fn claim_notification(&self) -> Result<Option<Notification>> {
        let row: Option<NotificationRow> = sqlx::query_as(
            "UPDATE notifications
             SET attempts = attempts + 1
             WHERE id = (
                 SELECT id FROM notifications
                 WHERE state = 'pending'
                 ORDER BY id ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING id, identity, ticket_code, kind, message, channel, state, attempts, created_at",
        )
        .fetch_optional(&self.pool)
        .await?;

        metrics::outbox_operations().add(
            1,
            &[KeyValue::new(
                "operation",
                if row.is_some() { "claim" } else { "claim_empty" },
            )],
        );

        row.map(NotificationRow::try_into_notification).transpose()
    }

    /// Mark a notification delivered.
    pub async fn mark_notification_sent(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE notifications SET state = 'sent' WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        metrics::outbox_operations().add(1, &[KeyValue::new("operation", "sent")]);
        Ok(())
    }

    /// Give up on a notification after its retry budget is spent.
    pub async fn mark_notification_dropped(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE notifications SET state = 'dropped' WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        metrics::outbox_operations().add(1, &[KeyValue::new("operation", "dropped")]);
        Ok(())
    }

    /// How many notifications are waiting for delivery.
    pub async fn pending_notifications(&self) -> Result<i64> {
        let row: (i64,) =
            sqlx::query_as("SELECT count(*) FROM notifications WHERE state = 'pending'")
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: i64,
    identity: String,
    ticket_code: String,
    kind: String,
    message: String,
    channel: String,
    state: String,
    attempts: i32,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl NotificationRow {
    fn try_into_notification(self) -> Result<Notification> {
        Ok(Notification {
            id: self.id,
            identity: self.identity,
            ticket_code: self.ticket_code,
            kind: self.kind,
            message: self.message,
            channel: self.channel.parse::<Channel>()?,
            state: self.state.parse::<NotificationState>()?,
            attempts: self.attempts,
            created_at: self.created_at,
        })
    }
}
