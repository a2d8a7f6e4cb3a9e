//! Ticket store: creation with duplicate-identity guard, lookups, status
//! writes, and ordering persistence.
//!
//! Every creation and status change appends its event row inside the same
//! transaction as the ticket write.

use crate::error::{Error, Result};
use crate::model::{Channel, Event, EventKind, NewTicket, Status, Ticket};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use rand::Rng;

/// Attempts against the 4-digit code space before giving up.
const CODE_RETRIES: usize = 8;

impl super::Db {
    /// Create a ticket in status `waiting`, appending the `joined` event.
    ///
    /// The unique partial index on (identity) over active statuses makes a
    /// second active ticket per identity impossible, even under concurrent
    /// joins; collisions on the generated code are retried.
    pub async fn create_ticket(&self, new: &NewTicket) -> Result<Ticket> {
        for _ in 0..CODE_RETRIES {
            let code = generate_code();
            match self.try_create_ticket(new, &code).await {
                Err(Error::Database(sqlx::Error::Database(ref db_err)))
                    if db_err.constraint() == Some("idx_tickets_code") =>
                {
                    continue;
                }
                other => return other,
            }
        }
        Err(Error::Other(
            "could not allocate a unique ticket code".to_string(),
        ))
    }

    async fn try_create_ticket(&self, new: &NewTicket, code: &str) -> Result<Ticket> {
        let mut tx = self.pool.begin().await?;

        // DO NOTHING fires only on the active-identity index; a code
        // collision surfaces as a unique violation handled by the caller.
        let inserted: Option<TicketRow> = sqlx::query_as(
            "INSERT INTO tickets (code, status, identity, note, channel)
             VALUES ($1, 'waiting', $2, $3, $4)
             ON CONFLICT (identity) WHERE identity IS NOT NULL AND status IN ('waiting', 'urgent')
             DO NOTHING
             RETURNING id, code, status, identity, note, channel, position, eta_minutes, created_at, updated_at",
        )
        .bind(code)
        .bind(&new.identity)
        .bind(&new.note)
        .bind(new.channel.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let row = match inserted {
            Some(row) => row,
            None => {
                // Conflict: the identity already holds an active ticket.
                let existing: (String,) = sqlx::query_as(
                    "SELECT code FROM tickets
                     WHERE identity = $1 AND status IN ('waiting', 'urgent')
                     LIMIT 1",
                )
                .bind(&new.identity)
                .fetch_one(&mut *tx)
                .await?;

                metrics::tickets_joined().add(
                    1,
                    &[
                        KeyValue::new("channel", new.channel.as_str()),
                        KeyValue::new("result", "duplicate"),
                    ],
                );
                return Err(Error::DuplicateActiveTicket { code: existing.0 });
            }
        };

        sqlx::query("INSERT INTO events (ticket_id, kind) VALUES ($1, $2)")
            .bind(row.id)
            .bind(EventKind::Joined.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        metrics::tickets_joined().add(
            1,
            &[
                KeyValue::new("channel", new.channel.as_str()),
                KeyValue::new("result", "ok"),
            ],
        );

        row.try_into_ticket()
    }

    /// Find a ticket by its public code.
    pub async fn find_by_code(&self, code: &str) -> Result<Option<Ticket>> {
        let row: Option<TicketRow> = sqlx::query_as(
            "SELECT id, code, status, identity, note, channel, position, eta_minutes, created_at, updated_at
             FROM tickets WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TicketRow::try_into_ticket).transpose()
    }

    /// Find the identity's active ticket, if any.
    pub async fn find_active_by_identity(&self, identity: &str) -> Result<Option<Ticket>> {
        let row: Option<TicketRow> = sqlx::query_as(
            "SELECT id, code, status, identity, note, channel, position, eta_minutes, created_at, updated_at
             FROM tickets
             WHERE identity = $1 AND status IN ('waiting', 'urgent')
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TicketRow::try_into_ticket).transpose()
    }

    /// Set a ticket's status, appending the matching event in the same
    /// transaction. Position and ETA are cleared when the ticket leaves the
    /// active set; a following reorder pass fills them when it enters.
    ///
    /// The transition check runs on the row-locked status, so concurrent
    /// transitions on one code serialize: the loser sees the winner's
    /// committed status and fails with `InvalidTransition` if that status
    /// is terminal.
    ///
    /// Returns the prior status alongside the updated ticket, or None (and
    /// writes nothing) when the code is unknown.
    pub async fn set_status(&self, code: &str, to: Status) -> Result<Option<(Status, Ticket)>> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(i64, String)> =
            sqlx::query_as("SELECT id, status FROM tickets WHERE code = $1 FOR UPDATE")
                .bind(code)
                .fetch_optional(&mut *tx)
                .await?;

        let Some((id, from_str)) = current else {
            return Ok(None);
        };
        let from: Status = from_str.parse()?;

        if !from.can_transition_to(to) {
            return Err(Error::InvalidTransition { from, to });
        }

        let row: TicketRow = sqlx::query_as(
            "UPDATE tickets
             SET status = $1,
                 position = CASE WHEN $2 THEN position ELSE NULL END,
                 eta_minutes = CASE WHEN $2 THEN eta_minutes ELSE NULL END,
                 updated_at = now()
             WHERE id = $3
             RETURNING id, code, status, identity, note, channel, position, eta_minutes, created_at, updated_at",
        )
        .bind(to.as_str())
        .bind(to.is_active())
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO events (ticket_id, kind) VALUES ($1, $2)")
            .bind(id)
            .bind(EventKind::Transitioned(to).to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        metrics::ticket_transitions().add(
            1,
            &[
                KeyValue::new("from", from.as_str()),
                KeyValue::new("to", to.as_str()),
            ],
        );

        row.try_into_ticket().map(|ticket| Some((from, ticket)))
    }

    /// All tickets ordered by creation time, for board assembly.
    pub async fn list_all(&self) -> Result<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(
            "SELECT id, code, status, identity, note, channel, position, eta_minutes, created_at, updated_at
             FROM tickets ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TicketRow::try_into_ticket).collect()
    }

    /// The active set (waiting|urgent) in stable creation order.
    pub async fn list_active(&self) -> Result<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(
            "SELECT id, code, status, identity, note, channel, position, eta_minutes, created_at, updated_at
             FROM tickets
             WHERE status IN ('waiting', 'urgent')
             ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TicketRow::try_into_ticket).collect()
    }

    /// Persist a full ordering pass: (ticket id, position, eta) for every
    /// active ticket, in one transaction.
    pub async fn apply_ordering(&self, assignments: &[(i64, i64, i64)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for &(id, position, eta) in assignments {
            sqlx::query(
                "UPDATE tickets SET position = $1, eta_minutes = $2, updated_at = now()
                 WHERE id = $3",
            )
            .bind(position)
            .bind(eta)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Audit trail for one ticket, oldest first.
    pub async fn events_for(&self, ticket_id: i64) -> Result<Vec<Event>> {
        let rows: Vec<(i64, i64, String, chrono::DateTime<chrono::Utc>)> = sqlx::query_as(
            "SELECT id, ticket_id, kind, at FROM events WHERE ticket_id = $1 ORDER BY at ASC, id ASC",
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, ticket_id, kind, at)| Event {
                id,
                ticket_id,
                kind,
                at,
            })
            .collect())
    }
}

fn generate_code() -> String {
    // Same shape the kiosk printout always had: Q + 4 digits.
    format!("Q{:04}", rand::thread_rng().gen_range(0..10_000))
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct TicketRow {
    id: i64,
    code: String,
    status: String,
    identity: Option<String>,
    note: Option<String>,
    channel: String,
    position: Option<i64>,
    eta_minutes: Option<i64>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TicketRow {
    fn try_into_ticket(self) -> Result<Ticket> {
        Ok(Ticket {
            id: self.id,
            code: self.code,
            status: self.status.parse()?,
            identity: self.identity,
            note: self.note,
            channel: self.channel.parse::<Channel>()?,
            position: self.position,
            eta_minutes: self.eta_minutes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
