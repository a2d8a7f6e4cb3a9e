//! Ticket lifecycle controller: validates and applies status transitions,
//! drives the ordering pass, keeps the board cache honest, and feeds the
//! notification outbox.

pub mod ordering;

use crate::board::BoardCache;
use crate::db::Db;
use crate::error::{Error, Result};
use crate::model::{
    Action, BoardEntry, BoardView, NewTicket, QueueEvent, Settings, Status, Ticket,
};
use crate::ratelimit::{DEFAULT_LIMIT, DEFAULT_WINDOW, RateLimiter};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tracing::{info, warn};

/// Outbox message kind for promote-to-next notifications.
pub const KIND_NEXT_IN_LINE: &str = "next-in-line";

/// The queue engine. One instance serves all callers; per-operation
/// consistency comes from store transactions, and the ordering pass is
/// serialized by a global lock.
pub struct Queue {
    db: Arc<Db>,
    cache: Arc<BoardCache>,
    /// Throttles identity-scoped requester commands.
    limiter: RateLimiter,
    /// Serializes read-sequence-write ordering passes. Without it, two
    /// concurrent passes could interleave and break position contiguity.
    ordering_lock: Mutex<()>,
}

impl Queue {
    pub fn new(db: Arc<Db>) -> Self {
        Self {
            db,
            cache: Arc::new(BoardCache::new()),
            limiter: RateLimiter::new(),
            ordering_lock: Mutex::new(()),
        }
    }

    /// Subscribe to change events, for live board updates. Callers without
    /// a subscription fall back to polling `board`.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.cache.subscribe()
    }

    // -----------------------------------------------------------------------
    // Requester operations
    // -----------------------------------------------------------------------

    /// Join the line. Fails when the queue is closed, the identity already
    /// holds an active ticket, or the identity is over its request budget.
    pub async fn join(&self, new: NewTicket) -> Result<Ticket> {
        if let Some(ref identity) = new.identity {
            self.throttle(identity, "join").await?;
        }
        let settings = self.settings().await?;
        if !settings.open {
            return Err(Error::QueueClosed);
        }

        let created = self.db.create_ticket(&new).await?;
        self.reorder().await?;

        // Re-read so the caller sees the freshly assigned position/ETA.
        let ticket = self
            .db
            .find_by_code(&created.code)
            .await?
            .unwrap_or(created);

        info!(
            code = %ticket.code,
            channel = %ticket.channel,
            position = ?ticket.position,
            "ticket joined"
        );

        self.cache.invalidate_board().await;
        self.cache.publish(QueueEvent::TicketJoined {
            code: ticket.code.clone(),
            position: ticket.position,
        });

        Ok(ticket)
    }

    /// Look a ticket up by code, active or not.
    pub async fn lookup(&self, code: &str) -> Result<Option<Ticket>> {
        self.db.find_by_code(code).await
    }

    /// A ticket's audit trail, oldest first.
    pub async fn events(&self, ticket: &Ticket) -> Result<Vec<crate::model::Event>> {
        self.db.events_for(ticket.id).await
    }

    /// The identity's active ticket, with current position and ETA.
    pub async fn status(&self, identity: &str) -> Result<Ticket> {
        self.throttle(identity, "status").await?;
        self.db
            .find_active_by_identity(identity)
            .await?
            .ok_or_else(|| Error::TicketNotFound(identity.to_string()))
    }

    /// Cancel the identity's active ticket.
    pub async fn leave(&self, identity: &str) -> Result<Ticket> {
        self.throttle(identity, "leave").await?;
        let ticket = self
            .db
            .find_active_by_identity(identity)
            .await?
            .ok_or_else(|| Error::TicketNotFound(identity.to_string()))?;
        self.transition(&ticket.code, Action::Cancel).await
    }

    /// Fixed-window budget check for identity-scoped commands. Admin and
    /// kiosk paths are not throttled.
    async fn throttle(&self, identity: &str, action: &str) -> Result<()> {
        if self
            .limiter
            .allow(identity, action, DEFAULT_LIMIT, DEFAULT_WINDOW)
            .await
        {
            Ok(())
        } else {
            Err(Error::RateLimited {
                identity: identity.to_string(),
                action: action.to_string(),
            })
        }
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Apply an action to a ticket. Reorders the active set, refreshes the
    /// cache, and — on promote-to-next — enqueues the outbound notification.
    ///
    /// Validation happens inside the store's row-locked transaction, so a
    /// ticket that just went terminal under a concurrent transition fails
    /// with `InvalidTransition` rather than being re-transitioned.
    pub async fn transition(&self, code: &str, action: Action) -> Result<Ticket> {
        let to = action.target();
        let (from, updated) = self
            .db
            .set_status(code, to)
            .await?
            .ok_or_else(|| Error::TicketNotFound(code.to_string()))?;

        // Any status change may affect active-set membership or urgency
        // ordering, so the pass runs unconditionally.
        self.reorder().await?;

        info!(code = %updated.code, from = %from, to = %to, "ticket transitioned");

        if to == Status::Next && updated.notifiable() {
            self.enqueue_next_in_line(&updated).await;
        }

        self.cache.invalidate_board().await;
        self.cache.publish(QueueEvent::TicketTransitioned {
            code: updated.code.clone(),
            from,
            to,
        });

        Ok(self.db.find_by_code(code).await?.unwrap_or(updated))
    }

    /// Best-effort outbox append. Delivery problems must never abort a
    /// ticket write, so failures are logged and swallowed here.
    async fn enqueue_next_in_line(&self, ticket: &Ticket) {
        let Some(ref identity) = ticket.identity else {
            return;
        };
        let message = format!(
            "Ticket {}: you're next! Please come to the front desk.",
            ticket.code
        );
        if let Err(e) = self
            .db
            .enqueue_notification(identity, &ticket.code, KIND_NEXT_IN_LINE, &message, ticket.channel)
            .await
        {
            warn!(code = %ticket.code, "failed to enqueue notification: {e}");
        }
    }

    // -----------------------------------------------------------------------
    // Ordering
    // -----------------------------------------------------------------------

    /// Recompute position and ETA for the whole active set.
    ///
    /// Serialized globally: the pass reads the entire active set and
    /// rewrites every position, so concurrent passes must not interleave.
    async fn reorder(&self) -> Result<()> {
        let _guard = self.ordering_lock.lock().await;

        let settings = self.settings().await?;
        let active = self.db.list_active().await?;
        let assignments = ordering::assign(&active, settings.avg_service_minutes);
        self.db.apply_ordering(&assignments).await
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// The aggregated board, cache-first with store fallback.
    pub async fn board(&self) -> Result<BoardView> {
        if let Some(cached) = self.cache.get_board().await {
            return Ok(cached);
        }

        let settings = self.settings().await?;
        let tickets = self.db.list_all().await?;

        let mut view = BoardView {
            tickets: Default::default(),
            display_name: settings.display_name,
            open: settings.open,
        };
        for ticket in tickets {
            view.tickets
                .entry(ticket.status)
                .or_default()
                .push(BoardEntry {
                    code: ticket.code,
                    status: ticket.status,
                    position: ticket.position,
                    eta_minutes: ticket.eta_minutes,
                    note: ticket.note,
                    created_at: ticket.created_at,
                });
        }

        self.cache.put_board(view.clone()).await;
        Ok(view)
    }

    /// Settings, cache-first with store fallback.
    pub async fn settings(&self) -> Result<Settings> {
        if let Some(cached) = self.cache.get_settings().await {
            return Ok(cached);
        }
        let settings = self.db.get_settings().await?;
        self.cache.put_settings(settings.clone()).await;
        Ok(settings)
    }

    // -----------------------------------------------------------------------
    // Admin operations
    // -----------------------------------------------------------------------

    /// Board read gated by the shared passcode.
    pub async fn admin_board(&self, passcode: &str) -> Result<BoardView> {
        self.authorize(passcode).await?;
        self.board().await
    }

    /// Apply an admin action and return the refreshed board.
    pub async fn admin_transition(
        &self,
        code: &str,
        action: Action,
        passcode: &str,
    ) -> Result<BoardView> {
        self.authorize(passcode).await?;
        self.transition(code, action).await?;
        self.board().await
    }

    /// Replace the admin passcode, invalidating the settings cache.
    pub async fn set_passcode(&self, current: &str, new: &str) -> Result<()> {
        self.authorize(current).await?;
        self.db.set_passcode(new).await?;
        self.cache.invalidate_settings().await;
        self.cache.publish(QueueEvent::SettingsChanged);
        Ok(())
    }

    /// Update operational settings (average service minutes, open flag,
    /// display name). The average must be a positive finite number; it
    /// multiplies into every active ticket's ETA.
    pub async fn update_settings(
        &self,
        passcode: &str,
        avg_service_minutes: f64,
        open: bool,
        display_name: &str,
    ) -> Result<()> {
        self.authorize(passcode).await?;
        if !avg_service_minutes.is_finite() || avg_service_minutes <= 0.0 {
            return Err(Error::Config(format!(
                "avg_service_minutes must be a positive number, got {avg_service_minutes}"
            )));
        }
        self.db
            .update_settings(avg_service_minutes, open, display_name)
            .await?;
        self.cache.invalidate_settings().await;
        self.cache.invalidate_board().await;
        self.cache.publish(QueueEvent::SettingsChanged);
        // ETAs depend on the average, so recompute right away.
        self.reorder().await
    }

    async fn authorize(&self, passcode: &str) -> Result<()> {
        let settings = self.settings().await?;
        if settings.passcode == passcode {
            Ok(())
        } else {
            Err(Error::Unauthorized)
        }
    }
}
