//! Error types for waitline-rs.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The identity already holds an active ticket. Carries the existing
    /// ticket's code so callers can echo it back.
    #[error("identity already has an active ticket: {code}")]
    DuplicateActiveTicket { code: String },

    #[error("ticket not found: {0}")]
    TicketNotFound(String),

    #[error("unknown action: {0}")]
    InvalidAction(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: crate::model::Status,
        to: crate::model::Status,
    },

    #[error("passcode mismatch")]
    Unauthorized,

    #[error("rate limit exceeded for {identity}/{action}")]
    RateLimited { identity: String, action: String },

    #[error("queue is closed to new tickets")]
    QueueClosed,

    #[error("config error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Short reply text for messaging-channel callers, mapped 1:1 from the
    /// error kind. Store problems all read the same to an end user.
    pub fn user_reply(&self) -> String {
        match self {
            Error::DuplicateActiveTicket { code } => {
                format!("You already have ticket {code}. Reply STATUS to check it.")
            }
            Error::TicketNotFound(_) => {
                "No active ticket. Reply JOIN to enter the queue.".to_string()
            }
            Error::QueueClosed => "The queue is closed right now. Please try later.".to_string(),
            Error::RateLimited { .. } => {
                "Too many requests. Please wait a few minutes.".to_string()
            }
            Error::Unauthorized => "Invalid passcode.".to_string(),
            Error::InvalidAction(_) | Error::InvalidTransition { .. } => {
                "That action isn't possible for this ticket.".to_string()
            }
            Error::Config(_) | Error::Database(_) | Error::Other(_) => {
                "Service temporarily unavailable. Please try again later.".to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
