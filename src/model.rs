//! Core data model.
//!
//! A ticket is one requester's place in the line. It has identity (short
//! code, optional requester address), a lifecycle status, and — while it is
//! in the active part of the line — a position and an estimated wait.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a ticket.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// In line, ordered FIFO behind urgent tickets.
    Waiting,
    /// In line, ordered ahead of all waiting tickets.
    Urgent,
    /// Called up, no longer positioned.
    Next,
    /// Being served.
    InRoom,
    /// Served. Terminal.
    Done,
    /// Called but never appeared. Terminal.
    NoShow,
    /// Withdrew or was removed. Terminal.
    Canceled,
}

impl Status {
    /// Active tickets are the positioned part of the line.
    pub fn is_active(self) -> bool {
        matches!(self, Status::Waiting | Status::Urgent)
    }

    /// Terminal tickets are history; no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Done | Status::NoShow | Status::Canceled)
    }

    /// Can transition from self to `to`?
    ///
    /// Any non-terminal ticket can move to any mapped target status;
    /// terminal tickets are never reopened.
    pub fn can_transition_to(self, _to: Status) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Waiting => "waiting",
            Status::Urgent => "urgent",
            Status::Next => "next",
            Status::InRoom => "in_room",
            Status::Done => "done",
            Status::NoShow => "no_show",
            Status::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Status::Waiting),
            "urgent" => Ok(Status::Urgent),
            "next" => Ok(Status::Next),
            "in_room" => Ok(Status::InRoom),
            "done" => Ok(Status::Done),
            "no_show" => Ok(Status::NoShow),
            "canceled" => Ok(Status::Canceled),
            other => Err(crate::error::Error::Other(format!(
                "unknown status: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// Admin actions, each mapping to exactly one target status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Promote,
    InRoom,
    Done,
    NoShow,
    Urgent,
    Cancel,
}

impl Action {
    /// The status this action moves a ticket into.
    pub fn target(self) -> Status {
        match self {
            Action::Promote => Status::Next,
            Action::InRoom => Status::InRoom,
            Action::Done => Status::Done,
            Action::NoShow => Status::NoShow,
            Action::Urgent => Status::Urgent,
            Action::Cancel => Status::Canceled,
        }
    }
}

impl std::str::FromStr for Action {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "promote" => Ok(Action::Promote),
            "in_room" => Ok(Action::InRoom),
            "done" => Ok(Action::Done),
            "no_show" => Ok(Action::NoShow),
            "urgent" => Ok(Action::Urgent),
            "cancel" => Ok(Action::Cancel),
            other => Err(crate::error::Error::InvalidAction(other.to_string())),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Action::Promote => "promote",
            Action::InRoom => "in_room",
            Action::Done => "done",
            Action::NoShow => "no_show",
            Action::Urgent => "urgent",
            Action::Cancel => "cancel",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// Where a ticket came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Sms,
    Whatsapp,
    Kiosk,
}

impl Channel {
    /// Can we push outbound messages over this channel?
    /// Kiosk tickets have no reachable address.
    pub fn supports_notification(self) -> bool {
        matches!(self, Channel::Sms | Channel::Whatsapp)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Sms => "sms",
            Channel::Whatsapp => "whatsapp",
            Channel::Kiosk => "kiosk",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sms" => Ok(Channel::Sms),
            "whatsapp" => Ok(Channel::Whatsapp),
            "kiosk" => Ok(Channel::Kiosk),
            other => Err(crate::error::Error::Other(format!(
                "unknown channel: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Ticket
// ---------------------------------------------------------------------------

/// A ticket in the line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,

    /// Short public code (e.g. "Q4821"). Unique, immutable once assigned.
    pub code: String,

    pub status: Status,

    /// Requester address (phone-like string). None for walk-in kiosk tickets.
    pub identity: Option<String>,

    /// Free-text note given at join time.
    pub note: Option<String>,

    pub channel: Channel,

    /// 1-based place in the active line. Some iff status is active.
    pub position: Option<i64>,

    /// Estimated wait in whole minutes. Some iff status is active.
    pub eta_minutes: Option<i64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Whether a "next-in-line" message can be sent for this ticket.
    pub fn notifiable(&self) -> bool {
        self.identity.is_some() && self.channel.supports_notification()
    }
}

/// Builder for joining the queue. The engine's public API for new tickets.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub(crate) identity: Option<String>,
    pub(crate) note: Option<String>,
    pub(crate) channel: Channel,
}

impl NewTicket {
    pub fn new(channel: Channel) -> Self {
        Self {
            identity: None,
            note: None,
            channel,
        }
    }

    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// What an event records: the join, or the status the ticket moved into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Joined,
    Transitioned(Status),
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Joined => f.write_str("joined"),
            EventKind::Transitioned(status) => f.write_str(status.as_str()),
        }
    }
}

/// Append-only audit row. One per ticket creation and per status change.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: i64,
    pub ticket_id: i64,
    pub kind: String,
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Singleton service configuration, mutated only by explicit admin ops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Rolling average minutes per service, drives ETA.
    pub avg_service_minutes: f64,
    /// When false, join requests are rejected.
    pub open: bool,
    pub passcode: String,
    pub display_name: String,
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// One ticket as shown on the board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardEntry {
    pub code: String,
    pub status: Status,
    pub position: Option<i64>,
    pub eta_minutes: Option<i64>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The aggregated queue view: tickets grouped by status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoardView {
    pub tickets: BTreeMap<Status, Vec<BoardEntry>>,
    pub display_name: String,
    pub open: bool,
}

impl BoardView {
    /// Number of tickets currently holding a position.
    pub fn active_count(&self) -> usize {
        self.tickets
            .iter()
            .filter(|(status, _)| status.is_active())
            .map(|(_, entries)| entries.len())
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Change notifications
// ---------------------------------------------------------------------------

/// Broadcast to board subscribers after every write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    TicketJoined {
        code: String,
        position: Option<i64>,
    },
    TicketTransitioned {
        code: String,
        from: Status,
        to: Status,
    },
    SettingsChanged,
}

// ---------------------------------------------------------------------------
// Notifications (outbox)
// ---------------------------------------------------------------------------

/// Delivery state of an outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationState {
    Pending,
    Sent,
    Dropped,
}

impl std::fmt::Display for NotificationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotificationState::Pending => "pending",
            NotificationState::Sent => "sent",
            NotificationState::Dropped => "dropped",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for NotificationState {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NotificationState::Pending),
            "sent" => Ok(NotificationState::Sent),
            "dropped" => Ok(NotificationState::Dropped),
            other => Err(crate::error::Error::Other(format!(
                "unknown notification state: {other}"
            ))),
        }
    }
}

/// An outbound message intent. Append-only; a dispatcher consumes these.
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: i64,
    pub identity: String,
    pub ticket_code: String,
    /// Message kind tag (e.g. "next-in-line").
    pub kind: String,
    pub message: String,
    pub channel: Channel,
    pub state: NotificationState,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrips_through_strings() {
        for status in [
            Status::Waiting,
            Status::Urgent,
            Status::Next,
            Status::InRoom,
            Status::Done,
            Status::NoShow,
            Status::Canceled,
        ] {
            let parsed: Status = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn active_and_terminal_partition_statuses() {
        assert!(Status::Waiting.is_active());
        assert!(Status::Urgent.is_active());
        assert!(!Status::Next.is_active());
        assert!(!Status::InRoom.is_active());

        assert!(Status::Done.is_terminal());
        assert!(Status::NoShow.is_terminal());
        assert!(Status::Canceled.is_terminal());
        assert!(!Status::Next.is_terminal());
    }

    #[test]
    fn terminal_statuses_reject_all_transitions() {
        for from in [Status::Done, Status::NoShow, Status::Canceled] {
            assert!(!from.can_transition_to(Status::Waiting));
            assert!(!from.can_transition_to(Status::Urgent));
            assert!(!from.can_transition_to(Status::Next));
        }
        assert!(Status::Waiting.can_transition_to(Status::Urgent));
        assert!(Status::Next.can_transition_to(Status::InRoom));
    }

    #[test]
    fn action_mapping_matches_contract() {
        assert_eq!(Action::Promote.target(), Status::Next);
        assert_eq!(Action::InRoom.target(), Status::InRoom);
        assert_eq!(Action::Done.target(), Status::Done);
        assert_eq!(Action::NoShow.target(), Status::NoShow);
        assert_eq!(Action::Urgent.target(), Status::Urgent);
        assert_eq!(Action::Cancel.target(), Status::Canceled);
    }

    #[test]
    fn unknown_action_is_invalid() {
        let err = "reopen".parse::<Action>().unwrap_err();
        assert!(matches!(err, crate::error::Error::InvalidAction(_)));
    }

    #[test]
    fn kiosk_tickets_are_not_notifiable() {
        assert!(!Channel::Kiosk.supports_notification());
        assert!(Channel::Sms.supports_notification());
        assert!(Channel::Whatsapp.supports_notification());
    }
}
