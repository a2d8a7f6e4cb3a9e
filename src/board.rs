//! Board cache: TTL read-through cache of the aggregated queue view and the
//! settings singleton, plus the change-notification channel.
//!
//! Entries are (Instant, value) pairs behind an RwLock; expired entries are
//! eagerly removed. Every operation is best-effort — a miss means the caller
//! recomputes from the store, never an error.

use crate::model::{BoardView, QueueEvent, Settings};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, broadcast};

const BOARD_TTL: Duration = Duration::from_secs(30);
const SETTINGS_TTL: Duration = Duration::from_secs(300);
const CHANGE_CHANNEL_CAPACITY: usize = 64;

pub struct BoardCache {
    board: RwLock<Option<(Instant, BoardView)>>,
    settings: RwLock<Option<(Instant, Settings)>>,
    changes: broadcast::Sender<QueueEvent>,
}

impl Default for BoardCache {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardCache {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            board: RwLock::new(None),
            settings: RwLock::new(None),
            changes,
        }
    }

    /// Cached board, if present and unexpired.
    pub async fn get_board(&self) -> Option<BoardView> {
        get_with_ttl(&self.board, BOARD_TTL, "board").await
    }

    pub async fn put_board(&self, view: BoardView) {
        *self.board.write().await = Some((Instant::now(), view));
    }

    /// Drop the cached board immediately. Called after every write.
    pub async fn invalidate_board(&self) {
        *self.board.write().await = None;
    }

    /// Cached settings, if present and unexpired.
    pub async fn get_settings(&self) -> Option<Settings> {
        get_with_ttl(&self.settings, SETTINGS_TTL, "settings").await
    }

    pub async fn put_settings(&self, settings: Settings) {
        *self.settings.write().await = Some((Instant::now(), settings));
    }

    pub async fn invalidate_settings(&self) {
        *self.settings.write().await = None;
    }

    /// Broadcast a change event. Fire-and-forget: no subscribers is fine,
    /// lagging subscribers miss events rather than blocking writes.
    pub fn publish(&self, event: QueueEvent) {
        let _ = self.changes.send(event);
    }

    /// Subscribe to change events, for live board updates.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.changes.subscribe()
    }
}

async fn get_with_ttl<V: Clone>(
    slot: &RwLock<Option<(Instant, V)>>,
    ttl: Duration,
    projection: &'static str,
) -> Option<V> {
    if let Some((stored_at, value)) = slot.read().await.as_ref() {
        if stored_at.elapsed() < ttl {
            metrics::board_cache().add(
                1,
                &[
                    KeyValue::new("projection", projection),
                    KeyValue::new("result", "hit"),
                ],
            );
            return Some(value.clone());
        }
    } else {
        metrics::board_cache().add(
            1,
            &[
                KeyValue::new("projection", projection),
                KeyValue::new("result", "miss"),
            ],
        );
        return None;
    }

    // Entry expired: take the write lock only to remove it.
    let mut write = slot.write().await;
    if let Some((stored_at, _)) = write.as_ref()
        && stored_at.elapsed() >= ttl
    {
        *write = None;
    }
    metrics::board_cache().add(
        1,
        &[
            KeyValue::new("projection", projection),
            KeyValue::new("result", "expired"),
        ],
    );
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QueueEvent;

    fn empty_board() -> BoardView {
        BoardView {
            tickets: Default::default(),
            display_name: "Test".to_string(),
            open: true,
        }
    }

    #[tokio::test]
    async fn board_round_trips_within_ttl() {
        let cache = BoardCache::new();
        assert!(cache.get_board().await.is_none());

        cache.put_board(empty_board()).await;
        let cached = cache.get_board().await.expect("fresh entry");
        assert_eq!(cached.display_name, "Test");
    }

    #[tokio::test]
    async fn invalidation_is_unconditional() {
        let cache = BoardCache::new();
        cache.put_board(empty_board()).await;
        assert!(cache.get_board().await.is_some());

        cache.invalidate_board().await;
        assert!(cache.get_board().await.is_none());
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_error() {
        let cache = BoardCache::new();
        cache.publish(QueueEvent::SettingsChanged);
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let cache = BoardCache::new();
        let mut rx = cache.subscribe();
        cache.publish(QueueEvent::TicketJoined {
            code: "Q0001".to_string(),
            position: Some(1),
        });

        match rx.recv().await.unwrap() {
            QueueEvent::TicketJoined { code, position } => {
                assert_eq!(code, "Q0001");
                assert_eq!(position, Some(1));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
