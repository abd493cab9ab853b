//! Palaver realtime crate - per-room publish/subscribe fanout and presence.
//!
//! `RoomHub` keeps a registry of live connections per room and a
//! last-writer-wins presence map. Delivery is best-effort and at most once
//! per live connection: a failed send removes that connection from the
//! registry without affecting delivery to the others, and nothing is queued
//! or replayed. Removal during a publish pass uses two phases (collect the
//! dead, then remove) so the registry is never mutated while being iterated.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use palaver_core::error::PalaverError;
use palaver_core::events::RoomEvent;

/// Lifecycle state of a room connection.
///
/// A connection is created `Connecting`, becomes `Subscribed` when the hub
/// registers it, and is `Closed` once removed (explicitly or by a failed
/// delivery).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Subscribed,
    Closed,
}

/// One live subscriber connection.
///
/// Wraps the sending half of an unbounded channel; the receiving half is
/// drained by the transport (e.g. a WebSocket task). Dropping the receiver
/// makes subsequent sends fail, which is how the hub notices a dead
/// connection.
#[derive(Debug)]
pub struct Subscriber {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    state: ConnectionState,
    tx: mpsc::UnboundedSender<String>,
}

impl Subscriber {
    /// Create a new connection in the `Connecting` state, returning the
    /// receiving half for the transport to drain.
    pub fn new(user_id: Option<Uuid>) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: Uuid::new_v4(),
                user_id,
                state: ConnectionState::Connecting,
                tx,
            },
            rx,
        )
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }
}

/// Per-room publish/subscribe registry with user presence.
#[derive(Debug, Default)]
pub struct RoomHub {
    rooms: Mutex<HashMap<Uuid, Vec<Subscriber>>>,
    presence: Mutex<HashMap<Uuid, bool>>,
}

impl RoomHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection with a room and mark its user online.
    pub fn subscribe(&self, room_id: Uuid, mut subscriber: Subscriber) {
        subscriber.state = ConnectionState::Subscribed;
        let conn_id = subscriber.id;
        let user_id = subscriber.user_id;

        {
            let mut rooms = self.rooms.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            rooms.entry(room_id).or_default().push(subscriber);
            info!(
                room = %room_id,
                connection = %conn_id,
                total = rooms.get(&room_id).map(|c| c.len()).unwrap_or(0),
                "Connection subscribed"
            );
        }

        if let Some(user_id) = user_id {
            self.set_presence(user_id, true);
        }
    }

    /// Remove a connection from a room, dropping the room entry when it
    /// becomes empty, and mark the user offline.
    pub fn unsubscribe(&self, room_id: Uuid, conn_id: Uuid, user_id: Option<Uuid>) {
        {
            let mut rooms = self.rooms.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(conns) = rooms.get_mut(&room_id) {
                conns.retain(|c| c.id != conn_id);
                if conns.is_empty() {
                    rooms.remove(&room_id);
                }
            }
            debug!(room = %room_id, connection = %conn_id, "Connection unsubscribed");
        }

        if let Some(user_id) = user_id {
            self.set_presence(user_id, false);
        }
    }

    /// Deliver an event to every connection subscribed to `room_id`.
    ///
    /// The envelope is serialized once. Connections whose send fails are
    /// collected during the delivery pass and removed afterwards; delivery
    /// to the remaining connections is unaffected. Returns the number of
    /// successful deliveries.
    pub fn publish(&self, room_id: Uuid, event: &RoomEvent) -> Result<usize, PalaverError> {
        let payload = serde_json::to_string(event)?;

        let mut rooms = self.rooms.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(conns) = rooms.get_mut(&room_id) else {
            return Ok(0);
        };

        let mut dead: Vec<Uuid> = Vec::new();
        let mut delivered = 0usize;
        for conn in conns.iter() {
            if conn.tx.send(payload.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(conn.id);
            }
        }

        if !dead.is_empty() {
            warn!(
                room = %room_id,
                pruned = dead.len(),
                event = event.event_name(),
                "Pruned dead connections during publish"
            );
            conns.retain(|c| !dead.contains(&c.id));
            if conns.is_empty() {
                rooms.remove(&room_id);
            }
        }

        debug!(
            room = %room_id,
            event = event.event_name(),
            delivered,
            "Event published"
        );
        Ok(delivered)
    }

    /// Number of live connections registered for a room.
    pub fn connection_count(&self, room_id: Uuid) -> usize {
        self.rooms
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&room_id)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    /// Whether a user is currently marked online.
    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.presence
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&user_id)
            .copied()
            .unwrap_or(false)
    }

    fn set_presence(&self, user_id: Uuid, online: bool) {
        self.presence
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(user_id, online);
        debug!(user = %user_id, online, "Presence updated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_core::types::ContentItem;

    fn make_event(room: Uuid) -> RoomEvent {
        RoomEvent::NewContent {
            content: ContentItem::new_text(room, Uuid::new_v4(), "hello".to_string()),
        }
    }

    #[test]
    fn test_subscribe_and_publish() {
        let hub = RoomHub::new();
        let room = Uuid::new_v4();

        let (sub, mut rx) = Subscriber::new(None);
        assert_eq!(sub.state(), ConnectionState::Connecting);
        hub.subscribe(room, sub);
        assert_eq!(hub.connection_count(room), 1);

        let delivered = hub.publish(room, &make_event(room)).unwrap();
        assert_eq!(delivered, 1);

        let payload = rx.try_recv().unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["type"], "new_content");
    }

    #[test]
    fn test_publish_to_empty_room() {
        let hub = RoomHub::new();
        let room = Uuid::new_v4();
        assert_eq!(hub.publish(room, &make_event(room)).unwrap(), 0);
    }

    #[test]
    fn test_closed_connection_pruned_on_publish() {
        let hub = RoomHub::new();
        let room = Uuid::new_v4();

        let (alive, mut alive_rx) = Subscriber::new(None);
        let (dead, dead_rx) = Subscriber::new(None);
        hub.subscribe(room, alive);
        hub.subscribe(room, dead);
        assert_eq!(hub.connection_count(room), 2);

        // Forcibly close one connection by dropping its receiver.
        drop(dead_rx);

        let delivered = hub.publish(room, &make_event(room)).unwrap();
        assert_eq!(delivered, 1);

        // The survivor still received the envelope; the dead connection is
        // gone from the registry.
        assert!(alive_rx.try_recv().is_ok());
        assert_eq!(hub.connection_count(room), 1);
    }

    #[test]
    fn test_all_dead_removes_room_entry() {
        let hub = RoomHub::new();
        let room = Uuid::new_v4();

        let (sub, rx) = Subscriber::new(None);
        hub.subscribe(room, sub);
        drop(rx);

        hub.publish(room, &make_event(room)).unwrap();
        assert_eq!(hub.connection_count(room), 0);
    }

    #[test]
    fn test_unsubscribe_removes_connection() {
        let hub = RoomHub::new();
        let room = Uuid::new_v4();

        let (sub, _rx) = Subscriber::new(None);
        let conn_id = sub.id;
        hub.subscribe(room, sub);

        hub.unsubscribe(room, conn_id, None);
        assert_eq!(hub.connection_count(room), 0);
    }

    #[test]
    fn test_presence_on_connect_disconnect() {
        let hub = RoomHub::new();
        let room = Uuid::new_v4();
        let user = Uuid::new_v4();

        assert!(!hub.is_online(user));

        let (sub, _rx) = Subscriber::new(Some(user));
        let conn_id = sub.id;
        hub.subscribe(room, sub);
        assert!(hub.is_online(user));

        hub.unsubscribe(room, conn_id, Some(user));
        assert!(!hub.is_online(user));
    }

    #[test]
    fn test_presence_last_writer_wins() {
        let hub = RoomHub::new();
        let room = Uuid::new_v4();
        let user = Uuid::new_v4();

        let (first, _rx1) = Subscriber::new(Some(user));
        let first_id = first.id;
        hub.subscribe(room, first);

        let (second, _rx2) = Subscriber::new(Some(user));
        hub.subscribe(room, second);
        assert!(hub.is_online(user));

        // Disconnecting the first connection flips the flag off even though
        // a second connection survives: unversioned, last writer wins.
        hub.unsubscribe(room, first_id, Some(user));
        assert!(!hub.is_online(user));
    }

    #[test]
    fn test_multiple_rooms_are_independent() {
        let hub = RoomHub::new();
        let room_a = Uuid::new_v4();
        let room_b = Uuid::new_v4();

        let (sub_a, mut rx_a) = Subscriber::new(None);
        let (sub_b, mut rx_b) = Subscriber::new(None);
        hub.subscribe(room_a, sub_a);
        hub.subscribe(room_b, sub_b);

        hub.publish(room_a, &make_event(room_a)).unwrap();

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }
}
