//! Routing core of the relay service.
//!
//! Connections join rooms named by signaling id. Events are forwarded to the
//! room they address; nothing is interpreted beyond the addressing field.

use crate::signaling::{RelayMessage, ResponsePayload};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

pub type ConnId = u64;

#[derive(Default)]
struct Rooms {
    conns: HashMap<ConnId, mpsc::UnboundedSender<RelayMessage>>,
    rooms: HashMap<String, HashSet<ConnId>>,
}

#[derive(Default)]
pub struct RelayHub {
    next_id: AtomicU64,
    inner: Mutex<Rooms>,
}

impl RelayHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection; events for it arrive on the returned receiver.
    pub fn connect(&self) -> (ConnId, mpsc::UnboundedReceiver<RelayMessage>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().conns.insert(id, tx);
        debug!(conn = id, "relay connection opened");
        (id, rx)
    }

    /// Drops the connection and removes it from every room.
    pub fn disconnect(&self, conn: ConnId) {
        let mut inner = self.lock();
        inner.conns.remove(&conn);
        inner.rooms.retain(|_, members| {
            members.remove(&conn);
            !members.is_empty()
        });
        debug!(conn, "relay connection closed");
    }

    /// Routes one event received from `conn`.
    pub fn dispatch(&self, conn: ConnId, message: RelayMessage) {
        trace!(conn, event = message.name(), "dispatch");
        match message {
            RelayMessage::JoinId(join) => {
                info!(conn, room = %join.id, "joined room");
                self.lock().rooms.entry(join.id).or_default().insert(conn);
            }
            RelayMessage::Request(request) => {
                let room = request.remote_id.clone();
                let ack = ResponsePayload {
                    remote_id: room.clone(),
                };
                self.to_room(&room, RelayMessage::Request(request));
                self.to_conn(conn, RelayMessage::RequestResponse(ack));
            }
            RelayMessage::RequestAccept(accept) => {
                let room = accept.remote_room_id.clone();
                self.to_room(&room, RelayMessage::RequestAccept(accept));
            }
            RelayMessage::RequestDecline(decline) => {
                let room = decline.to.clone();
                self.to_room(&room, RelayMessage::RequestDecline(decline));
            }
            RelayMessage::RequestResponse(_) => {
                debug!(conn, "client-sent requestResponse ignored");
            }
        }
    }

    pub fn room_size(&self, room: &str) -> usize {
        self.lock().rooms.get(room).map_or(0, HashSet::len)
    }

    fn to_room(&self, room: &str, message: RelayMessage) {
        let inner = self.lock();
        let Some(members) = inner.rooms.get(room) else {
            debug!(%room, event = message.name(), "no one in room, dropped");
            return;
        };
        for conn in members {
            if let Some(tx) = inner.conns.get(conn) {
                let _ = tx.send(message.clone());
            }
        }
    }

    fn to_conn(&self, conn: ConnId, message: RelayMessage) {
        if let Some(tx) = self.lock().conns.get(&conn) {
            let _ = tx.send(message);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Rooms> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::{AcceptPayload, DeclinePayload, JoinPayload, RequestPayload};

    fn join(hub: &RelayHub, room: &str) -> (ConnId, mpsc::UnboundedReceiver<RelayMessage>) {
        let (conn, rx) = hub.connect();
        hub.dispatch(conn, RelayMessage::JoinId(JoinPayload { id: room.into() }));
        (conn, rx)
    }

    #[test]
    fn request_is_forwarded_and_acknowledged() {
        let hub = RelayHub::new();
        let (a, mut a_rx) = join(&hub, "abcde");
        let (_b, mut b_rx) = join(&hub, "fghij");

        let request = RequestPayload {
            username: "user-abcde".into(),
            remote_id: "fghij".into(),
            id: "t-a".into(),
            room_id: "abcde".into(),
        };
        hub.dispatch(a, RelayMessage::Request(request.clone()));

        assert_eq!(b_rx.try_recv().unwrap(), RelayMessage::Request(request));
        assert_eq!(
            a_rx.try_recv().unwrap(),
            RelayMessage::RequestResponse(ResponsePayload {
                remote_id: "fghij".into()
            })
        );
    }

    #[test]
    fn accept_and_decline_follow_their_address() {
        let hub = RelayHub::new();
        let (_a, mut a_rx) = join(&hub, "abcde");
        let (b, mut b_rx) = join(&hub, "fghij");

        hub.dispatch(
            b,
            RelayMessage::RequestAccept(AcceptPayload {
                remote_room_id: "abcde".into(),
            }),
        );
        hub.dispatch(
            b,
            RelayMessage::RequestDecline(DeclinePayload { to: "abcde".into() }),
        );

        assert_eq!(a_rx.try_recv().unwrap().name(), "requestAccept");
        assert_eq!(a_rx.try_recv().unwrap().name(), "requestDecline");
        assert!(b_rx.try_recv().is_err());
    }

    #[test]
    fn events_for_empty_rooms_are_dropped() {
        let hub = RelayHub::new();
        let (a, mut a_rx) = join(&hub, "abcde");
        hub.dispatch(
            a,
            RelayMessage::RequestDecline(DeclinePayload { to: "nobody".into() }),
        );
        assert!(a_rx.try_recv().is_err());
    }

    #[test]
    fn disconnect_leaves_rooms() {
        let hub = RelayHub::new();
        let (a, _a_rx) = join(&hub, "abcde");
        assert_eq!(hub.room_size("abcde"), 1);
        hub.disconnect(a);
        assert_eq!(hub.room_size("abcde"), 0);
    }
}
