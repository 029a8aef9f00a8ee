use crate::client::Envelope;
use crate::error::RelayError;
use crate::peer::state::Event;
use crate::relay::{Relay, RelayConnection};
use crate::signaling::RelayMessage;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Relay events the state machine listens to.
pub const SUBSCRIBED_EVENTS: [&str; 4] = [
    "request",
    "requestResponse",
    "requestAccept",
    "requestDecline",
];

/// Bridges one relay connection at a time to the endpoint's inbox.
///
/// Each attach starts a new subscription generation; detaching aborts the
/// listener so a reconnect never leaves two listeners feeding the machine.
pub struct RelayEventAdapter {
    inbox: mpsc::UnboundedSender<Envelope>,
    relay: Option<Arc<dyn Relay>>,
    listener: Option<JoinHandle<()>>,
    generation: u64,
}

impl RelayEventAdapter {
    pub fn new(inbox: mpsc::UnboundedSender<Envelope>) -> Self {
        Self {
            inbox,
            relay: None,
            listener: None,
            generation: 0,
        }
    }

    /// Subscribes to `conn` and announces presence on it with `presence`.
    pub async fn attach(
        &mut self,
        conn: RelayConnection,
        presence: RelayMessage,
    ) -> Result<(), RelayError> {
        self.detach();
        self.generation += 1;
        let generation = self.generation;

        let RelayConnection { relay, mut inbound } = conn;
        let inbox = self.inbox.clone();
        self.listener = Some(tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                let Some(event) = translate(message) else {
                    continue;
                };
                if inbox.send(Envelope::Relay { generation, event }).is_err() {
                    return;
                }
            }
            let _ = inbox.send(Envelope::Relay {
                generation,
                event: Event::RelayDisconnected,
            });
        }));
        debug!(generation, events = ?SUBSCRIBED_EVENTS, "relay events subscribed");

        self.relay = Some(Arc::clone(&relay));
        relay.emit(presence).await?;
        info!(generation, "presence registered with relay");
        Ok(())
    }

    /// Unsubscribes from the current connection, if any.
    pub fn detach(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
            debug!(generation = self.generation, "relay events unsubscribed");
        }
        self.relay = None;
    }

    pub fn is_attached(&self) -> bool {
        self.relay.is_some()
    }

    /// Whether an event tagged `generation` came from the live subscription.
    pub fn is_current(&self, generation: u64) -> bool {
        self.listener.is_some() && generation == self.generation
    }

    pub async fn send(&self, message: RelayMessage) -> Result<(), RelayError> {
        let relay = self.relay.as_ref().ok_or(RelayError::Closed)?;
        debug!(event = message.name(), "relay emit");
        relay.emit(message).await
    }
}

impl Drop for RelayEventAdapter {
    fn drop(&mut self) {
        self.detach();
    }
}

fn translate(message: RelayMessage) -> Option<Event> {
    match message {
        RelayMessage::Request(p) => Some(Event::RelayRequest(p)),
        RelayMessage::RequestResponse(p) => Some(Event::RelayResponse(p)),
        RelayMessage::RequestAccept(p) => Some(Event::RelayAccept(p)),
        RelayMessage::RequestDecline(p) => Some(Event::RelayDecline(p)),
        other => {
            warn!(event = other.name(), "unsubscribed relay event ignored");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::hub::RelayHub;
    use crate::relay::local::LocalRelay;
    use crate::signaling::{DeclinePayload, JoinPayload};

    fn presence(id: &str) -> RelayMessage {
        RelayMessage::JoinId(JoinPayload { id: id.into() })
    }

    #[tokio::test]
    async fn attach_registers_presence_and_forwards_events() {
        let hub = Arc::new(RelayHub::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut adapter = RelayEventAdapter::new(tx);

        let (_relay, conn) = LocalRelay::connect(&hub);
        adapter.attach(conn, presence("abcde")).await.unwrap();
        assert_eq!(hub.room_size("abcde"), 1);

        let (other, other_conn) = LocalRelay::connect(&hub);
        drop(other_conn);
        other
            .emit(RelayMessage::RequestDecline(DeclinePayload {
                to: "abcde".into(),
            }))
            .await
            .unwrap();

        match rx.recv().await {
            Some(Envelope::Relay { generation, event }) => {
                assert!(adapter.is_current(generation));
                assert!(matches!(event, Event::RelayDecline(_)));
            }
            _ => panic!("expected relay event"),
        }
    }

    #[tokio::test]
    async fn closed_connection_reports_disconnect() {
        let hub = Arc::new(RelayHub::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut adapter = RelayEventAdapter::new(tx);

        let (relay, conn) = LocalRelay::connect(&hub);
        adapter.attach(conn, presence("abcde")).await.unwrap();
        relay.close();

        match rx.recv().await {
            Some(Envelope::Relay { event, .. }) => assert_eq!(event, Event::RelayDisconnected),
            _ => panic!("expected disconnect"),
        }
    }

    #[tokio::test]
    async fn reattach_retires_previous_subscription() {
        let hub = Arc::new(RelayHub::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut adapter = RelayEventAdapter::new(tx);

        let (_a, first) = LocalRelay::connect(&hub);
        adapter.attach(first, presence("abcde")).await.unwrap();
        let (_b, second) = LocalRelay::connect(&hub);
        adapter.attach(second, presence("abcde")).await.unwrap();

        assert!(!adapter.is_current(1));
        assert!(adapter.is_current(2));

        adapter.detach();
        assert!(!adapter.is_attached());
        assert!(matches!(
            adapter.send(presence("abcde")).await,
            Err(RelayError::Closed)
        ));
    }
}
