use crate::config::AppConfig;
use crate::peer::types::{CallStatus, MediaStream};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

static INIT: OnceCell<()> = OnceCell::new();

/// Installs the global tracing subscriber. Safe to call more than once.
pub fn init(config: &AppConfig) {
    if !config.logging_enabled() {
        return;
    }
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));
        // another subscriber may already be installed (tests, embedding apps)
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    });
}

/// Notifications for the presentation layer.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CallEvent {
    StateChanged { status: CallStatus },
    TransportReady { transport_id: String },
    IncomingRequest { from: String, display_name: String },
    /// relay confirmed the request went out
    RequestDelivered { to: String },
    RequestDeclined { by: String },
    RequestWithdrawn { by: String },
    /// a concurrent request was turned away while busy
    RequestRejectedBusy { from: String },
    RemoteStreamBound { stream: MediaStream },
    LocalMediaReady { stream: MediaStream },
    LocalMediaFailed { reason: String },
    CallEnded,
    Disconnected { reason: String },
}

/// Fan-out of UI notifications, logging each one on the way.
#[derive(Clone)]
pub struct Emitter {
    tx: broadcast::Sender<CallEvent>,
}

impl Emitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: CallEvent) {
        match &event {
            CallEvent::StateChanged { status } => info!(?status, "call state changed"),
            other => debug!(event = ?other, "emit"),
        }
        // no subscribers is fine, the UI may not be attached yet
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(CallEvent::IncomingRequest {
            from: "abcde".into(),
            display_name: "user-abcde".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "incomingRequest");
        assert_eq!(json["from"], "abcde");
    }

    #[tokio::test]
    async fn emitter_reaches_every_subscriber() {
        let emitter = Emitter::new(4);
        let mut a = emitter.subscribe();
        let mut b = emitter.subscribe();
        emitter.emit(CallEvent::CallEnded);
        assert_eq!(a.recv().await.unwrap(), CallEvent::CallEnded);
        assert_eq!(b.recv().await.unwrap(), CallEvent::CallEnded);
    }
}
