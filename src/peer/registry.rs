use crate::peer::types::EndpointIdentity;
use crate::signaling::{JoinPayload, RelayMessage};
use crate::utils::generate_signaling_id;
use tokio::sync::watch;
use tracing::{info, warn};

/// Holds the local signaling and transport identifiers.
pub struct EndpointRegistry {
    signaling_id: String,
    transport_tx: watch::Sender<Option<String>>,
}

impl EndpointRegistry {
    /// Generates a fresh signaling id of `id_len` characters.
    pub fn generate(id_len: usize) -> Self {
        Self::with_signaling_id(generate_signaling_id(id_len))
    }

    pub fn with_signaling_id(signaling_id: impl Into<String>) -> Self {
        let (transport_tx, _) = watch::channel(None);
        Self {
            signaling_id: signaling_id.into(),
            transport_tx,
        }
    }

    pub fn signaling_id(&self) -> &str {
        &self.signaling_id
    }

    pub fn transport_id(&self) -> Option<String> {
        self.transport_tx.borrow().clone()
    }

    pub fn identity(&self) -> EndpointIdentity {
        EndpointIdentity {
            signaling_id: self.signaling_id.clone(),
            transport_id: self.transport_id(),
        }
    }

    /// Presence message binding this endpoint to the relay connection.
    pub fn presence(&self) -> RelayMessage {
        RelayMessage::JoinId(JoinPayload {
            id: self.signaling_id.clone(),
        })
    }

    /// Records the transport id. Only the first assignment counts; returns
    /// whether this call was it.
    pub fn set_transport_id(&self, id: String) -> bool {
        let first = self.transport_tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(id.clone());
            true
        });
        if first {
            info!(transport_id = %id, signaling_id = %self.signaling_id, "transport ready");
        } else {
            warn!(transport_id = %id, "transport id already assigned, ignoring");
        }
        first
    }

    /// Forgets a transport id that went dead. The next `open` is accepted as a
    /// first assignment again.
    pub fn clear_transport_id(&self) {
        let previous = self.transport_tx.send_replace(None);
        if let Some(id) = previous {
            info!(transport_id = %id, signaling_id = %self.signaling_id, "transport lost");
        }
    }

    /// Watch that flips to `Some` once the transport id is known.
    pub fn on_transport_ready(&self) -> watch::Receiver<Option<String>> {
        self.transport_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_id_is_assigned_once() {
        let registry = EndpointRegistry::with_signaling_id("abcde");
        assert!(registry.identity().transport_id.is_none());

        assert!(registry.set_transport_id("t-1".into()));
        assert!(!registry.set_transport_id("t-2".into()));
        assert_eq!(registry.transport_id().as_deref(), Some("t-1"));
    }

    #[test]
    fn cleared_transport_id_can_be_reassigned() {
        let registry = EndpointRegistry::with_signaling_id("abcde");
        registry.set_transport_id("t-1".into());
        registry.clear_transport_id();
        assert!(registry.identity().transport_id.is_none());

        assert!(registry.set_transport_id("t-2".into()));
        assert_eq!(registry.transport_id().as_deref(), Some("t-2"));
    }

    #[test]
    fn generated_id_uses_configured_length() {
        let registry = EndpointRegistry::generate(7);
        assert_eq!(registry.signaling_id().len(), 7);
    }

    #[test]
    fn presence_is_join_id() {
        let registry = EndpointRegistry::with_signaling_id("abcde");
        assert_eq!(
            registry.presence(),
            RelayMessage::JoinId(JoinPayload { id: "abcde".into() })
        );
    }

    #[tokio::test]
    async fn watchers_see_readiness() {
        let registry = EndpointRegistry::with_signaling_id("abcde");
        let mut rx = registry.on_transport_ready();
        registry.set_transport_id("t-1".into());
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_deref(), Some("t-1"));
    }
}
