//! In-process media transport and capture sources.
//!
//! Every endpoint joined to a [`LoopbackNetwork`] gets a random transport id
//! and can ring any other endpoint on the same network. Streams are opaque
//! handles, nothing is actually encoded.

use crate::error::{MediaError, TransportError};
use crate::peer::transport::{InboundCall, MediaSource, MediaTransport, TransportEvent};
use crate::peer::types::MediaStream;
use crate::utils::random_id;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

type Peers = HashMap<String, mpsc::UnboundedSender<TransportEvent>>;

#[derive(Default)]
struct Members {
    online: Peers,
    // dropped endpoints that may come back with the same id
    offline: Peers,
}

#[derive(Default)]
pub struct LoopbackNetwork {
    peers: Mutex<Members>,
}

/// Held by tests that want to control when `open` fires.
pub struct PendingOpen {
    id: String,
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl PendingOpen {
    pub fn open(self) {
        let _ = self.tx.send(TransportEvent::Open(self.id));
    }
}

impl LoopbackNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Joins the network and reports `open` right away.
    pub fn join(
        self: &Arc<Self>,
    ) -> (LoopbackTransport, mpsc::UnboundedReceiver<TransportEvent>) {
        let (transport, rx, pending) = self.join_deferred();
        pending.open();
        (transport, rx)
    }

    /// Joins without reporting `open`; the caller fires it through [`PendingOpen`].
    pub fn join_deferred(
        self: &Arc<Self>,
    ) -> (
        LoopbackTransport,
        mpsc::UnboundedReceiver<TransportEvent>,
        PendingOpen,
    ) {
        let id = random_id();
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().online.insert(id.clone(), tx.clone());
        debug!(transport_id = %id, "loopback endpoint joined");

        let transport = LoopbackTransport {
            id: id.clone(),
            network: Arc::clone(self),
        };
        (transport, rx, PendingOpen { id, tx })
    }

    /// Takes the endpoint off the network and tells it the transport went away.
    pub fn disconnect(&self, id: &str) {
        let mut peers = self.lock();
        if let Some(tx) = peers.online.remove(id) {
            let _ = tx.send(TransportEvent::Disconnected);
            peers.offline.insert(id.to_string(), tx);
        }
    }

    /// Brings a disconnected endpoint back; it sees `open` again.
    pub fn reconnect(&self, id: &str) -> bool {
        let mut peers = self.lock();
        let Some(tx) = peers.offline.remove(id) else {
            return false;
        };
        let _ = tx.send(TransportEvent::Open(id.to_string()));
        peers.online.insert(id.to_string(), tx);
        debug!(transport_id = %id, "loopback endpoint rejoined");
        true
    }

    fn peer(&self, id: &str) -> Option<mpsc::UnboundedSender<TransportEvent>> {
        self.lock().online.get(id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Members> {
        // a poisoned map is still structurally valid
        self.peers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct LoopbackTransport {
    id: String,
    network: Arc<LoopbackNetwork>,
}

impl LoopbackTransport {
    pub fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl MediaTransport for LoopbackTransport {
    async fn call(&self, target: &str, local: MediaStream) -> Result<MediaStream, TransportError> {
        let peer = self
            .network
            .peer(target)
            .ok_or_else(|| TransportError::PeerUnavailable(target.to_string()))?;

        let (answer_tx, answer_rx) = oneshot::channel();
        let call = LoopbackCall {
            caller: self.id.clone(),
            offered: local,
            answer_tx,
        };
        debug!(from = %self.id, to = %target, "ringing");
        peer.send(TransportEvent::IncomingCall(Box::new(call)))
            .map_err(|_| TransportError::PeerUnavailable(target.to_string()))?;

        answer_rx.await.map_err(|_| TransportError::Rejected)
    }

    fn hang_up(&self, peer: &str) {
        if let Some(tx) = self.network.peer(peer) {
            debug!(from = %self.id, to = %peer, "hanging up");
            let _ = tx.send(TransportEvent::CallClosed(self.id.clone()));
        }
    }
}

struct LoopbackCall {
    caller: String,
    offered: MediaStream,
    answer_tx: oneshot::Sender<MediaStream>,
}

#[async_trait]
impl InboundCall for LoopbackCall {
    fn caller(&self) -> &str {
        &self.caller
    }

    async fn answer(self: Box<Self>, local: MediaStream) -> Result<MediaStream, TransportError> {
        let LoopbackCall {
            offered, answer_tx, ..
        } = *self;
        answer_tx.send(local).map_err(|_| TransportError::Closed)?;
        Ok(offered)
    }
}

/// Capture source that always yields the same stream.
pub struct StaticSource(pub MediaStream);

#[async_trait]
impl MediaSource for StaticSource {
    async fn acquire(&self) -> Result<MediaStream, MediaError> {
        Ok(self.0.clone())
    }
}

/// Capture source that always fails, like a denied permission prompt.
pub struct DeniedSource;

#[async_trait]
impl MediaSource for DeniedSource {
    async fn acquire(&self) -> Result<MediaStream, MediaError> {
        Err(MediaError::Denied)
    }
}
