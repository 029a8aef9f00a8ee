//! Contracts of the external media collaborators.
//!
//! The core never negotiates media itself. It only needs a transport that can
//! ring a remote transport id, report inbound attempts, and a source for the
//! local capture stream.

use crate::error::{MediaError, TransportError};
use crate::peer::types::MediaStream;
use async_trait::async_trait;

#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Rings `target` offering `local`; resolves with the remote stream once
    /// the other side answers.
    async fn call(&self, target: &str, local: MediaStream) -> Result<MediaStream, TransportError>;

    /// Closes the live call with `peer`; the peer sees `CallClosed`.
    fn hang_up(&self, peer: &str);
}

/// An inbound call attempt. Dropping it without answering rejects it.
#[async_trait]
pub trait InboundCall: Send {
    /// transport id of the caller
    fn caller(&self) -> &str;

    async fn answer(self: Box<Self>, local: MediaStream) -> Result<MediaStream, TransportError>;
}

/// Notifications pushed by the media transport.
pub enum TransportEvent {
    /// transport id assigned
    Open(String),
    IncomingCall(Box<dyn InboundCall>),
    /// the live call was closed by the remote side, carrying its transport id
    CallClosed(String),
    Disconnected,
}

impl std::fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportEvent::Open(id) => f.debug_tuple("Open").field(id).finish(),
            TransportEvent::IncomingCall(call) => {
                f.debug_tuple("IncomingCall").field(&call.caller()).finish()
            }
            TransportEvent::CallClosed(peer) => f.debug_tuple("CallClosed").field(peer).finish(),
            TransportEvent::Disconnected => f.write_str("Disconnected"),
        }
    }
}

/// Local camera/microphone capture.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire(&self) -> Result<MediaStream, MediaError>;
}
