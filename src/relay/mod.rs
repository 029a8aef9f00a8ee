pub mod adapter;
pub mod hub;
pub mod local;
pub mod ws;

use crate::error::RelayError;
use crate::signaling::RelayMessage;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

pub use adapter::RelayEventAdapter;
pub use hub::RelayHub;
pub use local::LocalRelay;
pub use ws::{serve, WsRelay};

/// Outbound half of a relay connection.
#[async_trait]
pub trait Relay: Send + Sync {
    async fn emit(&self, message: RelayMessage) -> Result<(), RelayError>;
}

/// A live relay connection: where to send, and what arrives. The inbound
/// channel closing means the connection is gone.
pub struct RelayConnection {
    pub relay: Arc<dyn Relay>,
    pub inbound: mpsc::UnboundedReceiver<RelayMessage>,
}
