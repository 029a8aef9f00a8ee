pub mod client;
pub mod config;
pub mod error;
pub mod logger;
pub mod peer;
pub mod relay;
pub mod session;
pub mod signaling;
pub mod utils;

use std::sync::Arc;
use tokio::net::TcpListener;

pub use client::{CallClient, Collaborators};
pub use config::AppConfig;
pub use error::{CallError, MediaError, RelayError, TransportError};
pub use logger::CallEvent;
pub use peer::{CallSnapshot, CallStatus, MediaStream};

/// Relay binary entry point: serves the relay hub over WebSocket.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env();
    logger::init(&config);

    let listener = TcpListener::bind(&config.relay_listen).await?;
    relay::serve(listener, Arc::new(relay::RelayHub::new())).await?;
    Ok(())
}
