//! WebSocket host for the relay hub, plus the matching client connector.

use crate::error::RelayError;
use crate::relay::hub::RelayHub;
use crate::relay::{Relay, RelayConnection};
use crate::signaling::RelayMessage;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, connect_async};
use tracing::{debug, info, warn};

// ========== SERVER ==========

/// Accepts WebSocket clients forever, routing their events through `hub`.
pub async fn serve(listener: TcpListener, hub: Arc<RelayHub>) -> Result<(), RelayError> {
    info!(addr = ?listener.local_addr().ok(), "relay listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        let hub = Arc::clone(&hub);
        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, peer, hub).await {
                warn!(%peer, error = %e, "relay client ended with error");
            }
        });
    }
}

async fn handle_client(
    stream: TcpStream,
    peer: SocketAddr,
    hub: Arc<RelayHub>,
) -> Result<(), RelayError> {
    let ws = accept_async(stream).await?;
    let (mut sink, mut source) = ws.split();
    let (conn, mut outbound) = hub.connect();
    info!(%peer, conn, "relay client connected");

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let frame = match message.encode() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, "dropping unencodable event");
                    continue;
                }
            };
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    let result = async {
        while let Some(frame) = source.next().await {
            match frame? {
                Message::Text(text) => match RelayMessage::decode(&text) {
                    Ok(message) => hub.dispatch(conn, message),
                    Err(e) => debug!(%peer, error = %e, "bad frame ignored"),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
        Ok::<(), RelayError>(())
    }
    .await;

    hub.disconnect(conn);
    writer.abort();
    info!(%peer, conn, "relay client disconnected");
    result
}

// ========== CLIENT ==========

/// Client side of the WebSocket relay.
pub struct WsRelay {
    outbound: mpsc::UnboundedSender<RelayMessage>,
}

impl WsRelay {
    pub async fn connect(url: &str) -> Result<RelayConnection, RelayError> {
        let (ws, _response) = connect_async(url).await?;
        info!(%url, "connected to relay");
        let (mut sink, mut source) = ws.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<RelayMessage>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                let frame = match message.encode() {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(error = %e, "dropping unencodable event");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(frame)).await {
                    warn!(error = %e, "relay write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => match RelayMessage::decode(&text) {
                        Ok(message) => {
                            if in_tx.send(message).is_err() {
                                break;
                            }
                        }
                        Err(e) => debug!(error = %e, "bad frame ignored"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "relay read failed");
                        break;
                    }
                }
            }
            // dropping in_tx tells the adapter the relay is gone
        });

        Ok(RelayConnection {
            relay: Arc::new(WsRelay { outbound: out_tx }),
            inbound: in_rx,
        })
    }
}

#[async_trait]
impl Relay for WsRelay {
    async fn emit(&self, message: RelayMessage) -> Result<(), RelayError> {
        self.outbound.send(message).map_err(|_| RelayError::Closed)
    }
}
