#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};
use vchat_lib::peer::loopback::{DeniedSource, LoopbackNetwork, PendingOpen, StaticSource};
use vchat_lib::peer::registry::EndpointRegistry;
use vchat_lib::peer::transport::MediaSource;
use vchat_lib::relay::{LocalRelay, RelayConnection, RelayHub};
use vchat_lib::{
    AppConfig, CallClient, CallEvent, CallSnapshot, CallStatus, Collaborators, MediaError,
    MediaStream,
};

pub const WAIT: Duration = Duration::from_secs(5);

pub struct Peer {
    pub client: CallClient,
    pub relay: Arc<LocalRelay>,
    pub transport_id: String,
    pub open: Option<PendingOpen>,
}

pub fn config() -> AppConfig {
    let config = AppConfig::default();
    vchat_lib::logger::init(&config);
    config
}

pub fn camera(name: &str) -> Arc<dyn MediaSource> {
    Arc::new(StaticSource(MediaStream::new(name)))
}

pub fn denied() -> Arc<dyn MediaSource> {
    Arc::new(DeniedSource)
}

/// Capture that never finishes, like an unanswered permission prompt.
pub struct StalledSource;

#[async_trait]
impl MediaSource for StalledSource {
    async fn acquire(&self) -> Result<MediaStream, MediaError> {
        std::future::pending().await
    }
}

pub fn stalled() -> Arc<dyn MediaSource> {
    Arc::new(StalledSource)
}

/// Endpoint with an open transport.
pub async fn peer(
    hub: &Arc<RelayHub>,
    net: &Arc<LoopbackNetwork>,
    id: &str,
    media: Arc<dyn MediaSource>,
) -> Peer {
    let mut p = peer_deferred(hub, net, id, media).await;
    open(&mut p).await;
    p
}

/// Fires the deferred `open` and waits for the endpoint to see it.
pub async fn open(p: &mut Peer) {
    if let Some(open) = p.open.take() {
        open.open();
    }
    timeout(WAIT, p.client.transport_ready())
        .await
        .expect("transport never opened")
        .unwrap();
}

/// Endpoint whose transport has not reported `open` yet.
pub async fn peer_deferred(
    hub: &Arc<RelayHub>,
    net: &Arc<LoopbackNetwork>,
    id: &str,
    media: Arc<dyn MediaSource>,
) -> Peer {
    let (relay, conn) = LocalRelay::connect(hub);
    peer_on(relay, conn, net, id, media).await
}

/// Endpoint on a caller-supplied relay connection, transport not open yet.
pub async fn peer_on(
    relay: Arc<LocalRelay>,
    conn: RelayConnection,
    net: &Arc<LoopbackNetwork>,
    id: &str,
    media: Arc<dyn MediaSource>,
) -> Peer {
    let (transport, transport_events, open) = net.join_deferred();
    let transport_id = transport.id().to_string();

    let client = CallClient::start_with(
        &config(),
        EndpointRegistry::with_signaling_id(id),
        Collaborators {
            relay: conn,
            transport: Arc::new(transport),
            transport_events,
            media,
        },
    )
    .await
    .unwrap();

    Peer {
        client,
        relay,
        transport_id,
        open: Some(open),
    }
}

/// Polls snapshots until `pred` holds.
pub async fn until<F>(client: &CallClient, pred: F) -> CallSnapshot
where
    F: Fn(&CallSnapshot) -> bool,
{
    timeout(WAIT, async {
        loop {
            let snap = client.snapshot().await.unwrap();
            if pred(&snap) {
                return snap;
            }
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never reached")
}

pub async fn until_status(client: &CallClient, status: CallStatus) -> CallSnapshot {
    until(client, |s| s.status == status).await
}

pub async fn media_ready(client: &CallClient) {
    until(client, |s| s.local_stream.is_some()).await;
}

pub async fn next_event<F>(rx: &mut broadcast::Receiver<CallEvent>, pred: F) -> CallEvent
where
    F: Fn(&CallEvent) -> bool,
{
    timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event stream ended: {e}"),
            }
        }
    })
    .await
    .expect("event never arrived")
}
