mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};
use vchat_lib::peer::loopback::LoopbackNetwork;
use vchat_lib::relay::{serve, RelayHub};
use vchat_lib::{AppConfig, CallClient, CallEvent, CallStatus, MediaStream};

async fn start_relay() -> (String, Arc<RelayHub>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hub = Arc::new(RelayHub::new());
    tokio::spawn(serve(listener, Arc::clone(&hub)));
    (format!("ws://{addr}"), hub)
}

async fn ws_peer(
    config: &AppConfig,
    hub: &RelayHub,
    net: &Arc<LoopbackNetwork>,
    cam: &str,
) -> CallClient {
    let (transport, events) = net.join();
    let client = CallClient::connect_ws(config, Arc::new(transport), events, camera(cam))
        .await
        .unwrap();
    client.transport_ready().await.unwrap();
    media_ready(&client).await;

    // presence travels over its own socket; wait until the relay has it
    timeout(WAIT, async {
        while hub.room_size(client.signaling_id()) == 0 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("presence never reached the relay");
    client
}

#[tokio::test]
async fn call_over_websocket_relay() {
    let mut config = config();
    let (url, hub) = start_relay().await;
    config.relay_url = url;
    let net = LoopbackNetwork::new();

    let a = ws_peer(&config, &hub, &net, "cam-a").await;
    let b = ws_peer(&config, &hub, &net, "cam-b").await;
    assert_eq!(a.signaling_id().len(), config.signaling_id_length);

    let mut a_events = a.subscribe();
    let mut b_events = b.subscribe();
    a.send_request(b.signaling_id()).await.unwrap();

    // the relay acknowledges the request to the sender
    next_event(&mut a_events, |e| matches!(e, CallEvent::RequestDelivered { .. })).await;
    let incoming =
        next_event(&mut b_events, |e| matches!(e, CallEvent::IncomingRequest { .. })).await;
    assert_eq!(
        incoming,
        CallEvent::IncomingRequest {
            from: a.signaling_id().to_string(),
            display_name: format!("user-{}", a.signaling_id()),
        }
    );

    b.accept().await.unwrap();
    let a_snap = until(&a, |s| s.media_active).await;
    let b_snap = until(&b, |s| s.media_active).await;
    assert_eq!(a_snap.status, CallStatus::Connected);
    assert_eq!(b_snap.status, CallStatus::Connected);
    assert_eq!(a_snap.remote_stream, Some(MediaStream::new("cam-b")));
    assert_eq!(b_snap.remote_stream, Some(MediaStream::new("cam-a")));
}

#[tokio::test]
async fn unreachable_relay_is_a_relay_error() {
    let mut config = config();
    // nothing listens on the discard port
    config.relay_url = "ws://127.0.0.1:9".into();
    let net = LoopbackNetwork::new();
    let (transport, events) = net.join();

    let result = CallClient::connect_ws(&config, Arc::new(transport), events, camera("cam")).await;
    assert!(matches!(result, Err(vchat_lib::CallError::Relay(_))));
}
