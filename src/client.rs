//! Per-endpoint runtime.
//!
//! A single task owns the registry, the state machine, the media binder and
//! the relay adapter. Everything that can change call state arrives through
//! its inbox, so transitions are strictly serialized. [`CallClient`] is the
//! cloneable handle the presentation layer talks to.

use crate::config::AppConfig;
use crate::error::{CallError, MediaError, TransportError};
use crate::logger::{CallEvent, Emitter};
use crate::peer::registry::EndpointRegistry;
use crate::peer::state::{CallMachine, Effect, Event};
use crate::peer::transport::{MediaSource, MediaTransport, TransportEvent};
use crate::peer::types::{CallSnapshot, CallStatus, MediaStream};
use crate::relay::adapter::RelayEventAdapter;
use crate::relay::ws::WsRelay;
use crate::relay::RelayConnection;
use crate::session::{BindOutcome, LocalMedia, MediaSessionBinder, QueuedOutcome};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Everything the endpoint task can be told.
pub enum Envelope {
    User(Event, oneshot::Sender<Result<(), CallError>>),
    Relay {
        generation: u64,
        event: Event,
    },
    Transport(TransportEvent),
    LocalMedia(Result<MediaStream, MediaError>),
    MediaResult {
        generation: u64,
        result: Result<MediaStream, TransportError>,
    },
    AttachRelay(RelayConnection, oneshot::Sender<Result<(), CallError>>),
    Snapshot(oneshot::Sender<CallSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

/// External collaborators an endpoint is wired to.
pub struct Collaborators {
    pub relay: RelayConnection,
    pub transport: Arc<dyn MediaTransport>,
    pub transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    pub media: Arc<dyn MediaSource>,
}

#[derive(Clone)]
pub struct CallClient {
    inbox: mpsc::UnboundedSender<Envelope>,
    emitter: Emitter,
    signaling_id: String,
    transport_ready: watch::Receiver<Option<String>>,
}

impl CallClient {
    /// Starts an endpoint with a freshly generated signaling id.
    pub async fn start(config: &AppConfig, parts: Collaborators) -> Result<Self, CallError> {
        let registry = EndpointRegistry::generate(config.signaling_id_length);
        Self::start_with(config, registry, parts).await
    }

    /// Connects to the WebSocket relay at `config.relay_url` and starts an
    /// endpoint on it.
    pub async fn connect_ws(
        config: &AppConfig,
        transport: Arc<dyn MediaTransport>,
        transport_events: mpsc::UnboundedReceiver<TransportEvent>,
        media: Arc<dyn MediaSource>,
    ) -> Result<Self, CallError> {
        let relay = WsRelay::connect(&config.relay_url).await?;
        Self::start(
            config,
            Collaborators {
                relay,
                transport,
                transport_events,
                media,
            },
        )
        .await
    }

    pub async fn start_with(
        config: &AppConfig,
        registry: EndpointRegistry,
        parts: Collaborators,
    ) -> Result<Self, CallError> {
        let Collaborators {
            relay,
            transport,
            transport_events,
            media,
        } = parts;

        let (inbox, rx) = mpsc::unbounded_channel();
        let emitter = Emitter::new(config.event_capacity);
        let signaling_id = registry.signaling_id().to_string();
        let transport_ready = registry.on_transport_ready();

        let binder = MediaSessionBinder::new(transport, inbox.clone());
        binder.acquire_local(media);

        let endpoint = Endpoint {
            registry,
            machine: CallMachine::new(config.display_name_prefix.clone()),
            binder,
            adapter: RelayEventAdapter::new(inbox.clone()),
            emitter: emitter.clone(),
            forwarder: forward_transport(transport_events, inbox.clone()),
        };
        info!(%signaling_id, "endpoint starting");
        tokio::spawn(endpoint.run(rx));

        let client = CallClient {
            inbox,
            emitter,
            signaling_id,
            transport_ready,
        };
        client.attach_relay(relay).await?;
        Ok(client)
    }

    pub fn signaling_id(&self) -> &str {
        &self.signaling_id
    }

    /// UI notification stream.
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.emitter.subscribe()
    }

    /// Resolves with the transport id once the media transport has opened.
    pub async fn transport_ready(&self) -> Result<String, CallError> {
        let mut rx = self.transport_ready.clone();
        let id = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| CallError::ClientClosed)?;
        let id: Option<String> = (*id).clone();
        id.ok_or(CallError::ClientClosed)
    }

    pub async fn send_request(&self, to: impl Into<String>) -> Result<(), CallError> {
        self.user(Event::SendRequest { to: to.into() }).await
    }

    pub async fn accept(&self) -> Result<(), CallError> {
        self.user(Event::Accept).await
    }

    pub async fn decline(&self) -> Result<(), CallError> {
        self.user(Event::Decline).await
    }

    /// Withdraws our own outstanding request.
    pub async fn cancel_request(&self) -> Result<(), CallError> {
        self.user(Event::Cancel).await
    }

    pub async fn end_call(&self) -> Result<(), CallError> {
        self.user(Event::EndCall).await
    }

    /// Swaps in a new relay connection, re-registering presence on it.
    pub async fn attach_relay(&self, conn: RelayConnection) -> Result<(), CallError> {
        let (tx, rx) = oneshot::channel();
        self.post(Envelope::AttachRelay(conn, tx))?;
        rx.await.map_err(|_| CallError::ClientClosed)?
    }

    pub async fn snapshot(&self) -> Result<CallSnapshot, CallError> {
        let (tx, rx) = oneshot::channel();
        self.post(Envelope::Snapshot(tx))?;
        rx.await.map_err(|_| CallError::ClientClosed)
    }

    /// Unsubscribes from the relay, releases media and stops the endpoint.
    pub async fn shutdown(&self) -> Result<(), CallError> {
        let (tx, rx) = oneshot::channel();
        self.post(Envelope::Shutdown(tx))?;
        rx.await.map_err(|_| CallError::ClientClosed)
    }

    async fn user(&self, event: Event) -> Result<(), CallError> {
        let (tx, rx) = oneshot::channel();
        self.post(Envelope::User(event, tx))?;
        rx.await.map_err(|_| CallError::ClientClosed)?
    }

    fn post(&self, envelope: Envelope) -> Result<(), CallError> {
        self.inbox
            .send(envelope)
            .map_err(|_| CallError::ClientClosed)
    }
}

fn forward_transport(
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    inbox: mpsc::UnboundedSender<Envelope>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if inbox.send(Envelope::Transport(event)).is_err() {
                return;
            }
        }
        // the transport dropped its event channel: treat as gone
        let _ = inbox.send(Envelope::Transport(TransportEvent::Disconnected));
    })
}

struct Endpoint {
    registry: EndpointRegistry,
    machine: CallMachine,
    binder: MediaSessionBinder,
    adapter: RelayEventAdapter,
    emitter: Emitter,
    forwarder: JoinHandle<()>,
}

impl Endpoint {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Envelope>) {
        while let Some(envelope) = inbox.recv().await {
            match envelope {
                Envelope::User(event, reply) => {
                    let result = self.on_user(event).await;
                    let _ = reply.send(result);
                }
                Envelope::Relay { generation, event } => {
                    if !self.adapter.is_current(generation) {
                        debug!(generation, ?event, "event from retired subscription dropped");
                        continue;
                    }
                    if event == Event::RelayDisconnected {
                        self.adapter.detach();
                    }
                    self.step(event).await;
                }
                Envelope::Transport(event) => self.on_transport(event).await,
                Envelope::LocalMedia(result) => self.on_local_media(result).await,
                Envelope::MediaResult { generation, result } => {
                    match self.binder.bind(generation, result) {
                        BindOutcome::Bound(stream) => {
                            self.emitter.emit(CallEvent::RemoteStreamBound { stream })
                        }
                        BindOutcome::Failed(reason) => {
                            self.step(Event::MediaFailed { reason }).await
                        }
                        BindOutcome::Stale => {}
                    }
                }
                Envelope::AttachRelay(conn, reply) => {
                    let presence = self.registry.presence();
                    let result = self
                        .adapter
                        .attach(conn, presence)
                        .await
                        .map_err(CallError::from);
                    let _ = reply.send(result);
                }
                Envelope::Snapshot(reply) => {
                    let _ = reply.send(self.snapshot());
                }
                Envelope::Shutdown(reply) => {
                    self.adapter.detach();
                    self.binder.hang_up();
                    self.forwarder.abort();
                    info!(signaling_id = %self.registry.signaling_id(), "endpoint stopped");
                    let _ = reply.send(());
                    return;
                }
            }
        }
    }

    async fn on_user(&mut self, event: Event) -> Result<(), CallError> {
        match &event {
            Event::SendRequest { .. } if !self.adapter.is_attached() => {
                return Err(CallError::Relay("relay connection closed".into()));
            }
            // nothing can be answered without a local stream
            Event::Accept if self.machine.status() == CallStatus::IncomingRequestPending => {
                self.binder.require_local()?;
            }
            _ => {}
        }
        let effects = self.machine.handle(&self.registry.identity(), event)?;
        self.apply(effects).await;
        Ok(())
    }

    async fn on_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open(id) => {
                if self.registry.set_transport_id(id.clone()) {
                    self.emitter
                        .emit(CallEvent::TransportReady { transport_id: id });
                }
            }
            TransportEvent::IncomingCall(call) => {
                let caller = call.caller().to_string();
                self.binder.offer(call);
                self.step(Event::IncomingMediaCall { caller }).await;
            }
            TransportEvent::CallClosed(peer) => {
                if self.binder.closed_by(&peer) {
                    self.step(Event::MediaClosed).await;
                } else {
                    debug!(%peer, "close for a call we are not in, ignored");
                }
            }
            TransportEvent::Disconnected => {
                // the old transport id is dead; requests wait for the next open
                self.registry.clear_transport_id();
                self.step(Event::TransportDisconnected).await;
            }
        }
    }

    async fn on_local_media(&mut self, result: Result<MediaStream, MediaError>) {
        match &result {
            Ok(stream) => self.emitter.emit(CallEvent::LocalMediaReady {
                stream: stream.clone(),
            }),
            Err(e) => self.emitter.emit(CallEvent::LocalMediaFailed {
                reason: e.to_string(),
            }),
        }
        match self.binder.set_local(result) {
            QueuedOutcome::Dropped(reason) => self.step(Event::MediaFailed { reason }).await,
            QueuedOutcome::Answered | QueuedOutcome::Nothing => {}
        }
    }

    /// Feeds a non-user event; refusals are only logged.
    async fn step(&mut self, event: Event) {
        match self.machine.handle(&self.registry.identity(), event) {
            Ok(effects) => self.apply(effects).await,
            Err(e) => warn!(error = %e, "event refused"),
        }
    }

    async fn apply(&mut self, effects: Vec<Effect>) {
        let mut queue: VecDeque<Effect> = effects.into();
        while let Some(effect) = queue.pop_front() {
            let followup = match effect {
                Effect::Send(message) => {
                    let name = message.name();
                    if let Err(e) = self.adapter.send(message).await {
                        warn!(event = name, error = %e, "relay send failed");
                    }
                    None
                }
                Effect::StartMediaCall { target } => self
                    .binder
                    .initiate_call(target)
                    .err()
                    .map(|e| Event::MediaFailed {
                        reason: e.to_string(),
                    }),
                Effect::AnswerMediaCall => {
                    self.binder
                        .answer_offered()
                        .err()
                        .map(|e| Event::MediaFailed {
                            reason: e.to_string(),
                        })
                }
                Effect::RejectMediaCall => {
                    self.binder.reject_offered();
                    None
                }
                Effect::HangUp => {
                    self.binder.hang_up();
                    None
                }
                Effect::ReleaseMedia => {
                    self.binder.release();
                    None
                }
                Effect::Notify(event) => {
                    self.emitter.emit(event);
                    None
                }
            };

            if let Some(event) = followup {
                match self.machine.handle(&self.registry.identity(), event) {
                    Ok(more) => queue.extend(more),
                    Err(e) => warn!(error = %e, "follow-up refused"),
                }
            }
        }
    }

    fn snapshot(&self) -> CallSnapshot {
        let session = self.binder.session();
        CallSnapshot {
            identity: self.registry.identity(),
            status: self.machine.status(),
            request: self.machine.request().cloned(),
            awaiting_response: self.machine.awaiting_response(),
            last_outcome: self.machine.last_outcome(),
            local_stream: session.local_stream.clone(),
            local_media_error: match self.binder.local() {
                LocalMedia::Failed(reason) => Some(reason.clone()),
                _ => None,
            },
            remote_stream: session.remote_stream.clone(),
            media_active: session.is_active,
        }
    }
}
