//! Media session binder.
//!
//! Owns the local capture stream and the live session, and drives the media
//! transport on behalf of the state machine. Every media attempt gets a
//! generation number; results from an attempt that has since been released
//! are never bound.

use crate::client::Envelope;
use crate::error::{CallError, MediaError, TransportError};
use crate::peer::transport::{InboundCall, MediaSource, MediaTransport};
use crate::peer::types::MediaStream;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalMedia {
    Pending,
    Ready(MediaStream),
    Failed(String),
}

/// The live local/remote stream pair.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaSession {
    pub local_stream: Option<MediaStream>,
    /// only `Some` while `is_active`
    pub remote_stream: Option<MediaStream>,
    pub is_active: bool,
}

/// What happened to a queued or offered inbound call once local media settled.
#[derive(Debug, PartialEq, Eq)]
pub enum QueuedOutcome {
    Nothing,
    Answered,
    Dropped(String),
}

pub struct MediaSessionBinder {
    transport: Arc<dyn MediaTransport>,
    inbox: mpsc::UnboundedSender<Envelope>,
    local: LocalMedia,
    session: MediaSession,
    generation: u64,
    // transport id on the other end of the current attempt
    peer: Option<String>,
    // inbound call waiting for the state machine's verdict
    offered: Option<Box<dyn InboundCall>>,
    // accepted inbound call waiting for the local stream
    queued: Option<Box<dyn InboundCall>>,
    task: Option<JoinHandle<()>>,
}

impl MediaSessionBinder {
    pub fn new(transport: Arc<dyn MediaTransport>, inbox: mpsc::UnboundedSender<Envelope>) -> Self {
        Self {
            transport,
            inbox,
            local: LocalMedia::Pending,
            session: MediaSession::default(),
            generation: 0,
            peer: None,
            offered: None,
            queued: None,
            task: None,
        }
    }

    pub fn session(&self) -> &MediaSession {
        &self.session
    }

    pub fn local(&self) -> &LocalMedia {
        &self.local
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Starts local capture; the result comes back as `Envelope::LocalMedia`.
    pub fn acquire_local(&self, source: Arc<dyn MediaSource>) {
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let result = source.acquire().await;
            let _ = inbox.send(Envelope::LocalMedia(result));
        });
    }

    /// Records the capture result and settles any inbound call queued behind it.
    pub fn set_local(&mut self, result: Result<MediaStream, MediaError>) -> QueuedOutcome {
        match result {
            Ok(stream) => {
                info!(stream = %stream.id, "local media ready");
                self.session.local_stream = Some(stream.clone());
                self.local = LocalMedia::Ready(stream);
            }
            Err(e) => {
                warn!(error = %e, "local media unavailable");
                self.local = LocalMedia::Failed(e.to_string());
            }
        }

        match self.queued.take() {
            None => QueuedOutcome::Nothing,
            Some(call) => match self.answer(call) {
                Ok(()) => QueuedOutcome::Answered,
                Err(e) => QueuedOutcome::Dropped(e.to_string()),
            },
        }
    }

    /// Local stream, or why there is none.
    pub fn require_local(&self) -> Result<MediaStream, CallError> {
        match &self.local {
            LocalMedia::Ready(stream) => Ok(stream.clone()),
            LocalMedia::Pending => Err(CallError::MediaPending),
            LocalMedia::Failed(reason) => Err(CallError::MediaUnavailable(reason.clone())),
        }
    }

    /// Parks an inbound call until the state machine decides on it.
    pub fn offer(&mut self, call: Box<dyn InboundCall>) {
        if let Some(previous) = self.offered.replace(call) {
            debug!(caller = %previous.caller(), "superseded inbound call dropped");
        }
    }

    /// Acceptor side: ring the requester.
    pub fn initiate_call(&mut self, target: String) -> Result<(), CallError> {
        let local = self.require_local()?;
        let generation = self.next_generation();
        let transport = Arc::clone(&self.transport);
        let inbox = self.inbox.clone();
        self.peer = Some(target.clone());

        info!(%target, generation, "initiating media call");
        self.track(tokio::spawn(async move {
            let result = transport.call(&target, local).await;
            let _ = inbox.send(Envelope::MediaResult { generation, result });
        }));
        Ok(())
    }

    /// Requester side: answer the offered inbound call, or queue it until the
    /// local stream shows up.
    pub fn answer_offered(&mut self) -> Result<(), CallError> {
        let call = self.offered.take().ok_or(CallError::NotConnected)?;
        self.peer = Some(call.caller().to_string());
        match &self.local {
            LocalMedia::Pending => {
                debug!(caller = %call.caller(), "local media pending, queueing inbound call");
                self.queued = Some(call);
                Ok(())
            }
            _ => self.answer(call),
        }
    }

    pub fn reject_offered(&mut self) {
        if let Some(call) = self.offered.take() {
            debug!(caller = %call.caller(), "inbound media call rejected");
        }
    }

    /// Binds the remote stream if `generation` is still the live attempt.
    pub fn bind(&mut self, generation: u64, result: Result<MediaStream, TransportError>) -> BindOutcome {
        if generation != self.generation || self.task.is_none() {
            debug!(generation, current = self.generation, "stale media result dropped");
            return BindOutcome::Stale;
        }
        self.task = None;
        match result {
            Ok(stream) => {
                info!(stream = %stream.id, "remote stream bound");
                self.session.remote_stream = Some(stream.clone());
                self.session.is_active = true;
                BindOutcome::Bound(stream)
            }
            Err(e) => BindOutcome::Failed(e.to_string()),
        }
    }

    /// Whether a `CallClosed` from `peer` concerns the current attempt. With no
    /// attempt bound yet, any close counts.
    pub fn closed_by(&self, peer: &str) -> bool {
        self.peer.as_deref().map_or(true, |p| p == peer)
    }

    /// Tells the other end the call is over, then releases locally.
    pub fn hang_up(&mut self) {
        if let Some(peer) = self.peer.take() {
            info!(%peer, "hanging up");
            self.transport.hang_up(&peer);
        }
        self.release();
    }

    /// Tears down the live session; local capture stays for the next call.
    pub fn release(&mut self) {
        self.next_generation();
        self.peer = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.offered = None;
        self.queued = None;
        if self.session.is_active {
            info!("media session released");
        }
        self.session.remote_stream = None;
        self.session.is_active = false;
    }

    fn answer(&mut self, call: Box<dyn InboundCall>) -> Result<(), CallError> {
        let local = self.require_local()?;
        let generation = self.next_generation();
        let inbox = self.inbox.clone();

        info!(caller = %call.caller(), generation, "answering media call");
        self.track(tokio::spawn(async move {
            let result = call.answer(local).await;
            let _ = inbox.send(Envelope::MediaResult { generation, result });
        }));
        Ok(())
    }

    fn track(&mut self, task: JoinHandle<()>) {
        if let Some(old) = self.task.replace(task) {
            old.abort();
        }
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum BindOutcome {
    Bound(MediaStream),
    Failed(String),
    Stale,
}
