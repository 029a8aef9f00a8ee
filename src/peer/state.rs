//! Call request state machine.
//!
//! Pure and synchronous: every input is an [`Event`], every side effect is
//! returned as an [`Effect`] for the owning runtime to carry out. One call
//! request at a time per endpoint.

use crate::error::CallError;
use crate::logger::CallEvent;
use crate::peer::types::{CallRequest, CallStatus, Direction, EndpointIdentity, Outcome};
use crate::signaling::{
    AcceptPayload, DeclinePayload, RelayMessage, RequestPayload, ResponsePayload,
};
use crate::utils::display_name;
use tracing::{debug, info, warn};

// ========== INPUTS ==========

/// Everything the machine reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // user actions
    SendRequest { to: String },
    Accept,
    Decline,
    Cancel,
    EndCall,

    // relay
    RelayRequest(RequestPayload),
    RelayResponse(ResponsePayload),
    RelayAccept(AcceptPayload),
    RelayDecline(DeclinePayload),
    RelayDisconnected,

    // media transport
    IncomingMediaCall { caller: String },
    MediaClosed,
    MediaFailed { reason: String },
    TransportDisconnected,
}

// ========== OUTPUTS ==========

/// Side effects for the owning runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// emit on the relay
    Send(RelayMessage),
    /// acceptor side: ring the requester's transport id with our stream
    StartMediaCall { target: String },
    /// requester side: answer the inbound media call with our stream
    AnswerMediaCall,
    RejectMediaCall,
    /// close the call on the transport so the counterpart sees it end, then release
    HangUp,
    /// the counterpart already closed; release locally only
    ReleaseMedia,
    Notify(CallEvent),
}

pub struct CallMachine {
    name_prefix: String,
    status: CallStatus,
    request: Option<CallRequest>,
    awaiting_response: bool,
    last_outcome: Option<Outcome>,
    // requester already answered the acceptor's media call
    media_answered: bool,
}

impl CallMachine {
    pub fn new(name_prefix: impl Into<String>) -> Self {
        Self {
            name_prefix: name_prefix.into(),
            status: CallStatus::Idle,
            request: None,
            awaiting_response: false,
            last_outcome: None,
            media_answered: false,
        }
    }

    pub fn status(&self) -> CallStatus {
        self.status
    }

    pub fn request(&self) -> Option<&CallRequest> {
        self.request.as_ref()
    }

    pub fn awaiting_response(&self) -> bool {
        self.awaiting_response
    }

    pub fn last_outcome(&self) -> Option<Outcome> {
        self.last_outcome
    }

    pub fn handle(
        &mut self,
        me: &EndpointIdentity,
        event: Event,
    ) -> Result<Vec<Effect>, CallError> {
        debug!(status = ?self.status, ?event, "handle");
        let mut fx = Vec::new();

        match event {
            Event::SendRequest { to } => {
                if self.status != CallStatus::Idle {
                    return Err(CallError::Busy);
                }
                let to = to.trim();
                if to.is_empty() {
                    return Err(CallError::MissingCounterpart);
                }
                let transport_id = me.transport_id.clone().ok_or(CallError::NotReady)?;

                info!(%to, "sending call request");
                fx.push(Effect::Send(RelayMessage::Request(RequestPayload {
                    username: display_name(&self.name_prefix, &me.signaling_id),
                    remote_id: to.to_string(),
                    id: transport_id,
                    room_id: me.signaling_id.clone(),
                })));
                self.last_outcome = None;
                self.awaiting_response = false;
                self.request = Some(CallRequest::outbound(to));
                self.set_status(CallStatus::RequestSent, &mut fx);
            }

            Event::Accept => {
                if self.status != CallStatus::IncomingRequestPending {
                    return Err(CallError::NoPendingRequest);
                }
                let (from, target) = match &self.request {
                    Some(CallRequest {
                        counterpart_signaling_id,
                        counterpart_transport_id: Some(target),
                        ..
                    }) => (counterpart_signaling_id.clone(), target.clone()),
                    _ => return Err(CallError::NoPendingRequest),
                };

                info!(%from, %target, "accepting call request");
                fx.push(Effect::Send(RelayMessage::RequestAccept(AcceptPayload {
                    remote_room_id: from,
                })));
                fx.push(Effect::StartMediaCall { target });
                self.set_status(CallStatus::Connected, &mut fx);
            }

            Event::Decline => match self.status {
                // already idle: declining again changes nothing
                CallStatus::Idle => {}
                CallStatus::IncomingRequestPending => {
                    // always the counterpart recorded from the request, never user input
                    let to = self.counterpart().unwrap_or_default();
                    info!(%to, "declining call request");
                    fx.push(Effect::Send(RelayMessage::RequestDecline(DeclinePayload {
                        to,
                    })));
                    self.finish(None, &mut fx);
                }
                _ => return Err(CallError::NoPendingRequest),
            },

            Event::Cancel => {
                if self.status != CallStatus::RequestSent {
                    return Err(CallError::NoOutgoingRequest);
                }
                let to = self.counterpart().unwrap_or_default();
                info!(%to, "cancelling outgoing request");
                fx.push(Effect::Send(RelayMessage::RequestDecline(DeclinePayload {
                    to,
                })));
                self.finish(Some(Outcome::Cancelled), &mut fx);
            }

            Event::EndCall => {
                if self.status != CallStatus::Connected {
                    return Err(CallError::NotConnected);
                }
                info!("ending call");
                fx.push(Effect::HangUp);
                fx.push(Effect::Notify(CallEvent::CallEnded));
                self.finish(Some(Outcome::Ended), &mut fx);
            }

            Event::RelayRequest(payload) => self.on_request(payload, &mut fx),

            Event::RelayResponse(_) => {
                if self.status == CallStatus::RequestSent {
                    self.awaiting_response = true;
                    let to = self.counterpart().unwrap_or_default();
                    fx.push(Effect::Notify(CallEvent::RequestDelivered { to }));
                }
            }

            Event::RelayAccept(payload) => match self.status {
                CallStatus::RequestSent => {
                    if !payload.remote_room_id.is_empty()
                        && payload.remote_room_id != me.signaling_id
                    {
                        warn!(room = %payload.remote_room_id, "accept addressed elsewhere, ignoring");
                    } else {
                        // media arrives separately as an inbound call from the acceptor
                        self.awaiting_response = false;
                        self.set_status(CallStatus::Connected, &mut fx);
                    }
                }
                CallStatus::Connected if self.is_outbound() => {
                    debug!("requestAccept after media call, confirmation only");
                }
                status => debug!(?status, "stray requestAccept ignored"),
            },

            Event::RelayDecline(_) => match self.status {
                CallStatus::RequestSent => {
                    let by = self.counterpart().unwrap_or_default();
                    info!(%by, "call request declined");
                    fx.push(Effect::Notify(CallEvent::RequestDeclined { by }));
                    self.finish(Some(Outcome::Declined), &mut fx);
                }
                CallStatus::IncomingRequestPending => {
                    let by = self.counterpart().unwrap_or_default();
                    info!(%by, "call request withdrawn");
                    fx.push(Effect::Notify(CallEvent::RequestWithdrawn { by }));
                    self.finish(Some(Outcome::Withdrawn), &mut fx);
                }
                status => debug!(?status, "stray requestDecline ignored"),
            },

            Event::IncomingMediaCall { caller } => match self.status {
                CallStatus::RequestSent => {
                    // acceptor's media call beat its requestAccept
                    info!(%caller, "media call before requestAccept, connecting");
                    self.media_answered = true;
                    self.awaiting_response = false;
                    fx.push(Effect::AnswerMediaCall);
                    self.set_status(CallStatus::Connected, &mut fx);
                }
                CallStatus::Connected if self.is_outbound() && !self.media_answered => {
                    self.media_answered = true;
                    fx.push(Effect::AnswerMediaCall);
                }
                status => {
                    warn!(%caller, ?status, "rejecting unexpected media call");
                    fx.push(Effect::RejectMediaCall);
                }
            },

            Event::MediaClosed => {
                if self.status == CallStatus::Connected {
                    info!("remote closed the call");
                    fx.push(Effect::ReleaseMedia);
                    fx.push(Effect::Notify(CallEvent::CallEnded));
                    self.finish(Some(Outcome::Ended), &mut fx);
                }
            }

            Event::MediaFailed { reason } => {
                if self.status == CallStatus::Connected {
                    warn!(%reason, "media call failed");
                    fx.push(Effect::HangUp);
                    fx.push(Effect::Notify(CallEvent::Disconnected { reason }));
                    self.finish(Some(Outcome::Disconnected), &mut fx);
                }
            }

            Event::RelayDisconnected => self.on_disconnect("relay disconnected", &mut fx),
            Event::TransportDisconnected => {
                self.on_disconnect("media transport disconnected", &mut fx)
            }
        }

        Ok(fx)
    }

    fn on_request(&mut self, payload: RequestPayload, fx: &mut Vec<Effect>) {
        let from = payload.room_id.trim().to_string();
        if from.is_empty() {
            warn!("request without sender id dropped");
            return;
        }

        if self.status != CallStatus::Idle {
            info!(%from, status = ?self.status, "busy, turning request away");
            fx.push(Effect::Send(RelayMessage::RequestDecline(DeclinePayload {
                to: from.clone(),
            })));
            fx.push(Effect::Notify(CallEvent::RequestRejectedBusy { from }));
            return;
        }

        if payload.id.trim().is_empty() {
            // sender's transport never opened, a media call back is impossible
            warn!(%from, "request without transport id, declining");
            fx.push(Effect::Send(RelayMessage::RequestDecline(DeclinePayload {
                to: from,
            })));
            return;
        }

        info!(%from, username = %payload.username, "incoming call request");
        self.last_outcome = None;
        self.request = Some(CallRequest::inbound(&from, &payload.id, &payload.username));
        fx.push(Effect::Notify(CallEvent::IncomingRequest {
            from,
            display_name: payload.username,
        }));
        self.set_status(CallStatus::IncomingRequestPending, fx);
    }

    fn on_disconnect(&mut self, reason: &str, fx: &mut Vec<Effect>) {
        if self.status == CallStatus::Connected {
            fx.push(Effect::HangUp);
        }
        fx.push(Effect::Notify(CallEvent::Disconnected {
            reason: reason.to_string(),
        }));
        if self.status != CallStatus::Idle {
            warn!(%reason, status = ?self.status, "discarding call request");
            self.finish(Some(Outcome::Disconnected), fx);
        }
    }

    fn counterpart(&self) -> Option<String> {
        self.request
            .as_ref()
            .map(|r| r.counterpart_signaling_id.clone())
    }

    fn is_outbound(&self) -> bool {
        matches!(
            self.request,
            Some(CallRequest {
                direction: Direction::Outbound,
                ..
            })
        )
    }

    fn finish(&mut self, outcome: Option<Outcome>, fx: &mut Vec<Effect>) {
        self.request = None;
        self.awaiting_response = false;
        self.media_answered = false;
        if outcome.is_some() {
            self.last_outcome = outcome;
        }
        self.set_status(CallStatus::Idle, fx);
    }

    fn set_status(&mut self, status: CallStatus, fx: &mut Vec<Effect>) {
        if self.status == status {
            return;
        }
        self.status = status;
        if let Some(req) = self.request.as_mut() {
            req.status = status;
        }
        fx.push(Effect::Notify(CallEvent::StateChanged { status }));
    }
}
