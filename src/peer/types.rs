use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque handle to a local or remote media stream.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    pub id: String,
}

impl MediaStream {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Identity of the local endpoint
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct EndpointIdentity {
    /// short human-shareable code, fixed for the process lifetime
    pub signaling_id: String,
    /// assigned by the media transport once it opens
    pub transport_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outbound,
    Inbound,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CallStatus {
    Idle,
    RequestSent,
    IncomingRequestPending,
    Connected,
}

/// One attempt to connect two endpoints.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub direction: Direction,
    pub counterpart_signaling_id: String,
    /// only known for inbound requests; the requester never learns the acceptor's id
    pub counterpart_transport_id: Option<String>,
    pub counterpart_display_name: Option<String>,
    pub status: CallStatus,
    pub requested_at: DateTime<Utc>,
}

impl CallRequest {
    pub fn outbound(to: &str) -> Self {
        Self {
            direction: Direction::Outbound,
            counterpart_signaling_id: to.to_string(),
            counterpart_transport_id: None,
            counterpart_display_name: None,
            status: CallStatus::RequestSent,
            requested_at: Utc::now(),
        }
    }

    pub fn inbound(from: &str, transport_id: &str, display_name: &str) -> Self {
        Self {
            direction: Direction::Inbound,
            counterpart_signaling_id: from.to_string(),
            counterpart_transport_id: Some(transport_id.to_string()),
            counterpart_display_name: Some(display_name.to_string()),
            status: CallStatus::IncomingRequestPending,
            requested_at: Utc::now(),
        }
    }
}

/// Why the last request ended without a call.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    Declined,
    Withdrawn,
    Cancelled,
    Disconnected,
    Ended,
}

/// Read-only view of an endpoint for the presentation layer.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CallSnapshot {
    pub identity: EndpointIdentity,
    pub status: CallStatus,
    pub request: Option<CallRequest>,
    pub awaiting_response: bool,
    pub last_outcome: Option<Outcome>,
    pub local_stream: Option<MediaStream>,
    /// why local capture failed, if it did
    pub local_media_error: Option<String>,
    pub remote_stream: Option<MediaStream>,
    pub media_active: bool,
}
