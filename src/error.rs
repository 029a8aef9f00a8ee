use thiserror::Error;

/// Errors returned to the user-facing call operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// media transport has not assigned our transport id yet
    #[error("not ready yet, try again shortly")]
    NotReady,

    #[error("no counterpart id given")]
    MissingCounterpart,

    #[error("another call request is already in progress")]
    Busy,

    #[error("no incoming request to answer")]
    NoPendingRequest,

    #[error("no outgoing request to cancel")]
    NoOutgoingRequest,

    #[error("no active call")]
    NotConnected,

    #[error("local media unavailable: {0}")]
    MediaUnavailable(String),

    /// camera/microphone still being acquired
    #[error("local media is not ready yet")]
    MediaPending,

    #[error("relay error: {0}")]
    Relay(String),

    #[error("call client has shut down")]
    ClientClosed,
}

/// Relay channel failures.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("relay connection closed")]
    Closed,

    #[error("failed to encode relay message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode relay frame: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RelayError> for CallError {
    fn from(err: RelayError) -> Self {
        CallError::Relay(err.to_string())
    }
}

/// Media transport failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("peer {0} is not reachable")]
    PeerUnavailable(String),

    #[error("call was rejected by the remote transport")]
    Rejected,

    #[error("media transport closed")]
    Closed,
}

/// Local capture failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("permission to use camera/microphone denied")]
    Denied,

    #[error("no capture device found")]
    NoDevice,
}
