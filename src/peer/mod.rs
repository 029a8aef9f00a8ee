pub mod loopback;
pub mod registry;
pub mod state;
pub mod transport;
pub mod types;

pub use registry::EndpointRegistry;
pub use state::{CallMachine, Effect, Event};
pub use transport::{InboundCall, MediaSource, MediaTransport, TransportEvent};
pub use types::{
    CallRequest, CallSnapshot, CallStatus, Direction, EndpointIdentity, MediaStream, Outcome,
};
