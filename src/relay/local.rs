use crate::error::RelayError;
use crate::relay::hub::{ConnId, RelayHub};
use crate::relay::{Relay, RelayConnection};
use crate::signaling::RelayMessage;
use async_trait::async_trait;
use std::sync::Arc;

/// In-process relay connection straight into a shared [`RelayHub`].
pub struct LocalRelay {
    hub: Arc<RelayHub>,
    conn: ConnId,
}

impl LocalRelay {
    pub fn connect(hub: &Arc<RelayHub>) -> (Arc<LocalRelay>, RelayConnection) {
        let (conn, inbound) = hub.connect();
        let relay = Arc::new(LocalRelay {
            hub: Arc::clone(hub),
            conn,
        });
        let connection = RelayConnection {
            relay: relay.clone(),
            inbound,
        };
        (relay, connection)
    }

    /// Drops the connection on the hub side, as a network failure would.
    pub fn close(&self) {
        self.hub.disconnect(self.conn);
    }
}

#[async_trait]
impl Relay for LocalRelay {
    async fn emit(&self, message: RelayMessage) -> Result<(), RelayError> {
        self.hub.dispatch(self.conn, message);
        Ok(())
    }
}
