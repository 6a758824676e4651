// The boundary to whatever carries bytes between the endpoints. The core
// never opens sockets; hosts hand in one sender/receiver pair per logical
// connection.

use thiserror::Error;

/// Errors surfaced by a transport implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The underlying connection is gone; no packet will ever arrive again
    #[error("Transport is disconnected")]
    Disconnected,

    /// A send did not go through
    #[error("Transport send failed: {detail}")]
    SendFailed { detail: String },

    /// A receive failed for a reason other than having nothing to deliver
    #[error("Transport receive failed: {detail}")]
    ReceiveFailed { detail: String },
}

/// Outbound half of a connection. Packets are whole encoded values; the
/// transport must deliver each one intact or not at all.
pub trait PacketSender: Send {
    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError>;
}

/// Inbound half of a connection. `Ok(None)` means nothing waiting right
/// now; packets are handed over as owned buffers, so a receiver may run on
/// a different thread than the endpoint that drains it.
pub trait PacketReceiver: Send {
    fn receive(&mut self) -> Result<Option<Vec<u8>>, TransportError>;
}
