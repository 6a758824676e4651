use tandem_wire::{ByteReader, ByteWriter, Wire, WireError, WireKind};

pub mod reason;
pub use reason::{loss_codes, LossCategory, SessionLossReason};

/// Opaque proof of an established session. Minted by the server during the
/// handshake, useless once the session is lost: a reconnect always yields a
/// fresh one.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SessionToken(pub u64);

impl Wire for SessionToken {
    fn kind() -> WireKind {
        WireKind::Varint
    }

    fn ser(&self, writer: &mut ByteWriter) {
        self.0.ser(writer);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, WireError> {
        Ok(Self(u64::de(reader)?))
    }
}
