use tandem_shared::{EntityId, OpSeq, RejectReason, SessionLossReason, SessionToken};

use crate::session::ClientKey;

/// Everything a server reports back to its host, drained from `update` in
/// the order it happened
#[derive(Clone, Debug, PartialEq)]
pub enum ServerEvent<A> {
    /// A handshake succeeded and a session now exists
    ClientConnected {
        key: ClientKey,
        entity: EntityId,
        token: SessionToken,
    },
    /// A handshake was turned away
    HandshakeRefused {
        key: ClientKey,
        entity: EntityId,
        reason: SessionLossReason,
    },
    /// A session ended, for whatever reason the payload says
    ClientDisconnected {
        key: ClientKey,
        entity: EntityId,
        reason: SessionLossReason,
    },
    /// An action was committed to a model, client-submitted or pushed
    ActionCommitted {
        key: ClientKey,
        entity: EntityId,
        op_seq: OpSeq,
        action: A,
    },
    /// A client-submitted action failed validation
    ActionRejected {
        key: ClientKey,
        entity: EntityId,
        reason: RejectReason,
    },
    /// A client submitted an action its origin may not issue. Worth an
    /// alert: production clients never do this.
    PolicyViolation {
        key: ClientKey,
        entity: EntityId,
        action: &'static str,
    },
    /// The model store failed; the session carries on, the snapshot is lost
    StorageFailed { entity: EntityId, detail: String },
}
