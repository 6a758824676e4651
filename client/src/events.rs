use tandem_shared::{Digest, OpSeq, RejectReason, SessionLossReason, SessionToken, Tick};

use crate::client::PendingHandle;

/// Everything a client reports back to its host. Events come out of
/// `update` in the order they happened; the host drains the returned buffer
/// and reacts, the client never calls back into the host.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent<A> {
    /// The handshake succeeded and a session now exists
    SessionStarted { token: SessionToken },
    /// The handshake failed; no session ever existed
    FailedToStartSession { reason: SessionLossReason },
    /// An active session ended
    SessionLost { reason: SessionLossReason },
    /// The server committed an action this client submitted
    ActionConfirmed { handle: PendingHandle, op_seq: OpSeq },
    /// The server refused an action this client submitted
    ActionRejected {
        handle: PendingHandle,
        reason: RejectReason,
    },
    /// The server originated an action and it was applied here
    ServerAction { op_seq: OpSeq, action: A },
    /// A scheduled tick was applied to the confirmed model
    TickApplied { tick: Tick },
    /// Client and server computed different digests for the same operation.
    /// Reported exactly once, never retried; the session is lost right after.
    Desync {
        op_seq: OpSeq,
        reported: Digest,
        computed: Digest,
    },
}
