use std::fmt;
use std::time::Instant;

use tandem_shared::{
    EntityId, OpSeq, PacketReceiver, PacketSender, SessionToken, Tick, Timer,
};

/// Server-side handle for one accepted transport connection, session or not
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ClientKey(pub u64);

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

/// One accepted transport connection. Before the hello arrives there is no
/// session; after a grant there is exactly one.
pub(crate) struct Remote<M> {
    pub sender: Box<dyn PacketSender>,
    pub receiver: Box<dyn PacketReceiver>,
    pub last_heard: Instant,
    pub heartbeat: Timer,
    pub session: Option<Session<M>>,
}

/// One granted session: the authoritative model and the counters that give
/// its committed operations their single total order
pub(crate) struct Session<M> {
    pub entity: EntityId,
    pub token: SessionToken,
    pub model: M,
    pub next_op_seq: OpSeq,
    pub tick: Tick,
}
