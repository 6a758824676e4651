/// Authority-assigned position in the single total order of committed
/// operations. Monotonically increasing within a session, never reused.
pub type OpSeq = u32;

/// Client-assigned submission counter, used to match confirmations and
/// rejections back to pending actions
pub type ClientSeq = u32;

/// Scheduled time-step counter of a model
pub type Tick = u64;

/// Version of the packet framing itself, as opposed to the model schema
pub type ProtocolVersion = u16;
