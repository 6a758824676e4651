use thiserror::Error;

use tandem_shared::{EntityId, RejectReason};

/// Why a server-originated action was not committed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    #[error("No active session for entity {entity}")]
    NoSession { entity: EntityId },

    /// The action failed its own validation against the current model
    #[error("The action was rejected: {reason:?}")]
    Rejected { reason: RejectReason },
}
