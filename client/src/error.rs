use thiserror::Error;

use tandem_shared::{RejectReason, TransportError};

/// Why `connect` did not begin a connection attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// Only one attempt may be in flight per client instance
    #[error("A connection attempt is already in flight")]
    AlreadyConnecting,

    #[error("A session is already active; disconnect first")]
    AlreadyActive,
}

/// Why `submit` did not put an action in flight
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("No active session to submit to")]
    NoSession,

    /// The policy boundary: clients never submit server-only actions
    #[error("This action may only originate on the server")]
    ServerOnly,

    #[error("Development actions are disabled in this build")]
    DevelopmentDisabled,

    /// Local dry-run validation already knows the authority would say no
    #[error("The action would be rejected: {reason:?}")]
    WouldReject { reason: RejectReason },

    #[error("Transport send failed")]
    SendFailed(#[from] TransportError),
}
