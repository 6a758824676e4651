// The session lifecycle as a pure transition function. Keeping it free of
// I/O means the whole table is testable without a transport, and the client
// cannot reach an undefined state no matter what arrives in what order.

use tandem_shared::{loss_codes, LossCategory, SessionLossReason, SessionToken};

/// Where a connection currently stands. Only `SessionActive` permits action
/// submission; `SessionLost` and `TerminalError` end this session for good,
/// though the last-known model stays readable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No attempt made yet, or a cancelled one
    NotConnected,
    /// `connect()` accepted; the hello is about to go out
    Connecting,
    /// Hello sent, waiting for the server's grant or refusal
    HandshakeInProgress,
    /// A session exists; the token proves it
    SessionActive { token: SessionToken },
    /// An active session ended
    SessionLost { reason: SessionLossReason },
    /// A session never came to be
    TerminalError { reason: SessionLossReason },
}

impl ConnectionState {
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::SessionActive { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionState::SessionLost { .. } | ConnectionState::TerminalError { .. }
        )
    }

    pub fn token(&self) -> Option<SessionToken> {
        match self {
            ConnectionState::SessionActive { token } => Some(*token),
            _ => None,
        }
    }
}

/// Everything that can happen to a connection
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionInput {
    /// The caller asked for a first connection
    Connect,
    /// The caller asked for a fresh connection after a loss
    Reconnect,
    /// The hello went out onto the transport
    HelloSent,
    /// The server granted a session
    GrantReceived { token: SessionToken },
    /// The server turned the handshake away
    Refused { reason: SessionLossReason },
    /// The transport failed or a timeout expired
    ConnectionFailed { reason: SessionLossReason },
    /// The server ended the session on purpose
    ServerBye { reason: SessionLossReason },
    /// The caller asked for the connection to end
    Stop,
}

/// The externally visible consequence of one transition
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    None,
    SessionStarted { token: SessionToken },
    FailedToStartSession { reason: SessionLossReason },
    SessionLost { reason: SessionLossReason },
}

fn stopped_reason() -> SessionLossReason {
    SessionLossReason::new(
        LossCategory::ExplicitStop,
        loss_codes::STOPPED_BY_CALLER,
        "stopped by caller",
    )
}

/// Computes the successor state and lifecycle effect for one input.
///
/// Total over all state/input pairs: inputs that make no sense in the
/// current state (a grant while idle, a reconnect while active) leave the
/// state as it was, and the caller decides whether that deserves a log line.
pub fn transition(state: &ConnectionState, input: &SessionInput) -> (ConnectionState, Lifecycle) {
    use ConnectionState as S;
    use SessionInput as I;

    match (state, input) {
        // Idle
        (S::NotConnected, I::Connect | I::Reconnect) => (S::Connecting, Lifecycle::None),
        (S::NotConnected, _) => (S::NotConnected, Lifecycle::None),

        // Hello not yet on the wire
        (S::Connecting, I::HelloSent) => (S::HandshakeInProgress, Lifecycle::None),
        (S::Connecting, I::GrantReceived { token }) => (
            S::SessionActive { token: *token },
            Lifecycle::SessionStarted { token: *token },
        ),
        (
            S::Connecting,
            I::Refused { reason } | I::ConnectionFailed { reason } | I::ServerBye { reason },
        ) => (
            S::TerminalError {
                reason: reason.clone(),
            },
            Lifecycle::FailedToStartSession {
                reason: reason.clone(),
            },
        ),
        // Cancellation: no session, no event, no dangling token
        (S::Connecting, I::Stop) => (S::NotConnected, Lifecycle::None),
        (S::Connecting, I::Connect | I::Reconnect) => (state.clone(), Lifecycle::None),

        // Hello sent, verdict pending
        (S::HandshakeInProgress, I::GrantReceived { token }) => (
            S::SessionActive { token: *token },
            Lifecycle::SessionStarted { token: *token },
        ),
        (
            S::HandshakeInProgress,
            I::Refused { reason } | I::ConnectionFailed { reason } | I::ServerBye { reason },
        ) => (
            S::TerminalError {
                reason: reason.clone(),
            },
            Lifecycle::FailedToStartSession {
                reason: reason.clone(),
            },
        ),
        (S::HandshakeInProgress, I::Stop) => (S::NotConnected, Lifecycle::None),
        (S::HandshakeInProgress, I::Connect | I::Reconnect | I::HelloSent) => {
            (state.clone(), Lifecycle::None)
        }

        // Live session
        (
            S::SessionActive { .. },
            I::ConnectionFailed { reason } | I::ServerBye { reason },
        ) => (
            S::SessionLost {
                reason: reason.clone(),
            },
            Lifecycle::SessionLost {
                reason: reason.clone(),
            },
        ),
        (S::SessionActive { .. }, I::Stop) => {
            let reason = stopped_reason();
            (
                S::SessionLost {
                    reason: reason.clone(),
                },
                Lifecycle::SessionLost { reason },
            )
        }
        (
            S::SessionActive { .. },
            I::Connect | I::Reconnect | I::HelloSent | I::GrantReceived { .. } | I::Refused { .. },
        ) => (state.clone(), Lifecycle::None),

        // Terminal: only a fresh attempt or a reset leads anywhere
        (S::SessionLost { .. } | S::TerminalError { .. }, I::Connect | I::Reconnect) => {
            (S::Connecting, Lifecycle::None)
        }
        (S::SessionLost { .. } | S::TerminalError { .. }, I::Stop) => {
            (S::NotConnected, Lifecycle::None)
        }
        (S::SessionLost { .. } | S::TerminalError { .. }, _) => (state.clone(), Lifecycle::None),
    }
}

// Tests
