use std::time::Duration;

use tandem_shared::ProtocolVersion;

/// Tuning knobs for a client endpoint
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Version of the packet framing this build speaks
    pub protocol_version: ProtocolVersion,
    /// How long a handshake may stay unanswered before it fails
    pub handshake_timeout: Duration,
    /// How long the server may stay silent before the session counts as lost
    pub session_timeout: Duration,
    /// How often to send a heartbeat over an otherwise idle session
    pub heartbeat_interval: Duration,
    /// How long a submitted action may stay unconfirmed and unrejected.
    /// Expiry is a session-health signal, not an action retry.
    pub confirm_timeout: Duration,
    /// Whether to compare server-reported digests against locally computed
    /// ones. Off means desyncs go undetected; the wire format is the same.
    pub verify_checksums: bool,
    /// Whether this build may submit development-only actions
    pub allow_development_actions: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            protocol_version: 1,
            handshake_timeout: Duration::from_secs(5),
            session_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(2),
            confirm_timeout: Duration::from_secs(5),
            verify_checksums: true,
            allow_development_actions: false,
        }
    }
}
