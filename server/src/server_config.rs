use std::time::Duration;

use tandem_shared::ProtocolVersion;

/// Tuning knobs for a server endpoint
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Version of the packet framing this build speaks
    pub protocol_version: ProtocolVersion,
    /// How long a client may stay silent before its session is dropped
    pub session_timeout: Duration,
    /// How often to send a heartbeat over an otherwise idle session
    pub heartbeat_interval: Duration,
    /// Whether to compute and report digests for committed operations.
    /// Clients treat an absent digest as nothing to verify.
    pub compute_checksums: bool,
    /// Whether clients may submit development-only actions
    pub allow_development_actions: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            protocol_version: 1,
            session_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(2),
            compute_checksums: true,
            allow_development_actions: false,
        }
    }
}
