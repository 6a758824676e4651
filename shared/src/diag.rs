// Optional hook for low-level network diagnostics. When a session dies for
// a network-shaped reason, whatever the probe gathered rides along in the
// loss reason so logs can tell "their server is down" from "this phone is
// in a tunnel".

/// A collaborator that can describe the state of the local network path.
/// Implementations live outside the core (raw sockets, kernel interfaces).
pub trait NetworkProbe: Send {
    /// A short diagnostic line, or `None` if the probe has nothing to say
    fn diagnose(&mut self) -> Option<String>;

    /// Whether the local machine appears to have no route out at all.
    /// Drives the `NoInternet` loss category; default is to claim nothing.
    fn internet_reachable(&mut self) -> bool {
        true
    }
}
