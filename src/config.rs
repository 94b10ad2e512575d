//! Plain Rust configuration values constructed by the caller and passed
//! into `Connection::connect`/`accept`, in the spirit of the teacher's
//! `AppState`/constants rather than a files-on-disk layer (SPEC_FULL.md
//! "Configuration" — deployment config loading is out of this crate's
//! scope, same as the teacher's `forwarder::config` TOML reader is a
//! separate concern from its session loop).

use std::time::Duration;

/// Tunables for one connection's handshake and stream multiplexer.
/// None of these are enforced as hard deadlines inside the core loop
/// (spec.md §5 "Not enforced by the core") — they're surfaced here so a
/// caller can apply them at the boundary (e.g. wrapping `connect` in
/// `tokio::time::timeout`).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Applied by the caller around the initial handshake; the core
    /// itself never times out a read.
    pub connect_timeout: Option<Duration>,
    /// Default per-call deadline, carried as a `deadline` header rather
    /// than enforced here (spec.md §5/§6).
    pub default_deadline: Option<Duration>,
    /// Initial buffer window advertised by `Start` when the caller
    /// doesn't pick one explicitly.
    pub default_buffer: u32,
    /// Protocol versions this side understands; `Service.proto` values
    /// outside this list are denied with `reason = "proto"`.
    pub accepted_protocols: Vec<String>,
    /// Whether the callee may also open streams toward the caller.
    /// Default `false`: client-initiated only (spec.md §4.7).
    pub bidirectional_streams: bool,
    /// Upper bound on how long a handler task is given to notice a
    /// `Cancel` before connection shutdown force-drops its mailbox
    /// sender (spec.md §9(c) — there is no core timer loop; this only
    /// bounds the shutdown path's own wait).
    pub cancel_grace: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            connect_timeout: Some(Duration::from_secs(10)),
            default_deadline: None,
            default_buffer: 16,
            accepted_protocols: vec!["0.1.0".to_string()],
            bidirectional_streams: false,
            cancel_grace: Some(Duration::from_secs(5)),
        }
    }
}

impl SessionConfig {
    pub fn accepts_protocol(&self, proto: &str) -> bool {
        self.accepted_protocols.iter().any(|p| p == proto)
    }
}
