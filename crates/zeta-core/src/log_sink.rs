//! Host-visible logging sink.
//!
//! `spec.md` §9's design note asks that logging be left to the host via a
//! provided sink interface rather than the core writing to `stderr`
//! directly. `zeta-core` additionally emits `tracing` events internally at
//! each hook boundary (ambient structured logging, independent of whatever
//! the host's `LogSink` does with the same information) — the two channels
//! are complementary, not a replacement for one another.

/// Severity of one [`LogSink::event`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Routine, high-volume detail.
    Debug,
    /// Normal operational milestones.
    Info,
    /// A recoverable anomaly the host may want visibility into.
    Warn,
    /// A fatal condition the host must act on.
    Error,
}

/// A host-provided sink for orchestrator log events.
///
/// One method, so any host can wire this onto its own logging framework
/// (or onto `tracing` itself) without implementing a larger trait surface.
pub trait LogSink: Send + Sync {
    /// Called once per notable orchestrator event.
    fn event(&self, level: Level, message: &str, fields: &[(&str, &str)]);
}

/// A [`LogSink`] that discards everything. The default when a host does not
/// care about the summary channel (it still gets `tracing` events).
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn event(&self, _level: Level, _message: &str, _fields: &[(&str, &str)]) {}
}

/// A [`LogSink`] that forwards every event onto `tracing` at the matching
/// level, for hosts that want the host-visible summary channel and the
/// ambient structured log to end up in the same place.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn event(&self, level: Level, message: &str, fields: &[(&str, &str)]) {
        let rendered: Vec<String> = fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let joined = rendered.join(" ");
        match level {
            Level::Debug => tracing::debug!(%joined, "{message}"),
            Level::Info => tracing::info!(%joined, "{message}"),
            Level::Warn => tracing::warn!(%joined, "{message}"),
            Level::Error => tracing::error!(%joined, "{message}"),
        }
    }
}
