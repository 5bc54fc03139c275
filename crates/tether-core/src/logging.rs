//! Logging and profiling facilities for Tether.
//!
//! Tether is instrumented with the `tracing` crate. The library never installs
//! a subscriber; to see logs, install one in your application:
//!
//! ```ignore
//! fn main() {
//!     tracing_subscriber::fmt()
//!         .with_env_filter("tether_core::event_loop=debug,tether_core::timer=trace")
//!         .init();
//!
//!     // Your application code...
//! }
//! ```
//!
//! Every event carries one of the targets in [`targets`], so subsystems can be
//! filtered independently.

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core framework target.
    pub const CORE: &str = "tether_core";
    /// Signal emission and connection teardown.
    pub const SIGNAL: &str = "tether_core::signal";
    /// Trackable target bookkeeping.
    pub const TRACKABLE: &str = "tether_core::trackable";
    /// Timer queue.
    pub const TIMER: &str = "tether_core::timer";
    /// Event loop scheduling and run levels.
    pub const EVENT_LOOP: &str = "tether_core::event_loop";
    /// Platform backends.
    pub const BACKEND: &str = "tether_core::backend";
    /// Performance spans.
    pub const PERF: &str = "tether_core::perf";
}

/// A guard for performance tracing spans.
///
/// The span is entered on creation and exited when the guard is dropped.
///
/// # Example
///
/// ```
/// use tether_core::logging::PerfSpan;
///
/// fn relayout() {
///     let _span = PerfSpan::new("relayout");
///     // ... expensive work ...
/// }
/// # relayout();
/// ```
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create a new performance span.
    ///
    /// The span will be active until the guard is dropped.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!(target: "tether_core::perf", "perf", operation = name);
        Self {
            span: span.entered(),
        }
    }
}

/// Emit a trace-level event on the core target.
#[macro_export]
macro_rules! tether_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "tether_core", $($arg)*)
    };
}

/// Emit a debug-level event on the core target.
#[macro_export]
macro_rules! tether_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "tether_core", $($arg)*)
    };
}

/// Emit an info-level event on the core target.
#[macro_export]
macro_rules! tether_info {
    ($($arg:tt)*) => {
        tracing::info!(target: "tether_core", $($arg)*)
    };
}

/// Emit a warn-level event on the core target.
#[macro_export]
macro_rules! tether_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "tether_core", $($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_share_core_prefix() {
        for target in [
            targets::SIGNAL,
            targets::TRACKABLE,
            targets::TIMER,
            targets::EVENT_LOOP,
            targets::BACKEND,
            targets::PERF,
        ] {
            assert!(target.starts_with(targets::CORE));
        }
    }

    #[test]
    fn test_perf_span() {
        let _span = PerfSpan::new("test_operation");
        tether_trace!("inside perf span");
    }
}
