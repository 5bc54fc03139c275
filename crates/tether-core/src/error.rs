//! Error types for Tether.
//!
//! Only misuse of the event loop lifecycle is reported as an error. Signal
//! emission and timer delivery never fail, and repeated teardown calls
//! (dropping a dropped connection, stopping a stopped timer) are no-ops.

use thiserror::Error;

/// The main error type for Tether operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TetherError {
    /// Event loop lifecycle error.
    #[error("event loop error: {0}")]
    Loop(#[from] LoopError),

    /// Timer-related error.
    #[error("timer error: {0}")]
    Timer(#[from] TimerError),
}

/// Errors raised by [`EventLoop`](crate::EventLoop) misuse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoopError {
    /// The outermost `run()` has returned; the loop accepts no further work.
    #[error("the event loop is dead; its outermost run() has already returned")]
    Dead,

    /// A live event loop is already registered for the current thread.
    #[error("an event loop is already registered for this thread")]
    AlreadyRegistered,
}

/// Timer-specific errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// The event loop that owned the timer has been dropped.
    #[error("the event loop owning this timer no longer exists")]
    LoopGone,
}

/// A specialized Result type for Tether operations.
pub type Result<T> = std::result::Result<T, TetherError>;
