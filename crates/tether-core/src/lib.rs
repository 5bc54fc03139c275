//! Core systems for Tether.
//!
//! This crate provides the observer and scheduling core that the rest of a
//! toolkit is built on:
//!
//! - **Signal/Slot System**: ordered multicast dispatch with copyable
//!   connection handles
//! - **Trackable Targets**: connections that disconnect themselves when the
//!   object they call into is destroyed
//! - **Event Loop**: a single-threaded cooperative scheduler with nested run
//!   levels and start/idle/heartbeat/quit hooks
//! - **Timers**: one-shot and periodic timers driven by the loop's queue
//! - **Backends**: the platform hook the loop blocks in
//!
//! Everything here is single-threaded: signals, connections, timers and loop
//! handles are `!Send`. Other threads talk to a loop through a
//! [`LoopProxy`].
//!
//! # Signal/Slot Example
//!
//! ```
//! use tether_core::Signal;
//!
//! // Create a signal that notifies when a value changes
//! let value_changed = Signal::<i32>::new();
//!
//! // Connect a slot to handle the signal
//! let conn = value_changed.connect(|value| {
//!     println!("Value changed to: {}", value);
//! });
//!
//! // Emit the signal
//! value_changed.emit(42);
//!
//! // Disconnect when done
//! conn.disconnect();
//! ```
//!
//! # Lifetime Tracking Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use tether_core::{Signal, Trackable};
//!
//! let resized = Signal::<(u32, u32)>::new();
//! let window = Trackable::new();
//! let calls = Rc::new(Cell::new(0));
//!
//! let calls_clone = calls.clone();
//! let conn = resized.connect_tracked(&window, move |_| calls_clone.set(calls_clone.get() + 1));
//!
//! resized.emit((640, 480));
//! drop(window);
//! resized.emit((800, 600));
//!
//! assert_eq!(calls.get(), 1);
//! assert!(conn.empty());
//! ```
//!
//! # Event Loop Example
//!
//! ```
//! use std::time::Duration;
//! use tether_core::{EventLoop, SleepBackend, Timer};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let event_loop = EventLoop::new(SleepBackend)?;
//!
//!     // Print something every few milliseconds
//!     let _tick = Timer::new(&event_loop, || println!("tick"), Duration::from_millis(3), true)?;
//!
//!     // Stop after a short while
//!     let handle = event_loop.clone();
//!     let _stop = Timer::new(&event_loop, move || handle.quit(), Duration::from_millis(10), false)?;
//!
//!     // Run the event loop (blocks until quit)
//!     Ok(event_loop.run()?)
//! }
//! ```

mod backend;
pub mod clock;
mod connection;
mod error;
mod event_loop;
pub mod logging;
pub mod signal;
mod slot;
mod timer;
mod timer_queue;
mod trackable;

pub use backend::{ChannelBackend, LoopBackend, LoopProxy, SleepBackend};
pub use connection::Connection;
pub use error::{LoopError, Result, TetherError, TimerError};
pub use event_loop::{
    DEFAULT_IDLE_PERIOD, EventLoop, EventLoopBuilder, HEARTBEAT_INTERVAL, LoopConfig,
};
pub use logging::PerfSpan;
pub use signal::{Signal, SignalEmitter};
pub use timer::Timer;
pub use trackable::{AsTrackable, Trackable};
