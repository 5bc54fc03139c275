//! Timer front-end.
//!
//! A [`Timer`] is a thin handle over an entry in its event loop's timer
//! queue: the queue decides when the timer fires, the handle only starts,
//! restarts and stops it. Dropping the handle removes the entry.
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use std::time::Duration;
//! use tether_core::{EventLoop, SleepBackend, Timer};
//!
//! let event_loop = EventLoop::new(SleepBackend).unwrap();
//! let ticks = Rc::new(Cell::new(0));
//!
//! let ticks_clone = ticks.clone();
//! let handle = event_loop.clone();
//! let _ticker = Timer::new(
//!     &event_loop,
//!     move || {
//!         ticks_clone.set(ticks_clone.get() + 1);
//!         if ticks_clone.get() == 3 {
//!             handle.quit();
//!         }
//!     },
//!     Duration::from_millis(2),
//!     true,
//! )
//! .unwrap();
//!
//! event_loop.run().unwrap();
//! assert_eq!(ticks.get(), 3);
//! ```

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::error::{Result, TimerError};
use crate::event_loop::{EventLoop, LoopCore};
use crate::signal::Signal;
use crate::timer_queue::TimerId;

/// A one-shot or periodic timer owned by an [`EventLoop`] queue.
///
/// The callback runs on the loop thread each time the timer fires. Extra
/// listeners can attach to [`signal`](Self::signal); a periodic timer keeps
/// re-queueing only while its signal has at least one connection.
pub struct Timer {
    event_loop: Weak<LoopCore>,
    id: TimerId,
    signal: Rc<Signal<()>>,
    period: Cell<Duration>,
    periodic: Cell<bool>,
}

impl Timer {
    /// Create a timer on `event_loop`.
    ///
    /// A non-zero `period` starts the timer right away; a zero period leaves
    /// it stopped until [`start`](Self::start) or [`restart`](Self::restart).
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::Dead`](crate::LoopError::Dead) if the loop has
    /// already finished.
    pub fn new<F>(event_loop: &EventLoop, callback: F, period: Duration, periodic: bool) -> Result<Self>
    where
        F: Fn() + 'static,
    {
        let signal = Rc::new(Signal::new());
        // The slot lives as long as the signal; no handle needed.
        let _ = signal.connect(move |_| callback());
        let id = event_loop.register_timer(signal.clone())?;

        let timer = Self {
            event_loop: event_loop.downgrade(),
            id,
            signal,
            period: Cell::new(period),
            periodic: Cell::new(periodic),
        };
        if !period.is_zero() {
            timer.restart(period, periodic)?;
        }
        Ok(timer)
    }

    /// Start the timer unless it is already running.
    ///
    /// # Errors
    ///
    /// Fails if the loop is dead or has been dropped.
    pub fn start(&self, period: Duration, periodic: bool) -> Result<()> {
        if self.running() {
            return Ok(());
        }
        self.restart(period, periodic)
    }

    /// (Re)queue the timer with a fresh deadline `period` from now.
    ///
    /// # Errors
    ///
    /// Fails if the loop is dead or has been dropped.
    pub fn restart(&self, period: Duration, periodic: bool) -> Result<()> {
        let event_loop = self.event_loop()?;
        self.period.set(period);
        self.periodic.set(periodic);
        tracing::trace!(
            target: "tether_core::timer",
            period_ms = period.as_millis() as u64,
            periodic,
            "timer started"
        );
        event_loop.schedule_timer(self.id, period, periodic)
    }

    /// Take the timer off the queue. No-op if it is not running.
    pub fn stop(&self) {
        if let Ok(event_loop) = self.event_loop() {
            event_loop.unschedule_timer(self.id);
        }
    }

    /// Whether the timer is in its loop's queue.
    ///
    /// Inside its own callback a one-shot timer is no longer running, so
    /// [`start`](Self::start) re-arms it. A periodic timer is already queued
    /// for its next period there; `stop` or `restart` from the callback
    /// replaces that deadline.
    pub fn running(&self) -> bool {
        self.event_loop()
            .is_ok_and(|event_loop| event_loop.is_timer_scheduled(self.id))
    }

    /// The period of the most recent start.
    pub fn period(&self) -> Duration {
        self.period.get()
    }

    /// Whether the most recent start was periodic.
    pub fn periodic(&self) -> bool {
        self.periodic.get()
    }

    /// The signal emitted when the timer fires.
    pub fn signal(&self) -> &Signal<()> {
        &self.signal
    }

    fn event_loop(&self) -> Result<EventLoop> {
        self.event_loop
            .upgrade()
            .map(EventLoop::from_core)
            .ok_or_else(|| TimerError::LoopGone.into())
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if let Ok(event_loop) = self.event_loop() {
            event_loop.remove_timer(self.id);
        }
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("period", &self.period.get())
            .field("periodic", &self.periodic.get())
            .field("running", &self.running())
            .finish()
    }
}
