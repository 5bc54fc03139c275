//! The single-threaded cooperative event loop.
//!
//! An [`EventLoop`] owns a time-ordered timer queue and four lifecycle
//! signals, and drives a [`LoopBackend`] that supplies platform events. One
//! loop may be registered per thread; [`EventLoop::current`] finds it.
//!
//! # Run levels
//!
//! [`run`](EventLoop::run) raises the run level and iterates while the level
//! stays at or above the value it entered with. Calling `run` from inside a
//! callback nests a new level (a modal interaction); [`quit`](EventLoop::quit)
//! lowers the level by one and lets the innermost affected `run` unwind on its
//! next check. When the outermost `run` returns, the loop is dead: the quit
//! signal fires, pending timers are discarded and further runs fail.
//!
//! # Scheduling
//!
//! Each iteration waits in the backend until the earlier of the idle deadline
//! and the next timer deadline, fires every due timer in deadline order, then
//! emits the heartbeat and idle signals when they are due. While the
//! heartbeat signal has connections the wait never exceeds
//! [`HEARTBEAT_INTERVAL`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use tether_core::{EventLoop, SleepBackend, Timer};
//!
//! let event_loop = EventLoop::new(SleepBackend).unwrap();
//!
//! let handle = event_loop.clone();
//! let _quit = Timer::new(&event_loop, move || handle.quit(), Duration::from_millis(5), false)
//!     .unwrap();
//!
//! event_loop.run().unwrap();
//! assert!(!event_loop.alive());
//! assert!(event_loop.run().is_err());
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use crate::backend::{LoopBackend, SleepBackend};
use crate::clock;
use crate::error::{LoopError, Result};
use crate::signal::{Signal, SignalEmitter};
use crate::timer_queue::{TimerId, TimerQueue};

/// Longest backend wait while the heartbeat signal has connections.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(2);

/// Default interval between idle signal emissions.
pub const DEFAULT_IDLE_PERIOD: Duration = Duration::from_millis(1000);

/// Configuration for an [`EventLoop`].
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Name used in log output.
    pub name: String,
    /// Interval between idle signal emissions.
    ///
    /// A zero period emits idle on every iteration and never lets the
    /// backend wait.
    pub idle_period: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            name: "tether-loop".to_string(),
            idle_period: DEFAULT_IDLE_PERIOD,
        }
    }
}

impl LoopConfig {
    /// Create a config with a custom name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the idle period.
    pub fn with_idle_period(mut self, idle_period: Duration) -> Self {
        self.idle_period = idle_period;
        self
    }
}

/// Builder for creating an [`EventLoop`] with custom configuration.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tether_core::EventLoopBuilder;
///
/// let event_loop = EventLoopBuilder::new()
///     .name("ui")
///     .idle_period(Duration::from_millis(250))
///     .build()
///     .unwrap();
/// assert_eq!(event_loop.name(), "ui");
/// ```
pub struct EventLoopBuilder {
    config: LoopConfig,
    backend: Option<Rc<dyn LoopBackend>>,
}

impl EventLoopBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: LoopConfig::default(),
            backend: None,
        }
    }

    /// Set the loop name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the idle period.
    pub fn idle_period(mut self, idle_period: Duration) -> Self {
        self.config.idle_period = idle_period;
        self
    }

    /// Set the platform backend. Defaults to [`SleepBackend`].
    pub fn backend(mut self, backend: impl LoopBackend + 'static) -> Self {
        self.backend = Some(Rc::new(backend));
        self
    }

    /// Build the loop and register it for the current thread.
    pub fn build(self) -> Result<EventLoop> {
        let backend = self.backend.unwrap_or_else(|| Rc::new(SleepBackend));
        EventLoop::register(self.config, backend)
    }
}

impl Default for EventLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared by every handle to one loop.
pub(crate) struct LoopCore {
    config: LoopConfig,
    /// Creation time, for log offsets.
    origin: Instant,
    /// Reentrancy counter driven by `run` and `quit`.
    run_level: Cell<u32>,
    /// Number of `run` frames currently on the stack.
    depth: Cell<u32>,
    dead: Cell<bool>,
    idle_deadline: Cell<Instant>,
    timers: RefCell<TimerQueue>,
    /// Cloned out before each call so a nested `run` can iterate too.
    backend: RefCell<Rc<dyn LoopBackend>>,
    sig_start: Signal<()>,
    sig_idle: Signal<()>,
    sig_heartbeat: Signal<()>,
    sig_quit: Signal<()>,
}

thread_local! {
    /// The loop registered for this thread, if any.
    static CURRENT_LOOP: RefCell<Weak<LoopCore>> = const { RefCell::new(Weak::new()) };
}

/// A handle to a single-threaded cooperative event loop.
///
/// Handles are cheap to clone and all refer to the same loop. The loop lives
/// as long as any handle does; [`Timer`](crate::Timer)s only hold weak
/// references to it.
#[derive(Clone)]
pub struct EventLoop {
    core: Rc<LoopCore>,
}

impl EventLoop {
    /// Create a loop with the default config and register it for this thread.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::AlreadyRegistered`] if a live loop is already
    /// registered on this thread.
    pub fn new(backend: impl LoopBackend + 'static) -> Result<Self> {
        Self::with_config(LoopConfig::default(), backend)
    }

    /// Create a loop with a custom config and register it for this thread.
    pub fn with_config(config: LoopConfig, backend: impl LoopBackend + 'static) -> Result<Self> {
        Self::register(config, Rc::new(backend))
    }

    fn register(config: LoopConfig, backend: Rc<dyn LoopBackend>) -> Result<Self> {
        let occupied = CURRENT_LOOP.with(|current| {
            current
                .borrow()
                .upgrade()
                .is_some_and(|core| !core.dead.get())
        });
        if occupied {
            return Err(LoopError::AlreadyRegistered.into());
        }

        let core = Rc::new(LoopCore {
            idle_deadline: Cell::new(clock::future(config.idle_period)),
            config,
            origin: clock::now(),
            run_level: Cell::new(0),
            depth: Cell::new(0),
            dead: Cell::new(false),
            timers: RefCell::new(TimerQueue::new()),
            backend: RefCell::new(backend),
            sig_start: Signal::new(),
            sig_idle: Signal::new(),
            sig_heartbeat: Signal::new(),
            sig_quit: Signal::new(),
        });
        CURRENT_LOOP.with(|current| *current.borrow_mut() = Rc::downgrade(&core));

        tracing::debug!(
            target: "tether_core::event_loop",
            name = %core.config.name,
            idle_period_ms = core.config.idle_period.as_millis() as u64,
            "event loop created"
        );
        Ok(Self { core })
    }

    /// The loop registered for the current thread, if it is still around.
    pub fn current() -> Option<Self> {
        CURRENT_LOOP.with(|current| current.borrow().upgrade().map(|core| Self { core }))
    }

    pub(crate) fn from_core(core: Rc<LoopCore>) -> Self {
        Self { core }
    }

    pub(crate) fn downgrade(&self) -> Weak<LoopCore> {
        Rc::downgrade(&self.core)
    }

    /// The name from the loop's config.
    pub fn name(&self) -> &str {
        &self.core.config.name
    }

    /// The loop's configuration.
    pub fn config(&self) -> &LoopConfig {
        &self.core.config
    }

    /// Replace the platform backend. Takes effect on the next iteration.
    pub fn set_backend(&self, backend: impl LoopBackend + 'static) {
        *self.core.backend.borrow_mut() = Rc::new(backend);
    }

    /// Run the loop until the run level drops below the level entered with.
    ///
    /// The outermost call emits the start signal before iterating. When it
    /// returns, the loop is dead: the quit signal has fired and all pending
    /// timers are gone.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::Dead`] if the loop has already finished.
    #[tracing::instrument(skip(self), target = "tether_core::event_loop", level = "debug", fields(name = %self.core.config.name))]
    pub fn run(&self) -> Result<()> {
        if self.core.dead.get() {
            return Err(LoopError::Dead.into());
        }

        let outermost = self.core.depth.get() == 0;
        self.core.depth.set(self.core.depth.get() + 1);
        let level = self.core.run_level.get() + 1;
        self.core.run_level.set(level);

        if outermost {
            tracing::info!(target: "tether_core::event_loop", "starting event loop");
            self.core
                .idle_deadline
                .set(clock::future(self.core.config.idle_period));
            self.core.sig_start.emit(());
        } else {
            tracing::debug!(target: "tether_core::event_loop", level, "entering nested run level");
        }

        while self.core.run_level.get() >= level {
            self.dispatch_iteration();
        }

        self.core.depth.set(self.core.depth.get() - 1);
        if outermost {
            self.shutdown();
        } else {
            tracing::debug!(target: "tether_core::event_loop", level, "leaving nested run level");
        }
        Ok(())
    }

    /// Lower the run level by one.
    ///
    /// The affected `run` call returns after the current iteration. No-op when
    /// the loop is not running.
    pub fn quit(&self) {
        let level = self.core.run_level.get();
        if level > 0 {
            tracing::debug!(target: "tether_core::event_loop", level, "quit requested");
            self.core.run_level.set(level - 1);
        }
    }

    /// Whether the loop can still run.
    pub fn alive(&self) -> bool {
        !self.core.dead.get()
    }

    /// Whether a `run` call is active and has not been asked to quit.
    pub fn running(&self) -> bool {
        self.alive() && self.core.run_level.get() > 0
    }

    /// The current run level; zero when not running.
    pub fn run_level(&self) -> u32 {
        self.core.run_level.get()
    }

    /// Perform exactly one scheduling iteration without touching the run level.
    ///
    /// Returns what the backend reported: whether it handled an event.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::Dead`] if the loop has already finished.
    pub fn iterate_once(&self) -> Result<bool> {
        if self.core.dead.get() {
            return Err(LoopError::Dead.into());
        }
        Ok(self.dispatch_iteration())
    }

    fn dispatch_iteration(&self) -> bool {
        let now = clock::now();
        let mut wake_at = now.max(self.core.idle_deadline.get());
        if let Some(next) = self.core.timers.borrow_mut().next_deadline() {
            wake_at = wake_at.min(next);
        }

        let mut timeout = wake_at.saturating_duration_since(now);
        let heartbeat = !self.core.sig_heartbeat.is_empty() && timeout > HEARTBEAT_INTERVAL;
        if heartbeat {
            timeout = HEARTBEAT_INTERVAL;
        }

        tracing::trace!(
            target: "tether_core::event_loop",
            at_us = clock::micros_since(self.core.origin),
            timeout_us = timeout.as_micros() as u64,
            heartbeat,
            "waiting in backend"
        );
        let backend = self.core.backend.borrow().clone();
        let handled = backend.iterate(self, timeout);

        self.fire_due_timers();

        if heartbeat {
            self.core.sig_heartbeat.emit(());
        }

        let now = clock::now();
        if now >= self.core.idle_deadline.get() {
            self.core
                .idle_deadline
                .set(now + self.core.config.idle_period);
            self.core.sig_idle.emit(());
        }

        handled
    }

    fn fire_due_timers(&self) {
        let now = clock::now();
        let bound = self.core.timers.borrow().batch_bound();
        let mut fired = 0usize;

        // One at a time: a callback may restart timers or run a nested loop
        // that fires the rest of this batch itself.
        loop {
            let due = self.core.timers.borrow_mut().pop_due(now, bound);
            let Some(due) = due else {
                break;
            };
            due.signal.emit(());
            let retired = self.core.timers.borrow_mut().settle(&due);
            drop(retired);
            fired += 1;
        }

        if fired > 0 {
            tracing::trace!(target: "tether_core::timer", count = fired, "fired due timers");
        }
    }

    fn shutdown(&self) {
        self.core.dead.set(true);
        self.core.run_level.set(0);
        tracing::info!(
            target: "tether_core::event_loop",
            uptime_us = clock::micros_since(self.core.origin),
            "event loop finished"
        );
        self.core.sig_quit.emit(());

        let retired = self.core.timers.borrow_mut().clear();
        if !retired.is_empty() {
            tracing::debug!(
                target: "tether_core::event_loop",
                count = retired.len(),
                "discarded pending timers"
            );
        }
        drop(retired);

        let lifecycle: [(&str, &dyn SignalEmitter); 4] = [
            ("start", &self.core.sig_start),
            ("idle", &self.core.sig_idle),
            ("heartbeat", &self.core.sig_heartbeat),
            ("quit", &self.core.sig_quit),
        ];
        for (name, signal) in lifecycle {
            if !signal.is_empty() {
                tracing::trace!(
                    target: "tether_core::event_loop",
                    signal = name,
                    connections = signal.connection_count(),
                    "lifecycle signal still connected at shutdown"
                );
            }
        }

        CURRENT_LOOP.with(|current| {
            let mut current = current.borrow_mut();
            if std::ptr::eq(current.as_ptr(), Rc::as_ptr(&self.core)) {
                *current = Weak::new();
            }
        });
    }

    /// Emitted once when the outermost `run` begins.
    pub fn signal_start(&self) -> &Signal<()> {
        &self.core.sig_start
    }

    /// Emitted roughly once per idle period.
    pub fn signal_idle(&self) -> &Signal<()> {
        &self.core.sig_idle
    }

    /// Emitted at least every [`HEARTBEAT_INTERVAL`] while connected.
    pub fn signal_heartbeat(&self) -> &Signal<()> {
        &self.core.sig_heartbeat
    }

    /// Emitted once when the outermost `run` finishes.
    pub fn signal_quit(&self) -> &Signal<()> {
        &self.core.sig_quit
    }

    /// Register a signal that fires `timeout` from now.
    ///
    /// A periodic alarm keeps firing every `timeout` while its signal has
    /// connections. The loop drops the entry once the alarm stops firing.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::Dead`] if the loop has already finished.
    pub fn signal_alarm(&self, timeout: Duration, periodic: bool) -> Result<Rc<Signal<()>>> {
        if self.core.dead.get() {
            return Err(LoopError::Dead.into());
        }
        let signal = Rc::new(Signal::new());
        let mut timers = self.core.timers.borrow_mut();
        let id = timers.insert(signal.clone(), true);
        timers.schedule(id, timeout, periodic, clock::now());
        tracing::trace!(
            target: "tether_core::timer",
            timeout_ms = timeout.as_millis() as u64,
            periodic,
            "alarm registered"
        );
        Ok(signal)
    }

    /// Number of queued timers.
    pub fn pending_timers(&self) -> usize {
        self.core.timers.borrow().scheduled_count()
    }

    pub(crate) fn register_timer(&self, signal: Rc<Signal<()>>) -> Result<TimerId> {
        if self.core.dead.get() {
            return Err(LoopError::Dead.into());
        }
        Ok(self.core.timers.borrow_mut().insert(signal, false))
    }

    pub(crate) fn schedule_timer(&self, id: TimerId, delay: Duration, periodic: bool) -> Result<()> {
        if self.core.dead.get() {
            return Err(LoopError::Dead.into());
        }
        self.core
            .timers
            .borrow_mut()
            .schedule(id, delay, periodic, clock::now());
        Ok(())
    }

    pub(crate) fn unschedule_timer(&self, id: TimerId) {
        self.core.timers.borrow_mut().unschedule(id);
    }

    pub(crate) fn is_timer_scheduled(&self, id: TimerId) -> bool {
        self.core.timers.borrow().is_scheduled(id)
    }

    pub(crate) fn remove_timer(&self, id: TimerId) {
        let signal = self.core.timers.borrow_mut().remove(id);
        drop(signal);
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("name", &self.core.config.name)
            .field("run_level", &self.core.run_level.get())
            .field("alive", &self.alive())
            .field("pending_timers", &self.pending_timers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TetherError;

    fn counter() -> (Rc<Cell<u32>>, impl Fn(&()) + 'static) {
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        (count, move |_: &()| count_clone.set(count_clone.get() + 1))
    }

    fn instant_backend(_: &EventLoop, _: Duration) -> bool {
        false
    }

    #[test]
    fn test_config_defaults() {
        let config = LoopConfig::default();
        assert_eq!(config.name, "tether-loop");
        assert_eq!(config.idle_period, DEFAULT_IDLE_PERIOD);

        let config = LoopConfig::with_name("modal").with_idle_period(Duration::from_millis(5));
        assert_eq!(config.name, "modal");
        assert_eq!(config.idle_period, Duration::from_millis(5));
    }

    #[test]
    fn test_one_live_loop_per_thread() {
        let event_loop = EventLoop::new(instant_backend).unwrap();
        assert_eq!(
            EventLoop::new(instant_backend).unwrap_err(),
            TetherError::Loop(LoopError::AlreadyRegistered)
        );
        assert!(EventLoop::current().is_some());

        drop(event_loop);
        assert!(EventLoop::current().is_none());
        assert!(EventLoop::new(instant_backend).is_ok());
    }

    #[test]
    fn test_dead_loop_frees_registration() {
        let event_loop = EventLoop::new(instant_backend).unwrap();
        let handle = event_loop.clone();
        let _conn = event_loop.signal_start().connect(move |_| handle.quit());

        event_loop.run().unwrap();
        assert!(EventLoop::current().is_none());
        assert!(EventLoop::new(instant_backend).is_ok());
    }

    #[test]
    fn test_start_and_quit_signals_fire_once() {
        let event_loop = EventLoop::new(instant_backend).unwrap();
        let (starts, on_start) = counter();
        let (quits, on_quit) = counter();
        let _start = event_loop.signal_start().connect(on_start);
        let _quit = event_loop.signal_quit().connect(on_quit);

        let handle = event_loop.clone();
        let alarm = event_loop.signal_alarm(Duration::ZERO, false).unwrap();
        let _alarm = alarm.connect(move |_| {
            let inner = handle.clone();
            let stop = handle.signal_alarm(Duration::ZERO, false).unwrap();
            let _ = stop.connect(move |_| inner.quit());
            // Nested level: no second start signal.
            assert!(handle.run().is_ok());
            assert!(handle.alive());
            handle.quit();
        });

        event_loop.run().unwrap();
        assert_eq!(starts.get(), 1);
        assert_eq!(quits.get(), 1);
    }

    #[test]
    fn test_run_on_dead_loop_fails() {
        let event_loop = EventLoop::new(instant_backend).unwrap();
        event_loop.quit();
        assert_eq!(event_loop.run_level(), 0);

        let handle = event_loop.clone();
        let _conn = event_loop.signal_start().connect(move |_| handle.quit());
        event_loop.run().unwrap();

        assert!(!event_loop.alive());
        assert!(!event_loop.running());
        assert_eq!(event_loop.run().unwrap_err(), TetherError::Loop(LoopError::Dead));
        assert_eq!(
            event_loop.iterate_once().unwrap_err(),
            TetherError::Loop(LoopError::Dead)
        );
        assert!(event_loop.signal_alarm(Duration::ZERO, false).is_err());
    }

    #[test]
    fn test_shutdown_discards_timers() {
        let event_loop = EventLoop::new(instant_backend).unwrap();
        let (fired, on_fire) = counter();
        let alarm = event_loop.signal_alarm(Duration::from_secs(60), false).unwrap();
        let _conn = alarm.connect(on_fire);
        assert_eq!(event_loop.pending_timers(), 1);

        let handle = event_loop.clone();
        let _start = event_loop.signal_start().connect(move |_| handle.quit());
        event_loop.run().unwrap();

        assert_eq!(event_loop.pending_timers(), 0);
        assert_eq!(fired.get(), 0);
    }

    #[test]
    fn test_alarm_fires_and_retires() {
        let event_loop = EventLoop::new(instant_backend).unwrap();
        let (fired, on_fire) = counter();
        let alarm = event_loop.signal_alarm(Duration::ZERO, false).unwrap();
        let _conn = alarm.connect(on_fire);

        event_loop.iterate_once().unwrap();
        event_loop.iterate_once().unwrap();

        assert_eq!(fired.get(), 1);
        assert_eq!(event_loop.pending_timers(), 0);
    }

    #[test]
    fn test_periodic_alarm_stops_without_connections() {
        let event_loop = EventLoop::new(instant_backend).unwrap();
        let (fired, on_fire) = counter();
        let alarm = event_loop.signal_alarm(Duration::ZERO, true).unwrap();
        let conn = alarm.connect(on_fire);

        event_loop.iterate_once().unwrap();
        event_loop.iterate_once().unwrap();
        assert_eq!(fired.get(), 2);
        assert_eq!(event_loop.pending_timers(), 1);

        conn.disconnect();
        event_loop.iterate_once().unwrap();
        assert_eq!(event_loop.pending_timers(), 0);
    }

    #[test]
    fn test_backend_wait_is_bounded_by_next_timer() {
        let waits = Rc::new(RefCell::new(Vec::new()));
        let waits_clone = waits.clone();
        let event_loop = EventLoop::new(move |_: &EventLoop, timeout: Duration| {
            waits_clone.borrow_mut().push(timeout);
            false
        })
        .unwrap();

        let _alarm = event_loop.signal_alarm(Duration::from_millis(40), false).unwrap();
        event_loop.iterate_once().unwrap();

        let waits = waits.borrow();
        assert_eq!(waits.len(), 1);
        assert!(waits[0] <= Duration::from_millis(40));
    }

    #[test]
    fn test_heartbeat_clamps_wait() {
        let waits = Rc::new(RefCell::new(Vec::new()));
        let waits_clone = waits.clone();
        let event_loop = EventLoop::new(move |_: &EventLoop, timeout: Duration| {
            waits_clone.borrow_mut().push(timeout);
            false
        })
        .unwrap();

        event_loop.iterate_once().unwrap();
        let (beats, on_beat) = counter();
        let _conn = event_loop.signal_heartbeat().connect(on_beat);
        event_loop.iterate_once().unwrap();

        let waits = waits.borrow();
        assert!(waits[0] > HEARTBEAT_INTERVAL);
        assert_eq!(waits[1], HEARTBEAT_INTERVAL);
        assert_eq!(beats.get(), 1);
    }

    #[test]
    fn test_backend_may_schedule_timers() {
        let scheduled = Rc::new(Cell::new(false));
        let fired = Rc::new(Cell::new(0));
        let (scheduled_clone, fired_clone) = (scheduled.clone(), fired.clone());
        let event_loop = EventLoop::new(move |event_loop: &EventLoop, _: Duration| {
            if !scheduled_clone.replace(true) {
                let alarm = event_loop.signal_alarm(Duration::ZERO, false).unwrap();
                let fired = fired_clone.clone();
                let _ = alarm.connect(move |_| fired.set(fired.get() + 1));
            }
            true
        })
        .unwrap();

        assert!(event_loop.iterate_once().unwrap());
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_set_backend() {
        let event_loop = EventLoop::new(instant_backend).unwrap();
        assert!(!event_loop.iterate_once().unwrap());
        event_loop.set_backend(|_: &EventLoop, _: Duration| true);
        assert!(event_loop.iterate_once().unwrap());
    }
}
