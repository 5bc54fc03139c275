//! Platform backends for the event loop.
//!
//! A backend is the only place the loop blocks. Each scheduling iteration
//! calls [`LoopBackend::iterate`] with the longest wait the scheduler can
//! afford; the backend returns once a platform event was handled or the wait
//! elapsed. Backends may start or stop timers while handling events; the loop
//! re-reads its queue after every call.
//!
//! Two backends ship with the crate:
//!
//! - [`SleepBackend`] sleeps for the whole wait. Useful for headless programs
//!   driven purely by timers.
//! - [`ChannelBackend`] waits on a `crossbeam-channel` queue and runs closures
//!   posted from other threads through a [`LoopProxy`].

use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};

use crate::event_loop::EventLoop;

/// The platform collaborator driven by an [`EventLoop`].
///
/// Any `Fn(&EventLoop, Duration) -> bool` closure is a backend too.
pub trait LoopBackend {
    /// Block for at most `timeout` waiting for a platform event.
    ///
    /// Returns `true` if an event was handled, `false` if the wait elapsed.
    fn iterate(&self, event_loop: &EventLoop, timeout: Duration) -> bool;
}

impl<F> LoopBackend for F
where
    F: Fn(&EventLoop, Duration) -> bool,
{
    fn iterate(&self, event_loop: &EventLoop, timeout: Duration) -> bool {
        self(event_loop, timeout)
    }
}

/// A backend with no event source: it sleeps for the full timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct SleepBackend;

impl LoopBackend for SleepBackend {
    fn iterate(&self, _event_loop: &EventLoop, timeout: Duration) -> bool {
        if !timeout.is_zero() {
            thread::sleep(timeout);
        }
        false
    }
}

/// A closure posted to the loop thread.
type Job = Box<dyn FnOnce() + Send>;

/// Messages carried by a [`ChannelBackend`] queue.
enum Message {
    /// Run a closure on the loop thread.
    Run(Job),
    /// Interrupt the current wait without doing any work.
    Wake,
}

/// A backend fed by a multi-producer channel.
///
/// Other threads reach the loop through [`LoopProxy`] handles obtained from
/// [`proxy`](Self::proxy). Posted closures run on the loop thread, inside
/// `iterate`, in the order they were posted.
///
/// # Example
///
/// ```
/// use std::thread;
/// use tether_core::{ChannelBackend, EventLoop};
///
/// let backend = ChannelBackend::new();
/// let proxy = backend.proxy();
/// let event_loop = EventLoop::new(backend).unwrap();
///
/// let worker = thread::spawn(move || {
///     proxy.post(|| {
///         if let Some(event_loop) = EventLoop::current() {
///             event_loop.quit();
///         }
///     });
/// });
///
/// event_loop.run().unwrap();
/// worker.join().unwrap();
/// assert!(!event_loop.alive());
/// ```
pub struct ChannelBackend {
    sender: Sender<Message>,
    receiver: Receiver<Message>,
}

impl ChannelBackend {
    /// Create a backend with an unbounded queue.
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// A handle other threads use to reach this backend.
    pub fn proxy(&self) -> LoopProxy {
        LoopProxy {
            sender: self.sender.clone(),
        }
    }

    /// Number of messages waiting to be handled.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    fn handle(message: Message) -> bool {
        match message {
            Message::Run(job) => {
                job();
                true
            }
            Message::Wake => false,
        }
    }
}

impl Default for ChannelBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopBackend for ChannelBackend {
    fn iterate(&self, _event_loop: &EventLoop, timeout: Duration) -> bool {
        let first = if timeout.is_zero() {
            self.receiver.try_recv().map_err(|err| match err {
                TryRecvError::Empty => RecvTimeoutError::Timeout,
                TryRecvError::Disconnected => RecvTimeoutError::Disconnected,
            })
        } else {
            self.receiver.recv_timeout(timeout)
        };

        let Ok(first) = first else {
            return false;
        };

        let mut handled = Self::handle(first);
        let mut drained = 0usize;
        // Work posted while draining waits for the next iteration.
        let backlog = self.receiver.len();
        while drained < backlog {
            match self.receiver.try_recv() {
                Ok(message) => handled |= Self::handle(message),
                Err(_) => break,
            }
            drained += 1;
        }

        tracing::trace!(
            target: "tether_core::backend",
            handled,
            drained = drained + 1,
            "channel backend iteration"
        );
        handled
    }
}

/// A thread-safe handle for waking an event loop driven by a [`ChannelBackend`].
///
/// Cheap to clone. Posting after the backend has been dropped fails softly and
/// returns `false`.
#[derive(Clone)]
pub struct LoopProxy {
    sender: Sender<Message>,
}

impl LoopProxy {
    /// Run `job` on the loop thread during its next iteration.
    pub fn post<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.send(Message::Run(Box::new(job)))
    }

    /// Interrupt the loop's current wait.
    pub fn wake(&self) -> bool {
        self.send(Message::Wake)
    }

    fn send(&self, message: Message) -> bool {
        match self.sender.send(message) {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(target: "tether_core::backend", "event loop backend is gone");
                false
            }
        }
    }
}

impl std::fmt::Debug for LoopProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopProxy").finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(LoopProxy: Send, Sync, Clone);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::LoopConfig;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn loop_with(backend: impl LoopBackend + 'static) -> EventLoop {
        EventLoop::with_config(LoopConfig::with_name("backend-test"), backend).unwrap()
    }

    #[test]
    fn test_sleep_backend_waits() {
        let event_loop = loop_with(|_: &EventLoop, _: Duration| false);
        let start = Instant::now();
        assert!(!SleepBackend.iterate(&event_loop, Duration::from_millis(5)));
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_closure_backend() {
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        let event_loop = loop_with(move |_: &EventLoop, _: Duration| {
            calls_clone.set(calls_clone.get() + 1);
            true
        });

        assert!(event_loop.iterate_once().unwrap());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_channel_backend_runs_posted_jobs() {
        let backend = ChannelBackend::new();
        let proxy = backend.proxy();
        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let ran = ran.clone();
            assert!(proxy.post(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(backend.pending(), 3);

        let event_loop = loop_with(|_: &EventLoop, _: Duration| false);
        assert!(backend.iterate(&event_loop, Duration::from_millis(10)));
        assert_eq!(ran.load(Ordering::SeqCst), 3);
        assert_eq!(backend.pending(), 0);
    }

    #[test]
    fn test_channel_backend_wake_is_not_an_event() {
        let backend = ChannelBackend::new();
        let proxy = backend.proxy();
        let event_loop = loop_with(|_: &EventLoop, _: Duration| false);

        assert!(proxy.wake());
        let start = Instant::now();
        assert!(!backend.iterate(&event_loop, Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_channel_backend_times_out() {
        let backend = ChannelBackend::new();
        let event_loop = loop_with(|_: &EventLoop, _: Duration| false);
        assert!(!backend.iterate(&event_loop, Duration::ZERO));
        assert!(!backend.iterate(&event_loop, Duration::from_millis(2)));
    }

    #[test]
    fn test_post_from_other_thread() {
        let backend = ChannelBackend::new();
        let proxy = backend.proxy();
        let ran = Arc::new(AtomicUsize::new(0));

        let ran_clone = ran.clone();
        std::thread::spawn(move || {
            proxy.post(move || {
                ran_clone.fetch_add(1, Ordering::SeqCst);
            })
        })
        .join()
        .unwrap();

        let event_loop = loop_with(|_: &EventLoop, _: Duration| false);
        assert!(backend.iterate(&event_loop, Duration::from_secs(1)));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_post_after_backend_dropped() {
        let backend = ChannelBackend::new();
        let proxy = backend.proxy();
        drop(backend);
        // The proxy keeps a sender alive, but nobody receives any more.
        assert!(!proxy.post(|| {}));
        assert!(!proxy.wake());
    }
}
