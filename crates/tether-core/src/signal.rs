//! Signal/slot system for Tether.
//!
//! A [`Signal<Args>`] is an ordered multicast event source. Connecting a
//! callable yields a [`Connection`] handle; emitting calls every connected,
//! unblocked slot in connection order.
//!
//! # Key Types
//!
//! - [`Signal<Args>`] - The signal type for emitting notifications
//! - [`Connection`] - Handle used to block, track or disconnect a slot
//! - [`Trackable`](crate::Trackable) - Base capability for receivers whose
//!   destruction must disconnect their slots
//! - [`SignalEmitter`] - Type-erased view over signals of any argument type
//!
//! # Emission
//!
//! Signals are single-threaded (`!Send`); all reentrancy is call-stack
//! reentrancy. One `emit` visits the slots linked when it started, in
//! connection order:
//!
//! - a slot disconnected before its turn (by itself or by another slot) is
//!   skipped, and every other slot still fires exactly once;
//! - a slot connected during the emission first fires on the next `emit`;
//! - a slot may emit the same signal again; depth limits are the caller's
//!   concern.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use tether_core::Signal;
//!
//! // Create a signal that passes a string argument
//! let text_changed = Signal::<String>::new();
//! let seen = Rc::new(RefCell::new(Vec::new()));
//!
//! // Connect a slot (closure)
//! let seen_clone = seen.clone();
//! let conn = text_changed.connect(move |text| seen_clone.borrow_mut().push(text.clone()));
//!
//! // Emit the signal
//! text_changed.emit("Hello, World!".to_string());
//!
//! // Disconnect when done
//! conn.disconnect();
//! text_changed.emit("ignored".to_string());
//!
//! assert_eq!(*seen.borrow(), vec!["Hello, World!".to_string()]);
//! ```

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::connection::Connection;
use crate::slot::SlotRecord;
use crate::trackable::AsTrackable;

/// The shared state of a signal: its ordered slot collection.
pub(crate) struct SignalCore<Args: 'static> {
    slots: RefCell<Vec<Rc<SlotRecord<Args>>>>,
}

impl<Args: 'static> SignalCore<Args> {
    /// Remove `slot` from the collection, looked up by identity.
    ///
    /// Called by the slot's own `disconnect`.
    pub(crate) fn erase(&self, slot: &SlotRecord<Args>) {
        let removed = {
            let mut slots = self.slots.borrow_mut();
            slots
                .iter()
                .position(|s| std::ptr::eq(Rc::as_ptr(s), slot))
                .map(|index| slots.remove(index))
        };
        // Released outside the borrow: dropping the record may run arbitrary
        // captured destructors that touch this signal again.
        drop(removed);
    }
}

/// A type-safe, ordered multicast signal.
///
/// When a signal is emitted, all connected slots are invoked with a shared
/// reference to the provided arguments.
///
/// # Type Parameter
///
/// - `Args`: The argument type passed to connected slots. Use `()` for signals
///   with no arguments, or a tuple like `(String, i32)` for multiple arguments.
///
/// # Related Types
///
/// - [`Connection`] - Returned by [`connect`](Self::connect)
/// - [`Trackable`](crate::Trackable) - Ties a slot to the lifetime of a receiver
/// - [`Timer`](crate::Timer) - Owns a `Signal<()>` fired on expiry
pub struct Signal<Args: 'static> {
    core: Rc<SignalCore<Args>>,
}

impl<Args: 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: 'static> Signal<Args> {
    /// Create a new signal with no connections.
    pub fn new() -> Self {
        Self {
            core: Rc::new(SignalCore {
                slots: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Connect a slot (closure) to this signal.
    ///
    /// The returned handle does not disconnect on drop; the slot stays
    /// connected until [`Connection::disconnect`] is called, a tracked target
    /// is destroyed, or the signal itself is dropped.
    ///
    /// # Example
    ///
    /// ```
    /// use tether_core::Signal;
    ///
    /// let signal = Signal::<String>::new();
    /// let _conn = signal.connect(|s| println!("Got: {}", s));
    /// signal.emit("Hello".to_string());
    /// ```
    pub fn connect<F>(&self, slot: F) -> Connection
    where
        F: Fn(&Args) + 'static,
    {
        let record = SlotRecord::new(Rc::new(slot));
        record.link(Some(&self.core));
        self.core.slots.borrow_mut().push(record.clone());
        tracing::trace!(
            target: "tether_core::signal",
            connection_count = self.connection_count(),
            "slot connected"
        );
        Connection::new(record, false)
    }

    /// Connect a slot that is disconnected when the last handle clone drops.
    ///
    /// # Example
    ///
    /// ```
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    /// use tether_core::Signal;
    ///
    /// let signal = Signal::<i32>::new();
    /// let counter = Rc::new(Cell::new(0));
    /// {
    ///     let counter_clone = counter.clone();
    ///     let _guard = signal.connect_scoped(move |&n| counter_clone.set(counter_clone.get() + n));
    ///     signal.emit(42); // counter = 42
    /// }
    /// signal.emit(43); // Nothing happens - connection was dropped
    /// assert_eq!(counter.get(), 42);
    /// ```
    pub fn connect_scoped<F>(&self, slot: F) -> Connection
    where
        F: Fn(&Args) + 'static,
    {
        let conn = self.connect(slot);
        conn.set_autodrop(true);
        conn
    }

    /// Connect a slot whose lifetime follows `target`.
    ///
    /// When `target`'s [`Trackable`](crate::Trackable) is dropped the slot is
    /// disconnected, even if handles to it are still held.
    pub fn connect_tracked<T, F>(&self, target: &T, slot: F) -> Connection
    where
        T: AsTrackable + ?Sized,
        F: Fn(&Args) + 'static,
    {
        let conn = self.connect(slot);
        conn.track(target);
        conn
    }

    /// Connect a method of a reference-counted receiver.
    ///
    /// The slot holds only a weak reference to `receiver` and tracks its
    /// embedded [`Trackable`](crate::Trackable), so dropping the receiver
    /// disconnects the slot.
    pub fn connect_receiver<T, M>(&self, receiver: &Rc<T>, method: M) -> Connection
    where
        T: AsTrackable + 'static,
        M: Fn(&T, &Args) + 'static,
    {
        let weak = Rc::downgrade(receiver);
        let conn = self.connect(move |args| {
            if let Some(receiver) = weak.upgrade() {
                method(&receiver, args);
            }
        });
        conn.track(&**receiver);
        conn
    }

    /// Disconnect all slots from this signal.
    ///
    /// Outstanding handles become empty.
    pub fn disconnect_all(&self) {
        let slots = std::mem::take(&mut *self.core.slots.borrow_mut());
        for slot in &slots {
            slot.link(None);
        }
        tracing::debug!(target: "tether_core::signal", count = slots.len(), "disconnected all slots");
    }

    /// Get the number of connected slots.
    pub fn connection_count(&self) -> usize {
        self.core.slots.borrow().len()
    }

    /// Whether no slot is connected.
    pub fn is_empty(&self) -> bool {
        self.core.slots.borrow().is_empty()
    }

    /// Emit the signal, invoking all connected slots in connection order.
    ///
    /// Blocked slots are skipped. Emitting a signal without connections is a
    /// no-op. Emission never fails.
    #[tracing::instrument(skip_all, target = "tether_core::signal", level = "trace")]
    pub fn emit(&self, args: Args) {
        let core = self.core.clone();
        let snapshot: Vec<Rc<SlotRecord<Args>>> = core.slots.borrow().clone();
        if snapshot.is_empty() {
            return;
        }
        tracing::trace!(target: "tether_core::signal", connection_count = snapshot.len(), "emitting signal");

        for slot in snapshot {
            // Skip slots disconnected since the emission started.
            if slot.is_linked_to(&core) {
                slot.invoke(&args);
            }
        }
    }
}

impl<Args: 'static> Drop for Signal<Args> {
    fn drop(&mut self) {
        let slots = std::mem::take(&mut *self.core.slots.borrow_mut());
        for slot in &slots {
            slot.link(None);
        }
    }
}

impl<Args: 'static> fmt::Debug for Signal<Args> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("connection_count", &self.connection_count())
            .finish()
    }
}

// Signals and their handles are bound to the thread that created them.
static_assertions::assert_not_impl_any!(Signal<()>: Send, Sync);
static_assertions::assert_not_impl_any!(Connection: Send, Sync);

/// Type-erased signal trait for inspecting signals of any argument type.
pub trait SignalEmitter {
    /// Disconnect all connections.
    fn disconnect_all(&self);

    /// Get the number of connections.
    fn connection_count(&self) -> usize;

    /// Whether no slot is connected.
    fn is_empty(&self) -> bool {
        self.connection_count() == 0
    }

    /// Get this as Any for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl<Args: 'static> SignalEmitter for Signal<Args> {
    fn disconnect_all(&self) {
        Signal::disconnect_all(self);
    }

    fn connection_count(&self) -> usize {
        Signal::connection_count(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn recorder<T: Clone + 'static>() -> (Rc<RefCell<Vec<T>>>, impl Fn(&T) + 'static) {
        let received = Rc::new(RefCell::new(Vec::new()));
        let received_clone = received.clone();
        (received, move |value: &T| received_clone.borrow_mut().push(value.clone()))
    }

    #[test]
    fn test_signal_connect_emit() {
        let signal = Signal::<i32>::new();
        let (received, slot) = recorder();
        let _conn = signal.connect(slot);

        signal.emit(42);
        signal.emit(100);

        assert_eq!(*received.borrow(), vec![42, 100]);
    }

    #[test]
    fn test_emit_empty_signal_is_noop() {
        let signal = Signal::<i32>::new();
        signal.emit(1);
        assert!(signal.is_empty());
    }

    #[test]
    fn test_emission_order_skips_blocked() {
        let signal = Signal::<()>::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let conns: Vec<Connection> = (1..=3)
            .map(|n| {
                let order = order.clone();
                signal.connect(move |_| order.borrow_mut().push(n))
            })
            .collect();

        signal.emit(());
        conns[1].block();
        signal.emit(());
        conns[1].unblock();
        conns[0].block();
        signal.emit(());

        assert_eq!(*order.borrow(), vec![1, 2, 3, 1, 3, 2, 3]);
    }

    #[test]
    fn test_self_disconnect_during_emit() {
        let signal = Signal::<()>::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let own: Rc<RefCell<Connection>> = Rc::default();

        let order_a = order.clone();
        let own_clone = own.clone();
        *own.borrow_mut() = signal.connect(move |_| {
            order_a.borrow_mut().push("a");
            own_clone.borrow().disconnect();
        });
        let order_b = order.clone();
        let _b = signal.connect(move |_| order_b.borrow_mut().push("b"));

        signal.emit(());
        signal.emit(());

        assert_eq!(*order.borrow(), vec!["a", "b", "b"]);
        assert!(own.borrow().empty());
    }

    #[test]
    fn test_disconnect_later_slot_during_emit() {
        let signal = Signal::<()>::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let victim: Rc<RefCell<Connection>> = Rc::default();

        let order_a = order.clone();
        let victim_clone = victim.clone();
        let _a = signal.connect(move |_| {
            order_a.borrow_mut().push("a");
            victim_clone.borrow().disconnect();
        });
        let order_b = order.clone();
        *victim.borrow_mut() = signal.connect(move |_| order_b.borrow_mut().push("b"));
        let order_c = order.clone();
        let _c = signal.connect(move |_| order_c.borrow_mut().push("c"));

        signal.emit(());

        assert_eq!(*order.borrow(), vec!["a", "c"]);
    }

    #[test]
    fn test_connect_during_emit_fires_next_time() {
        let signal = Rc::new(Signal::<()>::new());
        let hits = Rc::new(Cell::new(0));
        let added = Rc::new(Cell::new(false));

        let weak_signal = Rc::downgrade(&signal);
        let hits_clone = hits.clone();
        let _conn = signal.connect(move |_| {
            if !added.replace(true)
                && let Some(signal) = weak_signal.upgrade()
            {
                let hits = hits_clone.clone();
                let _late = signal.connect(move |_| hits.set(hits.get() + 1));
            }
        });

        signal.emit(());
        assert_eq!(hits.get(), 0);
        signal.emit(());
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_reentrant_emit() {
        let signal = Rc::new(Signal::<u32>::new());
        let (received, record) = recorder();

        let weak_signal = Rc::downgrade(&signal);
        let _conn = signal.connect(move |&depth| {
            record(&depth);
            if depth < 3
                && let Some(signal) = weak_signal.upgrade()
            {
                signal.emit(depth + 1);
            }
        });

        signal.emit(0);
        assert_eq!(*received.borrow(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_disconnect_all() {
        let signal = Signal::<()>::new();
        let conns: Vec<Connection> = (0..5).map(|_| signal.connect(|_| {})).collect();

        assert_eq!(signal.connection_count(), 5);
        signal.disconnect_all();
        assert_eq!(signal.connection_count(), 0);
        assert!(conns.iter().all(Connection::empty));
    }

    #[test]
    fn test_signal_drop_empties_handles() {
        let signal = Signal::<i32>::new();
        let conn = signal.connect(|_| {});

        drop(signal);
        assert!(conn.empty());
        conn.disconnect();
    }

    #[test]
    fn test_signal_with_multiple_args() {
        let signal = Signal::<(String, i32)>::new();
        let (received, slot) = recorder();
        let _conn = signal.connect(slot);

        signal.emit(("hello".to_string(), 42));

        assert_eq!(*received.borrow(), vec![("hello".to_string(), 42)]);
    }

    #[test]
    fn test_signal_emitter_trait_object() {
        let numbers = Signal::<i32>::new();
        let names = Signal::<String>::new();
        let _a = numbers.connect(|_| {});
        let _b = numbers.connect(|_| {});
        let _c = names.connect(|_| {});

        let emitters: [&dyn SignalEmitter; 2] = [&numbers, &names];
        let total: usize = emitters.iter().map(|e| e.connection_count()).sum();
        assert_eq!(total, 3);
        assert!(emitters[0].as_any().downcast_ref::<Signal<i32>>().is_some());

        emitters[1].disconnect_all();
        assert!(names.is_empty());
    }
}
