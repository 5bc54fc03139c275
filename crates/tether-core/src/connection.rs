//! Connection handles over slot records.
//!
//! A [`Connection`] is the user-facing side of a signal/slot link. Cloning a
//! connection shares one logical handle: an explicit [`Connection::disconnect`]
//! through any clone is seen by all of them, and repeating it is harmless.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::slot::SlotLink;
use crate::trackable::AsTrackable;

/// State shared by all clones of one connection handle.
struct ConnectionShared {
    slot: RefCell<Option<Rc<dyn SlotLink>>>,
    autodrop: Cell<bool>,
}

impl ConnectionShared {
    fn release(&self) {
        let slot = self.slot.borrow_mut().take();
        if let Some(slot) = slot {
            tracing::trace!(target: "tether_core::signal", "dropping connection");
            slot.untrack();
            slot.clear();
            slot.disconnect();
        }
    }
}

impl Drop for ConnectionShared {
    fn drop(&mut self) {
        if self.autodrop.get() {
            self.release();
        }
    }
}

/// A copyable handle to one signal/slot connection.
///
/// Returned by [`Signal::connect`](crate::Signal::connect) and friends. The
/// handle controls delivery (`block`/`unblock`), lifetime tracking
/// (`track`/`untrack`) and teardown (`disconnect`).
///
/// With `autodrop` set, destroying the last clone disconnects the slot. Without
/// it the slot outlives its handles and stays connected until disconnected
/// explicitly or until its tracked target is destroyed.
///
/// # Example
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use tether_core::Signal;
///
/// let clicked = Signal::<()>::new();
/// let count = Rc::new(Cell::new(0));
///
/// let count_clone = count.clone();
/// let conn = clicked.connect(move |_| count_clone.set(count_clone.get() + 1));
///
/// clicked.emit(());
/// conn.block();
/// clicked.emit(());
/// conn.unblock();
/// clicked.emit(());
/// conn.disconnect();
/// clicked.emit(());
///
/// assert_eq!(count.get(), 2);
/// assert!(conn.empty());
/// ```
#[derive(Clone, Default)]
pub struct Connection {
    shared: Option<Rc<ConnectionShared>>,
}

impl Connection {
    pub(crate) fn new(slot: Rc<dyn SlotLink>, autodrop: bool) -> Self {
        Self {
            shared: Some(Rc::new(ConnectionShared {
                slot: RefCell::new(Some(slot)),
                autodrop: Cell::new(autodrop),
            })),
        }
    }

    pub(crate) fn slot(&self) -> Option<Rc<dyn SlotLink>> {
        self.shared.as_ref()?.slot.borrow().clone()
    }

    /// Whether this handle no longer refers to a connected slot.
    pub fn empty(&self) -> bool {
        self.slot().is_none_or(|slot| !slot.is_connected())
    }

    /// Whether this handle refers to a connected slot.
    pub fn connected(&self) -> bool {
        !self.empty()
    }

    /// Untrack, clear and disconnect the slot, then release it.
    ///
    /// Safe to call any number of times, from any clone.
    pub fn disconnect(&self) {
        if let Some(shared) = &self.shared {
            shared.release();
        }
    }

    /// Suppress delivery to this slot without disconnecting it.
    ///
    /// Blocks nest: each `block` needs a matching `unblock`.
    pub fn block(&self) {
        if let Some(slot) = self.slot() {
            slot.block();
        }
    }

    /// Undo one `block`. Extra calls are ignored.
    pub fn unblock(&self) {
        if let Some(slot) = self.slot() {
            slot.unblock();
        }
    }

    /// Whether delivery to this slot is currently suppressed.
    pub fn blocked(&self) -> bool {
        self.slot().is_some_and(|slot| slot.is_blocked())
    }

    /// Whether destroying the last clone disconnects the slot.
    pub fn autodrop(&self) -> bool {
        self.shared.as_ref().is_some_and(|shared| shared.autodrop.get())
    }

    /// Set whether destroying the last clone disconnects the slot.
    pub fn set_autodrop(&self, autodrop: bool) {
        if let Some(shared) = &self.shared {
            shared.autodrop.set(autodrop);
        }
    }

    /// Tie the slot's lifetime to `target`.
    pub fn track<T: AsTrackable + ?Sized>(&self, target: &T) {
        target.trackable().track(self);
    }

    /// Stop tracking whichever target the slot tracks.
    pub fn untrack(&self) {
        if let Some(slot) = self.slot() {
            slot.untrack();
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("connected", &self.connected())
            .field("blocked", &self.blocked())
            .field("autodrop", &self.autodrop())
            .finish()
    }
}
