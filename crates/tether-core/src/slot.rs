//! Slot records: the shared endpoint joining one callable to one signal.
//!
//! A slot record is owned jointly by its signal's ordered collection and by
//! every [`Connection`](crate::Connection) handle referencing it. It holds a
//! weak back-reference to the signal that owns it and, optionally, a weak
//! reference to the [`Trackable`](crate::Trackable) its callable depends on.
//! Trackable targets hold the matching back-reference in their registry, so
//! the slot/target relation is kept consistent from both sides.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::signal::SignalCore;
use crate::trackable::TrackerCore;

/// The callable bound into a slot.
pub(crate) type SlotFn<Args> = Rc<dyn Fn(&Args)>;

/// Type-erased operations on a slot record.
///
/// Connection handles and trackable targets work with slots of any argument
/// type through this trait.
pub(crate) trait SlotLink {
    /// Unlink from the owning signal and ask it to erase this slot. Idempotent.
    fn disconnect(&self);
    /// Whether the slot is still linked to a live signal.
    fn is_connected(&self) -> bool;
    /// Increase the block counter.
    fn block(&self);
    /// Decrease the block counter, saturating at zero.
    fn unblock(&self);
    /// Whether delivery is currently suppressed.
    fn is_blocked(&self) -> bool;
    /// Release the bound callable.
    fn clear(&self);
    /// Start tracking `target`, leaving any previous target first.
    fn track(&self, target: &Rc<TrackerCore>);
    /// Stop tracking the current target, removing the back-reference too.
    fn untrack(&self);
    /// Forget the target reference without touching the target's registry.
    ///
    /// Only the target itself calls this, while it is being destroyed.
    fn detach_target(&self);
    /// Whether this slot currently tracks `target`.
    fn tracks(&self, target: &Rc<TrackerCore>) -> bool;
}

/// The connection endpoint between one signal and one callable.
pub(crate) struct SlotRecord<Args: 'static> {
    this: Weak<SlotRecord<Args>>,
    callback: RefCell<Option<SlotFn<Args>>>,
    target: RefCell<Option<Weak<TrackerCore>>>,
    signal: RefCell<Option<Weak<SignalCore<Args>>>>,
    blocked: Cell<u32>,
}

impl<Args: 'static> SlotRecord<Args> {
    pub(crate) fn new(callback: SlotFn<Args>) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            callback: RefCell::new(Some(callback)),
            target: RefCell::new(None),
            signal: RefCell::new(None),
            blocked: Cell::new(0),
        })
    }

    /// Set or clear the owning signal. Has no effect on the tracked target.
    pub(crate) fn link(&self, signal: Option<&Rc<SignalCore<Args>>>) {
        *self.signal.borrow_mut() = signal.map(Rc::downgrade);
    }

    /// Whether this slot is linked to exactly `signal`.
    pub(crate) fn is_linked_to(&self, signal: &Rc<SignalCore<Args>>) -> bool {
        self.signal
            .borrow()
            .as_ref()
            .is_some_and(|linked| std::ptr::eq(linked.as_ptr(), Rc::as_ptr(signal)))
    }

    /// Call the bound callable unless the slot is blocked or cleared.
    pub(crate) fn invoke(&self, args: &Args) {
        if self.blocked.get() > 0 {
            return;
        }
        // Clone out of the cell so the callable may drop or clear this slot.
        let callback = self.callback.borrow().clone();
        if let Some(callback) = callback {
            callback(args);
        }
    }

    fn identity(&self) -> *const () {
        (self as *const Self).cast()
    }
}

impl<Args: 'static> SlotLink for SlotRecord<Args> {
    fn disconnect(&self) {
        let signal = self.signal.borrow_mut().take();
        if let Some(signal) = signal.and_then(|weak| weak.upgrade()) {
            signal.erase(self);
        }
    }

    fn is_connected(&self) -> bool {
        self.signal
            .borrow()
            .as_ref()
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    fn block(&self) {
        self.blocked.set(self.blocked.get().saturating_add(1));
    }

    fn unblock(&self) {
        self.blocked.set(self.blocked.get().saturating_sub(1));
    }

    fn is_blocked(&self) -> bool {
        self.blocked.get() > 0
    }

    fn clear(&self) {
        let callback = self.callback.borrow_mut().take();
        drop(callback);
    }

    fn track(&self, target: &Rc<TrackerCore>) {
        if self.tracks(target) {
            return;
        }
        self.untrack();
        *self.target.borrow_mut() = Some(Rc::downgrade(target));
        let this: Weak<dyn SlotLink> = self.this.clone();
        target.register(this);
    }

    fn untrack(&self) {
        let target = self.target.borrow_mut().take();
        if let Some(target) = target.and_then(|weak| weak.upgrade()) {
            target.unregister(self.identity());
        }
    }

    fn detach_target(&self) {
        self.target.borrow_mut().take();
    }

    fn tracks(&self, target: &Rc<TrackerCore>) -> bool {
        self.target
            .borrow()
            .as_ref()
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), Rc::as_ptr(target)))
    }
}

impl<Args: 'static> Drop for SlotRecord<Args> {
    fn drop(&mut self) {
        self.untrack();
    }
}
