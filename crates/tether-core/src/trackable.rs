//! Trackable targets: objects that callbacks may safely refer to.
//!
//! Embedding a [`Trackable`] in a type lets connections bound to that type's
//! methods follow its lifetime. The trackable keeps a registry of weak
//! back-references to every slot tracking it; on drop it walks that registry,
//! clears each slot's target reference and force-disconnects the slot from its
//! signal. Connection handles held elsewhere stay valid but become empty.
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use tether_core::{AsTrackable, Signal, Trackable};
//!
//! struct Label {
//!     trackable: Trackable,
//!     text: Cell<i32>,
//! }
//!
//! impl AsTrackable for Label {
//!     fn trackable(&self) -> &Trackable {
//!         &self.trackable
//!     }
//! }
//!
//! let value_changed = Signal::<i32>::new();
//! let label = Rc::new(Label { trackable: Trackable::new(), text: Cell::new(0) });
//!
//! let conn = value_changed.connect_receiver(&label, |label, value| label.text.set(*value));
//! value_changed.emit(3);
//! assert_eq!(label.text.get(), 3);
//!
//! drop(label);
//! assert!(conn.empty());
//! value_changed.emit(4); // no receiver left, nothing runs
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::connection::Connection;
use crate::slot::SlotLink;

/// Registry of slots tracking one target.
pub(crate) struct TrackerCore {
    slots: RefCell<Vec<Weak<dyn SlotLink>>>,
}

impl TrackerCore {
    fn new() -> Self {
        Self {
            slots: RefCell::new(Vec::new()),
        }
    }

    /// Add a back-reference. Re-adding an already tracked slot is a no-op.
    pub(crate) fn register(&self, slot: Weak<dyn SlotLink>) {
        let mut slots = self.slots.borrow_mut();
        let id = slot.as_ptr().cast::<()>();
        if !slots.iter().any(|s| s.as_ptr().cast::<()>() == id) {
            slots.push(slot);
        }
    }

    /// Remove the back-reference to the slot at `id`, pruning dead entries.
    pub(crate) fn unregister(&self, id: *const ()) {
        self.slots
            .borrow_mut()
            .retain(|s| s.as_ptr().cast::<()>() != id && s.strong_count() > 0);
    }

    fn live_count(&self) -> usize {
        self.slots
            .borrow()
            .iter()
            .filter(|s| s.strong_count() > 0)
            .count()
    }
}

/// The base capability that makes an object safely observable by callbacks.
///
/// Embed one per object. Cloning a `Trackable` yields a fresh, untracked
/// instance: observers belong to an object's identity, not to its value.
///
/// # Related
///
/// - [`AsTrackable`] - exposes the embedded `Trackable` to [`Signal`](crate::Signal)
/// - [`Signal::connect_receiver`](crate::Signal::connect_receiver) - connects a method of a tracked receiver
/// - [`Connection::track`] - attaches an existing connection to a target
pub struct Trackable {
    core: Rc<TrackerCore>,
}

impl Trackable {
    /// Create a trackable target with no observers.
    pub fn new() -> Self {
        Self {
            core: Rc::new(TrackerCore::new()),
        }
    }

    /// Number of live slots currently tracking this target.
    pub fn tracked_count(&self) -> usize {
        self.core.live_count()
    }

    /// Make `connection`'s slot track this target.
    ///
    /// Idempotent; a slot tracking some other target moves over to this one.
    pub fn track(&self, connection: &Connection) {
        if let Some(slot) = connection.slot() {
            slot.track(&self.core);
        }
    }

    /// Stop `connection`'s slot from tracking this target.
    ///
    /// No-op if the slot is not tracking this target.
    pub fn untrack(&self, connection: &Connection) {
        if let Some(slot) = connection.slot()
            && slot.tracks(&self.core)
        {
            slot.untrack();
        }
    }

    pub(crate) fn core(&self) -> &Rc<TrackerCore> {
        &self.core
    }
}

impl Default for Trackable {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Trackable {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl fmt::Debug for Trackable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trackable")
            .field("tracked", &self.tracked_count())
            .finish()
    }
}

impl Drop for Trackable {
    fn drop(&mut self) {
        // Take the registry first; disconnecting may drop slots, whose own
        // teardown must not find it borrowed.
        let slots = std::mem::take(&mut *self.core.slots.borrow_mut());
        if !slots.is_empty() {
            tracing::debug!(
                target: "tether_core::trackable",
                count = slots.len(),
                "disconnecting slots of destroyed target"
            );
        }
        for slot in slots.iter().filter_map(Weak::upgrade) {
            slot.detach_target();
            slot.clear();
            slot.disconnect();
        }
    }
}

/// Types that embed a [`Trackable`].
///
/// Derivable with `#[derive(Trackable)]` from the `tether-macros` crate.
pub trait AsTrackable {
    /// The embedded trackable target.
    fn trackable(&self) -> &Trackable;
}

impl AsTrackable for Trackable {
    fn trackable(&self) -> &Trackable {
        self
    }
}

impl<T: AsTrackable + ?Sized> AsTrackable for Rc<T> {
    fn trackable(&self) -> &Trackable {
        (**self).trackable()
    }
}
