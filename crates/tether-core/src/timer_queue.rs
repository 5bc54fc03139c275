//! Time-ordered queue of pending timers owned by the event loop.
//!
//! Each registered timer owns a `Signal<()>` fired on expiry. The queue is a
//! min-heap of `(deadline, sequence)` entries over a slot map of timer state;
//! restarting or stopping a timer leaves its old heap entry behind, and stale
//! entries are discarded when they reach the head.
//!
//! Due timers are popped one at a time. Callbacks run between pops, so a
//! callback that restarts timers or opens a nested loop sees the queue as it
//! really is: a popped one-shot is no longer queued, a popped periodic timer
//! already carries its next deadline.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use slotmap::{SlotMap, new_key_type};

use crate::signal::Signal;

new_key_type! {
    /// A unique identifier for a timer registered with an event loop.
    pub struct TimerId;
}

/// Where a timer is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    /// Registered but not queued.
    Idle,
    /// Queued; only the heap entry with this sequence number is current.
    Queued { deadline: Instant, seq: u64 },
}

/// Internal timer data.
struct TimerData {
    /// Fired when the timer expires.
    signal: Rc<Signal<()>>,
    /// Interval for periodic timers, delay for one-shot timers.
    period: Duration,
    /// Whether the timer re-queues itself after firing.
    periodic: bool,
    /// Alarm entries are removed once they stop firing.
    transient: bool,
    state: TimerState,
}

/// An entry in the timer queue (min-heap by fire time, then insertion order).
#[derive(Debug, Clone, Copy)]
struct TimerQueueEntry {
    id: TimerId,
    fire_time: Instant,
    seq: u64,
}

impl PartialEq for TimerQueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_time == other.fire_time && self.seq == other.seq
    }
}

impl Eq for TimerQueueEntry {}

impl PartialOrd for TimerQueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerQueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap (BinaryHeap is max-heap by default).
        other
            .fire_time
            .cmp(&self.fire_time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A timer taken off the queue because its deadline passed.
pub(crate) struct DueTimer {
    pub id: TimerId,
    pub signal: Rc<Signal<()>>,
    /// Sequence number of the periodic re-queue done when popping.
    requeued: Option<u64>,
}

/// Manages all timers of one event loop.
pub(crate) struct TimerQueue {
    /// All registered timers.
    timers: SlotMap<TimerId, TimerData>,
    /// Priority queue of pending timer fires.
    queue: BinaryHeap<TimerQueueEntry>,
    /// Sequence counter for queue entries.
    next_seq: u64,
}

impl TimerQueue {
    /// Create an empty timer queue.
    pub fn new() -> Self {
        Self {
            timers: SlotMap::with_key(),
            queue: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Register a timer without queueing it.
    pub fn insert(&mut self, signal: Rc<Signal<()>>, transient: bool) -> TimerId {
        self.timers.insert(TimerData {
            signal,
            period: Duration::ZERO,
            periodic: false,
            transient,
            state: TimerState::Idle,
        })
    }

    /// Queue a timer to fire `delay` after `now`, replacing any pending deadline.
    ///
    /// Returns the entry's sequence number, or `None` if the timer is not
    /// registered.
    pub fn schedule(
        &mut self,
        id: TimerId,
        delay: Duration,
        periodic: bool,
        now: Instant,
    ) -> Option<u64> {
        let timer = self.timers.get_mut(id)?;
        let seq = self.next_seq;
        self.next_seq += 1;
        let deadline = now + delay;

        timer.period = delay;
        timer.periodic = periodic;
        timer.state = TimerState::Queued { deadline, seq };
        self.queue.push(TimerQueueEntry {
            id,
            fire_time: deadline,
            seq,
        });
        Some(seq)
    }

    /// Take a timer off the queue. No-op if it is not queued.
    pub fn unschedule(&mut self, id: TimerId) {
        if let Some(timer) = self.timers.get_mut(id) {
            timer.state = TimerState::Idle;
        }
    }

    /// Remove a timer entirely, handing back its signal.
    ///
    /// The caller drops the signal once no queue borrow is held.
    pub fn remove(&mut self, id: TimerId) -> Option<Rc<Signal<()>>> {
        self.timers.remove(id).map(|timer| timer.signal)
    }

    /// Whether the timer is in the queue.
    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.timers
            .get(id)
            .is_some_and(|timer| matches!(timer.state, TimerState::Queued { .. }))
    }

    /// The earliest pending deadline, if any.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.prune_stale_head();
        self.queue.peek().map(|entry| entry.fire_time)
    }

    /// Upper bound on sequence numbers for one firing batch.
    ///
    /// Entries queued after this call, including periodic re-queues made by
    /// [`pop_due`](Self::pop_due), wait for the next batch.
    pub fn batch_bound(&self) -> u64 {
        self.next_seq
    }

    /// Pop the earliest timer due at `now` that was queued before `bound`.
    ///
    /// A one-shot timer leaves the queue. A periodic timer with at least one
    /// connection is queued again at `now` plus its period before it fires.
    /// Call [`settle`](Self::settle) once its signal has been emitted.
    pub fn pop_due(&mut self, now: Instant, bound: u64) -> Option<DueTimer> {
        loop {
            let entry = *self.queue.peek()?;
            if !self.is_current(&entry) {
                self.queue.pop();
                continue;
            }
            // Anything queued during this batch sorts after every entry still
            // eligible, so the batch ends at the first one.
            if entry.fire_time > now || entry.seq >= bound {
                return None;
            }
            self.queue.pop();

            let timer = self.timers.get_mut(entry.id)?;
            timer.state = TimerState::Idle;
            let signal = timer.signal.clone();
            let (period, periodic) = (timer.period, timer.periodic);

            let requeued = if periodic && !signal.is_empty() {
                self.schedule(entry.id, period, true, now)
            } else {
                None
            };
            return Some(DueTimer {
                id: entry.id,
                signal,
                requeued,
            });
        }
    }

    /// Settle a timer after its signal was emitted.
    ///
    /// A periodic re-queue is undone if the emission left the signal without
    /// connections; changes made by the callback itself are kept. Alarms that
    /// are no longer queued are removed, and their signal handed back so it
    /// can be dropped outside the queue borrow.
    pub fn settle(&mut self, due: &DueTimer) -> Option<Rc<Signal<()>>> {
        let timer = self.timers.get_mut(due.id)?;
        if let (TimerState::Queued { seq, .. }, Some(requeued)) = (timer.state, due.requeued)
            && seq == requeued
            && timer.signal.is_empty()
        {
            timer.state = TimerState::Idle;
        }

        if timer.transient && timer.state == TimerState::Idle {
            self.remove(due.id)
        } else {
            None
        }
    }

    /// Number of queued timers.
    pub fn scheduled_count(&self) -> usize {
        self.timers
            .values()
            .filter(|timer| matches!(timer.state, TimerState::Queued { .. }))
            .count()
    }

    /// Drop every timer, handing back their signals.
    pub fn clear(&mut self) -> Vec<Rc<Signal<()>>> {
        self.queue.clear();
        self.timers.drain().map(|(_, timer)| timer.signal).collect()
    }

    fn is_current(&self, entry: &TimerQueueEntry) -> bool {
        self.timers.get(entry.id).is_some_and(|timer| {
            matches!(timer.state, TimerState::Queued { seq, .. } if seq == entry.seq)
        })
    }

    fn prune_stale_head(&mut self) {
        while let Some(entry) = self.queue.peek() {
            if self.is_current(entry) {
                break;
            }
            self.queue.pop();
        }
    }
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}
