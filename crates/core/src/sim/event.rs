//! Future-dated event queue for the fetch stage.
//!
//! Completions that take simulated time (translation results, deferred
//! trap delivery) are parked here and drained at the clock edge they fall
//! due. The queue is owned by the stage; collaborators never hold a
//! reference back into it.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::common::{Fault, PhysAddr, ThreadId};
use crate::core::fetch::target::FtId;
use crate::mem::packet::Request;
use crate::sim::Cycle;

/// One deferred fetch-stage action.
pub enum FetchEvent {
    /// An instruction translation finished.
    TranslationComplete {
        /// Thread the translation belongs to.
        tid: ThreadId,
        /// The translated request.
        req: Request,
        /// Physical address or the fault the walk raised.
        result: Result<PhysAddr, Fault>,
        /// Fetch target the translation was started for, if any.
        ft: Option<FtId>,
    },
    /// Retry delivering a translation fault whose fetch queue was full.
    ProcessTrap {
        /// Thread the fault belongs to.
        tid: ThreadId,
        /// The fault to deliver.
        fault: Fault,
        /// The faulting request.
        req: Request,
    },
}

struct Scheduled {
    when: Cycle,
    seq: u64,
    event: FetchEvent,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.when == other.when && self.seq == other.seq
    }
}
impl Eq for Scheduled {}
impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.when, self.seq).cmp(&(other.when, other.seq))
    }
}

/// Min-ordered queue of future-dated fetch events.
///
/// Events scheduled for the same cycle are delivered in scheduling order.
pub struct EventQueue {
    heap: BinaryHeap<Reverse<Scheduled>>,
    next_seq: u64,
}

impl EventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Schedules `event` to fire at cycle `when`.
    pub fn schedule(&mut self, when: Cycle, event: FetchEvent) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Scheduled { when, seq, event }));
    }

    /// Removes and returns every event due at or before `now`.
    pub fn take_due(&mut self, now: Cycle) -> Vec<FetchEvent> {
        let mut due = Vec::new();
        while let Some(Reverse(head)) = self.heap.peek() {
            if head.when > now {
                break;
            }
            if let Some(Reverse(entry)) = self.heap.pop() {
                due.push(entry.event);
            }
        }
        due
    }

    /// Whether a translation completion is still queued.
    pub fn translation_pending(&self) -> bool {
        self.heap
            .iter()
            .any(|entry| matches!(entry.0.event, FetchEvent::TranslationComplete { .. }))
    }

    /// Whether a deferred trap delivery is queued.
    pub fn trap_scheduled(&self) -> bool {
        self.heap
            .iter()
            .any(|entry| matches!(entry.0.event, FetchEvent::ProcessTrap { .. }))
    }

    /// Whether no events are queued.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drops every queued event.
    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
