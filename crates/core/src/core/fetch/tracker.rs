//! Outstanding-request tracker.
//!
//! Bookkeeping for everything the stage has in flight toward the memory
//! system: the set of physical addresses with a pending cache access (used
//! to deduplicate prefetches) and the bounded counters for outstanding
//! translations and prefetches.

use std::collections::HashSet;

use crate::common::PhysAddr;

/// In-flight request set plus bounded translation/prefetch counters.
pub struct OutstandingRequests {
    in_flight: HashSet<PhysAddr>,
    outstanding_prefetches: u64,
    outstanding_translations: u64,
    max_prefetches: u64,
    max_translations: u64,
}

impl OutstandingRequests {
    /// Creates an empty tracker with the given caps.
    pub fn new(max_prefetches: u64, max_translations: u64) -> Self {
        Self {
            in_flight: HashSet::new(),
            outstanding_prefetches: 0,
            outstanding_translations: 0,
            max_prefetches,
            max_translations,
        }
    }

    /// Records a cache access to `paddr` as in flight.
    pub fn insert_in_flight(&mut self, paddr: PhysAddr) {
        self.in_flight.insert(paddr);
    }

    /// Removes a completed cache access. Returns whether it was tracked.
    pub fn remove_in_flight(&mut self, paddr: PhysAddr) -> bool {
        self.in_flight.remove(&paddr)
    }

    /// Whether an access to `paddr` is already in flight.
    pub fn contains(&self, paddr: PhysAddr) -> bool {
        self.in_flight.contains(&paddr)
    }

    /// Number of in-flight cache accesses.
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Whether another translation may be started.
    pub fn can_start_translation(&self) -> bool {
        self.outstanding_translations < self.max_translations
    }

    /// Accounts a started translation.
    ///
    /// Must be incremented before the translation is handed to the MMU:
    /// the completion may be delivered before the call returns.
    pub fn translation_started(&mut self) {
        self.outstanding_translations += 1;
        debug_assert!(self.outstanding_translations <= self.max_translations);
    }

    /// Accounts a finished translation.
    pub fn translation_finished(&mut self) {
        debug_assert!(self.outstanding_translations > 0);
        self.outstanding_translations = self.outstanding_translations.saturating_sub(1);
    }

    /// Whether another prefetch may be issued.
    pub fn can_issue_prefetch(&self) -> bool {
        self.outstanding_prefetches < self.max_prefetches
    }

    /// Accounts an issued prefetch.
    pub fn prefetch_issued(&mut self) {
        self.outstanding_prefetches += 1;
        debug_assert!(self.outstanding_prefetches <= self.max_prefetches);
    }

    /// Accounts a prefetch completion or adoption.
    ///
    /// Saturating: a squash may already have zeroed the counter while the
    /// response was still on its way back from the cache.
    pub fn prefetch_done(&mut self) {
        self.outstanding_prefetches = self.outstanding_prefetches.saturating_sub(1);
    }

    /// Zeroes the prefetch counter on a squash, returning the old value.
    pub fn drop_all_prefetches(&mut self) -> u64 {
        std::mem::take(&mut self.outstanding_prefetches)
    }

    /// Current number of outstanding prefetches.
    pub fn outstanding_prefetches(&self) -> u64 {
        self.outstanding_prefetches
    }

    /// Current number of outstanding translations.
    pub fn outstanding_translations(&self) -> u64 {
        self.outstanding_translations
    }
}
