//! Per-thread fetch-target queue.
//!
//! The branch-prediction unit pushes predicted fetch regions at the tail;
//! the fetch stage consumes them at the head and the prefetch engine scans
//! the entries behind the head. A squash invalidates the whole queue; it
//! becomes usable again once the predictor pushes fresh targets.

use std::collections::VecDeque;

use crate::common::ThreadId;
use crate::core::fetch::target::{FetchTarget, FtId};

/// Ordered fetch targets for every hardware thread.
pub struct Ftq {
    queues: Vec<VecDeque<FetchTarget>>,
    valid: Vec<bool>,
    cache_blk_size: usize,
    next_id: u64,
}

impl Ftq {
    /// Creates empty queues for `num_threads` threads.
    pub fn new(num_threads: usize, cache_blk_size: usize) -> Self {
        Self {
            queues: (0..num_threads).map(|_| VecDeque::new()).collect(),
            valid: vec![true; num_threads],
            cache_blk_size,
            next_id: 0,
        }
    }

    fn alloc_id(&mut self) -> FtId {
        let id = FtId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Pushes a fall-through or plain fetch target at the tail.
    ///
    /// Pushing revalidates a queue that was invalidated by a squash.
    pub fn push(&mut self, tid: ThreadId, start: u64, end: u64, fall_through: bool) -> FtId {
        let id = self.alloc_id();
        let ft = FetchTarget::new(id, tid, start, end, fall_through, self.cache_blk_size);
        self.queues[tid].push_back(ft);
        self.valid[tid] = true;
        id
    }

    /// Pushes a target terminated by a predicted-taken branch.
    pub fn push_with_branch(
        &mut self,
        tid: ThreadId,
        start: u64,
        end: u64,
        branch_pc: u64,
        target: u64,
    ) -> FtId {
        let id = self.alloc_id();
        let mut ft = FetchTarget::new(id, tid, start, end, false, self.cache_blk_size);
        ft.set_branch(branch_pc, target);
        self.queues[tid].push_back(ft);
        self.valid[tid] = true;
        id
    }

    /// Reads the head target.
    pub fn read_head(&self, tid: ThreadId) -> Option<&FetchTarget> {
        self.queues[tid].front()
    }

    /// Mutable access to the head target.
    pub fn head_mut(&mut self, tid: ThreadId) -> Option<&mut FetchTarget> {
        self.queues[tid].front_mut()
    }

    /// Reads the target behind the head.
    pub fn read_next_head(&self, tid: ThreadId) -> Option<&FetchTarget> {
        self.queues[tid].get(1)
    }

    /// Whether the head target exists and the queue is in sync with the
    /// predictor.
    pub fn is_head_ready(&self, tid: ThreadId) -> bool {
        self.valid[tid] && !self.queues[tid].is_empty()
    }

    /// Whether the queue holds no targets.
    pub fn is_empty(&self, tid: ThreadId) -> bool {
        self.queues[tid].is_empty()
    }

    /// Whether the queue is in sync with the predictor.
    pub fn is_valid(&self, tid: ThreadId) -> bool {
        self.valid[tid]
    }

    /// Number of queued targets.
    pub fn size(&self, tid: ThreadId) -> usize {
        self.queues[tid].len()
    }

    /// Finds the first target behind the head satisfying `pred`.
    pub fn find_after_head_mut(
        &mut self,
        tid: ThreadId,
        pred: impl Fn(&FetchTarget) -> bool,
    ) -> Option<&mut FetchTarget> {
        self.queues[tid].iter_mut().skip(1).find(|ft| pred(ft))
    }

    /// Looks up a queued target by identity.
    pub fn get(&self, tid: ThreadId, id: FtId) -> Option<&FetchTarget> {
        self.queues[tid].iter().find(|ft| ft.id() == id)
    }

    /// Looks up a queued target by identity, mutably.
    pub fn get_mut(&mut self, tid: ThreadId, id: FtId) -> Option<&mut FetchTarget> {
        self.queues[tid].iter_mut().find(|ft| ft.id() == id)
    }

    /// Pops the consumed head target.
    ///
    /// The head is marked consumed while still in the queue, so a holder
    /// of its `FtId` observes the transition before the entry disappears.
    /// Returns false when the queue is invalid or empty — the predictor
    /// has lost sync with the actual control flow and the caller must
    /// resteer it.
    pub fn update_head(&mut self, tid: ThreadId) -> bool {
        if !self.valid[tid] {
            return false;
        }
        match self.queues[tid].front_mut() {
            Some(ft) => {
                ft.mark_consumed();
                self.queues[tid].pop_front();
                true
            }
            None => false,
        }
    }

    /// Drops all targets and marks the queue out of sync.
    pub fn invalidate(&mut self, tid: ThreadId) {
        self.queues[tid].clear();
        self.valid[tid] = false;
    }
}
