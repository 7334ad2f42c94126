//! Fetch-target record and its translation/prefetch lifecycle.
//!
//! One fetch target describes a contiguous predicted fetch region inside a
//! single cache block, as produced by the branch-prediction unit. The
//! embedded state machine tracks how far the front end has taken the
//! target toward being fetchable:
//!
//! ```text
//! Initial -> TranslationInProgress -> TranslationReady -> PrefetchInProgress -> ReadyToFetch
//!                                  \-> TranslationFailed \-----------------------^
//! ```
//!
//! `TranslationReady` may skip the prefetch hop entirely when the demand
//! fetch adopts the target directly.

use crate::common::addr::align_down;
use crate::common::{Fault, PhysAddr, ThreadId};
use crate::mem::packet::{ReqId, Request};
use crate::sim::Cycle;

/// Identity of one fetch target, unique within a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FtId(pub u64);

/// Lifecycle state of a fetch target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FtState {
    /// Freshly predicted; no translation started.
    Initial,
    /// A translation request is in flight.
    TranslationInProgress,
    /// Translation succeeded; the physical base is known.
    TranslationReady,
    /// Translation faulted; the fault is stored.
    TranslationFailed,
    /// A prefetch for the block is in flight.
    PrefetchInProgress,
    /// Nothing left to do before the demand fetch consumes the target.
    ReadyToFetch,
    /// The demand fetch has moved past this target.
    Consumed,
}

/// One entry of the fetch-target queue.
#[derive(Debug)]
pub struct FetchTarget {
    id: FtId,
    tid: ThreadId,
    /// First byte of the predicted region.
    start: u64,
    /// One past the last byte of the predicted region.
    end: u64,
    /// Cache-block-aligned address of the region.
    blk_addr: u64,
    /// True iff the successor target is the sequential next block.
    fall_through: bool,
    /// PC of the terminating branch, when the target ends in one.
    branch_pc: Option<u64>,
    /// Predicted target of the terminating branch.
    predicted_target: Option<u64>,
    /// Lifecycle state.
    state: FtState,
    req: Option<Request>,
    paddr: Option<PhysAddr>,
    fault: Option<Fault>,
    translation_started_at: Option<Cycle>,
}

impl FetchTarget {
    /// Creates a fresh fetch target covering `[start, end)`.
    pub fn new(
        id: FtId,
        tid: ThreadId,
        start: u64,
        end: u64,
        fall_through: bool,
        cache_blk_size: usize,
    ) -> Self {
        debug_assert!(start < end);
        Self {
            id,
            tid,
            start,
            end,
            blk_addr: align_down(start, cache_blk_size),
            fall_through,
            branch_pc: None,
            predicted_target: None,
            state: FtState::Initial,
            req: None,
            paddr: None,
            fault: None,
            translation_started_at: None,
        }
    }

    /// Attaches the terminating branch and its predicted target.
    pub fn set_branch(&mut self, branch_pc: u64, target: u64) {
        self.branch_pc = Some(branch_pc);
        self.predicted_target = Some(target);
    }

    /// Records that translation of this target has started.
    pub fn start_translation(&mut self, req: &Request, now: Cycle) {
        debug_assert_eq!(self.state, FtState::Initial);
        self.state = FtState::TranslationInProgress;
        self.req = Some(req.clone());
        self.translation_started_at = Some(now);
    }

    /// Completes a translation for this target.
    ///
    /// Idempotent against stale completions: when `req` no longer matches
    /// the stored request (it was popped or replaced) the call is a no-op.
    /// Returns the translation latency on a live completion.
    pub fn finish_translation(
        &mut self,
        result: &Result<PhysAddr, Fault>,
        req: &Request,
        _is_prefetch: bool,
        now: Cycle,
    ) -> Option<Cycle> {
        if self.req_id() != Some(req.id()) || self.state != FtState::TranslationInProgress {
            return None;
        }
        match result {
            Ok(paddr) => {
                self.state = FtState::TranslationReady;
                self.paddr = Some(*paddr);
                self.fault = None;
                if let Some(r) = &mut self.req {
                    r.set_paddr(*paddr);
                }
            }
            Err(fault) => {
                self.state = FtState::TranslationFailed;
                self.fault = Some(fault.clone());
                self.paddr = None;
            }
        }
        self.translation_started_at.map(|t| now.saturating_sub(t))
    }

    /// Marks the prefetch for this target as sent to the cache.
    pub fn prefetch_issued(&mut self) {
        debug_assert_eq!(self.state, FtState::TranslationReady);
        self.state = FtState::PrefetchInProgress;
    }

    /// Transfers ownership of the stored request out of the target.
    ///
    /// Used when the demand fetch adopts an in-flight translation or
    /// prefetch as its own access.
    pub fn pop_req(&mut self) -> Option<Request> {
        self.req.take()
    }

    /// Marks the target as needing no further front-end work.
    pub fn mark_ready(&mut self) {
        self.state = FtState::ReadyToFetch;
    }

    /// Marks the target as consumed by the demand fetch.
    pub fn mark_consumed(&mut self) {
        self.state = FtState::Consumed;
    }

    /// Whether the target still needs a translation started.
    pub fn requires_translation(&self) -> bool {
        self.state == FtState::Initial
    }

    /// Whether the target's translation is complete and unconsumed.
    pub fn translation_ready(&self) -> bool {
        self.state == FtState::TranslationReady
    }

    /// Whether `addr` lies inside the predicted region.
    pub fn in_range(&self, addr: u64) -> bool {
        self.start <= addr && addr < self.end
    }

    /// Whether the `size`-aligned block containing `addr` overlaps the
    /// predicted region.
    pub fn in_range_aligned(&self, addr: u64, size: usize) -> bool {
        let blk = align_down(addr, size);
        blk < self.end && blk + size as u64 > self.start
    }

    /// Identity of this target.
    pub fn id(&self) -> FtId {
        self.id
    }

    /// Owning thread.
    pub fn tid(&self) -> ThreadId {
        self.tid
    }

    /// First byte of the predicted region.
    pub fn start_addr(&self) -> u64 {
        self.start
    }

    /// One past the last byte of the predicted region.
    pub fn end_addr(&self) -> u64 {
        self.end
    }

    /// Cache-block-aligned address of the region.
    pub fn blk_addr(&self) -> u64 {
        self.blk_addr
    }

    /// Whether the successor target is sequential.
    pub fn is_fall_through(&self) -> bool {
        self.fall_through
    }

    /// PC of the terminating branch, if any.
    pub fn branch_pc(&self) -> Option<u64> {
        self.branch_pc
    }

    /// Predicted target of the terminating branch, if any.
    pub fn predicted_target(&self) -> Option<u64> {
        self.predicted_target
    }

    /// Current lifecycle state.
    pub fn state(&self) -> FtState {
        self.state
    }

    /// Stored translated physical base, if translation completed.
    pub fn paddr(&self) -> Option<PhysAddr> {
        self.paddr
    }

    /// Whether a translated physical base is stored.
    pub fn has_paddr(&self) -> bool {
        self.paddr.is_some()
    }

    /// Fault raised by a failed translation.
    pub fn fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    /// The request associated with this target, if one is stored.
    pub fn req(&self) -> Option<&Request> {
        self.req.as_ref()
    }

    /// Identity of the stored request, if any.
    pub fn req_id(&self) -> Option<ReqId> {
        self.req.as_ref().map(|r| r.id())
    }
}
