//! The instruction-fetch stage.
//!
//! Drives the front end for one or more hardware threads: consumes
//! predicted fetch targets, initiates translations and instruction-cache
//! accesses (in order on the demand path, out of order through the
//! prefetch engine), refills the per-thread fetch buffer, and decodes
//! bytes into dynamic instructions delivered to decode. Squash, drain,
//! quiesce, and trap transitions are handled without losing or
//! duplicating in-flight work: late completions are recognized by request
//! identity and either attributed to a queued fetch target or discarded.

/// SMT fetch arbitration.
pub mod arbiter;

/// Per-thread fetch buffer.
pub mod buffer;

/// Per-thread fetch-target queue.
pub mod ftq;

/// Probe hooks.
pub mod probes;

/// Inter-stage signal structures.
pub mod signals;

/// Fetch-target record and lifecycle.
pub mod target;

/// Outstanding-request tracker.
pub mod tracker;

use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use log::{debug, trace, warn};

use crate::common::addr::align_down;
use crate::common::{ConfigError, Fault, InstSeqNum, PhysAddr, ThreadId, VirtAddr};
use crate::config::{Config, SmtFetchPolicy};
use crate::core::bac::BranchUnit;
use crate::core::fetch::arbiter::SmtArbiter;
use crate::core::fetch::buffer::FetchBuffer;
use crate::core::fetch::ftq::Ftq;
use crate::core::fetch::probes::{FetchProbes, NullProbes};
use crate::core::fetch::signals::{FetchInputs, FetchOutputs, FetchToBac, Stalls};
use crate::core::fetch::target::{FtId, FtState};
use crate::core::fetch::tracker::OutstandingRequests;
use crate::core::inst::{DynInst, DynInstPtr};
use crate::isa::{is_rom_micro_pc, InstDecoder, PcState, StaticInst};
use crate::mem::mmu::InstructionMmu;
use crate::mem::packet::{Packet, ReqId, Request};
use crate::mem::port::TimingPort;
use crate::sim::event::{EventQueue, FetchEvent};
use crate::sim::rng::XorShiftRng;
use crate::sim::Cycle;
use crate::stats::FetchStats;

pub use crate::core::fetch::target::FetchTarget;

/// Per-thread controller state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Thread exists but has nothing to do.
    Idle,
    /// Fetching and decoding normally.
    Running,
    /// Discarding in-flight work after a squash signal.
    Squashing,
    /// Held by a downstream stall.
    Blocked,
    /// Waiting for the predictor to fill the fetch-target queue.
    FtqEmpty,
    /// Waiting for an instruction translation.
    ItlbWait,
    /// Waiting for the demand cache response.
    IcacheWaitResponse,
    /// Waiting for the cache to accept the refused demand packet.
    IcacheWaitRetry,
    /// The demand response arrived; fetch resumes next cycle.
    IcacheAccessComplete,
    /// A translation fault was handed to decode; waiting for the trap.
    TrapPending,
    /// A quiesce instruction was fetched; waiting for an external wake.
    QuiescePending,
    /// The predicted address is outside backed memory; waiting for a
    /// squash to redirect.
    NoGoodAddr,
}

/// Aggregate activity of the stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageActivity {
    /// At least one thread can make progress.
    Active,
    /// Every thread is parked on some event.
    Inactive,
}

/// Collaborators handed to the stage each cycle.
///
/// The stage holds no owning references to its collaborators; everything
/// it needs is borrowed for the duration of one call.
pub struct FetchContext<'a> {
    /// Current cycle.
    pub now: Cycle,
    /// Fetch-target queue (filled by the branch unit).
    pub ftq: &'a mut Ftq,
    /// Branch/address-calculation unit.
    pub bac: &'a mut dyn BranchUnit,
    /// Instruction MMU.
    pub mmu: &'a mut dyn InstructionMmu,
    /// Instruction-cache port.
    pub icache: &'a mut dyn TimingPort,
    /// Threads currently active on the CPU.
    pub active_threads: &'a [ThreadId],
}

/// The fetch stage.
pub struct Fetch {
    // Configuration-derived parameters.
    fetch_policy: SmtFetchPolicy,
    decoupled_front_end: bool,
    fetch_width: usize,
    decode_width: usize,
    fetch_buffer_size: usize,
    fetch_queue_size: usize,
    cache_blk_size: usize,
    num_threads: usize,
    num_fetching_threads: usize,
    /// Bytes fed to the decoder per step.
    inst_size: usize,

    // Per-thread state.
    status: Vec<ThreadStatus>,
    pc: Vec<PcState>,
    fetch_offset: Vec<u64>,
    macroop: Vec<Option<Arc<StaticInst>>>,
    delayed_commit: Vec<bool>,
    mem_req: Vec<Option<Request>>,
    stalls: Vec<Stalls>,
    fetch_buffer: Vec<FetchBuffer>,
    fetch_queue: Vec<VecDeque<DynInstPtr>>,
    issue_pipelined_ifetch: Vec<bool>,
    decoders: Vec<Box<dyn InstDecoder>>,

    // Stage-wide state.
    tracker: OutstandingRequests,
    /// The single refused demand packet awaiting a cache retry.
    retry: Option<(ThreadId, Packet)>,
    cache_blocked: bool,
    interrupt_pending: bool,
    arbiter: SmtArbiter,
    events: EventQueue,
    rng: XorShiftRng,
    probes: Box<dyn FetchProbes>,
    next_seq: InstSeqNum,
    next_req_id: u64,
    /// Instructions fetched so far this cycle.
    num_inst: usize,
    threads_fetched: usize,
    wrote_to_time_buffer: bool,
    stage_status: StageActivity,
    /// Stage statistics.
    pub stats: FetchStats,
}

impl Fetch {
    /// Creates the stage from a validated configuration and one decoder
    /// per thread.
    pub fn new(config: &Config, decoders: Vec<Box<dyn InstDecoder>>) -> Result<Self, ConfigError> {
        config.validate()?;
        let n = config.smt.num_threads;
        assert_eq!(decoders.len(), n, "one decoder per hardware thread");

        let inst_size = decoders[0].more_bytes_size();
        debug_assert!(config.fetch.fetch_buffer_size % inst_size == 0);

        Ok(Self {
            fetch_policy: config.smt.fetch_policy,
            decoupled_front_end: config.fetch.decoupled_front_end,
            fetch_width: config.fetch.fetch_width,
            decode_width: config.fetch.decode_width,
            fetch_buffer_size: config.fetch.fetch_buffer_size,
            fetch_queue_size: config.fetch.fetch_queue_size,
            cache_blk_size: config.fetch.cache_blk_size,
            num_threads: n,
            num_fetching_threads: config.smt.num_fetching_threads,
            inst_size,
            status: vec![ThreadStatus::Idle; n],
            pc: vec![PcState::default(); n],
            fetch_offset: vec![0; n],
            macroop: vec![None; n],
            delayed_commit: vec![false; n],
            mem_req: vec![None; n],
            stalls: vec![Stalls::default(); n],
            fetch_buffer: (0..n)
                .map(|_| FetchBuffer::new(config.fetch.fetch_buffer_size))
                .collect(),
            fetch_queue: (0..n).map(|_| VecDeque::new()).collect(),
            issue_pipelined_ifetch: vec![false; n],
            decoders,
            tracker: OutstandingRequests::new(
                config.fetch.max_outstanding_prefetches,
                config.fetch.max_outstanding_translations,
            ),
            retry: None,
            cache_blocked: false,
            interrupt_pending: false,
            arbiter: SmtArbiter::new(n),
            events: EventQueue::new(),
            rng: XorShiftRng::new(config.fetch.rng_seed),
            probes: Box::new(NullProbes),
            next_seq: 1,
            next_req_id: 0,
            num_inst: 0,
            threads_fetched: 0,
            wrote_to_time_buffer: false,
            stage_status: StageActivity::Inactive,
            stats: FetchStats::new(n),
        })
    }

    /// Installs a probe sink.
    pub fn set_probes(&mut self, probes: Box<dyn FetchProbes>) {
        self.probes = probes;
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Resets the whole stage to fetch from the given per-thread PCs.
    pub fn reset_stage(&mut self, pcs: &[u64]) {
        debug_assert_eq!(pcs.len(), self.num_threads);
        self.num_inst = 0;
        self.interrupt_pending = false;
        self.cache_blocked = false;
        self.retry = None;
        self.events.clear();
        self.arbiter.reset(self.num_threads);

        for tid in 0..self.num_threads {
            self.status[tid] = ThreadStatus::Running;
            self.pc[tid] = PcState::new(pcs[tid]);
            self.fetch_offset[tid] = 0;
            self.macroop[tid] = None;
            self.delayed_commit[tid] = false;
            self.mem_req[tid] = None;
            self.stalls[tid] = Stalls::default();
            self.fetch_buffer[tid].reset();
            self.fetch_queue[tid].clear();
        }

        self.wrote_to_time_buffer = false;
        self.stage_status = StageActivity::Inactive;
    }

    /// Resets a single thread to fetch from `pc`.
    pub fn clear_states(&mut self, tid: ThreadId, pc: u64) {
        self.status[tid] = ThreadStatus::Running;
        self.pc[tid] = PcState::new(pc);
        self.fetch_offset[tid] = 0;
        self.macroop[tid] = None;
        self.delayed_commit[tid] = false;
        self.mem_req[tid] = None;
        self.stalls[tid] = Stalls::default();
        self.fetch_buffer[tid].reset();
        self.fetch_queue[tid].clear();
    }

    /// Restores stage state when taking over from another CPU model.
    pub fn take_over_from(&mut self, pcs: &[u64]) {
        self.reset_stage(pcs);
    }

    /// Removes a deactivated thread from the arbitration priority list.
    pub fn deactivate_thread(&mut self, tid: ThreadId) {
        self.arbiter.deactivate(tid);
    }

    /// Wakes the quiesced thread. Only an external event may do this.
    pub fn wake_from_quiesce(&mut self) {
        debug!(target: "fetch", "waking up from quiesce");
        self.status[0] = ThreadStatus::Running;
    }

    // ------------------------------------------------------------------
    // Drain
    // ------------------------------------------------------------------

    /// Marks a thread as drain-stalled.
    pub fn drain_stall(&mut self, tid: ThreadId) {
        debug_assert!(!self.stalls[tid].drain);
        debug!(target: "fetch", "[tid:{}] thread drained", tid);
        self.stalls[tid].drain = true;
    }

    /// Clears all decode and drain stalls after a drain completes.
    pub fn drain_resume(&mut self) {
        for stalls in &mut self.stalls {
            stalls.decode = false;
            stalls.drain = false;
        }
    }

    /// Whether the stage has fully drained.
    ///
    /// Every fetch queue must be empty, every thread Idle or parked in
    /// Blocked by its drain stall, and no translation completion may
    /// still be in flight — a pending completion could restart the
    /// pipeline in the middle of the drain.
    pub fn is_drained(&self) -> bool {
        for tid in 0..self.num_threads {
            if !self.fetch_queue[tid].is_empty() {
                return false;
            }
            if self.status[tid] != ThreadStatus::Idle {
                if self.status[tid] == ThreadStatus::Blocked && self.stalls[tid].drain {
                    continue;
                }
                return false;
            }
        }
        !self.events.translation_pending()
    }

    /// Debug-time consistency checks once a drain has completed.
    pub fn drain_sanity_check(&self) {
        debug_assert!(self.is_drained());
        debug_assert!(self.retry.is_none());
        debug_assert!(!self.cache_blocked);
        debug_assert!(!self.interrupt_pending);
        for tid in 0..self.num_threads {
            debug_assert!(self.mem_req[tid].is_none());
            debug_assert!(
                self.status[tid] == ThreadStatus::Idle || self.stalls[tid].drain
            );
        }
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Runs one cycle of the stage.
    ///
    /// Internal events due this cycle (translation completions, deferred
    /// traps) are delivered first, then upstream signals are ingested,
    /// the arbitrated threads fetch, pipelined and prefetch accesses are
    /// issued, and finally the per-thread fetch queues drain into
    /// `out.to_decode` up to `decode_width` instructions.
    pub fn tick(
        &mut self,
        ctx: &mut FetchContext<'_>,
        inputs: &FetchInputs<'_>,
        out: &mut FetchOutputs,
    ) {
        let now = ctx.now;
        if out.to_bac.len() != self.num_threads {
            out.to_bac = vec![FetchToBac::default(); self.num_threads];
        }
        out.clear();

        self.process_events(now, ctx.ftq, ctx.mmu, ctx.icache, ctx.active_threads);

        self.wrote_to_time_buffer = false;
        for flag in &mut self.issue_pipelined_ifetch {
            *flag = false;
        }

        let mut status_change = false;
        for &tid in ctx.active_threads {
            status_change |= self.check_signals_and_update(tid, inputs, ctx.ftq);
        }

        trace!(target: "fetch", "running stage");

        if inputs.from_commit.commit[0].interrupt_pending {
            self.interrupt_pending = true;
        }
        if inputs.from_commit.commit[0].clear_interrupt {
            self.interrupt_pending = false;
        }

        self.threads_fetched = 0;
        while self.threads_fetched < self.num_fetching_threads {
            self.fetch(&mut status_change, ctx, inputs, out);
            self.threads_fetched += 1;
        }

        if status_change {
            self.stage_status = self.update_fetch_status(ctx.active_threads);
        }

        for tid in 0..self.num_threads {
            if self.issue_pipelined_ifetch[tid] {
                self.pipeline_icache_accesses(tid, ctx.ftq, ctx.mmu, ctx.icache, now);
            }
        }

        if self.decoupled_front_end {
            for tid in 0..self.num_threads {
                self.process_ftq(tid, ctx.ftq, ctx.mmu, ctx.icache, now);
            }
        }

        // Send queued instructions to decode, starting from a random
        // active thread and wrapping round-robin. Stalled threads keep
        // their instructions.
        let active = ctx.active_threads;
        let mut insts_to_decode = 0;
        let mut available: usize = active
            .iter()
            .filter(|&&tid| !self.stalls[tid].decode)
            .map(|&tid| self.fetch_queue[tid].len())
            .sum();

        if !active.is_empty() && available > 0 {
            let mut idx = self.rng.next_index(active.len());
            while available != 0 && insts_to_decode < self.decode_width {
                let tid = active[idx];
                if !self.stalls[tid].decode {
                    if let Some(inst) = self.fetch_queue[tid].pop_front() {
                        debug!(
                            target: "fetch",
                            "[tid:{}] [sn:{}] sending instruction to decode, queue size {}",
                            tid,
                            inst.seq_num,
                            self.fetch_queue[tid].len()
                        );
                        out.to_decode.push(inst);
                        self.wrote_to_time_buffer = true;
                        insts_to_decode += 1;
                        available -= 1;
                    }
                }
                idx = (idx + 1) % active.len();
            }
        }

        if self.wrote_to_time_buffer {
            out.activity = true;
        }
        self.num_inst = 0;
    }

    /// Delivers internal events that fall due this cycle.
    fn process_events(
        &mut self,
        now: Cycle,
        ftq: &mut Ftq,
        mmu: &mut dyn InstructionMmu,
        icache: &mut dyn TimingPort,
        active: &[ThreadId],
    ) {
        for event in self.events.take_due(now) {
            match event {
                FetchEvent::TranslationComplete {
                    tid,
                    req,
                    result,
                    ft,
                } => {
                    self.finish_translation(tid, result, req, ft, ftq, mmu, icache, active, now);
                }
                FetchEvent::ProcessTrap { tid, fault, req } => {
                    self.process_trap(tid, fault, req, now);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Signals and status
    // ------------------------------------------------------------------

    /// Ingests upstream signals for one thread and transitions its state.
    fn check_signals_and_update(
        &mut self,
        tid: ThreadId,
        inputs: &FetchInputs<'_>,
        ftq: &Ftq,
    ) -> bool {
        let dec = &inputs.from_decode.decode[tid];
        let com = &inputs.from_commit.commit[tid];

        if dec.block {
            self.stalls[tid].decode = true;
        }
        if dec.unblock {
            debug_assert!(self.stalls[tid].decode);
            debug_assert!(!dec.block);
            self.stalls[tid].decode = false;
        }

        if com.squash {
            debug!(
                target: "fetch",
                "[tid:{}] squashing from commit, PC = {:#x}",
                tid,
                com.pc.inst_addr()
            );
            self.squash(&com.pc, com.done_seq_num, com.squash_inst.clone(), tid);
            return true;
        }

        if dec.squash && self.status[tid] != ThreadStatus::Squashing {
            debug!(
                target: "fetch",
                "[tid:{}] squashing from decode, PC = {:#x}",
                tid,
                dec.next_pc.inst_addr()
            );
            self.squash_from_decode(&dec.next_pc, dec.squash_inst.clone(), dec.done_seq_num, tid);
            return true;
        }

        if self.check_stall(tid)
            && !matches!(
                self.status[tid],
                ThreadStatus::IcacheWaitResponse
                    | ThreadStatus::IcacheWaitRetry
                    | ThreadStatus::ItlbWait
                    | ThreadStatus::FtqEmpty
                    | ThreadStatus::QuiescePending
            )
        {
            debug!(target: "fetch", "[tid:{}] setting to blocked", tid);
            self.status[tid] = ThreadStatus::Blocked;
            return true;
        }

        if matches!(self.status[tid], ThreadStatus::Blocked | ThreadStatus::Squashing) {
            // Neither block nor squash is asserted this cycle. With a
            // decoupled front end we can only run once the FTQ refills.
            if self.decoupled_front_end && ftq.is_empty(tid) {
                self.status[tid] = ThreadStatus::FtqEmpty;
            } else {
                debug!(target: "fetch", "[tid:{}] done squashing, switching to running", tid);
                self.status[tid] = ThreadStatus::Running;
            }
            return true;
        }

        if self.status[tid] == ThreadStatus::FtqEmpty && !ftq.is_empty(tid) {
            debug!(target: "fetch", "[tid:{}] FTQ refilled, running", tid);
            self.status[tid] = ThreadStatus::Running;
            return true;
        }

        false
    }

    /// Whether a drain stall holds this thread.
    fn check_stall(&self, tid: ThreadId) -> bool {
        if self.stalls[tid].drain {
            debug!(target: "fetch", "[tid:{}] drain stall detected", tid);
            return true;
        }
        false
    }

    /// Whether the pending interrupt window blocks new fetches.
    fn check_interrupt(&self, _pc: u64) -> bool {
        self.interrupt_pending
    }

    /// Recomputes the aggregate stage status.
    fn update_fetch_status(&self, active: &[ThreadId]) -> StageActivity {
        for &tid in active {
            if matches!(
                self.status[tid],
                ThreadStatus::Running | ThreadStatus::Squashing | ThreadStatus::IcacheAccessComplete
            ) {
                return StageActivity::Active;
            }
        }
        StageActivity::Inactive
    }

    fn switch_to_active(&mut self) {
        if self.stage_status == StageActivity::Inactive {
            debug!(target: "fetch", "activating stage");
            self.stage_status = StageActivity::Active;
        }
    }

    // ------------------------------------------------------------------
    // Squash
    // ------------------------------------------------------------------

    /// Squash ordered by the commit stage.
    pub fn squash(
        &mut self,
        new_pc: &PcState,
        _done_seq_num: InstSeqNum,
        squash_inst: Option<DynInstPtr>,
        tid: ThreadId,
    ) {
        debug!(target: "fetch", "[tid:{}] squash from commit", tid);
        self.do_squash(new_pc, squash_inst, tid);
        // Removing instructions younger than the squash point from the
        // rest of the pipeline is the CPU's business, not ours.
    }

    /// Squash ordered by the decode stage (branch misprediction).
    pub fn squash_from_decode(
        &mut self,
        new_pc: &PcState,
        squash_inst: Option<DynInstPtr>,
        _seq_num: InstSeqNum,
        tid: ThreadId,
    ) {
        debug!(target: "fetch", "[tid:{}] squashing from decode", tid);
        self.do_squash(new_pc, squash_inst, tid);
    }

    fn do_squash(&mut self, new_pc: &PcState, squash_inst: Option<DynInstPtr>, tid: ThreadId) {
        debug!(
            target: "fetch",
            "[tid:{}] squashing, setting PC to {:#x}",
            tid,
            new_pc.inst_addr()
        );

        self.pc[tid] = *new_pc;
        self.fetch_offset[tid] = 0;

        // Keep expanding the squashed macro-op only when the squash point
        // is inside it.
        self.macroop[tid] = match &squash_inst {
            Some(si)
                if si.pc.inst_addr() == new_pc.inst_addr() && !si.is_last_microop() =>
            {
                si.macroop.clone()
            }
            _ => None,
        };
        self.decoders[tid].reset();

        if matches!(
            self.status[tid],
            ThreadStatus::IcacheWaitResponse | ThreadStatus::ItlbWait
        ) {
            debug!(target: "fetch", "[tid:{}] squashing outstanding demand access", tid);
            self.mem_req[tid] = None;
        }

        // Drop the retry packet if this thread owns it. The cache stays
        // blocked until its retry notification arrives.
        if self.retry.as_ref().is_some_and(|(owner, _)| *owner == tid) {
            debug_assert!(self.cache_blocked);
            self.retry = None;
        }

        self.status[tid] = ThreadStatus::Squashing;
        self.fetch_queue[tid].clear();

        // The youngest surviving micro-op may or may not have inhibited
        // interrupts; assume it did so none are taken when they cannot be.
        self.delayed_commit[tid] = true;

        self.stats.pf_squashed += self.tracker.drop_all_prefetches();
        self.stats.squash_cycles += 1;
    }

    /// Redirects the branch unit and invalidates the FTQ.
    fn bac_resteer(&mut self, new_pc: &PcState, tid: ThreadId, ftq: &mut Ftq, out: &mut FetchOutputs) {
        debug!(
            target: "fetch",
            "[tid:{}] resteer BAC to PC {:#x}",
            tid,
            new_pc.inst_addr()
        );
        out.to_bac[tid].squash = true;
        out.to_bac[tid].next_pc = *new_pc;
        ftq.invalidate(tid);
    }

    // ------------------------------------------------------------------
    // Cache-line fetch path
    // ------------------------------------------------------------------

    /// Whether the decoupled FTQ can supply the next fetch target.
    fn ftq_ready(&mut self, tid: ThreadId, status_change: &mut bool, ftq: &Ftq) -> bool {
        if !self.decoupled_front_end {
            return true;
        }
        if !ftq.is_head_ready(tid) {
            self.status[tid] = ThreadStatus::FtqEmpty;
            *status_change = true;
            return false;
        }
        true
    }

    fn alloc_req_id(&mut self) -> ReqId {
        let id = ReqId(self.next_req_id);
        self.next_req_id += 1;
        id
    }

    fn fetch_buffer_align(&self, addr: u64) -> u64 {
        align_down(addr, self.fetch_buffer_size)
    }

    fn cache_block_align(&self, addr: u64) -> u64 {
        align_down(addr, self.cache_blk_size)
    }

    /// Starts the demand access for the fetch-buffer block containing
    /// `vaddr`, adopting any in-flight fetch-target work along the way.
    fn fetch_cache_line(
        &mut self,
        vaddr: u64,
        tid: ThreadId,
        pc: u64,
        ftq: &mut Ftq,
        mmu: &mut dyn InstructionMmu,
        icache: &mut dyn TimingPort,
        now: Cycle,
    ) -> bool {
        if self.cache_blocked {
            debug!(target: "fetch", "[tid:{}] can't fetch cache line, cache blocked", tid);
            return false;
        } else if self.check_interrupt(pc) && !self.delayed_commit[tid] {
            debug!(target: "fetch", "[tid:{}] can't fetch cache line, interrupt pending", tid);
            return false;
        }

        let fetch_buffer_block_pc = self.fetch_buffer_align(vaddr);

        debug!(
            target: "fetch",
            "[tid:{}] fetching cache line {:#x} for PC {:#x}, addr {:#x}",
            tid, fetch_buffer_block_pc, pc, vaddr
        );

        // Pick the fetch target covering this cache block. An instruction
        // can span two fetch targets; the PC still points at the head
        // target, but the bytes come out of the next one.
        let mut ft_id: Option<FtId> = None;
        if self.decoupled_front_end {
            let cache_block = self.cache_block_align(vaddr);
            if let Some(head) = ftq.read_head(tid) {
                if head.blk_addr() == cache_block {
                    ft_id = Some(head.id());
                } else {
                    self.stats.ft_cross_cache_block += 1;
                    if head.is_fall_through() {
                        if let Some(next) = ftq.read_next_head(tid) {
                            if next.blk_addr() == cache_block {
                                ft_id = Some(next.id());
                            } else {
                                ft_id = None;
                                self.stats.ft_cross_cache_block_not_next += 1;
                            }
                        }
                    }
                }
            }
        }

        if let Some(id) = ft_id {
            let mut trap: Option<(Fault, Option<Request>)> = None;
            let mut done = false;

            if let Some(ft) = ftq.get_mut(tid, id) {
                match ft.state() {
                    FtState::ReadyToFetch => {
                        // Translation done and the block was prefetched
                        // into the cache; access it right away.
                        debug!(target: "fetch", "[tid:{}] ready to fetch", tid);
                        self.stats.ft_ready_to_fetch += 1;
                    }

                    FtState::PrefetchInProgress => {
                        // The in-flight prefetch becomes the demand
                        // request; wait for its response.
                        debug!(target: "fetch", "[tid:{}] prefetch in progress", tid);
                        self.stats.ft_prefetch_in_progress += 1;
                        self.stats.pf_late += 1;

                        self.tracker.prefetch_done();
                        self.status[tid] = ThreadStatus::IcacheWaitResponse;
                        self.fetch_buffer[tid].expect(fetch_buffer_block_pc);
                        self.mem_req[tid] = ft.pop_req();
                        ft.mark_ready();

                        if let Some(req) = &self.mem_req[tid] {
                            self.probes.on_fetch_request_sent(req);
                        }
                        done = true;
                    }

                    FtState::TranslationInProgress => {
                        // Adopt the in-flight translation and wait for it.
                        debug!(target: "fetch", "[tid:{}] translation in progress", tid);
                        self.stats.ft_translation_in_progress += 1;

                        self.status[tid] = ThreadStatus::ItlbWait;
                        self.mem_req[tid] = ft.pop_req();
                        ft.mark_ready();
                        done = true;
                    }

                    FtState::TranslationFailed => {
                        debug!(target: "fetch", "[tid:{}] translation failed", tid);
                        self.stats.ft_translation_failed += 1;
                        let fault = ft
                            .fault()
                            .cloned()
                            .unwrap_or(Fault::InstructionAccessFault(vaddr));
                        trap = Some((fault, ft.pop_req()));
                        done = true;
                    }

                    FtState::TranslationReady => {
                        // The stored request already carries the physical
                        // address; use it directly.
                        debug!(target: "fetch", "[tid:{}] translation ready", tid);
                        self.stats.ft_translation_ready += 1;
                    }

                    FtState::Initial | FtState::Consumed => {}
                }
            }

            if let Some((fault, req)) = trap {
                let req = match req {
                    Some(req) => req,
                    None => Request::new(
                        self.alloc_req_id(),
                        tid,
                        VirtAddr::new(fetch_buffer_block_pc),
                        self.fetch_buffer_size,
                        pc,
                    ),
                };
                self.process_trap(tid, fault, req, now);
                return true;
            }
            if done {
                return true;
            }
        }

        // Create (or reuse) a request for the fetch-buffer block.
        let ft_mut = ft_id.and_then(|id| ftq.get_mut(tid, id));
        let req = self.make_request(fetch_buffer_block_pc, tid, pc, ft_mut);
        self.mem_req[tid] = Some(req.clone());

        if req.has_paddr() {
            // Translation already resolved; go straight to the cache.
            self.perform_cache_access(fetch_buffer_block_pc, tid, req, false, mmu, icache, now);
        } else {
            self.status[tid] = ThreadStatus::ItlbWait;
            self.start_translation(req, tid, ft_id, ftq, mmu, now);
        }

        true
    }

    /// Builds the demand request, reusing the fetch target's request and
    /// translation when they cover the accessed block.
    fn make_request(
        &mut self,
        vaddr: u64,
        tid: ThreadId,
        pc: u64,
        mut ft: Option<&mut FetchTarget>,
    ) -> Request {
        let mut reused = None;
        if let Some(ft) = ft.as_deref_mut() {
            if ft.req().is_some_and(|r| r.vaddr().val() == vaddr) {
                reused = ft.pop_req();
                ft.mark_ready();
                debug!(target: "fetch", "[tid:{}] reusing request for {:#x}", tid, vaddr);
            }
        }

        let mut req = match reused {
            Some(req) => req,
            None => Request::new(
                self.alloc_req_id(),
                tid,
                VirtAddr::new(vaddr),
                self.fetch_buffer_size,
                pc,
            ),
        };

        if !req.has_paddr() {
            if let Some(ft) = ft.as_deref() {
                if ft.has_paddr() && ft.blk_addr() == self.cache_block_align(vaddr) {
                    // The target's translation covers the whole cache
                    // block; derive the buffer's physical address from its
                    // base plus the block offset.
                    if let Some(base) = ft.paddr() {
                        let cl_pa = align_down(base.val(), self.cache_blk_size)
                            + (vaddr & (self.cache_blk_size as u64 - 1));
                        req.set_paddr(PhysAddr::new(cl_pa));
                        debug!(
                            target: "fetch",
                            "[tid:{}] using translation VA {:#x} PA {:#x} from fetch target",
                            tid, vaddr, cl_pa
                        );
                    }
                }
            }
        }
        req
    }

    /// Hands a request to the MMU and schedules its completion.
    fn start_translation(
        &mut self,
        req: Request,
        tid: ThreadId,
        ft_id: Option<FtId>,
        ftq: &mut Ftq,
        mmu: &mut dyn InstructionMmu,
        now: Cycle,
    ) {
        if let Some(ft) = ft_id.and_then(|id| ftq.get_mut(tid, id)) {
            ft.start_translation(&req, now);
        }

        // Count before handing off: the walk may complete at the very
        // next edge.
        self.tracker.translation_started();

        let outcome = mmu.translate_timing(&req);
        self.events.schedule(
            now + outcome.latency.max(1),
            FetchEvent::TranslationComplete {
                tid,
                req,
                result: outcome.result,
                ft: ft_id,
            },
        );
    }

    /// Completes a translation delivered by the event queue.
    #[allow(clippy::too_many_arguments)]
    fn finish_translation(
        &mut self,
        tid: ThreadId,
        result: Result<PhysAddr, Fault>,
        mut req: Request,
        ft_id: Option<FtId>,
        ftq: &mut Ftq,
        mmu: &mut dyn InstructionMmu,
        icache: &mut dyn TimingPort,
        active: &[ThreadId],
        now: Cycle,
    ) {
        self.tracker.translation_finished();

        let live = self.status[tid] == ThreadStatus::ItlbWait
            && self.mem_req[tid]
                .as_ref()
                .is_some_and(|m| m.id() == req.id() && m.vaddr() == req.vaddr());

        if !live {
            // Not the demand access. Either it belongs to a queued fetch
            // target (prefetch translation) or it was squashed.
            match ft_id.and_then(|id| ftq.get_mut(tid, id)) {
                Some(ft) => {
                    debug!(
                        target: "fetch",
                        "[tid:{}] prefetch translation for {:#x} completed",
                        tid,
                        req.vaddr().val()
                    );
                    ft.finish_translation(&result, &req, true, now);
                }
                None => {
                    debug!(target: "fetch", "[tid:{}] ignoring itlb completion after squash", tid);
                    self.stats.tlb_squashes += 1;
                }
            }
            return;
        }

        if let Some(ft) = ft_id.and_then(|id| ftq.get_mut(tid, id)) {
            ft.finish_translation(&result, &req, false, now);
        }

        match result {
            Ok(paddr) => {
                debug!(
                    target: "fetch",
                    "[tid:{}] doing instruction read VA {:#x} PA {:#x}",
                    tid,
                    req.vaddr().val(),
                    paddr.val()
                );
                req.set_paddr(paddr);
                self.mem_req[tid] = Some(req.clone());
                let vaddr = req.vaddr().val();
                self.perform_cache_access(vaddr, tid, req, false, mmu, icache, now);
            }
            Err(fault) => {
                self.process_trap(tid, fault, req, now);
            }
        }
        self.stage_status = self.update_fetch_status(active);
    }

    /// Sends a read packet for `req` on the instruction port.
    fn perform_cache_access(
        &mut self,
        vaddr: u64,
        tid: ThreadId,
        req: Request,
        prefetch: bool,
        mmu: &mut dyn InstructionMmu,
        icache: &mut dyn TimingPort,
        _now: Cycle,
    ) -> bool {
        // An address outside backed memory means the predictor wandered
        // off; park the thread until a squash redirects it.
        let paddr = match req.paddr() {
            Some(paddr) if mmu.is_mem_addr(paddr) => paddr,
            Some(paddr) => {
                warn!(
                    target: "fetch",
                    "address {:#x} is outside of physical memory, stopping fetch",
                    paddr.val()
                );
                self.status[tid] = ThreadStatus::NoGoodAddr;
                self.mem_req[tid] = None;
                return false;
            }
            None => {
                debug_assert!(false, "cache access without a physical address");
                self.status[tid] = ThreadStatus::NoGoodAddr;
                self.mem_req[tid] = None;
                return false;
            }
        };

        let req_copy = req.clone();
        let pkt = Packet::read_req(req);

        if !prefetch {
            self.fetch_buffer[tid].expect(vaddr);
            debug_assert_eq!(vaddr, req_copy.vaddr().val());
            debug!(
                target: "fetch",
                "doing instruction read VA {:#x} PA {:#x}",
                vaddr,
                paddr.val()
            );
            self.stats.cache_lines += 1;
        }

        match icache.send_timing(pkt) {
            Err(_dropped) if prefetch => {
                // Prefetches are best-effort; drop on refusal.
                false
            }
            Err(refused) => {
                debug_assert!(self.retry.is_none());
                debug!(target: "fetch", "[tid:{}] out of MSHRs", tid);
                self.status[tid] = ThreadStatus::IcacheWaitRetry;
                self.retry = Some((tid, refused));
                self.cache_blocked = true;
                false
            }
            Ok(()) => {
                self.tracker.insert_in_flight(paddr);
                debug!(
                    target: "fetch",
                    "[tid:{}] sent fetch request to {:#x}, in flight: {}",
                    tid,
                    paddr.val(),
                    self.tracker.in_flight_len()
                );
                if !prefetch {
                    self.status[tid] = ThreadStatus::IcacheWaitResponse;
                    self.probes.on_fetch_request_sent(&req_copy);
                }
                true
            }
        }
    }

    // ------------------------------------------------------------------
    // Prefetch engine
    // ------------------------------------------------------------------

    /// Runs the decoupled prefetch engine for one thread.
    ///
    /// Starts at most one translation and one prefetch per cycle, always
    /// behind the FTQ head: the head is the demand path's business.
    fn process_ftq(
        &mut self,
        tid: ThreadId,
        ftq: &mut Ftq,
        mmu: &mut dyn InstructionMmu,
        icache: &mut dyn TimingPort,
        now: Cycle,
    ) {
        if ftq.size(tid) < 2 || !ftq.is_valid(tid) {
            return;
        }

        // Prefetch translations.
        if self.tracker.can_start_translation() {
            let mut found: Option<(FtId, u64)> = None;
            if let Some(ft) = ftq.find_after_head_mut(tid, |ft| ft.requires_translation()) {
                found = Some((ft.id(), ft.start_addr()));
            }
            if let Some((id, start)) = found {
                let block_pc = self.fetch_buffer_align(start);
                let req = Request::new(
                    self.alloc_req_id(),
                    tid,
                    VirtAddr::new(block_pc),
                    self.fetch_buffer_size,
                    start,
                );
                debug!(
                    target: "fetch",
                    "[tid:{}] translation for {:#x} started",
                    tid, block_pc
                );
                self.start_translation(req, tid, Some(id), ftq, mmu, now);
            }
        } else {
            debug!(target: "fetch", "[tid:{}] can't issue translation, too many outstanding", tid);
            self.stats.pf_translation_limit_reached += 1;
        }

        // Prefetches.
        if self.retry.is_some() || self.cache_blocked {
            debug!(target: "fetch", "[tid:{}] can't issue prefetches, out of MSHRs", tid);
            return;
        }
        if !self.tracker.can_issue_prefetch() {
            debug!(target: "fetch", "[tid:{}] can't issue prefetches, too many outstanding", tid);
            self.stats.pf_limit_reached += 1;
            return;
        }

        let mut candidate: Option<(FtId, Request)> = None;
        if let Some(ft) = ftq.find_after_head_mut(tid, |ft| ft.translation_ready()) {
            if let Some(req) = ft.req().cloned() {
                candidate = Some((ft.id(), req));
            }
        }
        let Some((id, req)) = candidate else { return };
        let Some(paddr) = req.paddr() else { return };

        if self.tracker.contains(paddr) {
            // An access to this block is already in flight from an
            // earlier request; the response will cover this target too.
            debug!(
                target: "fetch",
                "[tid:{}] access to {:#x} already in flight, mark ready",
                tid,
                paddr.val()
            );
            if let Some(ft) = ftq.get_mut(tid, id) {
                ft.mark_ready();
            }
            return;
        }

        let vaddr = req.vaddr().val();
        if self.perform_cache_access(vaddr, tid, req, true, mmu, icache, now) {
            if let Some(ft) = ftq.get_mut(tid, id) {
                ft.prefetch_issued();
            }
            self.tracker.prefetch_issued();
            self.stats.pf_issued += 1;
            debug!(
                target: "fetch",
                "[tid:{}] prefetch request sent for {:#x} ({} outstanding)",
                tid,
                vaddr,
                self.tracker.outstanding_prefetches()
            );
        }
    }

    /// Attributes a non-demand cache response to a prefetched target
    /// behind the FTQ head.
    ///
    /// The head is deliberately excluded: after a squash it may still
    /// hold the request of the dropped demand access, and that response
    /// must be discarded, not accounted as a received prefetch.
    fn try_satisfy_prefetch(&mut self, tid: ThreadId, pkt: &Packet, ftq: &mut Ftq) -> bool {
        if !self.decoupled_front_end {
            return false;
        }
        let Some(ft) = ftq.find_after_head_mut(tid, |ft| ft.req_id() == Some(pkt.req.id()))
        else {
            return false;
        };

        debug!(
            target: "fetch",
            "[tid:{}] prefetch for {:#x} completed",
            tid,
            pkt.req.vaddr().val()
        );

        // Translation and prefetch both done for this target.
        ft.mark_ready();
        self.tracker.prefetch_done();
        self.stats.pf_received += 1;
        true
    }

    // ------------------------------------------------------------------
    // Port callbacks
    // ------------------------------------------------------------------

    /// Handles a response packet from the instruction cache.
    pub fn process_cache_completion(&mut self, pkt: Packet, ftq: &mut Ftq, _now: Cycle) {
        let tid = pkt.req.tid();
        if let Some(paddr) = pkt.req.paddr() {
            self.tracker.remove_in_flight(paddr);
        }

        // Only act if the thread is still waiting on this very access.
        let is_demand = self.status[tid] == ThreadStatus::IcacheWaitResponse
            && self.mem_req[tid]
                .as_ref()
                .is_some_and(|m| m.id() == pkt.req.id());

        if !is_demand {
            if self.try_satisfy_prefetch(tid, &pkt, ftq) {
                return;
            }
            self.stats.icache_squashes += 1;
            return;
        }

        debug!(
            target: "fetch",
            "[tid:{}] received {:#x}, waking up from cache miss",
            tid,
            pkt.req.paddr().map(|p| p.val()).unwrap_or(0)
        );

        self.fetch_buffer[tid].fill(&pkt.data);
        self.switch_to_active();

        // Only resume if we're not drain-stalled as well.
        if self.check_stall(tid) {
            self.status[tid] = ThreadStatus::Blocked;
        } else {
            self.status[tid] = ThreadStatus::IcacheAccessComplete;
        }

        self.mem_req[tid] = None;
    }

    /// Handles a retry notification from the instruction cache.
    pub fn recv_req_retry(&mut self, icache: &mut dyn TimingPort) {
        match self.retry.take() {
            Some((tid, pkt)) => {
                debug_assert!(self.cache_blocked);
                debug_assert_eq!(self.status[tid], ThreadStatus::IcacheWaitRetry);

                let req = pkt.req.clone();
                match icache.send_timing(pkt) {
                    Ok(()) => {
                        self.status[tid] = ThreadStatus::IcacheWaitResponse;
                        if let Some(paddr) = req.paddr() {
                            self.tracker.insert_in_flight(paddr);
                        }
                        self.probes.on_fetch_request_sent(&req);
                        self.cache_blocked = false;
                    }
                    Err(refused) => {
                        self.retry = Some((tid, refused));
                    }
                }
            }
            None => {
                // The access was squashed since it was sent out; just
                // unblock the cache.
                self.cache_blocked = false;
            }
        }
    }

    // ------------------------------------------------------------------
    // Trap path
    // ------------------------------------------------------------------

    /// Delivers a translation fault into decode as a fault-carrying nop.
    ///
    /// When neither fetch bandwidth nor fetch-queue space is available
    /// this cycle, delivery retries at the next cycle.
    fn process_trap(&mut self, tid: ThreadId, fault: Fault, req: Request, now: Cycle) {
        if self.num_inst >= self.fetch_width
            || self.fetch_queue[tid].len() >= self.fetch_queue_size
        {
            debug_assert!(!self.events.trap_scheduled());
            self.events
                .schedule(now + 1, FetchEvent::ProcessTrap { tid, fault, req });
            return;
        }

        debug!(
            target: "fetch",
            "[tid:{}] translation of {:#x} faulted, building noop",
            tid,
            req.vaddr().val()
        );
        self.mem_req[tid] = None;

        // A nop carries the fault to commit. This thread does nothing
        // until commit handles it; only a squash can wake it otherwise.
        let fetch_pc = self.pc[tid];
        let mut inst = self.build_inst(
            tid,
            StaticInst::nop(self.inst_size),
            None,
            fetch_pc,
            fetch_pc,
        );
        inst.not_an_inst = true;
        inst.pred_pc = fetch_pc;
        inst.fault = Some(fault.clone());
        self.fetch_queue[tid].push_back(Rc::new(inst));

        self.wrote_to_time_buffer = true;
        self.status[tid] = ThreadStatus::TrapPending;

        debug!(
            target: "fetch",
            "[tid:{}] blocked on trap, fault ({}) at PC {:#x}",
            tid,
            fault,
            fetch_pc.inst_addr()
        );
    }

    // ------------------------------------------------------------------
    // Instruction issue
    // ------------------------------------------------------------------

    /// Allocates a sequence number and constructs a dynamic instruction.
    fn build_inst(
        &mut self,
        tid: ThreadId,
        static_inst: Arc<StaticInst>,
        macroop: Option<Arc<StaticInst>>,
        this_pc: PcState,
        next_pc: PcState,
    ) -> DynInst {
        let seq = self.next_seq;
        self.next_seq += 1;

        debug!(
            target: "fetch",
            "[tid:{}] instruction {} at PC {:#x} created [sn:{}]",
            tid,
            static_inst.mnemonic(),
            this_pc.inst_addr(),
            seq
        );

        // Track whether an interrupt can be taken at this boundary.
        self.delayed_commit[tid] = static_inst.is_delayed_commit();

        DynInst {
            seq_num: seq,
            tid,
            static_inst,
            macroop,
            pc: this_pc,
            pred_pc: next_pc,
            fault: None,
            not_an_inst: false,
        }
    }

    /// Runs the fetch pass for one arbitrated thread.
    fn fetch(
        &mut self,
        status_change: &mut bool,
        ctx: &mut FetchContext<'_>,
        inputs: &FetchInputs<'_>,
        out: &mut FetchOutputs,
    ) {
        let now = ctx.now;
        let active = ctx.active_threads;

        let tid = match self.arbiter.choose(
            self.fetch_policy,
            &self.status,
            active,
            &inputs.from_iew.iew,
        ) {
            Some(tid) => tid,
            None => {
                // Breaks the fetching loop in tick().
                self.threads_fetched = self.num_fetching_threads;
                if self.num_threads == 1 {
                    self.profile_stall(0, active);
                }
                return;
            }
        };

        let ftq = &mut *ctx.ftq;
        let bac = &mut *ctx.bac;

        if !self.ftq_ready(tid, status_change, ftq) {
            debug!(target: "fetch", "[tid:{}] FTQ not ready", tid);
            self.stats.ftq_stall_cycles += 1;
            return;
        }

        debug!(target: "fetch", "[tid:{}] attempting to fetch", tid);

        let mut this_pc = self.pc[tid];
        let mut pc_offset = self.fetch_offset[tid];
        let pc_mask = self.decoders[tid].pc_mask();
        let inst_size = self.inst_size;
        let mut fetch_addr = (this_pc.inst_addr() + pc_offset) & pc_mask;
        let mut in_rom = is_rom_micro_pc(this_pc.micro_pc());

        let mut cur_ft_id: Option<FtId> = ftq.read_head(tid).map(|ft| ft.id());

        if self.decoupled_front_end {
            let in_range = ftq
                .read_head(tid)
                .is_some_and(|ft| ft.in_range(this_pc.inst_addr()));
            if !in_range {
                debug!(
                    target: "fetch",
                    "[tid:{}] PC {:#x} not within fetch target",
                    tid,
                    this_pc.inst_addr()
                );
                self.bac_resteer(&this_pc, tid, ftq, out);
                self.stats.ftq_stall_cycles += 1;
                return;
            }
        }

        // If returning from the delay of a cache miss then update the
        // status to running, otherwise do the cache access.
        if self.status[tid] == ThreadStatus::IcacheAccessComplete {
            debug!(target: "fetch", "[tid:{}] icache miss is complete", tid);
            self.status[tid] = ThreadStatus::Running;
            *status_change = true;
        } else if self.status[tid] == ThreadStatus::Running {
            let fetch_buffer_block_pc = self.fetch_buffer_align(fetch_addr);

            // Start a cache access unless the buffer already holds the
            // block or we still have micro-ops to expand.
            if !(self.fetch_buffer[tid].holds(fetch_buffer_block_pc)
                && self.ftq_ready(tid, status_change, ftq))
                && !in_rom
                && self.macroop[tid].is_none()
            {
                debug!(
                    target: "fetch",
                    "[tid:{}] attempting to translate and read instruction, starting at PC {:#x}",
                    tid,
                    this_pc.inst_addr()
                );
                self.fetch_cache_line(fetch_addr, tid, this_pc.inst_addr(), ftq, ctx.mmu, ctx.icache, now);

                match self.status[tid] {
                    ThreadStatus::IcacheWaitResponse => {
                        self.stats.thread_icache_stall_cycles[tid] += 1
                    }
                    ThreadStatus::ItlbWait => self.stats.tlb_cycles += 1,
                    ThreadStatus::FtqEmpty => self.stats.ftq_stall_cycles += 1,
                    _ => self.stats.misc_stall_cycles += 1,
                }
                return;
            } else if self.check_interrupt(this_pc.inst_addr()) && !self.delayed_commit[tid] {
                // An interrupt is posted and we're not mid-macro-op:
                // stall instead of fetching past the interrupt point.
                self.stats.misc_stall_cycles += 1;
                debug!(target: "fetch", "[tid:{}] fetch is stalled", tid);
                return;
            }
        } else {
            if self.status[tid] == ThreadStatus::Idle {
                self.stats.idle_cycles += 1;
                debug!(target: "fetch", "[tid:{}] fetch is idle", tid);
            }
            return;
        }

        self.stats.cycles += 1;
        let mut next_pc = this_pc;
        let mut cur_macroop = self.macroop[tid].clone();

        debug!(target: "fetch", "[tid:{}] adding instructions to queue to decode", tid);

        let mut predicted_branch = false;
        let mut quiesce = false;

        let num_insts = self.fetch_buffer_size / inst_size;
        let mut blk_offset = (fetch_addr.wrapping_sub(self.fetch_buffer[tid].pc())
            / inst_size as u64) as usize;

        while self.num_inst < self.fetch_width
            && self.fetch_queue[tid].len() < self.fetch_queue_size
            && !predicted_branch
            && !quiesce
        {
            // With a decoupled front end the FTQ and the current target
            // must stay valid.
            if self.decoupled_front_end && (!ftq.is_valid(tid) || cur_ft_id.is_none()) {
                break;
            }

            // We need more memory unless a micro-op stream or the decoder
            // can already supply an instruction.
            let need_mem =
                !in_rom && cur_macroop.is_none() && !self.decoders[tid].inst_ready();
            fetch_addr = (this_pc.inst_addr() + pc_offset) & pc_mask;
            let fetch_buffer_block_pc = self.fetch_buffer_align(fetch_addr);

            if need_mem {
                // Stop if the buffer went stale or ran out; the next tick
                // re-issues the access.
                if !self.fetch_buffer[tid].holds(fetch_buffer_block_pc) {
                    break;
                }
                if blk_offset >= num_insts {
                    break;
                }

                let slice_off = blk_offset * inst_size;
                self.decoders[tid].more_bytes(
                    &this_pc,
                    fetch_addr,
                    self.fetch_buffer[tid].slice(slice_off, inst_size),
                );

                if self.decoders[tid].need_more_bytes() {
                    blk_offset += 1;
                    fetch_addr += inst_size as u64;
                    pc_offset += inst_size as u64;
                }
            }

            // Extract as many instructions and/or micro-ops as possible
            // from the bytes processed so far.
            loop {
                let mut new_macro = false;
                let mut static_inst: Option<Arc<StaticInst>> = None;

                if cur_macroop.is_none() && !in_rom {
                    if self.decoders[tid].inst_ready() {
                        let decoded = self.decoders[tid].decode(&this_pc);
                        self.stats.thread_insts[tid] += 1;

                        if decoded.is_macroop() {
                            cur_macroop = Some(decoded);
                        } else {
                            pc_offset = 0;
                            static_inst = Some(decoded);
                        }
                    } else {
                        // Need more bytes for this instruction.
                        break;
                    }
                }

                if cur_macroop.is_some() || in_rom {
                    let uop = if in_rom {
                        self.decoders[tid]
                            .fetch_rom_microop(this_pc.micro_pc(), cur_macroop.as_ref())
                    } else {
                        match &cur_macroop {
                            Some(mac) => mac.fetch_microop(this_pc.micro_pc()),
                            None => StaticInst::nop(inst_size),
                        }
                    };
                    new_macro |= uop.is_last_microop();
                    static_inst = Some(uop);
                }

                let static_inst = match static_inst {
                    Some(si) => si,
                    None => break,
                };

                let mut inst =
                    self.build_inst(tid, static_inst, cur_macroop.clone(), this_pc, next_pc);
                self.num_inst += 1;

                next_pc = this_pc;

                // Get the next PC from the BAC.
                let ft_ref = cur_ft_id.and_then(|id| ftq.get(tid, id));
                predicted_branch |= bac.update_pc(&inst, &mut next_pc, ft_ref);
                inst.pred_pc = next_pc;

                if inst.is_control() {
                    self.stats.thread_branches[tid] += 1;
                }
                if predicted_branch {
                    debug!(
                        target: "fetch",
                        "branch detected with PC {:#x} -> targ {:#x}",
                        this_pc.inst_addr(),
                        next_pc.inst_addr()
                    );
                    self.stats.predicted_branches += 1;
                }

                let inst = Rc::new(inst);
                self.probes.on_inst_fetched(&inst);
                self.fetch_queue[tid].push_back(inst.clone());
                debug_assert!(self.fetch_queue[tid].len() <= self.fetch_queue_size);

                new_macro |= this_pc.inst_addr() != next_pc.inst_addr();

                // Move to the next instruction, unless we have a branch.
                this_pc = next_pc;
                in_rom = is_rom_micro_pc(this_pc.micro_pc());

                if new_macro {
                    fetch_addr = this_pc.inst_addr() & pc_mask;
                    blk_offset = (fetch_addr.wrapping_sub(self.fetch_buffer[tid].pc())
                        / inst_size as u64) as usize;
                    pc_offset = 0;
                    cur_macroop = None;
                }

                // Clear the target pointer once the PC leaves its range.
                if let Some(id) = cur_ft_id {
                    let still_in = ftq
                        .get(tid, id)
                        .is_some_and(|ft| ft.in_range(this_pc.inst_addr()));
                    if !still_in {
                        cur_ft_id = None;
                    }
                }

                if inst.is_quiesce() {
                    debug!(target: "fetch", "quiesce instruction encountered, halting fetch");
                    self.status[tid] = ThreadStatus::QuiescePending;
                    *status_change = true;
                    quiesce = true;
                    break;
                }
                if self.decoupled_front_end && cur_ft_id.is_none() {
                    break;
                }

                if !((cur_macroop.is_some() || self.decoders[tid].inst_ready())
                    && self.num_inst < self.fetch_width
                    && self.fetch_queue[tid].len() < self.fetch_queue_size)
                {
                    break;
                }
            }

            // Re-evaluate whether the next instruction comes from the
            // micro-op ROM.
            in_rom = is_rom_micro_pc(this_pc.micro_pc());
        }

        if predicted_branch {
            debug!(target: "fetch", "[tid:{}] done fetching, predicted branch encountered", tid);
        } else if self.num_inst >= self.fetch_width {
            debug!(target: "fetch", "[tid:{}] done fetching, reached fetch bandwidth", tid);
        } else if blk_offset >= num_insts {
            debug!(target: "fetch", "[tid:{}] done fetching, reached the end of the fetch buffer", tid);
        } else if self.decoupled_front_end && cur_ft_id.is_none() {
            debug!(target: "fetch", "[tid:{}] done fetching, reached end of fetch target", tid);
        }

        if self.decoupled_front_end && cur_ft_id.is_none() {
            debug!(target: "fetch", "done with fetch target, pop from FTQ");
            if !ftq.update_head(tid) {
                // The predictor disagrees with the actual control flow.
                self.bac_resteer(&this_pc, tid, ftq, out);
            }
        }

        self.macroop[tid] = cur_macroop.clone();
        self.fetch_offset[tid] = pc_offset;
        self.pc[tid] = this_pc;

        if self.num_inst > 0 {
            self.wrote_to_time_buffer = true;
        }

        // Pipeline the next access if we're crossing a fetch-buffer
        // boundary and no blocking state holds.
        fetch_addr = (this_pc.inst_addr() + pc_offset) & pc_mask;
        let fetch_buffer_block_pc = self.fetch_buffer_align(fetch_addr);
        self.issue_pipelined_ifetch[tid] = fetch_buffer_block_pc != self.fetch_buffer[tid].pc()
            && !matches!(
                self.status[tid],
                ThreadStatus::IcacheWaitResponse
                    | ThreadStatus::ItlbWait
                    | ThreadStatus::FtqEmpty
                    | ThreadStatus::IcacheWaitRetry
                    | ThreadStatus::QuiescePending
            )
            && (!self.decoupled_front_end || ftq.is_head_ready(tid))
            && cur_macroop.is_none();
    }

    /// Issues the pipelined access prepared by this cycle's fetch pass.
    fn pipeline_icache_accesses(
        &mut self,
        tid: ThreadId,
        ftq: &mut Ftq,
        mmu: &mut dyn InstructionMmu,
        icache: &mut dyn TimingPort,
        now: Cycle,
    ) {
        let this_pc = self.pc[tid];
        if is_rom_micro_pc(this_pc.micro_pc()) {
            return;
        }

        let pc_offset = self.fetch_offset[tid];
        let fetch_addr = (this_pc.inst_addr() + pc_offset) & self.decoders[tid].pc_mask();
        let fetch_buffer_block_pc = self.fetch_buffer_align(fetch_addr);

        // Unless the buffer already holds the block, fetch it.
        if !self.fetch_buffer[tid].holds(fetch_buffer_block_pc) {
            debug!(
                target: "fetch",
                "[tid:{}] issuing a pipelined I-cache access, starting at PC {:#x}",
                tid,
                this_pc.inst_addr()
            );
            self.fetch_cache_line(fetch_addr, tid, this_pc.inst_addr(), ftq, mmu, icache, now);
        }
    }

    /// Attributes a cycle in which no thread could fetch to its cause.
    fn profile_stall(&mut self, tid: ThreadId, active: &[ThreadId]) {
        debug!(target: "fetch", "there are no more threads available to fetch from");

        if self.stalls[tid].drain {
            self.stats.pending_drain_cycles += 1;
        } else if active.is_empty() {
            self.stats.no_active_thread_stall_cycles += 1;
        } else {
            match self.status[tid] {
                ThreadStatus::Blocked => self.stats.blocked_cycles += 1,
                ThreadStatus::Squashing => self.stats.squash_cycles += 1,
                ThreadStatus::IcacheWaitResponse => {
                    self.stats.thread_icache_stall_cycles[tid] += 1
                }
                ThreadStatus::ItlbWait => self.stats.tlb_cycles += 1,
                ThreadStatus::FtqEmpty => self.stats.ftq_stall_cycles += 1,
                ThreadStatus::TrapPending => self.stats.pending_trap_stall_cycles += 1,
                ThreadStatus::QuiescePending => self.stats.pending_quiesce_stall_cycles += 1,
                ThreadStatus::IcacheWaitRetry => {
                    self.stats.icache_wait_retry_stall_cycles += 1
                }
                ThreadStatus::NoGoodAddr => {
                    debug!(target: "fetch", "[tid:{}] fetch predicted non-executable address", tid)
                }
                _ => debug!(
                    target: "fetch",
                    "[tid:{}] unexpected fetch stall reason ({:?})",
                    tid,
                    self.status[tid]
                ),
            }
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Current controller state of a thread.
    pub fn thread_status(&self, tid: ThreadId) -> ThreadStatus {
        self.status[tid]
    }

    /// Current PC of a thread.
    pub fn pc(&self, tid: ThreadId) -> PcState {
        self.pc[tid]
    }

    /// Redirects a thread's PC (used at startup).
    pub fn set_pc(&mut self, tid: ThreadId, pc: PcState) {
        self.pc[tid] = pc;
    }

    /// The demand request a thread is waiting on, if any.
    pub fn mem_req(&self, tid: ThreadId) -> Option<&Request> {
        self.mem_req[tid].as_ref()
    }

    /// A thread's fetch queue.
    pub fn fetch_queue(&self, tid: ThreadId) -> &VecDeque<DynInstPtr> {
        &self.fetch_queue[tid]
    }

    /// A thread's fetch buffer.
    pub fn fetch_buffer(&self, tid: ThreadId) -> &FetchBuffer {
        &self.fetch_buffer[tid]
    }

    /// The macro-op a thread is currently expanding, if any.
    pub fn current_macroop(&self, tid: ThreadId) -> Option<&Arc<StaticInst>> {
        self.macroop[tid].as_ref()
    }

    /// Whether interrupts are inhibited at this thread's fetch point.
    pub fn delayed_commit(&self, tid: ThreadId) -> bool {
        self.delayed_commit[tid]
    }

    /// The outstanding-request tracker.
    pub fn tracker(&self) -> &OutstandingRequests {
        &self.tracker
    }

    /// Whether the cache refused a demand packet and has not retried yet.
    pub fn cache_blocked(&self) -> bool {
        self.cache_blocked
    }

    /// The thread owning the held retry packet, if one is held.
    pub fn retry_tid(&self) -> Option<ThreadId> {
        self.retry.as_ref().map(|(tid, _)| *tid)
    }

    /// Whether an interrupt window is open.
    pub fn interrupt_pending(&self) -> bool {
        self.interrupt_pending
    }

    /// Aggregate stage activity.
    pub fn stage_activity(&self) -> StageActivity {
        self.stage_status
    }
}
