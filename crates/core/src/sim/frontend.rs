//! Top-level front-end driver.
//!
//! Owns the fetch stage together with its collaborators (FTQ, branch
//! unit, MMU, instruction cache) and the backward signal buffer, and runs
//! them one cycle at a time. Within a cycle the stage ticks first and
//! cache responses are delivered afterwards, so a response becomes
//! visible to the state machine at the next clock edge.

use crate::common::{ConfigError, ThreadId};
use crate::config::Config;
use crate::core::bac::{BranchUnit, SequentialBac};
use crate::core::fetch::ftq::Ftq;
use crate::core::fetch::signals::{FetchInputs, FetchOutputs, TimeStruct};
use crate::core::fetch::{Fetch, FetchContext};
use crate::isa::demo::DemoDecoder;
use crate::isa::{InstDecoder, PcState};
use crate::mem::icache::SimpleIcache;
use crate::mem::mmu::SimpleMmu;
use crate::sim::time_buffer::TimeBuffer;
use crate::sim::Cycle;

/// The fetch stage wired to a demo memory system.
pub struct FrontEnd {
    /// The fetch stage under test.
    pub fetch: Fetch,
    /// Fetch-target queue (normally filled by the branch unit).
    pub ftq: Ftq,
    /// Branch/address-calculation unit.
    pub bac: Box<dyn BranchUnit>,
    /// Identity-mapped instruction MMU.
    pub mmu: SimpleMmu,
    /// Fixed-latency instruction cache.
    pub icache: SimpleIcache,
    time_buffer: TimeBuffer<TimeStruct>,
    outputs: FetchOutputs,
    active_threads: Vec<ThreadId>,
    decode_to_fetch: usize,
    iew_to_fetch: usize,
    commit_to_fetch: usize,
    cycle: Cycle,
}

impl FrontEnd {
    /// Builds the front end from a configuration, with demo decoders.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let n = config.smt.num_threads;

        let decoders: Vec<Box<dyn InstDecoder>> = (0..n)
            .map(|_| Box::new(DemoDecoder::new()) as Box<dyn InstDecoder>)
            .collect();
        let mut fetch = Fetch::new(config, decoders)?;
        fetch.reset_stage(&vec![0; n]);

        Ok(Self {
            fetch,
            ftq: Ftq::new(n, config.fetch.cache_blk_size),
            bac: Box::new(SequentialBac),
            mmu: SimpleMmu::new(
                config.system.mem_base,
                config.system.mem_size,
                config.system.translation_latency,
            ),
            icache: SimpleIcache::new(
                config.system.mem_base,
                config.system.mem_size as usize,
                config.system.icache_latency,
                config.system.icache_mshrs,
            ),
            time_buffer: TimeBuffer::new(config.delays.max_delay()),
            outputs: FetchOutputs::new(n),
            active_threads: (0..n).collect(),
            decode_to_fetch: config.delays.decode_to_fetch,
            iew_to_fetch: config.delays.iew_to_fetch,
            commit_to_fetch: config.delays.commit_to_fetch,
            cycle: 0,
        })
    }

    /// Current cycle number.
    pub fn cycle(&self) -> Cycle {
        self.cycle
    }

    /// Loads a byte image at `addr` (identity-mapped).
    pub fn load_program(&mut self, addr: u64, image: &[u8]) {
        self.icache.load(addr, image);
    }

    /// Points a thread at its start PC.
    pub fn set_start_pc(&mut self, tid: ThreadId, addr: u64) {
        self.fetch.set_pc(tid, PcState::new(addr));
    }

    /// The signal entry being produced this cycle, for injecting
    /// squashes, stalls, and interrupt flags from a driver.
    pub fn signals_mut(&mut self) -> &mut TimeStruct {
        self.time_buffer.now_mut()
    }

    /// Orders a commit squash of `tid` toward `pc`.
    ///
    /// The squash signal travels through the delayed wire; the predictor
    /// reacts by dropping its fetch targets right away.
    pub fn inject_commit_squash(&mut self, tid: ThreadId, pc: u64) {
        let entry = self.time_buffer.now_mut();
        entry.commit[tid].squash = true;
        entry.commit[tid].pc = PcState::new(pc);
        self.ftq.invalidate(tid);
    }

    /// Runs one cycle; returns what the stage produced.
    pub fn tick(&mut self) -> &FetchOutputs {
        let now = self.cycle;

        let inputs = FetchInputs {
            from_decode: self.time_buffer.read(self.decode_to_fetch),
            from_iew: self.time_buffer.read(self.iew_to_fetch),
            from_commit: self.time_buffer.read(self.commit_to_fetch),
        };
        let mut ctx = FetchContext {
            now,
            ftq: &mut self.ftq,
            bac: &mut *self.bac,
            mmu: &mut self.mmu,
            icache: &mut self.icache,
            active_threads: &self.active_threads,
        };
        self.fetch.tick(&mut ctx, &inputs, &mut self.outputs);

        // Memory side: deliver responses and retry notifications that
        // fall due at the end of this cycle.
        self.icache.tick(now);
        for pkt in self.icache.take_ready_responses() {
            self.fetch.process_cache_completion(pkt, &mut self.ftq, now);
        }
        if self.icache.take_retry() {
            self.fetch.recv_req_retry(&mut self.icache);
        }

        self.time_buffer.advance();
        self.cycle += 1;
        &self.outputs
    }
}
