use fdip_core::common::ThreadId;
use fdip_core::config::Config;
use fdip_core::core::bac::SequentialBac;
use fdip_core::core::fetch::ftq::Ftq;
use fdip_core::core::fetch::signals::{FetchInputs, FetchOutputs, TimeStruct};
use fdip_core::core::fetch::{Fetch, FetchContext};
use fdip_core::core::inst::DynInstPtr;
use fdip_core::isa::demo::{assemble, DemoDecoder, DemoOp};
use fdip_core::isa::{InstDecoder, PcState};
use fdip_core::mem::packet::Packet;
use fdip_core::sim::Cycle;

use crate::common::mocks::{MockIcache, MockMmu};

/// Memory window backing the mock cache in tests.
pub const MEM_SIZE: usize = 0x2_0000;

/// A default configuration tuned for the tests: 16-byte fetch buffer,
/// width 4, single thread.
pub fn base_config() -> Config {
    let mut config = Config::default();
    config.fetch.fetch_buffer_size = 16;
    config
}

/// `base_config` with the decoupled front end switched off.
pub fn non_decoupled_config() -> Config {
    let mut config = base_config();
    config.fetch.decoupled_front_end = false;
    config
}

/// Decoupled configuration whose fetch buffer spans a whole cache block,
/// so one fetch target is exactly one demand access.
pub fn block_buffer_config() -> Config {
    let mut config = Config::default();
    config.fetch.fetch_buffer_size = 64;
    config
}

/// The fetch stage wired to controllable mocks.
pub struct TestBench {
    pub fetch: Fetch,
    pub ftq: Ftq,
    pub bac: SequentialBac,
    pub mmu: MockMmu,
    pub icache: MockIcache,
    /// Signals observed by the stage at the next `tick` (no wire delay).
    pub signals: TimeStruct,
    pub outputs: FetchOutputs,
    pub cycle: Cycle,
    active: Vec<ThreadId>,
}

impl TestBench {
    pub fn new(config: &Config) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let n = config.smt.num_threads;
        let decoders: Vec<Box<dyn InstDecoder>> = (0..n)
            .map(|_| Box::new(DemoDecoder::new()) as Box<dyn InstDecoder>)
            .collect();
        let mut fetch = Fetch::new(config, decoders).expect("valid test configuration");
        fetch.reset_stage(&vec![0; n]);

        Self {
            fetch,
            ftq: Ftq::new(n, config.fetch.cache_blk_size),
            bac: SequentialBac,
            mmu: MockMmu::new(1),
            icache: MockIcache::new(0, MEM_SIZE),
            signals: TimeStruct::default(),
            outputs: FetchOutputs::new(n),
            cycle: 0,
            active: (0..n).collect(),
        }
    }

    /// Assembles `ops` at `addr` and points the thread's PC there.
    pub fn load_program(&mut self, tid: ThreadId, addr: u64, ops: &[DemoOp]) {
        self.icache.load(addr, &assemble(ops));
        self.fetch.set_pc(tid, PcState::new(addr));
    }

    /// Runs one cycle. Signals set on `self.signals` are observed by
    /// this tick and then cleared.
    pub fn tick(&mut self) -> &FetchOutputs {
        let inputs = FetchInputs {
            from_decode: &self.signals,
            from_iew: &self.signals,
            from_commit: &self.signals,
        };
        let mut ctx = FetchContext {
            now: self.cycle,
            ftq: &mut self.ftq,
            bac: &mut self.bac,
            mmu: &mut self.mmu,
            icache: &mut self.icache,
            active_threads: &self.active,
        };
        self.fetch.tick(&mut ctx, &inputs, &mut self.outputs);
        self.cycle += 1;
        self.signals = TimeStruct::default();
        &self.outputs
    }

    /// Runs `n` cycles, collecting every instruction handed to decode.
    pub fn run(&mut self, n: usize) -> Vec<DynInstPtr> {
        let mut delivered = Vec::new();
        for _ in 0..n {
            self.tick();
            delivered.extend(self.outputs.to_decode.iter().cloned());
        }
        delivered
    }

    /// Runs `n` cycles, answering every accepted cache access between
    /// cycles, and collects every instruction handed to decode.
    pub fn run_auto(&mut self, n: usize) -> Vec<DynInstPtr> {
        let mut delivered = Vec::new();
        for _ in 0..n {
            self.tick();
            delivered.extend(self.outputs.to_decode.iter().cloned());
            while !self.icache.sent.is_empty() {
                self.respond_oldest();
            }
        }
        delivered
    }

    /// Delivers a cache response to the stage.
    pub fn deliver(&mut self, pkt: Packet) {
        self.fetch
            .process_cache_completion(pkt, &mut self.ftq, self.cycle);
    }

    /// Responds to the oldest accepted cache access.
    pub fn respond_oldest(&mut self) {
        let pkt = self.icache.make_response();
        self.deliver(pkt);
    }
}
