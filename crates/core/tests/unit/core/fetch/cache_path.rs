//! Demand Cache-Line Fetch Path Tests.
//!
//! Verifies the translation-then-access pipeline of the demand path:
//!   1. Miss timeline — translation, access, response, decode delivery
//!   2. Retry protocol — refused demand packet, cache-blocked, resend
//!   3. Bad addresses — non-memory physical address parks the thread
//!   4. Stale responses — squashed accesses are counted and discarded
//!   5. Macro-op expansion — one macro-op emits its micro-ops in order

use crate::common::harness::{non_decoupled_config, TestBench};
use fdip_core::core::fetch::ThreadStatus;
use fdip_core::isa::demo::DemoOp;
use fdip_core::isa::PcState;

// ══════════════════════════════════════════════════════════
// 1. Demand miss timeline
// ══════════════════════════════════════════════════════════

#[test]
fn demand_miss_timeline_delivers_full_buffer() {
    let mut tb = TestBench::new(&non_decoupled_config());
    tb.load_program(0, 0x1000, &[DemoOp::Alu; 8]);

    // C0: the demand access starts with a translation.
    tb.tick();
    assert_eq!(tb.fetch.thread_status(0), ThreadStatus::ItlbWait);
    assert_eq!(tb.fetch.tracker().outstanding_translations(), 1);
    assert!(tb.icache.sent.is_empty(), "no cache access before translation");

    // C1: translation completes, the cache read goes out.
    tb.tick();
    assert_eq!(tb.fetch.thread_status(0), ThreadStatus::IcacheWaitResponse);
    assert_eq!(tb.fetch.tracker().outstanding_translations(), 0);
    assert_eq!(tb.icache.sent.len(), 1);

    let req = tb.fetch.mem_req(0).expect("demand request outstanding");
    let paddr = req.paddr().expect("request was translated");
    assert!(
        tb.fetch.tracker().contains(paddr),
        "demand address is tracked in the outstanding set"
    );

    // C2: still waiting; the response arrives at the end of the cycle.
    tb.tick();
    assert_eq!(tb.fetch.thread_status(0), ThreadStatus::IcacheWaitResponse);
    tb.respond_oldest();
    assert_eq!(tb.fetch.thread_status(0), ThreadStatus::IcacheAccessComplete);
    assert!(tb.fetch.fetch_buffer(0).holds(0x1000));
    assert!(tb.fetch.mem_req(0).is_none());

    // C3: a full fetch width of instructions reaches decode.
    tb.tick();
    assert_eq!(tb.outputs.to_decode.len(), 4);
    let seqs: Vec<u64> = tb.outputs.to_decode.iter().map(|i| i.seq_num).collect();
    assert!(
        seqs.windows(2).all(|w| w[1] == w[0] + 1),
        "sequence numbers are dense: {:?}",
        seqs
    );
    for (i, inst) in tb.outputs.to_decode.iter().enumerate() {
        assert_eq!(inst.pc.inst_addr(), 0x1000 + 4 * i as u64);
        assert!(inst.fault.is_none());
    }
}

#[test]
fn buffer_alignment_is_idempotent_across_refetch() {
    // Fetching from a mid-buffer PC targets the aligned block; the block
    // the buffer ends up holding is the same one a block-aligned PC
    // would have produced.
    let mut tb = TestBench::new(&non_decoupled_config());
    tb.load_program(0, 0x1000, &[DemoOp::Alu; 8]);
    tb.fetch.set_pc(0, PcState::new(0x1008));

    tb.tick();
    tb.tick();
    tb.respond_oldest();
    assert!(tb.fetch.fetch_buffer(0).holds(0x1000));

    // Decode starts at the requested PC, not the block base.
    tb.tick();
    assert_eq!(tb.outputs.to_decode[0].pc.inst_addr(), 0x1008);
}

// ══════════════════════════════════════════════════════════
// 2. Cache retry protocol
// ══════════════════════════════════════════════════════════

#[test]
fn refused_demand_waits_for_retry() {
    let mut tb = TestBench::new(&non_decoupled_config());
    tb.load_program(0, 0x1000, &[DemoOp::Alu; 4]);
    tb.icache.accept = false;

    tb.tick(); // translation
    tb.tick(); // access refused
    assert_eq!(tb.fetch.thread_status(0), ThreadStatus::IcacheWaitRetry);
    assert!(tb.fetch.cache_blocked());
    assert_eq!(tb.fetch.retry_tid(), Some(0));
    assert!(tb.icache.sent.is_empty());

    // Nothing changes while the cache stays blocked.
    tb.tick();
    assert_eq!(tb.fetch.thread_status(0), ThreadStatus::IcacheWaitRetry);
    assert!(tb.fetch.stats.icache_wait_retry_stall_cycles > 0);

    // The cache frees an MSHR and signals the retry.
    tb.icache.accept = true;
    tb.fetch.recv_req_retry(&mut tb.icache);
    assert_eq!(tb.fetch.thread_status(0), ThreadStatus::IcacheWaitResponse);
    assert!(!tb.fetch.cache_blocked());
    assert_eq!(tb.fetch.retry_tid(), None);
    assert_eq!(tb.icache.sent.len(), 1, "held packet was re-sent");

    tb.respond_oldest();
    assert_eq!(tb.fetch.thread_status(0), ThreadStatus::IcacheAccessComplete);
}

#[test]
fn retry_after_squash_only_unblocks_the_cache() {
    let mut tb = TestBench::new(&non_decoupled_config());
    tb.load_program(0, 0x1000, &[DemoOp::Alu; 4]);
    tb.icache.accept = false;

    tb.tick();
    tb.tick();
    assert_eq!(tb.fetch.thread_status(0), ThreadStatus::IcacheWaitRetry);

    // The squash drops the held packet but the cache stays blocked
    // until its retry notification.
    tb.signals.commit[0].squash = true;
    tb.signals.commit[0].pc = PcState::new(0x4000);
    tb.tick();
    assert_eq!(tb.fetch.retry_tid(), None);
    assert!(tb.fetch.cache_blocked());

    tb.icache.accept = true;
    tb.fetch.recv_req_retry(&mut tb.icache);
    assert!(!tb.fetch.cache_blocked());
    assert!(tb.icache.sent.is_empty(), "no packet left to resend");
}

// ══════════════════════════════════════════════════════════
// 3. Non-memory physical address
// ══════════════════════════════════════════════════════════

#[test]
fn non_memory_address_parks_thread_until_squash() {
    let mut tb = TestBench::new(&non_decoupled_config());
    tb.mmu.mem_limit = 0x2000;
    tb.fetch.set_pc(0, PcState::new(0x3000));

    tb.tick(); // translation
    tb.tick(); // identity translation lands outside memory
    assert_eq!(tb.fetch.thread_status(0), ThreadStatus::NoGoodAddr);
    assert!(tb.fetch.mem_req(0).is_none());
    assert!(tb.icache.sent.is_empty());

    // Waits around until commit squashes to somewhere sane.
    tb.run(3);
    assert_eq!(tb.fetch.thread_status(0), ThreadStatus::NoGoodAddr);

    tb.signals.commit[0].squash = true;
    tb.signals.commit[0].pc = PcState::new(0x1000);
    tb.tick();
    assert_eq!(tb.fetch.thread_status(0), ThreadStatus::Squashing);
    assert_eq!(tb.fetch.pc(0).inst_addr(), 0x1000);

    // Next cycle the thread resumes and starts translating the new path.
    tb.tick();
    assert_eq!(tb.fetch.thread_status(0), ThreadStatus::ItlbWait);
}

// ══════════════════════════════════════════════════════════
// 4. Stale response accounting
// ══════════════════════════════════════════════════════════

#[test]
fn squashed_demand_response_is_discarded() {
    let mut tb = TestBench::new(&non_decoupled_config());
    tb.load_program(0, 0x1000, &[DemoOp::Alu; 4]);

    tb.tick();
    tb.tick();
    assert_eq!(tb.fetch.thread_status(0), ThreadStatus::IcacheWaitResponse);

    tb.signals.commit[0].squash = true;
    tb.signals.commit[0].pc = PcState::new(0x4000);
    tb.tick();
    assert!(tb.fetch.mem_req(0).is_none());

    let before = tb.fetch.stats.icache_squashes;
    tb.respond_oldest();
    assert_eq!(tb.fetch.stats.icache_squashes, before + 1);
    assert!(
        !tb.fetch.fetch_buffer(0).is_valid(),
        "stale bytes must not land in the fetch buffer"
    );
    assert_eq!(tb.fetch.thread_status(0), ThreadStatus::Squashing);
}

// ══════════════════════════════════════════════════════════
// 5. Macro-op expansion
// ══════════════════════════════════════════════════════════

#[test]
fn macroop_expands_into_microops() {
    let mut tb = TestBench::new(&non_decoupled_config());
    tb.load_program(0, 0x1000, &[DemoOp::Macro(3), DemoOp::Alu, DemoOp::Alu, DemoOp::Alu]);

    tb.tick();
    tb.tick();
    tb.tick();
    tb.respond_oldest();
    tb.tick();

    let insts = &tb.outputs.to_decode;
    assert_eq!(insts.len(), 4, "three micro-ops plus the following alu");

    for (upc, inst) in insts[..3].iter().enumerate() {
        assert_eq!(inst.pc.inst_addr(), 0x1000);
        assert_eq!(inst.pc.micro_pc(), upc as u16);
        assert!(inst.macroop.is_some());
    }
    assert!(insts[0].is_delayed_commit());
    assert!(insts[2].is_last_microop());
    assert!(!insts[2].is_delayed_commit());

    assert_eq!(insts[3].pc.inst_addr(), 0x1004);
    assert!(insts[3].macroop.is_none());

    // The expansion finished, so interrupts are no longer inhibited.
    assert!(!tb.fetch.delayed_commit(0));
    assert!(tb.fetch.current_macroop(0).is_none());
}
