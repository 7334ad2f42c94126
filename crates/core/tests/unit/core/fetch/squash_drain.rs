//! Squash and Drain Tests.
//!
//! Verifies the cancellation and drain machinery:
//!   1. Commit squash mid-miss — PC reset, request dropped, prefetches zeroed
//!   2. Macro-op preservation — squash into the middle of an expansion
//!   3. Decode block/unblock — fetched work is held, not lost
//!   4. Drain — detection, stability, and resume

use std::rc::Rc;

use crate::common::harness::{block_buffer_config, non_decoupled_config, TestBench};
use fdip_core::core::fetch::ThreadStatus;
use fdip_core::core::inst::DynInst;
use fdip_core::isa::demo::DemoOp;
use fdip_core::isa::{PcState, StaticInst};

// ══════════════════════════════════════════════════════════
// 1. Commit squash while a demand miss is outstanding
// ══════════════════════════════════════════════════════════

#[test]
fn commit_squash_mid_miss_resets_thread_and_prefetches() {
    let mut tb = TestBench::new(&block_buffer_config());
    tb.load_program(0, 0x2000, &[DemoOp::Alu; 48]);
    for b in 0..3u64 {
        let start = 0x2000 + b * 64;
        tb.ftq.push(0, start, start + 64, true);
    }

    tb.tick();
    tb.tick(); // demand miss outstanding, one prefetch in flight
    assert_eq!(tb.fetch.thread_status(0), ThreadStatus::IcacheWaitResponse);
    assert_eq!(tb.fetch.tracker().outstanding_prefetches(), 1);

    tb.signals.commit[0].squash = true;
    tb.signals.commit[0].pc = PcState::new(0x5000);
    tb.ftq.invalidate(0);
    tb.tick();

    assert_eq!(tb.fetch.thread_status(0), ThreadStatus::Squashing);
    assert_eq!(tb.fetch.pc(0).inst_addr(), 0x5000);
    assert!(tb.fetch.mem_req(0).is_none());
    assert_eq!(tb.fetch.tracker().outstanding_prefetches(), 0);
    assert!(tb.fetch.fetch_queue(0).is_empty());
    assert!(tb.outputs.to_decode.is_empty(), "nothing from the squashed path");

    // The old demand response must not touch the fetch buffer.
    tb.respond_oldest();
    assert!(!tb.fetch.fetch_buffer(0).is_valid());

    // With an empty FTQ the thread waits for the predictor.
    tb.tick();
    assert_eq!(tb.fetch.thread_status(0), ThreadStatus::FtqEmpty);

    // A refill gets it fetching again down the new path.
    tb.ftq.push(0, 0x5000, 0x5040, true);
    tb.tick();
    assert_eq!(tb.fetch.thread_status(0), ThreadStatus::ItlbWait);
}

// ══════════════════════════════════════════════════════════
// 2. Macro-op preservation across squash
// ══════════════════════════════════════════════════════════

fn microop_squash_inst(upc: u16) -> Rc<DynInst> {
    let mac = StaticInst::macroop("rep", 4, 3);
    let uop = mac.fetch_microop(upc);
    Rc::new(DynInst {
        seq_num: 7,
        tid: 0,
        static_inst: uop,
        macroop: Some(mac),
        pc: PcState { addr: 0x3000, upc },
        pred_pc: PcState { addr: 0x3000, upc: upc + 1 },
        fault: None,
        not_an_inst: false,
    })
}

#[test]
fn squash_into_mid_macroop_keeps_expanding_it() {
    let mut tb = TestBench::new(&non_decoupled_config());

    tb.signals.commit[0].squash = true;
    tb.signals.commit[0].pc = PcState { addr: 0x3000, upc: 1 };
    tb.signals.commit[0].squash_inst = Some(microop_squash_inst(1));
    tb.tick();

    assert!(
        tb.fetch.current_macroop(0).is_some(),
        "squash into a macro-op resumes its expansion"
    );
    assert!(
        tb.fetch.delayed_commit(0),
        "interrupts stay inhibited until the expansion state is known"
    );
}

#[test]
fn squash_past_last_microop_drops_the_macroop() {
    let mut tb = TestBench::new(&non_decoupled_config());

    tb.signals.commit[0].squash = true;
    tb.signals.commit[0].pc = PcState { addr: 0x3000, upc: 2 };
    tb.signals.commit[0].squash_inst = Some(microop_squash_inst(2));
    tb.tick();

    assert!(tb.fetch.current_macroop(0).is_none());
}

#[test]
fn squash_to_different_pc_drops_the_macroop() {
    let mut tb = TestBench::new(&non_decoupled_config());

    tb.signals.commit[0].squash = true;
    tb.signals.commit[0].pc = PcState::new(0x9000);
    tb.signals.commit[0].squash_inst = Some(microop_squash_inst(1));
    tb.tick();

    assert!(tb.fetch.current_macroop(0).is_none());
}

// ══════════════════════════════════════════════════════════
// 3. Decode block / unblock
// ══════════════════════════════════════════════════════════

#[test]
fn blocked_decode_holds_fetched_instructions() {
    let mut tb = TestBench::new(&non_decoupled_config());
    tb.load_program(0, 0x1000, &[DemoOp::Alu; 8]);

    tb.tick();
    tb.tick();
    tb.respond_oldest();

    // Decode blocks before the instructions are handed over.
    tb.signals.decode[0].block = true;
    tb.tick();
    assert!(tb.outputs.to_decode.is_empty());
    assert_eq!(tb.fetch.fetch_queue(0).len(), 4, "work is held, not lost");

    // Unblocking releases the queued instructions.
    tb.signals.decode[0].unblock = true;
    tb.tick();
    assert_eq!(tb.outputs.to_decode.len(), 4);
    for (i, inst) in tb.outputs.to_decode.iter().enumerate() {
        assert_eq!(inst.pc.inst_addr(), 0x1000 + 4 * i as u64);
    }
}

// ══════════════════════════════════════════════════════════
// 4. Drain
// ══════════════════════════════════════════════════════════

#[test]
fn drain_stall_blocks_thread_and_is_stable() {
    let mut tb = TestBench::new(&non_decoupled_config());

    tb.fetch.drain_stall(0);
    tb.tick();
    assert_eq!(tb.fetch.thread_status(0), ThreadStatus::Blocked);
    assert!(tb.fetch.is_drained());

    // No new upstream events: drained stays drained.
    tb.tick();
    tb.tick();
    assert!(tb.fetch.is_drained());
    assert_eq!(tb.fetch.thread_status(0), ThreadStatus::Blocked);
    tb.fetch.drain_sanity_check();

    // Resume puts the thread back to fetching.
    tb.fetch.drain_resume();
    tb.tick();
    assert_eq!(tb.fetch.thread_status(0), ThreadStatus::ItlbWait);
    assert!(!tb.fetch.is_drained());
}

#[test]
fn outstanding_demand_defers_drain_until_response() {
    let mut tb = TestBench::new(&non_decoupled_config());
    tb.load_program(0, 0x1000, &[DemoOp::Alu; 4]);

    tb.tick(); // translation in flight
    tb.fetch.drain_stall(0);
    assert!(!tb.fetch.is_drained(), "pending translation blocks the drain");

    tb.tick(); // access in flight
    assert!(!tb.fetch.is_drained());

    // The response parks the thread in Blocked under the drain stall.
    tb.respond_oldest();
    assert_eq!(tb.fetch.thread_status(0), ThreadStatus::Blocked);
    assert!(tb.fetch.is_drained());
    tb.fetch.drain_sanity_check();
}
