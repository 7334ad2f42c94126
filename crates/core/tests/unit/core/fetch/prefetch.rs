//! Decoupled Prefetch Engine Tests.
//!
//! Verifies the fetch-target pipeline behind the FTQ head:
//!   1. Run-ahead — translations and prefetches issue before demand
//!   2. Early completion — a received prefetch satisfies the later demand
//!   3. Adoption — an in-flight prefetch becomes the demand access
//!   4. Deduplication — no second access to an in-flight block
//!   5. Caps — outstanding translation/prefetch limits are respected
//!   6. Squash — late prefetch responses cannot corrupt state

use crate::common::harness::{block_buffer_config, TestBench};
use fdip_core::core::fetch::target::FtState;
use fdip_core::core::fetch::ThreadStatus;
use fdip_core::isa::demo::DemoOp;
use fdip_core::mem::packet::ReqId;

/// Three sequential cache blocks of straight-line code with one
/// fall-through fetch target per block.
fn decoupled_bench() -> TestBench {
    let mut tb = TestBench::new(&block_buffer_config());
    tb.load_program(0, 0x2000, &[DemoOp::Alu; 48]);
    for b in 0..3u64 {
        let start = 0x2000 + b * 64;
        tb.ftq.push(0, start, start + 64, true);
    }
    tb
}

/// Request id of the accepted packet targeting `vaddr`.
fn sent_id(tb: &TestBench, vaddr: u64) -> ReqId {
    tb.icache
        .sent
        .iter()
        .find(|p| p.req.vaddr().val() == vaddr)
        .expect("no accepted packet for that address")
        .req
        .id()
}

// ══════════════════════════════════════════════════════════
// 1. Prefetch runs ahead of demand
// ══════════════════════════════════════════════════════════

#[test]
fn prefetch_engine_runs_ahead_of_demand() {
    let mut tb = decoupled_bench();

    // C0: demand translation for the head plus a prefetch translation
    // for the target behind it.
    tb.tick();
    assert_eq!(tb.fetch.thread_status(0), ThreadStatus::ItlbWait);
    assert_eq!(tb.fetch.tracker().outstanding_translations(), 2);

    // C1: both translations complete; the demand read and the first
    // prefetch go out, the third target's translation starts.
    tb.tick();
    assert_eq!(tb.fetch.thread_status(0), ThreadStatus::IcacheWaitResponse);
    assert_eq!(tb.icache.sent.len(), 2);
    assert_eq!(tb.fetch.tracker().outstanding_prefetches(), 1);
    assert_eq!(tb.fetch.stats.pf_issued, 1);

    // C2: the third target becomes ready and its prefetch goes out too.
    tb.tick();
    assert_eq!(tb.icache.sent.len(), 3);
    assert_eq!(tb.fetch.tracker().outstanding_prefetches(), 2);
    assert_eq!(tb.fetch.stats.pf_issued, 2);
}

// ══════════════════════════════════════════════════════════
// 2. Early prefetch completion
// ══════════════════════════════════════════════════════════

#[test]
fn received_prefetch_marks_target_ready() {
    let mut tb = decoupled_bench();
    tb.tick();
    tb.tick();
    tb.tick();

    // The prefetch for 0x2040 returns before demand needs it.
    let id = sent_id(&tb, 0x2040);
    let pkt = tb.icache.make_response_for(id);
    tb.deliver(pkt);

    assert_eq!(tb.fetch.stats.pf_received, 1);
    assert_eq!(tb.fetch.tracker().outstanding_prefetches(), 1);
    assert!(
        !tb.fetch.fetch_buffer(0).is_valid(),
        "prefetch data stays in the cache, not the fetch buffer"
    );

    // Demand catches up: block one decodes, then the ready target is
    // fetched without waiting on translation or prefetch.
    tb.respond_oldest();
    tb.run(8);
    assert!(tb.fetch.stats.ft_ready_to_fetch >= 1);
}

// ══════════════════════════════════════════════════════════
// 3. Prefetch adoption
// ══════════════════════════════════════════════════════════

#[test]
fn late_prefetch_is_adopted_as_demand() {
    let mut tb = decoupled_bench();
    tb.tick();
    tb.tick();
    tb.tick();

    // Serve the demand only; both prefetches stay in flight.
    tb.respond_oldest();
    let sent_before = tb.icache.sent.len();

    // Demand consumes block one (16 instructions at width 4) and then
    // reaches the second target while its prefetch is still in flight.
    for _ in 0..4 {
        tb.tick();
    }

    assert_eq!(tb.fetch.thread_status(0), ThreadStatus::IcacheWaitResponse);
    assert_eq!(tb.fetch.stats.pf_late, 1);
    assert_eq!(
        tb.fetch.tracker().outstanding_prefetches(),
        1,
        "the adopted prefetch no longer counts as a prefetch"
    );
    assert_eq!(
        tb.icache.sent.len(),
        sent_before,
        "adoption re-uses the in-flight access instead of re-issuing"
    );

    // The prefetch response now satisfies the demand directly.
    let id = tb.fetch.mem_req(0).expect("adopted request").id();
    let pkt = tb.icache.make_response_for(id);
    tb.deliver(pkt);

    assert_eq!(tb.fetch.thread_status(0), ThreadStatus::IcacheAccessComplete);
    assert!(tb.fetch.fetch_buffer(0).holds(0x2040));
    // Same bytes a fresh demand access would have fetched.
    assert_eq!(tb.fetch.fetch_buffer(0).slice(0, 4), &DemoOp::Alu.encode()[..]);
}

// ══════════════════════════════════════════════════════════
// 4. In-flight deduplication
// ══════════════════════════════════════════════════════════

#[test]
fn duplicate_block_prefetch_is_not_reissued() {
    let mut tb = TestBench::new(&block_buffer_config());
    tb.load_program(0, 0x2000, &[DemoOp::Alu; 32]);
    tb.ftq.push(0, 0x2000, 0x2040, true);
    tb.ftq.push(0, 0x2040, 0x2080, true);
    // The predictor revisits the same block (a short loop).
    let dup = tb.ftq.push(0, 0x2040, 0x2080, true);

    tb.tick(); // demand + first prefetch translation
    tb.tick(); // prefetch for 0x2040 issued; duplicate translation starts
    tb.tick(); // duplicate is ready; its block is already in flight

    assert_eq!(tb.fetch.stats.pf_issued, 1, "one prefetch for the block");
    assert_eq!(tb.icache.sent.len(), 2, "demand plus a single prefetch");
    assert_eq!(
        tb.ftq.get(0, dup).map(|ft| ft.state()),
        Some(FtState::ReadyToFetch),
        "duplicate target rides on the in-flight access"
    );
    assert_eq!(tb.fetch.tracker().outstanding_prefetches(), 1);
}

// ══════════════════════════════════════════════════════════
// 5. Outstanding caps
// ══════════════════════════════════════════════════════════

#[test]
fn prefetch_cap_limits_in_flight_prefetches() {
    let mut config = block_buffer_config();
    config.fetch.max_outstanding_prefetches = 1;

    let mut tb = TestBench::new(&config);
    tb.load_program(0, 0x2000, &[DemoOp::Alu; 64]);
    for b in 0..4u64 {
        let start = 0x2000 + b * 64;
        tb.ftq.push(0, start, start + 64, true);
    }

    for _ in 0..6 {
        tb.tick();
        assert!(tb.fetch.tracker().outstanding_prefetches() <= 1);
    }
    assert_eq!(tb.fetch.stats.pf_issued, 1);
    assert!(tb.fetch.stats.pf_limit_reached > 0);
}

#[test]
fn translation_cap_limits_prefetch_translations() {
    let mut config = block_buffer_config();
    config.fetch.max_outstanding_translations = 1;

    let mut tb = TestBench::new(&config);
    tb.load_program(0, 0x2000, &[DemoOp::Alu; 32]);
    tb.ftq.push(0, 0x2000, 0x2040, true);
    tb.ftq.push(0, 0x2040, 0x2080, true);

    // The demand translation holds the only slot.
    tb.tick();
    assert_eq!(tb.fetch.tracker().outstanding_translations(), 1);
    assert_eq!(tb.fetch.stats.pf_translation_limit_reached, 1);
}

// ══════════════════════════════════════════════════════════
// 6. Squashed prefetches
// ══════════════════════════════════════════════════════════

#[test]
fn stale_demand_response_is_not_attributed_to_the_head_target() {
    let mut tb = TestBench::new(&block_buffer_config());
    tb.load_program(0, 0x2000, &[DemoOp::Alu; 32]);
    tb.ftq.push(0, 0x2000, 0x2040, true);
    tb.ftq.push(0, 0x2040, 0x2080, true);

    tb.tick();
    tb.tick(); // demand miss outstanding; the head still stores its request
    let head_id = tb.ftq.read_head(0).expect("head target").id();

    // Commit squashes. The fetch stage leaves the FTQ alone — dropping
    // it is the predictor's reaction, which has not happened yet.
    tb.signals.commit[0].squash = true;
    tb.signals.commit[0].pc = fdip_core::isa::PcState::new(0x7000);
    tb.tick();
    assert!(tb.fetch.mem_req(0).is_none());
    assert_eq!(tb.fetch.tracker().outstanding_prefetches(), 0);

    // The dropped demand's response returns. It matches the head target
    // by request id, but it is no prefetch and must simply be discarded.
    let stale_before = tb.fetch.stats.icache_squashes;
    tb.respond_oldest();

    assert_eq!(tb.fetch.stats.icache_squashes, stale_before + 1);
    assert_eq!(tb.fetch.stats.pf_received, 0);
    assert_eq!(
        tb.ftq.get(0, head_id).map(|ft| ft.state()),
        Some(FtState::TranslationReady),
        "the head target is not marked ready by the stale response"
    );
    assert_eq!(
        tb.fetch.tracker().outstanding_prefetches(),
        0,
        "no decrement of a counter that was never incremented"
    );
    assert!(!tb.fetch.fetch_buffer(0).is_valid());
}

#[test]
fn squashed_prefetch_response_is_dropped_without_double_decrement() {
    let mut tb = decoupled_bench();
    tb.tick();
    tb.tick(); // one prefetch in flight
    assert_eq!(tb.fetch.tracker().outstanding_prefetches(), 1);

    // Commit squashes; the predictor drops its targets.
    tb.signals.commit[0].squash = true;
    tb.signals.commit[0].pc = fdip_core::isa::PcState::new(0x6000);
    tb.ftq.invalidate(0);
    tb.tick();

    assert_eq!(tb.fetch.tracker().outstanding_prefetches(), 0);
    assert_eq!(tb.fetch.stats.pf_squashed, 1);

    // The prefetch still returns from the cache afterwards.
    let id = sent_id(&tb, 0x2040);
    let pkt = tb.icache.make_response_for(id);
    let stale_before = tb.fetch.stats.icache_squashes;
    tb.deliver(pkt);

    assert_eq!(tb.fetch.stats.icache_squashes, stale_before + 1);
    assert_eq!(
        tb.fetch.tracker().outstanding_prefetches(),
        0,
        "no double decrement of the prefetch counter"
    );
    assert!(!tb.fetch.fetch_buffer(0).is_valid());
}
