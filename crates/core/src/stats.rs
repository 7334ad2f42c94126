//! Fetch-stage statistics collection and reporting.
//!
//! This module tracks performance metrics for the front-end model. It
//! provides:
//! 1. **Throughput:** Fetched instructions and branches per thread.
//! 2. **Stalls:** Cycle counts attributed to each stall cause.
//! 3. **Fetch targets:** How often each lifecycle state was encountered on
//!    the demand path.
//! 4. **Prefetching:** Issue, completion, adoption, and drop counters.

/// Fetch statistics structure tracking all stage metrics.
#[derive(Clone, Default)]
pub struct FetchStats {
    /// Branches that fetch has predicted taken.
    pub predicted_branches: u64,
    /// Cycles fetch ran and was not squashing or blocked.
    pub cycles: u64,
    /// Cycles fetch spent squashing.
    pub squash_cycles: u64,
    /// Cycles fetch spent waiting for the instruction TLB.
    pub tlb_cycles: u64,
    /// Cycles fetch spent waiting for the FTQ to fill.
    pub ftq_stall_cycles: u64,
    /// Cycles fetch was idle.
    pub idle_cycles: u64,
    /// Cycles fetch was blocked.
    pub blocked_cycles: u64,
    /// Cycles lost to interrupts, bad addresses, or exhausted MSHRs.
    pub misc_stall_cycles: u64,
    /// Cycles spent waiting for the pipeline to drain.
    pub pending_drain_cycles: u64,
    /// Cycles with no active thread to fetch from.
    pub no_active_thread_stall_cycles: u64,
    /// Cycles stalled on a pending trap.
    pub pending_trap_stall_cycles: u64,
    /// Cycles stalled on a pending quiesce instruction.
    pub pending_quiesce_stall_cycles: u64,
    /// Cycles stalled waiting for an instruction-cache retry.
    pub icache_wait_retry_stall_cycles: u64,
    /// Cache lines fetched on the demand path.
    pub cache_lines: u64,
    /// Outstanding cache responses discarded as stale.
    pub icache_squashes: u64,
    /// Outstanding translation completions discarded as stale.
    pub tlb_squashes: u64,

    /// Demand fetches that found their target ready to fetch.
    pub ft_ready_to_fetch: u64,
    /// Demand fetches that adopted an in-flight prefetch.
    pub ft_prefetch_in_progress: u64,
    /// Demand fetches that adopted an in-flight translation.
    pub ft_translation_in_progress: u64,
    /// Demand fetches that found their translation already complete.
    pub ft_translation_ready: u64,
    /// Demand fetches that found their translation faulted.
    pub ft_translation_failed: u64,
    /// Instructions crossing a fetch-target boundary.
    pub ft_cross_cache_block: u64,
    /// Boundary crossings where the next target was not sequential.
    pub ft_cross_cache_block_not_next: u64,

    /// Prefetches sent to the cache.
    pub pf_issued: u64,
    /// Prefetch responses that arrived before the demand needed them.
    pub pf_received: u64,
    /// Prefetches still in flight when the demand caught up.
    pub pf_late: u64,
    /// Prefetches dropped by squashes.
    pub pf_squashed: u64,
    /// Prefetches suppressed by the outstanding-prefetch cap.
    pub pf_limit_reached: u64,
    /// Translations suppressed by the outstanding-translation cap.
    pub pf_translation_limit_reached: u64,

    /// Instructions fetched, per thread.
    pub thread_insts: Vec<u64>,
    /// Control instructions fetched, per thread.
    pub thread_branches: Vec<u64>,
    /// Cycles spent waiting on a demand cache response, per thread.
    pub thread_icache_stall_cycles: Vec<u64>,
}

/// Section names for selective stats output.
///
/// Valid identifiers: `"summary"`, `"stalls"`, `"targets"`, `"prefetch"`.
/// Pass an empty slice to `print_sections` to print all sections.
pub const STATS_SECTIONS: &[&str] = &["summary", "stalls", "targets", "prefetch"];

impl FetchStats {
    /// Creates zeroed statistics for `num_threads` threads.
    pub fn new(num_threads: usize) -> Self {
        Self {
            thread_insts: vec![0; num_threads],
            thread_branches: vec![0; num_threads],
            thread_icache_stall_cycles: vec![0; num_threads],
            ..Default::default()
        }
    }

    /// Prints only the requested statistics sections to stdout.
    ///
    /// Each element of `sections` should be one of the names in
    /// `STATS_SECTIONS`. Pass an empty slice to print all sections.
    pub fn print_sections(&self, sections: &[String]) {
        let want = |s: &str| sections.is_empty() || sections.iter().any(|x| x == s);

        if want("summary") {
            println!("\n==========================================================");
            println!("FETCH STAGE STATISTICS");
            println!("==========================================================");
            println!("fetch.cycles                 {}", self.cycles);
            for (tid, insts) in self.thread_insts.iter().enumerate() {
                println!("fetch.thread{}.insts          {}", tid, insts);
                println!(
                    "fetch.thread{}.branches       {}",
                    tid, self.thread_branches[tid]
                );
            }
            println!("fetch.predicted_branches     {}", self.predicted_branches);
            println!("fetch.cache_lines            {}", self.cache_lines);
            println!("----------------------------------------------------------");
        }
        if want("stalls") {
            println!("STALL BREAKDOWN");
            println!("  squash                 {}", self.squash_cycles);
            println!("  itlb                   {}", self.tlb_cycles);
            println!("  ftq_empty              {}", self.ftq_stall_cycles);
            println!("  idle                   {}", self.idle_cycles);
            println!("  blocked                {}", self.blocked_cycles);
            println!("  misc                   {}", self.misc_stall_cycles);
            println!("  pending_drain          {}", self.pending_drain_cycles);
            println!(
                "  no_active_thread       {}",
                self.no_active_thread_stall_cycles
            );
            println!("  pending_trap           {}", self.pending_trap_stall_cycles);
            println!(
                "  pending_quiesce        {}",
                self.pending_quiesce_stall_cycles
            );
            println!(
                "  icache_retry           {}",
                self.icache_wait_retry_stall_cycles
            );
            for (tid, cycles) in self.thread_icache_stall_cycles.iter().enumerate() {
                println!("  thread{}.icache         {}", tid, cycles);
            }
            println!("----------------------------------------------------------");
        }
        if want("targets") {
            println!("FETCH TARGETS");
            println!("  ready_to_fetch         {}", self.ft_ready_to_fetch);
            println!("  prefetch_in_progress   {}", self.ft_prefetch_in_progress);
            println!(
                "  translation_in_flight  {}",
                self.ft_translation_in_progress
            );
            println!("  translation_ready      {}", self.ft_translation_ready);
            println!("  translation_failed     {}", self.ft_translation_failed);
            println!("  cross_block            {}", self.ft_cross_cache_block);
            println!(
                "  cross_block_not_next   {}",
                self.ft_cross_cache_block_not_next
            );
            println!("----------------------------------------------------------");
        }
        if want("prefetch") {
            let accuracy = if self.pf_issued > 0 {
                100.0 * (self.pf_issued - self.pf_squashed.min(self.pf_issued)) as f64
                    / self.pf_issued as f64
            } else {
                0.0
            };
            println!("PREFETCH");
            println!("  issued                 {}", self.pf_issued);
            println!("  received               {}", self.pf_received);
            println!("  late                   {}", self.pf_late);
            println!("  squashed               {}", self.pf_squashed);
            println!("  limit_reached          {}", self.pf_limit_reached);
            println!(
                "  translation_limit      {}",
                self.pf_translation_limit_reached
            );
            println!("  accuracy               {:.2}%", accuracy);
            println!("  stale_icache_resps     {}", self.icache_squashes);
            println!("  stale_tlb_resps        {}", self.tlb_squashes);
        }
        println!("==========================================================");
    }

    /// Prints all statistics sections to stdout.
    ///
    /// Equivalent to `print_sections(&[])`.
    pub fn print(&self) {
        self.print_sections(&[]);
    }
}
