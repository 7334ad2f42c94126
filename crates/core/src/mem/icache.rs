//! Fixed-latency instruction cache model.
//!
//! A small timing model of the L1 instruction port used by the bundled
//! driver and the end-to-end tests. Every accepted read completes after a
//! fixed latency with bytes from a flat backing store; a bounded number of
//! accesses may be in flight at once (the MSHR limit), and a refused sender
//! is woken with a retry notification as soon as a slot frees up.

use log::trace;

use crate::mem::packet::Packet;
use crate::mem::port::TimingPort;
use crate::sim::Cycle;

/// One in-flight access.
struct InFlight {
    ready_at: Cycle,
    pkt: Packet,
}

/// Fixed-latency instruction cache with bounded MSHRs.
pub struct SimpleIcache {
    mem: Vec<u8>,
    base: u64,
    latency: Cycle,
    mshrs: usize,
    now: Cycle,
    in_flight: Vec<InFlight>,
    /// Set when a packet was refused; cleared once the retry is taken.
    need_retry: bool,
}

impl SimpleIcache {
    /// Creates a cache over `size` bytes of zeroed memory at `base`.
    pub fn new(base: u64, size: usize, latency: Cycle, mshrs: usize) -> Self {
        Self {
            mem: vec![0; size],
            base,
            latency,
            mshrs,
            now: 0,
            in_flight: Vec::new(),
            need_retry: false,
        }
    }

    /// Writes `data` into the backing store at physical address `paddr`.
    pub fn load(&mut self, paddr: u64, data: &[u8]) {
        let off = (paddr - self.base) as usize;
        self.mem[off..off + data.len()].copy_from_slice(data);
    }

    /// Advances the cache clock.
    pub fn tick(&mut self, now: Cycle) {
        self.now = now;
    }

    /// Removes and returns all responses that are ready at the current
    /// cycle, oldest first.
    pub fn take_ready_responses(&mut self) -> Vec<Packet> {
        let now = self.now;
        let mut ready = Vec::new();
        let mut i = 0;
        while i < self.in_flight.len() {
            if self.in_flight[i].ready_at <= now {
                let entry = self.in_flight.remove(i);
                let off = (entry.pkt.req.paddr().map(|p| p.val()).unwrap_or(0) - self.base) as usize;
                let size = entry.pkt.req.size();
                let data = self.mem[off..off + size].to_vec();
                ready.push(entry.pkt.into_response(data));
            } else {
                i += 1;
            }
        }
        ready
    }

    /// Whether a refused sender should be notified to retry now.
    ///
    /// Returns true at most once per refusal, after an MSHR has freed up.
    pub fn take_retry(&mut self) -> bool {
        if self.need_retry && self.in_flight.len() < self.mshrs {
            self.need_retry = false;
            true
        } else {
            false
        }
    }
}

impl TimingPort for SimpleIcache {
    fn send_timing(&mut self, pkt: Packet) -> Result<(), Packet> {
        if self.in_flight.len() >= self.mshrs {
            trace!(target: "icache", "refusing access, out of MSHRs");
            self.need_retry = true;
            return Err(pkt);
        }
        trace!(
            target: "icache",
            "accepted read of {:#x}, ready at cycle {}",
            pkt.req.paddr().map(|p| p.val()).unwrap_or(0),
            self.now + self.latency
        );
        self.in_flight.push(InFlight {
            ready_at: self.now + self.latency,
            pkt,
        });
        Ok(())
    }
}
