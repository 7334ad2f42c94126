use std::collections::HashMap;

use fdip_core::common::{Fault, PhysAddr};
use fdip_core::mem::mmu::{InstructionMmu, TranslationOutcome};
use fdip_core::mem::packet::Request;
use fdip_core::sim::Cycle;

/// Controllable instruction MMU.
///
/// Identity translation with a programmable latency. Individual block
/// addresses can be poisoned to fault, and the backed-memory bound can
/// be lowered to exercise the bad-address path.
pub struct MockMmu {
    /// Translation latency in cycles.
    pub latency: Cycle,
    /// One past the highest backed physical address.
    pub mem_limit: u64,
    faults: HashMap<u64, Fault>,
}

impl MockMmu {
    pub fn new(latency: Cycle) -> Self {
        Self {
            latency,
            mem_limit: u64::MAX,
            faults: HashMap::new(),
        }
    }

    /// Poisons the block at `vaddr`: its translation raises `fault`.
    pub fn inject_fault(&mut self, vaddr: u64, fault: Fault) {
        self.faults.insert(vaddr, fault);
    }
}

impl InstructionMmu for MockMmu {
    fn translate_timing(&mut self, req: &Request) -> TranslationOutcome {
        let vaddr = req.vaddr().val();
        let result = match self.faults.get(&vaddr) {
            Some(fault) => Err(fault.clone()),
            None => Ok(PhysAddr::new(vaddr)),
        };
        TranslationOutcome {
            result,
            latency: self.latency,
        }
    }

    fn is_mem_addr(&self, paddr: PhysAddr) -> bool {
        paddr.val() < self.mem_limit
    }
}
