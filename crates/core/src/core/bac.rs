//! Branch/address-calculation unit contract.
//!
//! The BAC owns branch prediction and fills the fetch-target queue; both
//! are outside this model. Fetch only needs one thing from it: given an
//! instruction just fetched, compute the next PC and learn whether a
//! predicted-taken branch ends the current fetch block.

use crate::core::fetch::target::FetchTarget;
use crate::core::inst::DynInst;
use crate::isa::PcState;

/// Contract between the fetch stage and the branch unit.
pub trait BranchUnit {
    /// Computes the next PC for `inst` and records prediction feedback.
    ///
    /// `next_pc` enters holding the PC state of `inst` and leaves holding
    /// the PC of its successor. `cur_ft` is the fetch target the
    /// instruction was fetched under (absent in the non-decoupled front
    /// end). Returns true when a predicted-taken branch terminates the
    /// current fetch block.
    fn update_pc(
        &mut self,
        inst: &DynInst,
        next_pc: &mut PcState,
        cur_ft: Option<&FetchTarget>,
    ) -> bool;
}

/// Minimal branch unit: sequential next-PC plus fetch-target metadata.
///
/// Control flow follows the prediction embedded in the fetch target — the
/// terminating branch of a non-fall-through target redirects to the
/// target's predicted successor. Without a fetch target every instruction
/// falls through. Used by the bundled driver and the tests.
pub struct SequentialBac;

impl BranchUnit for SequentialBac {
    fn update_pc(
        &mut self,
        inst: &DynInst,
        next_pc: &mut PcState,
        cur_ft: Option<&FetchTarget>,
    ) -> bool {
        inst.static_inst.advance_pc(next_pc);

        if let Some(ft) = cur_ft {
            if inst.is_control() && ft.branch_pc() == Some(inst.pc.inst_addr()) {
                if let Some(target) = ft.predicted_target() {
                    next_pc.addr = target;
                    next_pc.upc = 0;
                    return true;
                }
            }
        }
        false
    }
}
