//! Dynamic instruction representation.
//!
//! A `DynInst` is one instruction in flight: a static-instruction reference
//! plus the per-instance state the pipeline needs (sequence number, PCs,
//! thread, fault). The fetch stage builds them; ownership moves through the
//! per-thread fetch queue into decode.

use std::rc::Rc;
use std::sync::Arc;

use crate::common::{Fault, InstSeqNum, ThreadId};
use crate::isa::{PcState, StaticInst};

/// Shared handle to a dynamic instruction.
///
/// The same instruction is referenced by the fetch queue, the decode input,
/// and squash signals coming back from downstream stages.
pub type DynInstPtr = Rc<DynInst>;

/// One dynamic instruction produced by fetch.
#[derive(Debug)]
pub struct DynInst {
    /// Globally monotonic sequence number, dense in issue order.
    pub seq_num: InstSeqNum,
    /// Hardware thread the instruction belongs to.
    pub tid: ThreadId,
    /// The decoded static instruction (a micro-op when inside a macro-op).
    pub static_inst: Arc<StaticInst>,
    /// The enclosing macro-op, if any.
    pub macroop: Option<Arc<StaticInst>>,
    /// Architectural PC this instruction was fetched at.
    pub pc: PcState,
    /// Predicted next PC recorded by the branch unit.
    pub pred_pc: PcState,
    /// Fault raised while fetching this instruction, if any.
    pub fault: Option<Fault>,
    /// Set on the synthesized no-op that only exists to carry a fault.
    pub not_an_inst: bool,
}

impl DynInst {
    /// Whether this instruction is a control-flow instruction.
    pub fn is_control(&self) -> bool {
        self.static_inst.is_control()
    }

    /// Whether this instruction is a quiesce.
    pub fn is_quiesce(&self) -> bool {
        self.static_inst.is_quiesce()
    }

    /// Whether interrupts must be held off after this instruction.
    pub fn is_delayed_commit(&self) -> bool {
        self.static_inst.is_delayed_commit()
    }

    /// Whether this instruction terminates its macro-op.
    pub fn is_last_microop(&self) -> bool {
        self.static_inst.is_last_microop()
    }
}
