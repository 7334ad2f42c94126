//! Inter-stage signal structures.
//!
//! These are the wires the fetch stage reads from and writes to each
//! cycle: delayed backward communication from decode, IEW, and commit, and
//! the forward resteer wire toward the branch unit. One `TimeStruct` is
//! produced per cycle and observed `N` cycles later through the time
//! buffer, where `N` is the configured stage-to-stage delay.

use crate::common::{InstSeqNum, MAX_THREADS};
use crate::core::inst::DynInstPtr;
use crate::isa::PcState;

/// Per-thread communication from decode back to fetch.
#[derive(Clone, Default)]
pub struct DecodeComm {
    /// Decode ran out of space; fetch must block.
    pub block: bool,
    /// Decode has space again.
    pub unblock: bool,
    /// Decode detected a misprediction; squash and redirect.
    pub squash: bool,
    /// Redirect PC for the squash.
    pub next_pc: PcState,
    /// Youngest sequence number decode has seen.
    pub done_seq_num: InstSeqNum,
    /// The mispredicted instruction.
    pub squash_inst: Option<DynInstPtr>,
}

/// Per-thread communication from commit back to fetch.
#[derive(Clone, Default)]
pub struct CommitComm {
    /// Commit orders a squash (trap, interrupt, misspeculation).
    pub squash: bool,
    /// Redirect PC for the squash.
    pub pc: PcState,
    /// Youngest committed sequence number.
    pub done_seq_num: InstSeqNum,
    /// The instruction the squash originates from.
    pub squash_inst: Option<DynInstPtr>,
    /// An interrupt is pending; stop starting new cache lines.
    pub interrupt_pending: bool,
    /// The pending interrupt was handled or dismissed.
    pub clear_interrupt: bool,
}

/// Per-thread occupancy counters reported by IEW.
#[derive(Clone, Copy, Default)]
pub struct IewComm {
    /// Issue-queue entries in use.
    pub iq_count: usize,
    /// Load/store-queue entries in use.
    pub ldstq_count: usize,
}

/// All backward signals produced in one cycle.
#[derive(Clone)]
pub struct TimeStruct {
    /// Decode wires, indexed by thread.
    pub decode: [DecodeComm; MAX_THREADS],
    /// Commit wires, indexed by thread.
    pub commit: [CommitComm; MAX_THREADS],
    /// IEW wires, indexed by thread.
    pub iew: [IewComm; MAX_THREADS],
}

impl Default for TimeStruct {
    fn default() -> Self {
        Self {
            decode: std::array::from_fn(|_| DecodeComm::default()),
            commit: std::array::from_fn(|_| CommitComm::default()),
            iew: [IewComm::default(); MAX_THREADS],
        }
    }
}

/// Per-thread resteer signal from fetch toward the branch unit.
#[derive(Clone, Copy, Default)]
pub struct FetchToBac {
    /// The predictor must be redirected.
    pub squash: bool,
    /// PC to restart prediction from.
    pub next_pc: PcState,
}

/// Stall sources recorded per thread.
#[derive(Clone, Copy, Default)]
pub struct Stalls {
    /// Decode asked fetch to block.
    pub decode: bool,
    /// The stage is draining; hold this thread.
    pub drain: bool,
}

/// Delayed views of the backward wires, as seen by fetch this cycle.
pub struct FetchInputs<'a> {
    /// Signals decode produced `decode_to_fetch` cycles ago.
    pub from_decode: &'a TimeStruct,
    /// Signals IEW produced `iew_to_fetch` cycles ago.
    pub from_iew: &'a TimeStruct,
    /// Signals commit produced `commit_to_fetch` cycles ago.
    pub from_commit: &'a TimeStruct,
}

/// Everything the fetch stage produced in one cycle.
#[derive(Default)]
pub struct FetchOutputs {
    /// Instructions handed to decode, bounded by `decode_width`.
    pub to_decode: Vec<DynInstPtr>,
    /// Resteer wires toward the branch unit, indexed by thread.
    pub to_bac: Vec<FetchToBac>,
    /// The stage did observable work this cycle.
    pub activity: bool,
}

impl FetchOutputs {
    /// Creates empty outputs for `num_threads` threads.
    pub fn new(num_threads: usize) -> Self {
        Self {
            to_decode: Vec::new(),
            to_bac: vec![FetchToBac::default(); num_threads],
            activity: false,
        }
    }

    /// Clears the outputs for a new cycle.
    pub fn clear(&mut self) {
        self.to_decode.clear();
        for wire in &mut self.to_bac {
            *wire = FetchToBac::default();
        }
        self.activity = false;
    }
}
