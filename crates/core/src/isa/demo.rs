//! Fixed-width demonstration instruction set.
//!
//! Four-byte little-endian words whose first byte selects the operation.
//! The set exists to exercise the fetch stage (branches end fetch blocks,
//! quiesce halts the thread, macro-ops expand into micro-ops); it has no
//! functional semantics.

use std::sync::Arc;

use crate::isa::{InstDecoder, PcState, StaticInst};

/// Instruction word size in bytes.
pub const INST_SIZE: usize = 4;

const OP_NOP: u8 = 0x00;
const OP_ALU: u8 = 0x01;
const OP_BRANCH: u8 = 0x02;
const OP_QUIESCE: u8 = 0x03;
const OP_MACRO: u8 = 0x04;

/// One demo-ISA operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DemoOp {
    /// No-operation.
    Nop,
    /// Integer operation.
    Alu,
    /// Control-flow instruction (direction and target come from the BPU).
    Branch,
    /// Quiesce: halts fetch until an external wake event.
    Quiesce,
    /// Macro-op expanding into the given number of micro-ops (1..=255).
    Macro(u8),
}

impl DemoOp {
    /// Encodes the operation as a little-endian instruction word.
    pub fn encode(self) -> [u8; INST_SIZE] {
        match self {
            DemoOp::Nop => [OP_NOP, 0, 0, 0],
            DemoOp::Alu => [OP_ALU, 0, 0, 0],
            DemoOp::Branch => [OP_BRANCH, 0, 0, 0],
            DemoOp::Quiesce => [OP_QUIESCE, 0, 0, 0],
            DemoOp::Macro(n) => [OP_MACRO, n.max(1), 0, 0],
        }
    }
}

/// Assembles a sequence of operations into a byte image.
pub fn assemble(ops: &[DemoOp]) -> Vec<u8> {
    let mut image = Vec::with_capacity(ops.len() * INST_SIZE);
    for op in ops {
        image.extend_from_slice(&op.encode());
    }
    image
}

/// Streaming decoder for the demo ISA.
///
/// Buffers exactly one instruction word at a time; every slice handed to
/// `more_bytes` is consumed in full.
pub struct DemoDecoder {
    word: Option<[u8; INST_SIZE]>,
}

impl DemoDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self { word: None }
    }
}

impl Default for DemoDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl InstDecoder for DemoDecoder {
    fn reset(&mut self) {
        self.word = None;
    }

    fn more_bytes(&mut self, _pc: &PcState, _fetch_addr: u64, data: &[u8]) {
        debug_assert_eq!(data.len(), INST_SIZE);
        let mut word = [0u8; INST_SIZE];
        word.copy_from_slice(data);
        self.word = Some(word);
    }

    fn inst_ready(&self) -> bool {
        self.word.is_some()
    }

    fn need_more_bytes(&self) -> bool {
        // Fixed-width: every slice is consumed whole.
        true
    }

    fn decode(&mut self, _pc: &PcState) -> Arc<StaticInst> {
        let word = self.word.take().unwrap_or([OP_NOP, 0, 0, 0]);
        match word[0] {
            OP_ALU => StaticInst::simple("alu", INST_SIZE, false, false),
            OP_BRANCH => StaticInst::simple("branch", INST_SIZE, true, false),
            OP_QUIESCE => StaticInst::simple("quiesce", INST_SIZE, false, true),
            OP_MACRO => StaticInst::macroop("macro", INST_SIZE, word[1].max(1) as usize),
            _ => StaticInst::nop(INST_SIZE),
        }
    }

    fn more_bytes_size(&self) -> usize {
        INST_SIZE
    }

    fn pc_mask(&self) -> u64 {
        !(INST_SIZE as u64 - 1)
    }

    fn fetch_rom_microop(&self, _upc: u16, _macroop: Option<&Arc<StaticInst>>) -> Arc<StaticInst> {
        StaticInst::nop(INST_SIZE)
    }
}
