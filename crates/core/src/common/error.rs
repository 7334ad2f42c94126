//! Fault and configuration error definitions.
//!
//! This module defines the error handling types of the front-end model. It
//! provides:
//! 1. **Fault Representation:** Faults raised along the instruction
//!    translation path, carried by dynamic instructions into decode.
//! 2. **Configuration Errors:** Violations detected when the stage is
//!    constructed; these abort construction rather than panic at runtime.

use std::fmt;

/// A fault raised while translating or fetching an instruction address.
///
/// Faults are never handled inside the fetch stage itself. They are attached
/// to a no-op dynamic instruction and delivered to decode, where the commit
/// stage eventually takes the corresponding trap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Instruction page fault.
    ///
    /// Raised when an instruction fetch causes a page-table miss. The
    /// associated value is the faulting virtual address.
    InstructionPageFault(u64),

    /// Instruction access fault.
    ///
    /// Raised when an instruction fetch violates memory protection or
    /// targets invalid memory. The associated value is the faulting virtual
    /// address.
    InstructionAccessFault(u64),

    /// Instruction address misaligned.
    ///
    /// Raised when the fetch address is not aligned to the minimum
    /// instruction size. The associated value is the misaligned address.
    InstructionAddressMisaligned(u64),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::InstructionPageFault(addr) => {
                write!(f, "InstructionPageFault({:#x})", addr)
            }
            Fault::InstructionAccessFault(addr) => {
                write!(f, "InstructionAccessFault({:#x})", addr)
            }
            Fault::InstructionAddressMisaligned(addr) => {
                write!(f, "InstructionAddressMisaligned({:#x})", addr)
            }
        }
    }
}

impl std::error::Error for Fault {}

/// A configuration violation detected at stage construction.
///
/// Construction-time checks replace the original's fatal aborts: an invalid
/// configuration never produces a partially initialized stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// `num_threads` exceeds the compiled `MAX_THREADS` limit.
    TooManyThreads { requested: usize, limit: usize },

    /// `num_fetching_threads` exceeds `num_threads`.
    TooManyFetchingThreads { requested: usize, threads: usize },

    /// `fetch_width` or `decode_width` exceeds the compiled `MAX_WIDTH` limit.
    WidthTooLarge { requested: usize, limit: usize },

    /// The fetch buffer is larger than one cache block.
    BufferLargerThanBlock { buffer: usize, block: usize },

    /// The cache block size is not a multiple of the fetch buffer size.
    BlockNotMultipleOfBuffer { buffer: usize, block: usize },

    /// A size parameter that must be a power of two is not.
    NotPowerOfTwo { name: &'static str, value: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::TooManyThreads { requested, limit } => write!(
                f,
                "num_threads ({}) is larger than compiled limit ({})",
                requested, limit
            ),
            ConfigError::TooManyFetchingThreads { requested, threads } => write!(
                f,
                "num_fetching_threads ({}) is larger than num_threads ({})",
                requested, threads
            ),
            ConfigError::WidthTooLarge { requested, limit } => write!(
                f,
                "stage width ({}) is larger than compiled limit ({})",
                requested, limit
            ),
            ConfigError::BufferLargerThanBlock { buffer, block } => write!(
                f,
                "fetch buffer size ({} bytes) is greater than the cache block size ({} bytes)",
                buffer, block
            ),
            ConfigError::BlockNotMultipleOfBuffer { buffer, block } => write!(
                f,
                "cache block ({} bytes) is not a multiple of the fetch buffer ({} bytes)",
                block, buffer
            ),
            ConfigError::NotPowerOfTwo { name, value } => {
                write!(f, "{} ({}) must be a power of two", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
