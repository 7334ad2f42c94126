//! Memory-side interfaces of the fetch stage.
//!
//! This module defines how the stage talks to the instruction memory
//! system:
//! 1. **Requests and Packets:** Value types carrying one instruction-fetch
//!    access and its response data.
//! 2. **Ports:** Capability traits for non-blocking timing accesses.
//! 3. **Models:** A fixed-latency instruction cache and a table-backed MMU
//!    used by the bundled driver and the end-to-end tests.

/// Fixed-latency instruction cache model.
pub mod icache;

/// Instruction MMU contract and a simple table-backed model.
pub mod mmu;

/// Request and packet value types.
pub mod packet;

/// Timing port capability traits.
pub mod port;

pub use icache::SimpleIcache;
pub use mmu::{InstructionMmu, SimpleMmu, TranslationOutcome};
pub use packet::{MemCmd, Packet, ReqId, Request};
pub use port::{TimingClient, TimingPort};
