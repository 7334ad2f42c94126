//! Core model types (instructions, branch unit, fetch stage).

/// Branch/address-calculation unit contract.
pub mod bac;

/// The instruction-fetch stage.
pub mod fetch;

/// Dynamic instruction representation.
pub mod inst;

pub use bac::{BranchUnit, SequentialBac};
pub use fetch::Fetch;
pub use inst::{DynInst, DynInstPtr};
