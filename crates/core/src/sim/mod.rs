//! Simulation infrastructure (clock, events, wires, determinism).
//!
//! This module provides the discrete-time plumbing the fetch stage runs on:
//! 1. **Clock:** The `Cycle` type; the stage only ever sees an injected
//!    "now" value and never reads host time.
//! 2. **Events:** A queue of future-dated callbacks (translation
//!    completions, deferred traps).
//! 3. **Wires:** A `TimeBuffer` modeling the delayed backward signal paths
//!    from decode/rename/IEW/commit.
//! 4. **Determinism:** A small seeded xorshift generator for the SMT drain
//!    start.

/// Future-dated event queue for the fetch stage.
pub mod event;

/// Top-level front-end driver tying the stage to its collaborators.
pub mod frontend;

/// Seeded pseudo-random number generation.
pub mod rng;

/// Delayed inter-stage signal buffer.
pub mod time_buffer;

pub use event::{EventQueue, FetchEvent};
pub use frontend::FrontEnd;
pub use rng::XorShiftRng;
pub use time_buffer::TimeBuffer;

/// A simulated clock cycle count.
pub type Cycle = u64;
