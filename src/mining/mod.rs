//! Mining rounds: every registered wallet races to seal the next block.

pub mod coordinator;
pub mod round;
pub mod search;

pub use coordinator::{MiningCoordinator, ResetOutcome};
pub use round::{PackagedBlock, RoundStarted, RoundState, RoundStatus};
