pub mod block;
pub mod model;

pub use block::{Block, BlockHeader};
pub use model::{Blockchain, HistoryEntry};

use crate::transaction::COIN;

/// Default Proof-of-Work difficulty (number of leading hex zeros).
pub const DEFAULT_DIFFICULTY: u32 = 4;

/// Upper bound for the height-based difficulty schedule.
pub const DEFAULT_MAX_DIFFICULTY: u32 = 6;

/// Base block subsidy in base units.
pub const BASE_REWARD: u64 = 50 * COIN;

/// Consensus knobs the ledger validates every block against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerParams {
    pub block_reward: u64,
    pub base_difficulty: u32,
    pub max_difficulty: u32,
    /// Raise difficulty by one every this many blocks; 0 keeps it flat.
    pub difficulty_step_blocks: u64,
}

impl Default for LedgerParams {
    fn default() -> Self {
        Self {
            block_reward: BASE_REWARD,
            base_difficulty: DEFAULT_DIFFICULTY,
            max_difficulty: DEFAULT_MAX_DIFFICULTY,
            difficulty_step_blocks: 0,
        }
    }
}

impl LedgerParams {
    /// Difficulty required of the block at `height`. Genesis needs no work.
    pub fn difficulty_at(&self, height: u64) -> u32 {
        if height == 0 {
            return 0;
        }
        let bumps = match self.difficulty_step_blocks {
            0 => 0,
            step => height / step,
        };
        let wanted = (self.base_difficulty as u64).saturating_add(bumps);
        let cap = self.max_difficulty.max(self.base_difficulty) as u64;
        wanted.min(cap) as u32
    }
}
