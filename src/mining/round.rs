use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::search::SearchProgress;
use crate::blockchain::{Block, BlockHeader};
use crate::transaction::Transaction;

/// Lifecycle of a mining round. `Idle` means no round is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundState {
    Idle,
    Computing,
    WinnerFound,
    Packaged,
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RoundState::Idle => "idle",
            RoundState::Computing => "computing",
            RoundState::WinnerFound => "winner_found",
            RoundState::Packaged => "packaged",
        })
    }
}

/// The block a participant is trying to seal: the shared header fields with
/// that participant's own coinbase in front of the snapshot.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Candidate {
    pub fn seal(&self, nonce: u64) -> Block {
        Block::assemble(self.header.clone(), self.transactions.clone(), nonce)
    }
}

#[derive(Debug)]
pub struct Participant {
    pub name: String,
    pub address: String,
    pub candidate: Candidate,
    pub progress: Arc<SearchProgress>,
}

#[derive(Debug, Clone)]
pub struct Winner {
    pub participant: usize,
    pub nonce: u64,
    pub hash: String,
    pub found_after: Duration,
}

/// Result of a successful packaging step. Amounts are base units.
#[derive(Debug, Clone)]
pub struct PackagedBlock {
    pub block_index: u64,
    pub block_hash: String,
    pub winner: String,
    pub reward: u64,
    pub transaction_fee: u64,
    pub transaction_count: usize,
}

/// One competition for the next block height, owned by the coordinator.
#[derive(Debug)]
pub struct MiningRound {
    pub id: Uuid,
    pub round_number: u64,
    pub state: RoundState,
    pub started_at: Instant,
    pub difficulty: u32,
    pub reward: u64,
    pub fees: u64,
    /// Pending transactions every candidate carries after its coinbase.
    pub snapshot: Vec<String>,
    pub participants: Vec<Participant>,
    pub cancel: Arc<AtomicBool>,
    pub winner: Option<Winner>,
}

impl MiningRound {
    pub fn is_active(&self) -> bool {
        matches!(self.state, RoundState::Computing | RoundState::WinnerFound)
    }

    pub fn winner_participant(&self) -> Option<(&Participant, &Winner)> {
        let w = self.winner.as_ref()?;
        self.participants.get(w.participant).map(|p| (p, w))
    }
}

/// Read-only view of the current round for status queries.
#[derive(Debug, Clone, Serialize)]
pub struct RoundStatus {
    pub round_active: bool,
    pub state: RoundState,
    pub round_number: Option<u64>,
    pub difficulty: Option<u32>,
    pub transaction_count: usize,
    pub participants: Vec<ParticipantStatus>,
    pub winner: Option<WinnerStatus>,
    pub block_ready: bool,
    /// Seconds since the round started.
    pub elapsed_time: f64,
    /// Seconds the winning search took, once known.
    pub computing_time: Option<f64>,
}

impl RoundStatus {
    pub fn idle() -> Self {
        Self {
            round_active: false,
            state: RoundState::Idle,
            round_number: None,
            difficulty: None,
            transaction_count: 0,
            participants: Vec::new(),
            winner: None,
            block_ready: false,
            elapsed_time: 0.0,
            computing_time: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantStatus {
    pub name: String,
    pub address: String,
    pub nonce: u64,
    /// Seconds this participant has been hashing.
    pub elapsed: f64,
    pub finished: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct WinnerStatus {
    pub name: String,
    pub address: String,
    pub nonce: u64,
    pub hash: String,
}

/// Summary returned when a round starts.
#[derive(Debug, Clone, Serialize)]
pub struct RoundStarted {
    pub round_number: u64,
    pub participants: Vec<String>,
    pub difficulty: u32,
    pub transaction_count: usize,
}
