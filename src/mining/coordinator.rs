use chrono::Utc;
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::round::{
    Candidate, MiningRound, PackagedBlock, Participant, ParticipantStatus, RoundStarted,
    RoundState, RoundStatus, Winner, WinnerStatus,
};
use super::search::{self, Finding, SearchJob, SearchProgress};
use crate::blockchain::{BlockHeader, Blockchain};
use crate::error::{ChainError, ChainResult};
use crate::transaction::{SelectionPolicy, Transaction};
use crate::wallet::WalletRegistry;

type Slot = Arc<Mutex<Option<MiningRound>>>;

/// Outcome of an explicit reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetOutcome {
    pub previous: RoundState,
    pub released: usize,
}

/// Single owner of the current mining round. Only this type and its
/// collector thread write round state; workers just hash and report.
///
/// Lock order: round slot, then wallet registry, then ledger.
pub struct MiningCoordinator {
    slot: Slot,
    policy: SelectionPolicy,
    max_txs: usize,
}

impl MiningCoordinator {
    pub fn new(policy: SelectionPolicy, max_txs: usize) -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            policy,
            max_txs,
        }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    fn slot(&self) -> MutexGuard<'_, Option<MiningRound>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Idle/Packaged → Computing: snapshot participants and pending
    /// transactions, then launch one search per participant.
    pub fn start(
        &self,
        wallets: &RwLock<WalletRegistry>,
        chain: &Mutex<Blockchain>,
    ) -> ChainResult<RoundStarted> {
        let mut slot = self.slot();
        if let Some(round) = slot.as_ref() {
            if round.is_active() {
                warn!("MINING - start rejected: round {} is {}", round.round_number, round.state);
                return Err(ChainError::InvalidRoundState {
                    state: round.state,
                    action: "start",
                });
            }
        }

        let members: Vec<(String, String)> = {
            let wallets = wallets.read().unwrap_or_else(|e| e.into_inner());
            wallets
                .list()
                .iter()
                .map(|w| (w.name.clone(), w.address.clone()))
                .collect()
        };
        if members.is_empty() {
            return Err(ChainError::NoParticipants);
        }

        let (index, previous_hash, difficulty, reward, snapshot, fees) = {
            let bc = chain.lock().unwrap_or_else(|e| e.into_inner());
            let (txs, fees) = bc.pool().select(self.policy, self.max_txs);
            let index = bc.tip_height() + 1;
            (
                index,
                bc.tip().hash.clone(),
                bc.difficulty_at(index),
                bc.params().block_reward,
                txs,
                fees,
            )
        };
        let coinbase_amount = reward
            .checked_add(fees)
            .ok_or_else(|| ChainError::Validation("block reward plus fees overflows".into()))?;
        let timestamp = Utc::now().timestamp();

        let id = Uuid::new_v4();
        let cancel = Arc::new(AtomicBool::new(false));
        let (results, findings) = mpsc::channel();
        let mut participants = Vec::with_capacity(members.len());

        for (i, (name, address)) in members.into_iter().enumerate() {
            let mut transactions = Vec::with_capacity(snapshot.len() + 1);
            transactions.push(Transaction::coinbase(&address, coinbase_amount, index));
            transactions.extend(snapshot.iter().cloned());
            let header = BlockHeader::new(
                index,
                previous_hash.clone(),
                &transactions,
                difficulty,
                timestamp,
            );
            let progress = Arc::new(SearchProgress::default());

            let job = SearchJob {
                participant: i,
                header: header.clone(),
                cancel: Arc::clone(&cancel),
                progress: Arc::clone(&progress),
                results: results.clone(),
            };
            thread::spawn(move || search::run_search(job));

            participants.push(Participant {
                name,
                address,
                candidate: Candidate {
                    header,
                    transactions,
                },
                progress,
            });
        }
        drop(results);

        {
            let slot = Arc::clone(&self.slot);
            let cancel = Arc::clone(&cancel);
            thread::spawn(move || collect_findings(slot, id, findings, cancel));
        }

        let started = RoundStarted {
            round_number: index,
            participants: participants.iter().map(|p| p.name.clone()).collect(),
            difficulty,
            transaction_count: snapshot.len(),
        };
        info!(
            "MINING - round {} started: {} participants, {} txs, difficulty {}",
            index,
            participants.len(),
            snapshot.len(),
            difficulty
        );

        *slot = Some(MiningRound {
            id,
            round_number: index,
            state: RoundState::Computing,
            started_at: Instant::now(),
            difficulty,
            reward,
            fees,
            snapshot: snapshot.into_iter().map(|t| t.txid).collect(),
            participants,
            cancel,
            winner: None,
        });
        Ok(started)
    }

    pub fn state(&self) -> RoundState {
        self.slot()
            .as_ref()
            .map(|r| r.state)
            .unwrap_or(RoundState::Idle)
    }

    pub fn is_active(&self) -> bool {
        self.slot().as_ref().is_some_and(|r| r.is_active())
    }

    /// Snapshot of the round with each worker's live counters.
    pub fn status(&self) -> RoundStatus {
        let slot = self.slot();
        let Some(round) = slot.as_ref() else {
            return RoundStatus::idle();
        };

        let participants = round
            .participants
            .iter()
            .map(|p| ParticipantStatus {
                name: p.name.clone(),
                address: p.address.clone(),
                nonce: p.progress.nonce(),
                elapsed: p.progress.elapsed_ms() as f64 / 1000.0,
                finished: p.progress.is_finished(),
            })
            .collect();
        let winner = round.winner_participant().map(|(p, w)| WinnerStatus {
            name: p.name.clone(),
            address: p.address.clone(),
            nonce: w.nonce,
            hash: w.hash.clone(),
        });

        RoundStatus {
            round_active: round.is_active(),
            state: round.state,
            round_number: Some(round.round_number),
            difficulty: Some(round.difficulty),
            transaction_count: round.snapshot.len(),
            participants,
            winner,
            block_ready: round.state == RoundState::WinnerFound,
            elapsed_time: round.started_at.elapsed().as_secs_f64(),
            computing_time: round.winner.as_ref().map(|w| w.found_after.as_secs_f64()),
        }
    }

    /// WinnerFound → Packaged: seal the winner's candidate with its nonce and
    /// append it. A rejected block discards the round and its snapshot.
    pub fn package(&self, chain: &Mutex<Blockchain>) -> ChainResult<PackagedBlock> {
        let mut slot = self.slot();
        let (block, winner_name, snapshot, reward, fees) = {
            let Some(round) = slot.as_ref() else {
                return Err(ChainError::InvalidRoundState {
                    state: RoundState::Idle,
                    action: "package",
                });
            };
            match round.state {
                RoundState::Computing => return Err(ChainError::NoWinnerYet),
                RoundState::WinnerFound => {}
                state => {
                    return Err(ChainError::InvalidRoundState {
                        state,
                        action: "package",
                    });
                }
            }
            let (participant, winner) = round.winner_participant().ok_or_else(|| {
                ChainError::ConsistencyViolation("winner recorded without a participant".into())
            })?;
            let block = participant.candidate.seal(winner.nonce);
            let sealed = if block.hash == winner.hash {
                Ok(block)
            } else {
                Err(ChainError::ConsistencyViolation(format!(
                    "sealed hash {} differs from winning hash {}",
                    block.hash, winner.hash
                )))
            };
            let snapshot: HashSet<String> = round.snapshot.iter().cloned().collect();
            (sealed, participant.name.clone(), snapshot, round.reward, round.fees)
        };

        let mut bc = chain.lock().unwrap_or_else(|e| e.into_inner());
        let appended = block.and_then(|block| {
            let summary = (block.index, block.hash.clone(), block.transactions.len());
            bc.append(block).map(|()| summary)
        });
        let (block_index, block_hash, tx_total) = match appended {
            Ok(summary) => summary,
            Err(e) => {
                let released = bc.discard_pending(&snapshot);
                *slot = None;
                error!("MINING - packaging failed, round discarded ({released} txs released): {e}");
                return Err(e);
            }
        };
        drop(bc);
        let transaction_count = tx_total.saturating_sub(1);

        let packaged = PackagedBlock {
            block_index,
            block_hash,
            winner: winner_name,
            reward,
            transaction_fee: fees,
            transaction_count,
        };
        if let Some(round) = slot.as_mut() {
            round.state = RoundState::Packaged;
        }
        info!(
            "MINING - block #{} packaged for {} ({} txs, fees {})",
            packaged.block_index, packaged.winner, transaction_count, fees
        );
        Ok(packaged)
    }

    /// Any state → Idle. Stops the workers and, unless the block was already
    /// confirmed, drops the snapshot from the pool so its inputs unlock.
    pub fn reset(&self, chain: &Mutex<Blockchain>) -> ResetOutcome {
        let mut slot = self.slot();
        let Some(round) = slot.take() else {
            return ResetOutcome {
                previous: RoundState::Idle,
                released: 0,
            };
        };
        round.cancel.store(true, Ordering::Release);

        let released = if round.state == RoundState::Packaged {
            0
        } else {
            let snapshot: HashSet<String> = round.snapshot.iter().cloned().collect();
            let mut bc = chain.lock().unwrap_or_else(|e| e.into_inner());
            bc.discard_pending(&snapshot)
        };
        info!(
            "MINING - round {} reset from {} ({released} txs released)",
            round.round_number, round.state
        );
        ResetOutcome {
            previous: round.state,
            released,
        }
    }
}

impl Drop for MiningCoordinator {
    fn drop(&mut self) {
        if let Some(round) = self.slot().as_ref() {
            round.cancel.store(true, Ordering::Release);
        }
    }
}

/// Gather findings until every worker has stopped, then commit the winner
/// if the round is still the one these workers belong to.
fn collect_findings(slot: Slot, round_id: Uuid, findings: Receiver<Finding>, cancel: Arc<AtomicBool>) {
    let mut arrived = Vec::new();
    for finding in findings {
        if arrived.is_empty() {
            cancel.store(true, Ordering::Release);
        }
        arrived.push(finding);
    }

    let Some(best) = search::resolve_winner(&arrived) else {
        debug!("MINING - round {round_id} ended without a finding");
        return;
    };

    let mut slot = slot.lock().unwrap_or_else(|e| e.into_inner());
    match slot.as_mut() {
        Some(round) if round.id == round_id && round.state == RoundState::Computing => {
            round.winner = Some(Winner {
                participant: best.participant,
                nonce: best.nonce,
                hash: best.hash.clone(),
                found_after: Duration::from_millis(best.elapsed_ms),
            });
            round.state = RoundState::WinnerFound;
            let name = round
                .participants
                .get(best.participant)
                .map(|p| p.name.as_str())
                .unwrap_or("?");
            info!(
                "MINING - round {} won by {} with nonce {} ({} finding(s))",
                round.round_number,
                name,
                best.nonce,
                arrived.len()
            );
        }
        _ => debug!("MINING - stale findings for round {round_id} dropped"),
    }
}
