use log::{debug, warn};
use serde::Deserialize;
use std::collections::HashSet;
use std::str::FromStr;

use super::model::Transaction;
use super::utxo::{UtxoSet, UtxoStatus};
use crate::error::{ChainError, ChainResult};

/// Hard cap on the serialized size of the transactions a block may carry.
pub const MAX_BLOCK_BYTES: usize = 1_048_576;

/// A validated, unconfirmed transaction with its fee fixed at admission.
#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub tx: Transaction,
    pub fee: u64,
}

/// Which pending transactions a new mining round takes into its snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionPolicy {
    /// Everything pending, in admission order.
    All,
    /// Greedy by fee rate, then fee, then txid.
    Fee,
}

impl FromStr for SelectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(SelectionPolicy::All),
            "fee" => Ok(SelectionPolicy::Fee),
            other => Err(format!("unknown selection policy '{other}' (expected all|fee)")),
        }
    }
}

/// Pending transactions whose inputs are locked in the UTXO set.
#[derive(Debug, Default)]
pub struct TransactionPool {
    entries: Vec<PoolEntry>,
    allow_self_transfer: bool,
}

impl TransactionPool {
    pub fn new(allow_self_transfer: bool) -> Self {
        Self {
            entries: Vec::new(),
            allow_self_transfer,
        }
    }

    /// Validate `tx` against `utxos` and, if every check passes, lock all of its
    /// inputs and queue it. Either every input ends up locked or none does.
    pub fn admit(&mut self, tx: Transaction, utxos: &mut UtxoSet) -> ChainResult<u64> {
        tx.check_shape()?;
        if tx.is_coinbase {
            return Err(ChainError::Validation(
                "coinbase transactions cannot enter the pool".into(),
            ));
        }
        if self.contains(&tx.txid) {
            return Err(ChainError::DuplicateTransaction(tx.txid.clone()));
        }

        // Phase 1: check everything without mutating.
        let mut input_sum: u128 = 0;
        let mut owners = HashSet::new();
        for (i, input) in tx.inputs.iter().enumerate() {
            let op = &input.outpoint;
            let entry = utxos
                .get(op)
                .ok_or_else(|| ChainError::NotFound(format!("utxo {op}")))?;
            if entry.status != UtxoStatus::Available {
                return Err(ChainError::UtxoUnavailable {
                    outpoint: op.clone(),
                    status: entry.status,
                });
            }
            if !tx.input_is_authorized(i, &entry.owner) {
                return Err(ChainError::InvalidSignature(i));
            }
            owners.insert(entry.owner.clone());
            input_sum += entry.amount as u128;
        }

        let output_sum = tx.total_output_amount();
        if output_sum > input_sum {
            return Err(ChainError::OutputsExceedInputs {
                inputs: clamp_u64(input_sum),
                outputs: clamp_u64(output_sum),
            });
        }
        if !self.allow_self_transfer && tx.outputs.iter().all(|o| owners.contains(&o.address)) {
            return Err(ChainError::SelfTransfer);
        }
        let fee = u64::try_from(input_sum - output_sum)
            .map_err(|_| ChainError::Validation("fee overflows u64".into()))?;

        // Phase 2: lock, rolling back on the first failure.
        for (i, input) in tx.inputs.iter().enumerate() {
            if let Err(e) = utxos.lock(&input.outpoint) {
                for prev in &tx.inputs[..i] {
                    if let Err(undo) = utxos.unlock(&prev.outpoint) {
                        warn!("rollback of {} failed: {undo}", prev.outpoint);
                    }
                }
                return Err(e);
            }
        }

        debug!(
            "POOL - admitted txid={} inputs={} fee={} (size {} -> {})",
            tx.txid,
            tx.inputs.len(),
            fee,
            self.entries.len(),
            self.entries.len() + 1
        );
        self.entries.push(PoolEntry { tx, fee });
        Ok(fee)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, txid: &str) -> bool {
        self.entries.iter().any(|e| e.tx.txid == txid)
    }

    pub fn get(&self, txid: &str) -> Option<&PoolEntry> {
        self.entries.iter().find(|e| e.tx.txid == txid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PoolEntry> {
        self.entries.iter()
    }

    /// Drop transactions that a block just confirmed. Their inputs are already spent.
    pub fn remove_confirmed(&mut self, txids: &HashSet<String>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !txids.contains(&e.tx.txid));
        before - self.entries.len()
    }

    /// Throw away pending transactions and release the outputs they had locked.
    pub fn discard(&mut self, txids: &HashSet<String>, utxos: &mut UtxoSet) -> usize {
        let mut dropped = 0;
        self.entries.retain(|e| {
            if !txids.contains(&e.tx.txid) {
                return true;
            }
            for input in &e.tx.inputs {
                if let Err(err) = utxos.unlock(&input.outpoint) {
                    warn!("POOL - unlock {} failed: {err}", input.outpoint);
                }
            }
            dropped += 1;
            false
        });
        dropped
    }

    /// Choose the transactions for a block under `policy`. Returns them with their total fee.
    pub fn select(&self, policy: SelectionPolicy, max_txs: usize) -> (Vec<Transaction>, u64) {
        match policy {
            SelectionPolicy::All => {
                let fees = self.entries.iter().map(|e| e.fee).sum();
                let txs = self.entries.iter().map(|e| e.tx.clone()).collect();
                (txs, fees)
            }
            SelectionPolicy::Fee => self.select_by_fee_rate(max_txs),
        }
    }

    fn select_by_fee_rate(&self, max_txs: usize) -> (Vec<Transaction>, u64) {
        struct Cand<'a> {
            entry: &'a PoolEntry,
            size: usize,
            fee_rate: f64,
        }

        let mut cands: Vec<Cand> = self
            .entries
            .iter()
            .map(|entry| {
                let size = entry.tx.vsize_bytes();
                let fee_rate = if size > 0 {
                    entry.fee as f64 / size as f64
                } else {
                    0.0
                };
                Cand {
                    entry,
                    size,
                    fee_rate,
                }
            })
            .collect();

        cands.sort_by(|a, b| {
            b.fee_rate
                .partial_cmp(&a.fee_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.entry.fee.cmp(&a.entry.fee))
                .then_with(|| a.entry.tx.txid.cmp(&b.entry.tx.txid))
        });

        let mut total_fees = 0u64;
        let mut total_bytes = 0usize;
        let mut picked = Vec::new();
        for c in cands {
            if picked.len() >= max_txs {
                break;
            }
            if total_bytes + c.size > MAX_BLOCK_BYTES {
                continue;
            }
            total_fees += c.entry.fee;
            total_bytes += c.size;
            picked.push(c.entry.tx.clone());
        }
        (picked, total_fees)
    }
}

fn clamp_u64(v: u128) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}
