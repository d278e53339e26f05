use log::{debug, error, info};
use std::collections::HashSet;

use super::block::meets_difficulty;
use super::{Block, LedgerParams};
use crate::crypto::{self, KeyPair};
use crate::error::{ChainError, ChainResult};
use crate::transaction::{Transaction, TransactionPool, TxInput, TxOutput, UtxoSet, UtxoStatus};

/// A confirmed transaction as seen from one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub txid: String,
    pub block_index: u64,
    pub timestamp: i64,
    pub is_coinbase: bool,
    pub received: u64,
    pub sent: u64,
}

/// In-memory ledger: the block chain together with the UTXO set and the
/// pool of pending transactions. All three change under one `&mut self`.
#[derive(Debug)]
pub struct Blockchain {
    chain: Vec<Block>,
    utxos: UtxoSet,
    pool: TransactionPool,
    params: LedgerParams,
    total_supply: u64,
}

impl Blockchain {
    /// Initialize a new blockchain with a genesis block.
    pub fn new(params: LedgerParams, allow_self_transfer: bool) -> ChainResult<Self> {
        let mut bc = Self {
            chain: Vec::new(),
            utxos: UtxoSet::new(),
            pool: TransactionPool::new(allow_self_transfer),
            params,
            total_supply: 0,
        };
        bc.append(Block::genesis())?;
        Ok(bc)
    }

    pub fn params(&self) -> &LedgerParams {
        &self.params
    }

    /// Return the last block in the chain.
    pub fn tip(&self) -> &Block {
        self.chain
            .last()
            .expect("Blockchain should always have at least the genesis block")
    }

    pub fn tip_height(&self) -> u64 {
        self.tip().index
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    pub fn get_block(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.chain.get(i))
    }

    pub fn difficulty_at(&self, height: u64) -> u32 {
        self.params.difficulty_at(height)
    }

    /// Difficulty the next block must meet.
    pub fn next_difficulty(&self) -> u32 {
        self.difficulty_at(self.tip_height() + 1)
    }

    /// Sum of all coinbase outputs ever confirmed.
    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    pub fn utxos(&self) -> &UtxoSet {
        &self.utxos
    }

    pub fn pool(&self) -> &TransactionPool {
        &self.pool
    }

    pub fn balance_of(&self, address: &str) -> u64 {
        self.utxos.balance_of(address)
    }

    /// Validate `block` against the current tip and state, then apply it.
    /// On any failure the ledger is left exactly as it was.
    pub fn append(&mut self, block: Block) -> ChainResult<()> {
        if self.chain.is_empty() {
            return self.append_genesis(block);
        }

        let staged = match self.stage(&block) {
            Ok(staged) => staged,
            Err(e) => {
                error!("LEDGER - rejected block #{} ({}): {e}", block.index, block.hash);
                return Err(e);
            }
        };

        let confirmed: HashSet<String> = block
            .transactions
            .iter()
            .filter(|t| !t.is_coinbase)
            .map(|t| t.txid.clone())
            .collect();
        self.utxos = staged.utxos;
        let removed = self.pool.remove_confirmed(&confirmed);
        self.total_supply += staged.minted;

        info!(
            "LEDGER - appended block #{} hash={} txs={} minted={} fees={} (pool -{removed})",
            block.index,
            block.hash,
            block.transactions.len(),
            staged.minted,
            staged.fees
        );
        self.chain.push(block);
        Ok(())
    }

    fn append_genesis(&mut self, block: Block) -> ChainResult<()> {
        if block.index != 0
            || !block.previous_hash.is_empty()
            || !block.transactions.is_empty()
            || block.hash != block.compute_hash()
        {
            return Err(ChainError::ConsistencyViolation(
                "malformed genesis block".into(),
            ));
        }
        info!("LEDGER - genesis block {}", block.hash);
        self.chain.push(block);
        Ok(())
    }

    /// Run every check on a copy of the UTXO set and return the copy with
    /// the block applied.
    fn stage(&self, block: &Block) -> ChainResult<Staged> {
        let tip = self.tip();
        if block.previous_hash != tip.hash {
            return Err(violation(format!(
                "previous hash {} does not match tip {}",
                block.previous_hash, tip.hash
            )));
        }
        if block.index != tip.index + 1 {
            return Err(violation(format!(
                "index {} does not follow tip {}",
                block.index, tip.index
            )));
        }
        let root = block.compute_merkle_root();
        if block.merkle_root != root {
            return Err(violation(format!(
                "merkle root {} does not match transactions ({root})",
                block.merkle_root
            )));
        }
        let required = self.difficulty_at(block.index);
        if block.difficulty != required {
            return Err(violation(format!(
                "difficulty {} differs from required {required}",
                block.difficulty
            )));
        }
        if block.hash != block.compute_hash() {
            return Err(violation(format!("hash {} does not match header", block.hash)));
        }
        if !meets_difficulty(&block.hash, required) {
            return Err(violation(format!(
                "hash {} misses difficulty {required}",
                block.hash
            )));
        }

        let coinbase = match block.transactions.split_first() {
            Some((first, _)) if first.is_coinbase => first,
            _ => return Err(violation("first transaction must be the coinbase".into())),
        };
        if block.transactions.iter().filter(|t| t.is_coinbase).count() != 1 {
            return Err(violation("block must contain exactly one coinbase".into()));
        }
        coinbase.check_shape().map_err(into_violation)?;
        if coinbase.coinbase_height != Some(block.index) {
            return Err(violation(format!(
                "coinbase height {:?} does not match block {}",
                coinbase.coinbase_height, block.index
            )));
        }

        let mut utxos = self.utxos.clone();
        let mut seen_txids = HashSet::new();
        let mut fees: u64 = 0;

        for tx in &block.transactions[1..] {
            tx.check_shape().map_err(into_violation)?;
            if !seen_txids.insert(tx.txid.as_str()) {
                return Err(violation(format!("transaction {} appears twice", tx.txid)));
            }
            if !self.pool.contains(&tx.txid) {
                return Err(violation(format!("transaction {} is not pending", tx.txid)));
            }

            let mut input_sum: u128 = 0;
            for (i, input) in tx.inputs.iter().enumerate() {
                let entry = utxos.get(&input.outpoint).ok_or_else(|| {
                    violation(format!("input {} does not exist", input.outpoint))
                })?;
                if entry.status != UtxoStatus::Locked {
                    return Err(violation(format!(
                        "input {} is {} instead of locked",
                        input.outpoint, entry.status
                    )));
                }
                if !tx.input_is_authorized(i, &entry.owner) {
                    return Err(violation(format!(
                        "input {} of {} is not signed by its owner",
                        i, tx.txid
                    )));
                }
                input_sum += entry.amount as u128;
                utxos.spend(&input.outpoint).map_err(into_violation)?;
            }

            let output_sum = tx.total_output_amount();
            if output_sum > input_sum {
                return Err(violation(format!("transaction {} creates value", tx.txid)));
            }
            let fee = u64::try_from(input_sum - output_sum)
                .map_err(|_| violation(format!("fee of {} overflows", tx.txid)))?;
            fees = fees
                .checked_add(fee)
                .ok_or_else(|| violation("total fees overflow".into()))?;
        }

        let expected = self
            .params
            .block_reward
            .checked_add(fees)
            .ok_or_else(|| violation("coinbase amount overflows".into()))?;
        let minted = u64::try_from(coinbase.total_output_amount())
            .map_err(|_| violation("coinbase amount overflows".into()))?;
        if minted != expected {
            return Err(violation(format!(
                "coinbase pays {minted}, expected reward + fees = {expected}"
            )));
        }

        for tx in &block.transactions {
            utxos.add_tx_outputs(tx).map_err(into_violation)?;
        }

        Ok(Staged {
            utxos,
            minted,
            fees,
        })
    }

    /// Re-check the whole chain: genesis shape, linkage, hashes, difficulty,
    /// Merkle roots and coinbase placement.
    pub fn is_valid_chain(&self) -> bool {
        let Some(genesis) = self.chain.first() else {
            return false;
        };
        if genesis.index != 0
            || !genesis.previous_hash.is_empty()
            || genesis.hash != genesis.compute_hash()
        {
            return false;
        }

        self.chain.windows(2).all(|pair| {
            let (prev, current) = (&pair[0], &pair[1]);
            let coinbases = current.transactions.iter().filter(|t| t.is_coinbase).count();
            current.previous_hash == prev.hash
                && current.index == prev.index + 1
                && current.difficulty == self.difficulty_at(current.index)
                && current.is_valid(current.difficulty)
                && current.coinbase().is_some()
                && coinbases == 1
        })
    }

    /// Validate and queue a signed transaction, locking its inputs.
    pub fn submit_transaction(&mut self, tx: Transaction) -> ChainResult<u64> {
        self.pool.admit(tx, &mut self.utxos)
    }

    /// Spend `keys`' available outputs largest-first to pay `amount` to `to`
    /// plus `fee`, returning change to the sender. The result is signed but
    /// not yet submitted.
    pub fn build_transfer(
        &self,
        keys: &KeyPair,
        to: &str,
        amount: u64,
        fee: u64,
    ) -> ChainResult<Transaction> {
        crypto::validate_address(to)?;
        if amount == 0 {
            return Err(ChainError::Validation("amount must be > 0".into()));
        }
        let required = amount
            .checked_add(fee)
            .ok_or_else(|| ChainError::Validation("amount overflows".into()))?;

        let sender = keys.address();
        let mut gathered: u64 = 0;
        let mut inputs = Vec::new();
        for (outpoint, entry) in self.utxos.available_for(&sender) {
            if gathered >= required {
                break;
            }
            gathered += entry.amount;
            inputs.push(TxInput::unsigned(outpoint));
        }
        if gathered < required {
            return Err(ChainError::InsufficientFunds {
                available: gathered,
                required,
            });
        }

        let mut outputs = vec![TxOutput {
            address: to.to_string(),
            amount,
        }];
        let change = gathered - required;
        if change > 0 {
            outputs.push(TxOutput {
                address: sender,
                amount: change,
            });
        }

        let mut tx = Transaction::new(inputs, outputs);
        tx.sign_inputs(keys);
        debug!(
            "LEDGER - built transfer {} ({} inputs, change {change})",
            tx.txid,
            tx.inputs.len()
        );
        Ok(tx)
    }

    /// Drop pending transactions and release their locked inputs.
    pub fn discard_pending(&mut self, txids: &HashSet<String>) -> usize {
        self.pool.discard(txids, &mut self.utxos)
    }

    /// Confirmed transactions that pay to or spend from `address`, oldest first.
    pub fn history_of(&self, address: &str) -> Vec<HistoryEntry> {
        let mut history = Vec::new();
        for block in &self.chain {
            for tx in &block.transactions {
                let received: u64 = tx
                    .outputs
                    .iter()
                    .filter(|o| o.address == address)
                    .map(|o| o.amount)
                    .sum();
                let sent: u64 = tx
                    .inputs
                    .iter()
                    .filter_map(|i| self.utxos.get(&i.outpoint))
                    .filter(|e| e.owner == address)
                    .map(|e| e.amount)
                    .sum();
                if received == 0 && sent == 0 {
                    continue;
                }
                history.push(HistoryEntry {
                    txid: tx.txid.clone(),
                    block_index: block.index,
                    timestamp: block.timestamp,
                    is_coinbase: tx.is_coinbase,
                    received,
                    sent,
                });
            }
        }
        history
    }

    /// Inputs minus outputs, resolved against the output set. `None` for a
    /// coinbase or when an input is unknown.
    pub fn fee_of(&self, tx: &Transaction) -> Option<u64> {
        if tx.is_coinbase {
            return None;
        }
        let mut input_sum: u128 = 0;
        for input in &tx.inputs {
            input_sum += self.utxos.get(&input.outpoint)?.amount as u128;
        }
        u64::try_from(input_sum.checked_sub(tx.total_output_amount())?).ok()
    }

    /// Locate a confirmed transaction and the block holding it.
    pub fn find_transaction(&self, txid: &str) -> Option<(&Block, &Transaction)> {
        self.chain.iter().find_map(|b| {
            b.transactions
                .iter()
                .find(|t| t.txid == txid)
                .map(|t| (b, t))
        })
    }
}

struct Staged {
    utxos: UtxoSet,
    minted: u64,
    fees: u64,
}

fn violation(msg: String) -> ChainError {
    ChainError::ConsistencyViolation(msg)
}

fn into_violation(e: ChainError) -> ChainError {
    match e {
        ChainError::ConsistencyViolation(_) => e,
        other => ChainError::ConsistencyViolation(other.to_string()),
    }
}
