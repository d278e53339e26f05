use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::model::Transaction;
use crate::error::{ChainError, ChainResult};

/// Identifies a specific transaction output by its txid and index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: String,
    pub vout: u32,
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

/// Lifecycle of an output. The only legal moves are
/// available→locked, locked→available and locked→spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UtxoStatus {
    Available,
    Locked,
    Spent,
}

impl UtxoStatus {
    pub fn can_transition_to(self, next: UtxoStatus) -> bool {
        use UtxoStatus::*;
        matches!(
            (self, next),
            (Available, Locked) | (Locked, Available) | (Locked, Spent)
        )
    }
}

impl fmt::Display for UtxoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UtxoStatus::Available => "available",
            UtxoStatus::Locked => "locked",
            UtxoStatus::Spent => "spent",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UtxoEntry {
    pub amount: u64,
    pub owner: String,
    pub status: UtxoStatus,
}

/// Every output ever confirmed, keyed by (txid, vout). Spent entries are kept for history.
#[derive(Debug, Default, Clone)]
pub struct UtxoSet {
    map: HashMap<OutPoint, UtxoEntry>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Register a freshly confirmed output as available.
    pub fn create(&mut self, outpoint: OutPoint, amount: u64, owner: &str) -> ChainResult<()> {
        if self.map.contains_key(&outpoint) {
            return Err(ChainError::DuplicateOutput(outpoint));
        }
        self.map.insert(
            outpoint,
            UtxoEntry {
                amount,
                owner: owner.to_string(),
                status: UtxoStatus::Available,
            },
        );
        Ok(())
    }

    pub fn lock(&mut self, outpoint: &OutPoint) -> ChainResult<()> {
        match self.status(outpoint) {
            Some(UtxoStatus::Locked) => Err(ChainError::AlreadyLocked(outpoint.clone())),
            Some(UtxoStatus::Spent) => Err(ChainError::UtxoUnavailable {
                outpoint: outpoint.clone(),
                status: UtxoStatus::Spent,
            }),
            _ => self.transition(outpoint, UtxoStatus::Locked),
        }
    }

    pub fn unlock(&mut self, outpoint: &OutPoint) -> ChainResult<()> {
        self.transition(outpoint, UtxoStatus::Available)
    }

    pub fn spend(&mut self, outpoint: &OutPoint) -> ChainResult<()> {
        self.transition(outpoint, UtxoStatus::Spent)
    }

    fn transition(&mut self, outpoint: &OutPoint, to: UtxoStatus) -> ChainResult<()> {
        let entry = self
            .map
            .get_mut(outpoint)
            .ok_or_else(|| ChainError::NotFound(format!("utxo {outpoint}")))?;
        if !entry.status.can_transition_to(to) {
            return Err(ChainError::InvalidTransition {
                outpoint: outpoint.clone(),
                from: entry.status,
                to,
            });
        }
        entry.status = to;
        Ok(())
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&UtxoEntry> {
        self.map.get(outpoint)
    }

    pub fn status(&self, outpoint: &OutPoint) -> Option<UtxoStatus> {
        self.map.get(outpoint).map(|e| e.status)
    }

    /// Sum of `available` amounts owned by `address`.
    pub fn balance_of(&self, address: &str) -> u64 {
        self.map
            .values()
            .filter(|e| e.owner == address && e.status == UtxoStatus::Available)
            .map(|e| e.amount)
            .sum()
    }

    /// All entries owned by `address` in any status, largest amount first.
    pub fn owned_by(&self, address: &str) -> Vec<(OutPoint, UtxoEntry)> {
        let mut owned: Vec<_> = self
            .map
            .iter()
            .filter(|(_, e)| e.owner == address)
            .map(|(op, e)| (op.clone(), e.clone()))
            .collect();
        owned.sort_by(|a, b| b.1.amount.cmp(&a.1.amount).then_with(|| a.0.cmp(&b.0)));
        owned
    }

    /// Spendable entries owned by `address`, largest amount first.
    pub fn available_for(&self, address: &str) -> Vec<(OutPoint, UtxoEntry)> {
        self.owned_by(address)
            .into_iter()
            .filter(|(_, e)| e.status == UtxoStatus::Available)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Register all outputs of a confirmed transaction.
    pub fn add_tx_outputs(&mut self, tx: &Transaction) -> ChainResult<()> {
        for (i, out) in tx.outputs.iter().enumerate() {
            let op = OutPoint {
                txid: tx.txid.clone(),
                vout: i as u32,
            };
            self.create(op, out.amount, &out.address)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(n: u32) -> OutPoint {
        OutPoint {
            txid: "t".into(),
            vout: n,
        }
    }

    fn set_with(n: u32, amount: u64, owner: &str) -> UtxoSet {
        let mut set = UtxoSet::new();
        set.create(op(n), amount, owner).unwrap();
        set
    }

    #[test]
    fn transition_table_is_closed() {
        use UtxoStatus::*;
        let all = [Available, Locked, Spent];
        let allowed = [(Available, Locked), (Locked, Available), (Locked, Spent)];
        for from in all {
            for to in all {
                assert_eq!(from.can_transition_to(to), allowed.contains(&(from, to)));
            }
        }
    }

    #[test]
    fn lock_then_spend_follows_lifecycle() {
        let mut set = set_with(0, 10, "w");
        set.lock(&op(0)).unwrap();
        assert_eq!(set.status(&op(0)), Some(UtxoStatus::Locked));
        set.spend(&op(0)).unwrap();
        assert_eq!(set.status(&op(0)), Some(UtxoStatus::Spent));
        // spent entries stay for audit
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn spend_requires_lock() {
        let mut set = set_with(0, 10, "w");
        assert!(matches!(
            set.spend(&op(0)),
            Err(ChainError::InvalidTransition { .. })
        ));
        set.lock(&op(0)).unwrap();
        set.spend(&op(0)).unwrap();
        assert!(set.spend(&op(0)).is_err());
        assert!(set.unlock(&op(0)).is_err());
    }

    #[test]
    fn lock_reports_specific_failures() {
        let mut set = set_with(0, 10, "w");
        assert!(matches!(set.lock(&op(9)), Err(ChainError::NotFound(_))));
        set.lock(&op(0)).unwrap();
        assert!(matches!(set.lock(&op(0)), Err(ChainError::AlreadyLocked(_))));
        set.spend(&op(0)).unwrap();
        assert!(matches!(
            set.lock(&op(0)),
            Err(ChainError::UtxoUnavailable {
                status: UtxoStatus::Spent,
                ..
            })
        ));
    }

    #[test]
    fn unlock_restores_availability() {
        let mut set = set_with(0, 10, "w");
        assert!(set.unlock(&op(0)).is_err());
        set.lock(&op(0)).unwrap();
        assert_eq!(set.balance_of("w"), 0);
        set.unlock(&op(0)).unwrap();
        assert_eq!(set.balance_of("w"), 10);
    }

    #[test]
    fn create_rejects_existing_key() {
        let mut set = set_with(0, 10, "w");
        assert!(matches!(
            set.create(op(0), 5, "x"),
            Err(ChainError::DuplicateOutput(_))
        ));
        assert_eq!(set.get(&op(0)).unwrap().amount, 10);
    }

    #[test]
    fn balance_counts_only_available_entries() {
        let mut set = UtxoSet::new();
        set.create(op(0), 10, "w").unwrap();
        set.create(op(1), 7, "w").unwrap();
        set.create(op(2), 3, "other").unwrap();
        set.lock(&op(1)).unwrap();
        assert_eq!(set.balance_of("w"), 10);

        let available = set.available_for("w");
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].0, op(0));
        assert_eq!(set.owned_by("w").len(), 2);
    }
}
