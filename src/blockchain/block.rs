use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::merkle::{self, MerkleTree};
use crate::transaction::Transaction;

/// Everything a miner hashes except the nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub index: u64,
    pub timestamp: i64,
    pub previous_hash: String,
    pub merkle_root: String,
    pub difficulty: u32,
}

impl BlockHeader {
    /// Header committing to `transactions` through their Merkle root.
    pub fn new(
        index: u64,
        previous_hash: String,
        transactions: &[Transaction],
        difficulty: u32,
        timestamp: i64,
    ) -> Self {
        Self {
            index,
            timestamp,
            previous_hash,
            merkle_root: merkle_root_of(transactions),
            difficulty,
        }
    }

    /// Hashing state with the nonce-independent prefix already absorbed.
    pub fn hasher(&self) -> HeaderHasher {
        let mut prefix = Sha256::new();
        prefix.update(
            format!(
                "{}:{}:{}:{}:{}:",
                self.index, self.timestamp, self.previous_hash, self.merkle_root, self.difficulty
            )
            .as_bytes(),
        );
        HeaderHasher { prefix }
    }

    pub fn hash_with_nonce(&self, nonce: u64) -> String {
        self.hasher().hash(nonce)
    }

    /// Sequential Proof-of-Work: the first nonce from zero whose hash meets
    /// this header's difficulty.
    pub fn solve(&self) -> (u64, String) {
        let hasher = self.hasher();
        let mut nonce = 0u64;
        loop {
            let hash = hasher.hash(nonce);
            if meets_difficulty(&hash, self.difficulty) {
                return (nonce, hash);
            }
            nonce = nonce.wrapping_add(1);
        }
    }
}

#[derive(Clone)]
pub struct HeaderHasher {
    prefix: Sha256,
}

impl HeaderHasher {
    pub fn hash(&self, nonce: u64) -> String {
        let mut hasher = self.prefix.clone();
        hasher.update(nonce.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// The hex hash starts with `difficulty` zero digits.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let d = difficulty as usize;
    hash.len() >= d && hash.bytes().take(d).all(|c| c == b'0')
}

pub fn merkle_root_of(transactions: &[Transaction]) -> String {
    let txids: Vec<&str> = transactions.iter().map(|t| t.txid.as_str()).collect();
    merkle::merkle_root(&txids)
}

/// A single block in the blockchain holding a list of transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: i64, // Unix timestamp (UTC)
    pub previous_hash: String,
    pub merkle_root: String,
    pub difficulty: u32, // leading hex zeros required when mined
    pub nonce: u64,
    pub hash: String, // Cached hash of the block
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Create the genesis block (first block in the chain).
    pub fn genesis() -> Self {
        let header = BlockHeader::new(0, String::new(), &[], 0, Utc::now().timestamp());
        Self::assemble(header, Vec::new(), 0)
    }

    /// Seal `transactions` under `header` with a found `nonce`.
    pub fn assemble(header: BlockHeader, transactions: Vec<Transaction>, nonce: u64) -> Self {
        let hash = header.hash_with_nonce(nonce);
        Self {
            index: header.index,
            timestamp: header.timestamp,
            previous_hash: header.previous_hash,
            merkle_root: header.merkle_root,
            difficulty: header.difficulty,
            nonce,
            hash,
            transactions,
        }
    }

    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            index: self.index,
            timestamp: self.timestamp,
            previous_hash: self.previous_hash.clone(),
            merkle_root: self.merkle_root.clone(),
            difficulty: self.difficulty,
        }
    }

    /// Hash of the header fields plus nonce (excluding the `hash` field itself).
    pub fn compute_hash(&self) -> String {
        self.header().hash_with_nonce(self.nonce)
    }

    pub fn compute_merkle_root(&self) -> String {
        merkle_root_of(&self.transactions)
    }

    pub fn merkle_tree(&self) -> MerkleTree {
        let txids: Vec<&str> = self.transactions.iter().map(|t| t.txid.as_str()).collect();
        MerkleTree::build(&txids)
    }

    /// Validate that the block's cached `hash` matches its content and
    /// satisfies the PoW difficulty. (Does NOT validate chain linkage.)
    pub fn is_valid(&self, difficulty: u32) -> bool {
        self.merkle_root == self.compute_merkle_root()
            && self.hash == self.compute_hash()
            && meets_difficulty(&self.hash, difficulty)
    }

    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first().filter(|t| t.is_coinbase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{OutPoint, TxInput, TxOutput};

    fn transfer(txid: &str) -> Transaction {
        Transaction::new(
            vec![TxInput::unsigned(OutPoint {
                txid: txid.into(),
                vout: 0,
            })],
            vec![TxOutput {
                address: "addr".into(),
                amount: 1,
            }],
        )
    }

    fn mined(index: u64, txs: Vec<Transaction>, difficulty: u32) -> Block {
        let header = BlockHeader::new(index, "prev".into(), &txs, difficulty, 1_700_000_000);
        let (nonce, _) = header.solve();
        Block::assemble(header, txs, nonce)
    }

    #[test]
    fn genesis_has_valid_hash() {
        let b = Block::genesis();
        assert_eq!(b.index, 0);
        assert!(b.previous_hash.is_empty());
        assert_eq!(b.hash, b.compute_hash());
        assert_eq!(b.merkle_root, merkle::EMPTY_ROOT);
    }

    #[test]
    fn mining_produces_leading_zeros() {
        let b = mined(1, vec![Transaction::coinbase("m", 5, 1), transfer("demo")], 2);
        assert!(b.hash.starts_with("00"));
        assert!(b.is_valid(2));
    }

    #[test]
    fn prefix_hasher_matches_full_hash() {
        let header = BlockHeader::new(3, "p".into(), &[transfer("x")], 1, 42);
        let block = Block::assemble(header.clone(), vec![transfer("x")], 77);
        assert_eq!(header.hash_with_nonce(77), block.compute_hash());
        assert_ne!(header.hash_with_nonce(78), block.hash);
    }

    #[test]
    fn invalid_when_mutated() {
        let mut b = mined(2, vec![transfer("demo")], 2);
        let old_hash = b.hash.clone();

        // Tampering with the transaction list breaks the Merkle commitment.
        b.transactions.push(transfer("x"));
        assert!(!b.is_valid(2));

        b.merkle_root = b.compute_merkle_root();
        assert_ne!(old_hash, b.compute_hash());
        assert!(!b.is_valid(2));
    }

    #[test]
    fn difficulty_predicate_counts_hex_zeros() {
        assert!(meets_difficulty("00ab", 2));
        assert!(!meets_difficulty("0a0b", 2));
        assert!(meets_difficulty("ffff", 0));
        assert!(!meets_difficulty("00", 3));
    }
}
