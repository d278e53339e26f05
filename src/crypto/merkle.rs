use serde::{Deserialize, Serialize};

use super::double_sha256;

/// Root used for a block without transactions.
pub const EMPTY_ROOT: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// A Merkle tree over transaction ids, stored level by level (leaves first).
#[derive(Debug, Clone)]
pub struct MerkleTree {
    txids: Vec<String>,
    levels: Vec<Vec<[u8; 32]>>,
}

impl MerkleTree {
    /// Build the tree. Odd levels pair their last node with itself.
    pub fn build<S: AsRef<str>>(txids: &[S]) -> Self {
        let txids: Vec<String> = txids.iter().map(|t| t.as_ref().to_owned()).collect();
        let mut levels = Vec::new();
        let mut current: Vec<[u8; 32]> = txids.iter().map(|t| leaf_hash(t)).collect();

        while !current.is_empty() {
            let done = current.len() == 1;
            let next = if done {
                Vec::new()
            } else {
                current
                    .chunks(2)
                    .map(|pair| parent_hash(&pair[0], pair.get(1).unwrap_or(&pair[0])))
                    .collect()
            };
            levels.push(current);
            if done {
                break;
            }
            current = next;
        }

        Self { txids, levels }
    }

    pub fn root_hex(&self) -> String {
        match self.levels.last() {
            Some(top) => hex::encode(top[0]),
            None => EMPTY_ROOT.to_string(),
        }
    }

    /// Inclusion proof for `txid`, or `None` when it is not a leaf of this tree.
    pub fn proof(&self, txid: &str) -> Option<MerkleProof> {
        let mut idx = self.txids.iter().position(|t| t == txid)?;
        let mut path = Vec::new();

        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_idx = idx ^ 1;
            let sibling = level.get(sibling_idx).unwrap_or(&level[idx]);
            path.push(ProofStep {
                sibling: hex::encode(sibling),
                sibling_is_left: sibling_idx < idx,
            });
            idx /= 2;
        }

        Some(MerkleProof {
            txid: txid.to_string(),
            merkle_root: self.root_hex(),
            path,
        })
    }
}

/// Root of the tree over `txids`, hex encoded.
pub fn merkle_root<S: AsRef<str>>(txids: &[S]) -> String {
    MerkleTree::build(txids).root_hex()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: String,
    pub sibling_is_left: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleProof {
    pub txid: String,
    pub merkle_root: String,
    pub path: Vec<ProofStep>,
}

impl MerkleProof {
    /// Recompute the root from the leaf and compare with `merkle_root`.
    pub fn verify(&self) -> bool {
        let mut hash = leaf_hash(&self.txid);
        for step in &self.path {
            let Ok(bytes) = hex::decode(&step.sibling) else {
                return false;
            };
            let Ok(sibling) = <[u8; 32]>::try_from(bytes.as_slice()) else {
                return false;
            };
            hash = if step.sibling_is_left {
                parent_hash(&sibling, &hash)
            } else {
                parent_hash(&hash, &sibling)
            };
        }
        hex::encode(hash) == self.merkle_root
    }
}

fn leaf_hash(txid: &str) -> [u8; 32] {
    double_sha256(txid.as_bytes())
}

fn parent_hash(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left);
    buf[32..].copy_from_slice(right);
    double_sha256(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tree_has_zero_root() {
        let none: [&str; 0] = [];
        assert_eq!(merkle_root(&none), EMPTY_ROOT);
        assert!(MerkleTree::build(&none).proof("a").is_none());
    }

    #[test]
    fn single_leaf_root_is_leaf_hash() {
        assert_eq!(merkle_root(&["tx-a"]), hex::encode(leaf_hash("tx-a")));
    }

    #[test]
    fn odd_level_duplicates_last_node() {
        let three = merkle_root(&["a", "b", "c"]);
        let four = merkle_root(&["a", "b", "c", "c"]);
        assert_eq!(three, four);
        assert_ne!(three, merkle_root(&["a", "b"]));
    }

    #[test]
    fn order_changes_root() {
        assert_ne!(merkle_root(&["a", "b"]), merkle_root(&["b", "a"]));
    }

    #[test]
    fn proofs_verify_for_every_leaf() {
        let txids = ["t0", "t1", "t2", "t3", "t4"];
        let tree = MerkleTree::build(&txids);
        for t in txids {
            let proof = tree.proof(t).expect("leaf present");
            assert_eq!(proof.merkle_root, tree.root_hex());
            assert!(proof.verify(), "proof for {t} failed");
        }
        assert!(tree.proof("missing").is_none());
    }

    #[test]
    fn tampered_proof_fails() {
        let tree = MerkleTree::build(&["a", "b", "c"]);
        let mut proof = tree.proof("b").unwrap();
        proof.txid = "x".into();
        assert!(!proof.verify());

        let mut proof = tree.proof("a").unwrap();
        proof.path[0].sibling_is_left = !proof.path[0].sibling_is_left;
        assert!(!proof.verify());
    }
}
