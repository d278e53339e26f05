use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

use super::utxo::OutPoint;
use crate::crypto::{self, KeyPair};
use crate::error::{ChainError, ChainResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxInput {
    /// References a previous unspent output (UTXO)
    pub outpoint: OutPoint,
    /// Hex compressed public key of the spender
    pub pubkey: String,
    /// Hex-encoded DER ECDSA signature
    pub signature: String,
}

impl TxInput {
    pub fn unsigned(outpoint: OutPoint) -> Self {
        Self {
            outpoint,
            pubkey: String::new(),
            signature: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: String,
    pub amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// SHA-256 of the signing payload; signatures do not affect it.
    pub txid: String,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    #[serde(default)]
    pub is_coinbase: bool,
    /// Height of the block minting this coinbase; keeps coinbase txids unique.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coinbase_height: Option<u64>,
}

impl Transaction {
    /// Build an unsigned transaction and compute its txid from its content.
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        let mut tx = Self {
            txid: String::new(),
            inputs,
            outputs,
            is_coinbase: false,
            coinbase_height: None,
        };
        tx.txid = tx.compute_txid();
        tx
    }

    /// Reward-minting transaction for the block at `height`.
    pub fn coinbase(address: &str, amount: u64, height: u64) -> Self {
        let mut tx = Self {
            txid: String::new(),
            inputs: Vec::new(),
            outputs: vec![TxOutput {
                address: address.to_string(),
                amount,
            }],
            is_coinbase: true,
            coinbase_height: Some(height),
        };
        tx.txid = tx.compute_txid();
        tx
    }

    pub fn total_output_amount(&self) -> u128 {
        self.outputs.iter().map(|o| o.amount as u128).sum()
    }

    /// Canonical signing payload (JSON) that excludes signatures and pubkeys.
    pub fn signing_payload(&self) -> Vec<u8> {
        let lite_inputs: Vec<_> = self
            .inputs
            .iter()
            .map(|i| serde_json::json!({ "txid": i.outpoint.txid, "vout": i.outpoint.vout }))
            .collect();
        let payload = serde_json::json!({
            "inputs": lite_inputs,
            "outputs": self.outputs,
            "coinbase": self.is_coinbase,
            "height": self.coinbase_height,
        });
        payload.to_string().into_bytes()
    }

    pub fn compute_txid(&self) -> String {
        crypto::sha256_hex(&self.signing_payload())
    }

    /// Digest signed by the owner of input `index`.
    pub fn sighash(&self, index: usize) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.signing_payload());
        hasher.update((index as u64).to_be_bytes());
        hasher.finalize().into()
    }

    /// Sign every input with `keys`; all inputs must belong to the same owner.
    pub fn sign_inputs(&mut self, keys: &KeyPair) {
        let pubkey = keys.public_key_hex();
        for i in 0..self.inputs.len() {
            let signature = keys.sign(self.sighash(i));
            let input = &mut self.inputs[i];
            input.pubkey = pubkey.clone();
            input.signature = signature;
        }
    }

    /// True when input `index` carries a valid signature from the key owning `owner`.
    pub fn input_is_authorized(&self, index: usize, owner: &str) -> bool {
        let Some(input) = self.inputs.get(index) else {
            return false;
        };
        if input.signature.is_empty() {
            return false;
        }
        match crypto::address_from_pubkey_hex(&input.pubkey) {
            Some(addr) if addr == owner => {
                crypto::verify_signature_hex(&input.pubkey, &input.signature, self.sighash(index))
            }
            _ => false,
        }
    }

    /// Approximate serialized size, used for fee-rate ordering.
    pub fn vsize_bytes(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }

    /// Structural checks that need no ledger state.
    pub fn check_shape(&self) -> ChainResult<()> {
        if self.txid != self.compute_txid() {
            return Err(ChainError::Validation(format!(
                "txid {} does not match transaction content",
                self.txid
            )));
        }
        if self.outputs.is_empty() {
            return Err(ChainError::Validation(
                "transaction must have at least one output".into(),
            ));
        }

        if self.is_coinbase {
            if !self.inputs.is_empty() || self.coinbase_height.is_none() {
                return Err(ChainError::Validation(
                    "coinbase must have no inputs and carry its block height".into(),
                ));
            }
            return Ok(());
        }

        if self.inputs.is_empty() {
            return Err(ChainError::Validation(
                "transaction must have at least one input".into(),
            ));
        }
        if self.outputs.iter().any(|o| o.amount == 0) {
            return Err(ChainError::Validation("output amount must be > 0".into()));
        }
        let mut seen = HashSet::new();
        for input in &self.inputs {
            if !seen.insert(&input.outpoint) {
                return Err(ChainError::Validation(format!(
                    "duplicate input outpoint {}",
                    input.outpoint
                )));
            }
        }
        Ok(())
    }
}
