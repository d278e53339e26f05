pub mod merkle;

use std::fmt;
use std::sync::LazyLock;

use rand::rngs::OsRng;
use ripemd::Ripemd160;
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey, ecdsa::Signature};
use sha2::{Digest, Sha256};

use crate::error::{ChainError, ChainResult};

pub use merkle::{MerkleProof, MerkleTree};

/// Version byte prefixed to hash160 in addresses.
pub const ADDRESS_VERSION: u8 = 0x00;
/// Version byte prefixed to private keys in WIF.
pub const WIF_VERSION: u8 = 0x80;

static SECP: LazyLock<Secp256k1<All>> = LazyLock::new(Secp256k1::new);

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// A secp256k1 keypair. The secret half never leaves this type except to sign.
#[derive(Clone)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        let (secret, public) = SECP.generate_keypair(&mut OsRng);
        Self { secret, public }
    }

    /// Parse key material given either as 64 hex chars or as WIF.
    pub fn from_private_key(text: &str) -> ChainResult<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChainError::InvalidKey("empty key".into()));
        }

        let raw = if text.len() == 64 || text.starts_with("0x") {
            hex::decode(text.trim_start_matches("0x"))
                .map_err(|_| ChainError::InvalidKey("malformed hex".into()))?
        } else {
            let payload = base58check_decode(text)
                .ok_or_else(|| ChainError::InvalidKey("malformed WIF".into()))?;
            match payload.as_slice() {
                [WIF_VERSION, key @ ..] if key.len() == 32 => key.to_vec(),
                [WIF_VERSION, key @ .., 0x01] if key.len() == 32 => key.to_vec(),
                _ => return Err(ChainError::InvalidKey("unexpected WIF payload".into())),
            }
        };

        let secret = SecretKey::from_slice(&raw)
            .map_err(|_| ChainError::InvalidKey("not a valid secp256k1 scalar".into()))?;
        let public = PublicKey::from_secret_key(&SECP, &secret);
        Ok(Self { secret, public })
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public.serialize())
    }

    pub fn address(&self) -> String {
        address_from_pubkey(&self.public)
    }

    /// Sign a 32-byte digest and return the hex DER signature.
    pub fn sign(&self, msg32: [u8; 32]) -> String {
        let msg = Message::from_digest(msg32);
        let sig = SECP.sign_ecdsa(&msg, &self.secret);
        hex::encode(&*sig.serialize_der())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// Base58Check(version ‖ RIPEMD160(SHA256(compressed pubkey))).
pub fn address_from_pubkey(pk: &PublicKey) -> String {
    let hash160 = Ripemd160::digest(sha256(&pk.serialize()));
    let mut payload = Vec::with_capacity(21);
    payload.push(ADDRESS_VERSION);
    payload.extend_from_slice(&hash160);
    base58check_encode(&payload)
}

/// Derive the address owning a hex-encoded compressed public key.
pub fn address_from_pubkey_hex(pubkey_hex: &str) -> Option<String> {
    let bytes = hex::decode(pubkey_hex).ok()?;
    let pk = PublicKey::from_slice(&bytes).ok()?;
    Some(address_from_pubkey(&pk))
}

/// Check that `address` decodes as a versioned 20-byte hash with a valid checksum.
pub fn validate_address(address: &str) -> ChainResult<()> {
    match base58check_decode(address.trim()) {
        Some(payload) if payload.len() == 21 && payload[0] == ADDRESS_VERSION => Ok(()),
        Some(_) => Err(ChainError::InvalidRecipient(format!(
            "'{address}' is not a pay-to-address payload"
        ))),
        None => Err(ChainError::InvalidRecipient(format!(
            "'{address}' is not valid Base58Check"
        ))),
    }
}

/// Verify a hex DER signature over `msg32` with a hex compressed public key.
/// Any decoding failure counts as an invalid signature.
pub fn verify_signature_hex(pubkey_hex: &str, sig_hex: &str, msg32: [u8; 32]) -> bool {
    let Ok(sig_bytes) = hex::decode(sig_hex) else {
        return false;
    };
    let Ok(sig) = Signature::from_der(&sig_bytes) else {
        return false;
    };
    let Ok(pk_bytes) = hex::decode(pubkey_hex) else {
        return false;
    };
    let Ok(pk) = PublicKey::from_slice(&pk_bytes) else {
        return false;
    };
    let msg = Message::from_digest(msg32);
    SECP.verify_ecdsa(&msg, &sig, &pk).is_ok()
}

fn base58check_encode(payload: &[u8]) -> String {
    let checksum = double_sha256(payload);
    let mut data = payload.to_vec();
    data.extend_from_slice(&checksum[..4]);
    bs58::encode(data).into_string()
}

fn base58check_decode(text: &str) -> Option<Vec<u8>> {
    let data = bs58::decode(text).into_vec().ok()?;
    if data.len() < 5 {
        return None;
    }
    let (payload, checksum) = data.split_at(data.len() - 4);
    if double_sha256(payload)[..4] != *checksum {
        return None;
    }
    Some(payload.to_vec())
}
