use log::info;
use std::collections::HashMap;

use crate::crypto::KeyPair;
use crate::error::{ChainError, ChainResult};

/// A named participant holding a secp256k1 keypair.
#[derive(Debug, Clone)]
pub struct Wallet {
    pub name: String,
    pub address: String,
    keys: KeyPair,
}

impl Wallet {
    fn new(name: String, keys: KeyPair) -> Self {
        Self {
            address: keys.address(),
            name,
            keys,
        }
    }

    pub fn keys(&self) -> &KeyPair {
        &self.keys
    }

    pub fn public_key_hex(&self) -> String {
        self.keys.public_key_hex()
    }
}

/// Wallets in registration order. The order doubles as the tie-break order
/// between mining participants.
#[derive(Debug, Default)]
pub struct WalletRegistry {
    wallets: Vec<Wallet>,
    by_name: HashMap<String, usize>,
}

impl WalletRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wallet with a freshly generated keypair.
    pub fn create(&mut self, name: &str) -> ChainResult<&Wallet> {
        self.insert(name, KeyPair::generate())
    }

    /// Register a wallet from existing private key material (hex or WIF).
    pub fn import(&mut self, name: &str, private_key: &str) -> ChainResult<&Wallet> {
        let name = Self::check_name(name)?;
        if self.by_name.contains_key(name) {
            return Err(ChainError::DuplicateName(name.to_string()));
        }
        let keys = KeyPair::from_private_key(private_key)?;
        self.insert(name, keys)
    }

    fn insert(&mut self, name: &str, keys: KeyPair) -> ChainResult<&Wallet> {
        let name = Self::check_name(name)?;
        if self.by_name.contains_key(name) {
            return Err(ChainError::DuplicateName(name.to_string()));
        }
        let idx = self.wallets.len();
        self.wallets.push(Wallet::new(name.to_string(), keys));
        self.by_name.insert(name.to_string(), idx);
        let wallet = &self.wallets[idx];
        info!("WALLET - registered '{}' as {}", wallet.name, wallet.address);
        Ok(wallet)
    }

    fn check_name(name: &str) -> ChainResult<&str> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ChainError::Validation("wallet name must not be empty".into()));
        }
        Ok(name)
    }

    pub fn get(&self, name: &str) -> ChainResult<&Wallet> {
        self.by_name
            .get(name.trim())
            .map(|&i| &self.wallets[i])
            .ok_or_else(|| ChainError::NotFound(format!("wallet '{}'", name.trim())))
    }

    /// All wallets in registration order.
    pub fn list(&self) -> &[Wallet] {
        &self.wallets
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_ONE: &str = "0000000000000000000000000000000000000000000000000000000000000001";

    #[test]
    fn names_are_unique() {
        let mut reg = WalletRegistry::new();
        reg.create("Alice").unwrap();
        assert!(matches!(
            reg.create("Alice"),
            Err(ChainError::DuplicateName(_))
        ));
        assert!(matches!(
            reg.import(" Alice ", KEY_ONE),
            Err(ChainError::DuplicateName(_))
        ));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn empty_name_is_a_validation_error() {
        let mut reg = WalletRegistry::new();
        assert!(matches!(reg.create("   "), Err(ChainError::Validation(_))));
        assert!(reg.is_empty());
    }

    #[test]
    fn registration_order_is_kept() {
        let mut reg = WalletRegistry::new();
        for name in ["Alice", "Bob", "Charlie"] {
            reg.create(name).unwrap();
        }
        let names: Vec<_> = reg.list().iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, ["Alice", "Bob", "Charlie"]);
        assert_eq!(reg.get("Bob").unwrap().name, "Bob");
        assert!(matches!(reg.get("Dave"), Err(ChainError::NotFound(_))));
    }

    #[test]
    fn import_derives_deterministic_address() {
        let mut reg = WalletRegistry::new();
        let address = reg.import("One", KEY_ONE).unwrap().address.clone();
        let expected = KeyPair::from_private_key(KEY_ONE).unwrap().address();
        assert_eq!(address, expected);

        assert!(matches!(
            reg.import("Bad", "zz"),
            Err(ChainError::InvalidKey(_))
        ));
        assert!(reg.get("Bad").is_err());
    }
}
