use std::env;
use std::str::FromStr;
use thiserror::Error;

use crate::blockchain::{DEFAULT_DIFFICULTY, DEFAULT_MAX_DIFFICULTY, LedgerParams};
use crate::transaction::{SelectionPolicy, coins_to_units};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name}={value:?} is invalid: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime settings read from the environment (after `.env` is loaded).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub difficulty: u32,
    pub max_difficulty: u32,
    pub difficulty_step_blocks: u64,
    /// Base units.
    pub block_reward: u64,
    /// Base units charged by `send_transaction`.
    pub tx_fee: u64,
    pub tx_policy: SelectionPolicy,
    pub max_txs_per_block: usize,
    pub allow_self_transfer: bool,
    pub seed_wallets: Vec<String>,
    pub refresh_interval_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());

        let difficulty = parse_or(get("MINING_DIFFICULTY"), "MINING_DIFFICULTY", DEFAULT_DIFFICULTY)?;
        let max_difficulty = parse_or(get("MAX_DIFFICULTY"), "MAX_DIFFICULTY", DEFAULT_MAX_DIFFICULTY)?;
        for (name, value) in [
            ("MINING_DIFFICULTY", difficulty),
            ("MAX_DIFFICULTY", max_difficulty),
        ] {
            if value > 64 {
                return Err(invalid(
                    name,
                    value.to_string(),
                    "a sha256 hex digest has 64 digits",
                ));
            }
        }
        if difficulty > max_difficulty {
            return Err(invalid(
                "MINING_DIFFICULTY",
                difficulty.to_string(),
                format!("must not exceed MAX_DIFFICULTY ({max_difficulty})"),
            ));
        }

        let block_reward = coins("BLOCK_REWARD", get("BLOCK_REWARD"), 50.0)?;
        let tx_fee = coins("TX_FEE", get("TX_FEE"), 0.01)?;

        let tx_policy = match get("MINING_TX_POLICY") {
            Some(v) => v
                .parse::<SelectionPolicy>()
                .map_err(|reason| invalid("MINING_TX_POLICY", v.clone(), reason))?,
            None => SelectionPolicy::All,
        };

        let allow_self_transfer = match get("ALLOW_SELF_TRANSFER") {
            Some(v) => parse_bool(&v)
                .ok_or_else(|| invalid("ALLOW_SELF_TRANSFER", v.clone(), "expected true/false"))?,
            None => true,
        };

        let seed_wallets = match lookup("SEED_WALLETS") {
            Some(v) => v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            None => vec!["Alice".into(), "Bob".into(), "Charlie".into()],
        };

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or(get("PORT"), "PORT", 8080)?,
            difficulty,
            max_difficulty,
            difficulty_step_blocks: parse_or(get("DIFFICULTY_STEP_BLOCKS"), "DIFFICULTY_STEP_BLOCKS", 0)?,
            block_reward,
            tx_fee,
            tx_policy,
            max_txs_per_block: parse_or(get("MAX_TXS_PER_BLOCK"), "MAX_TXS_PER_BLOCK", 500)?,
            allow_self_transfer,
            seed_wallets,
            refresh_interval_ms: parse_or(get("REFRESH_INTERVAL_MS"), "REFRESH_INTERVAL_MS", 5000)?,
        })
    }

    pub fn ledger_params(&self) -> LedgerParams {
        LedgerParams {
            block_reward: self.block_reward,
            base_difficulty: self.difficulty,
            max_difficulty: self.max_difficulty,
            difficulty_step_blocks: self.difficulty_step_blocks,
        }
    }
}

fn invalid(name: &'static str, value: String, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        name,
        value,
        reason: reason.into(),
    }
}

fn parse_or<T>(raw: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(name, v.clone(), e.to_string())),
        None => Ok(default),
    }
}

fn coins(name: &'static str, raw: Option<String>, default: f64) -> Result<u64, ConfigError> {
    let value: f64 = parse_or(raw.clone(), name, default)?;
    coins_to_units(value).ok_or_else(|| {
        invalid(
            name,
            raw.unwrap_or_else(|| value.to_string()),
            "expected a non-negative coin amount",
        )
    })
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
