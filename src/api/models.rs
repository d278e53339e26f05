use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::blockchain::{Block, Blockchain};
use crate::config::Config;
use crate::error::ChainResult;
use crate::mining::MiningCoordinator;
use crate::transaction::{Transaction, UtxoStatus, units_to_coins};
use crate::wallet::{Wallet, WalletRegistry};

/// Shared application state: ledger, wallet registry and the mining coordinator.
///
/// Lock order is coordinator, then wallets, then chain. Handlers never hold a
/// guard while calling into the coordinator.
pub struct AppState {
    pub config: Config,
    pub chain: Mutex<Blockchain>,
    pub wallets: RwLock<WalletRegistry>,
    pub mining: MiningCoordinator,
}

impl AppState {
    /// Build the ledger from `config` and register its seed wallets in order.
    pub fn new(config: Config) -> ChainResult<Self> {
        let chain = Blockchain::new(config.ledger_params(), config.allow_self_transfer)?;
        let mut wallets = WalletRegistry::new();
        for name in &config.seed_wallets {
            wallets.create(name)?;
        }
        let mining = MiningCoordinator::new(config.tx_policy, config.max_txs_per_block);
        Ok(Self {
            config,
            chain: Mutex::new(chain),
            wallets: RwLock::new(wallets),
            mining,
        })
    }

    pub fn chain(&self) -> MutexGuard<'_, Blockchain> {
        self.chain.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn wallets(&self) -> RwLockReadGuard<'_, WalletRegistry> {
        self.wallets.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn wallets_mut(&self) -> RwLockWriteGuard<'_, WalletRegistry> {
        self.wallets.write().unwrap_or_else(|e| e.into_inner())
    }
}

/* ---------- Wallet API Models ---------- */

#[derive(Deserialize)]
pub struct CreateWalletRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct ImportWalletRequest {
    pub name: String,
    pub private_key: String,
}

#[derive(Deserialize)]
pub struct WalletBalanceQuery {
    pub wallet_name: String,
}

#[derive(Serialize)]
pub struct WalletSummary {
    pub name: String,
    pub address: String,
    pub balance: f64,
}

impl WalletSummary {
    pub fn new(wallet: &Wallet, chain: &Blockchain) -> Self {
        Self {
            name: wallet.name.clone(),
            address: wallet.address.clone(),
            balance: units_to_coins(chain.balance_of(&wallet.address)),
        }
    }
}

#[derive(Serialize)]
pub struct WalletResponse {
    pub success: bool,
    pub message: String,
    pub wallet: WalletSummary,
}

#[derive(Serialize)]
pub struct WalletsResponse {
    pub success: bool,
    pub wallets: Vec<WalletSummary>,
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub success: bool,
    pub wallet_name: String,
    pub balance: f64,
}

#[derive(Serialize)]
pub struct UtxoView {
    pub txid: String,
    pub vout: u32,
    pub amount: f64,
    pub status: UtxoStatus,
}

#[derive(Serialize)]
pub struct HistoryView {
    pub txid: String,
    pub block_index: u64,
    pub timestamp: i64,
    pub is_coinbase: bool,
    pub received: f64,
    pub sent: f64,
    pub net: f64,
}

#[derive(Serialize)]
pub struct WalletDetailResponse {
    pub success: bool,
    pub name: String,
    pub address: String,
    pub public_key: String,
    pub balance: f64,
    pub utxos: Vec<UtxoView>,
    pub history: Vec<HistoryView>,
}

/* ---------- Transaction API Models ---------- */

#[derive(Deserialize)]
pub struct SendTransactionRequest {
    pub from_wallet: String,
    pub to_address: String,
    pub amount: f64,
}

#[derive(Serialize)]
pub struct SendTransactionResponse {
    pub success: bool,
    pub transaction_id: String,
    pub amount: f64,
    pub fee: f64,
}

#[derive(Serialize)]
pub struct TransactionResponse<'a> {
    pub success: bool,
    pub confirmed: bool,
    /// Set once the transaction is in a block.
    pub block_index: Option<u64>,
    pub fee: f64,
    pub transaction: &'a Transaction,
}

/* ---------- Mining API Models ---------- */

#[derive(Serialize)]
pub struct StartRoundResponse {
    pub success: bool,
    pub round_number: u64,
    pub participants: Vec<String>,
    pub difficulty: u32,
    pub transaction_count: usize,
}

#[derive(Serialize)]
pub struct PackageBlockResponse {
    pub success: bool,
    pub block_index: u64,
    pub block_hash: String,
    pub winner: String,
    pub reward: f64,
    pub transaction_fee: f64,
    pub transaction_count: usize,
}

#[derive(Serialize)]
pub struct ResetRoundResponse {
    pub success: bool,
    pub message: String,
    pub mining_round_active: bool,
    pub released_transactions: usize,
}

/* ---------- Chain API Models ---------- */

#[derive(Serialize)]
pub struct BlockSummary {
    pub index: u64,
    pub hash: String,
    pub previous_hash: String,
    pub timestamp: i64,
    pub transaction_count: usize,
    pub nonce: u64,
    pub difficulty: u32,
}

impl From<&Block> for BlockSummary {
    fn from(b: &Block) -> Self {
        Self {
            index: b.index,
            hash: b.hash.clone(),
            previous_hash: b.previous_hash.clone(),
            timestamp: b.timestamp,
            transaction_count: b.transactions.len(),
            nonce: b.nonce,
            difficulty: b.difficulty,
        }
    }
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Serialize)]
pub struct BlocksResponse {
    pub success: bool,
    pub blocks: Vec<BlockSummary>,
    pub page: usize,
    pub per_page: usize,
    pub total_blocks: usize,
    pub total_pages: usize,
}

#[derive(Serialize)]
pub struct BlockResponse<'a> {
    pub success: bool,
    pub block: &'a Block,
}

#[derive(Serialize)]
pub struct MerkleProofResponse {
    pub success: bool,
    pub block_index: u64,
    pub proof: crate::crypto::MerkleProof,
    pub valid: bool,
}

#[derive(Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub length: usize,
    pub difficulty: u32,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub height: u64,
    pub block_count: usize,
    pub difficulty: u32,
    pub pending_transactions: usize,
    pub total_supply: f64,
    pub utxo_count: usize,
    pub mining_round_active: bool,
    pub latest_block: BlockSummary,
}

#[derive(Serialize)]
pub struct FrontendConfigResponse {
    pub refresh_interval: u64,
    pub max_log_entries: usize,
    pub hash_display_length: usize,
    pub difficulty: u32,
    pub block_reward: f64,
    pub transaction_fee: f64,
}
