use actix_web::{HttpResponse, get, post, web};
use log::{info, warn};

use super::models::{
    AppState, CreateWalletRequest, HistoryView, ImportWalletRequest, UtxoView, WalletDetailResponse,
    WalletResponse, WalletSummary, WalletsResponse,
};
use crate::error::ChainError;
use crate::transaction::{net_coins, units_to_coins};

#[post("/create_wallet")]
pub async fn create_wallet(
    state: web::Data<AppState>,
    body: web::Json<CreateWalletRequest>,
) -> Result<HttpResponse, ChainError> {
    let mut wallets = state.wallets_mut();
    let wallet = wallets.create(&body.name).inspect_err(|e| {
        warn!("POST /create_wallet - rejected '{}': {e}", body.name);
    })?;
    let summary = WalletSummary::new(wallet, &state.chain());
    info!("POST /create_wallet - '{}' -> {}", summary.name, summary.address);

    Ok(HttpResponse::Ok().json(WalletResponse {
        success: true,
        message: format!("wallet '{}' created", summary.name),
        wallet: summary,
    }))
}

#[post("/import_wallet")]
pub async fn import_wallet(
    state: web::Data<AppState>,
    body: web::Json<ImportWalletRequest>,
) -> Result<HttpResponse, ChainError> {
    let mut wallets = state.wallets_mut();
    let wallet = wallets
        .import(&body.name, &body.private_key)
        .inspect_err(|e| warn!("POST /import_wallet - rejected '{}': {e}", body.name))?;
    let summary = WalletSummary::new(wallet, &state.chain());
    info!("POST /import_wallet - '{}' -> {}", summary.name, summary.address);

    Ok(HttpResponse::Ok().json(WalletResponse {
        success: true,
        message: format!("wallet '{}' imported", summary.name),
        wallet: summary,
    }))
}

/// All wallets in registration order with their spendable balance.
#[get("/wallets")]
pub async fn list_wallets(state: web::Data<AppState>) -> Result<HttpResponse, ChainError> {
    let wallets = state.wallets();
    let chain = state.chain();
    let summaries = wallets
        .list()
        .iter()
        .map(|w| WalletSummary::new(w, &chain))
        .collect();

    Ok(HttpResponse::Ok().json(WalletsResponse {
        success: true,
        wallets: summaries,
    }))
}

/// Wallet detail: owned outputs in every status plus confirmed history.
#[get("/wallet/{name}")]
pub async fn wallet_detail(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ChainError> {
    let name = path.into_inner();
    let wallets = state.wallets();
    let wallet = wallets.get(&name)?;
    let chain = state.chain();

    let utxos = chain
        .utxos()
        .owned_by(&wallet.address)
        .into_iter()
        .map(|(op, entry)| UtxoView {
            txid: op.txid,
            vout: op.vout,
            amount: units_to_coins(entry.amount),
            status: entry.status,
        })
        .collect();
    let history = chain
        .history_of(&wallet.address)
        .into_iter()
        .map(|h| HistoryView {
            net: net_coins(h.received, h.sent),
            txid: h.txid,
            block_index: h.block_index,
            timestamp: h.timestamp,
            is_coinbase: h.is_coinbase,
            received: units_to_coins(h.received),
            sent: units_to_coins(h.sent),
        })
        .collect();

    Ok(HttpResponse::Ok().json(WalletDetailResponse {
        success: true,
        name: wallet.name.clone(),
        address: wallet.address.clone(),
        public_key: wallet.public_key_hex(),
        balance: units_to_coins(chain.balance_of(&wallet.address)),
        utxos,
        history,
    }))
}
