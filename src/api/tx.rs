use actix_web::{HttpResponse, get, post, web};
use log::{debug, info, warn};
use std::time::Instant;

use super::models::{
    AppState, SendTransactionRequest, SendTransactionResponse, TransactionResponse,
};
use crate::error::ChainError;
use crate::transaction::{coins_to_units, units_to_coins};

/// Build, sign and queue a transfer from a registered wallet. The sender's
/// spent outputs are locked until the next block confirms them or the round
/// holding them is reset.
#[post("/send_transaction")]
pub async fn send_transaction(
    state: web::Data<AppState>,
    body: web::Json<SendTransactionRequest>,
) -> Result<HttpResponse, ChainError> {
    let t0 = Instant::now();
    let amount = match coins_to_units(body.amount) {
        Some(units) if units > 0 => units,
        _ => {
            warn!("POST /send_transaction - rejected amount {}", body.amount);
            return Err(ChainError::Validation("amount must be a positive number".into()));
        }
    };
    let fee = state.config.tx_fee;

    let keys = state.wallets().get(&body.from_wallet)?.keys().clone();
    let to = body.to_address.trim();

    let mut chain = state.chain();
    let tx = chain.build_transfer(&keys, to, amount, fee).inspect_err(|e| {
        warn!("POST /send_transaction - '{}' cannot pay {to}: {e}", body.from_wallet);
    })?;
    let txid = tx.txid.clone();
    let inputs = tx.inputs.len();
    chain.submit_transaction(tx)?;
    let pending = chain.pool().len();
    drop(chain);

    debug!(
        "POST /send_transaction - {inputs} inputs locked in {:?}",
        t0.elapsed()
    );
    info!(
        "POST /send_transaction - accepted txid={txid} from '{}' (pool size {pending})",
        body.from_wallet
    );

    Ok(HttpResponse::Ok().json(SendTransactionResponse {
        success: true,
        transaction_id: txid,
        amount: units_to_coins(amount),
        fee: units_to_coins(fee),
    }))
}

/// Look a transaction up in the chain, then in the pending pool.
#[get("/transaction/{txid}")]
pub async fn get_transaction(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ChainError> {
    let txid = path.into_inner();
    let bc = state.chain();

    if let Some((block, tx)) = bc.find_transaction(&txid) {
        let fee = bc.fee_of(tx).unwrap_or(0);
        return Ok(HttpResponse::Ok().json(TransactionResponse {
            success: true,
            confirmed: true,
            block_index: Some(block.index),
            fee: units_to_coins(fee),
            transaction: tx,
        }));
    }

    let entry = bc
        .pool()
        .get(&txid)
        .ok_or_else(|| ChainError::NotFound(format!("transaction {txid}")))?;
    Ok(HttpResponse::Ok().json(TransactionResponse {
        success: true,
        confirmed: false,
        block_index: None,
        fee: units_to_coins(entry.fee),
        transaction: &entry.tx,
    }))
}
