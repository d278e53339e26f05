use actix_web::{HttpResponse, get, post, web};

use super::models::{AppState, PackageBlockResponse, ResetRoundResponse, StartRoundResponse};
use crate::error::ChainError;
use crate::transaction::units_to_coins;

/// Snapshot the wallets and pending transactions and start racing for the next block.
#[post("/start_mining_round")]
pub async fn start_mining_round(state: web::Data<AppState>) -> Result<HttpResponse, ChainError> {
    let started = state.mining.start(&state.wallets, &state.chain)?;
    Ok(HttpResponse::Ok().json(StartRoundResponse {
        success: true,
        round_number: started.round_number,
        participants: started.participants,
        difficulty: started.difficulty,
        transaction_count: started.transaction_count,
    }))
}

/// Live per-participant progress; never waits on the search workers.
#[get("/mining_round_status")]
pub async fn mining_round_status(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.mining.status())
}

#[post("/package_block")]
pub async fn package_block(state: web::Data<AppState>) -> Result<HttpResponse, ChainError> {
    let packaged = state.mining.package(&state.chain)?;
    Ok(HttpResponse::Ok().json(PackageBlockResponse {
        success: true,
        block_index: packaged.block_index,
        block_hash: packaged.block_hash,
        winner: packaged.winner,
        reward: units_to_coins(packaged.reward),
        transaction_fee: units_to_coins(packaged.transaction_fee),
        transaction_count: packaged.transaction_count,
    }))
}

#[post("/reset_mining_round")]
pub async fn reset_mining_round(state: web::Data<AppState>) -> HttpResponse {
    let outcome = state.mining.reset(&state.chain);
    HttpResponse::Ok().json(ResetRoundResponse {
        success: true,
        message: format!("mining round reset (was {})", outcome.previous),
        mining_round_active: false,
        released_transactions: outcome.released,
    })
}
