use actix_web::{HttpResponse, get, web};

use super::models::{AppState, BlockSummary, StatsResponse};
use crate::transaction::units_to_coins;

#[get("/blockchain_stats")]
pub async fn blockchain_stats(state: web::Data<AppState>) -> HttpResponse {
    let mining_round_active = state.mining.is_active();

    let bc = state.chain();
    HttpResponse::Ok().json(StatsResponse {
        height: bc.tip_height(),
        block_count: bc.len(),
        difficulty: bc.next_difficulty(),
        pending_transactions: bc.pool().len(),
        total_supply: units_to_coins(bc.total_supply()),
        utxo_count: bc.utxos().len(),
        mining_round_active,
        latest_block: BlockSummary::from(bc.tip()),
    })
}
