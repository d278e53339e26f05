use actix_web::{HttpResponse, Responder, get, web};

use super::models::{AppState, FrontendConfigResponse};
use crate::transaction::units_to_coins;

const MAX_LOG_ENTRIES: usize = 100;
const HASH_DISPLAY_LENGTH: usize = 16;

#[get("/health")]
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().body("API is up and running 🦀")
}

/// Settings the front end polls with.
#[get("/config")]
pub async fn frontend_config(state: web::Data<AppState>) -> impl Responder {
    let cfg = &state.config;
    HttpResponse::Ok().json(FrontendConfigResponse {
        refresh_interval: cfg.refresh_interval_ms,
        max_log_entries: MAX_LOG_ENTRIES,
        hash_display_length: HASH_DISPLAY_LENGTH,
        difficulty: cfg.difficulty,
        block_reward: units_to_coins(cfg.block_reward),
        transaction_fee: units_to_coins(cfg.tx_fee),
    })
}
