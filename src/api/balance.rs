use actix_web::{HttpResponse, get, web};

use super::models::{AppState, BalanceResponse, WalletBalanceQuery};
use crate::error::ChainError;
use crate::transaction::units_to_coins;

/// Spendable balance of a named wallet; locked outputs are excluded.
#[get("/wallet_balance")]
pub async fn wallet_balance(
    state: web::Data<AppState>,
    query: web::Query<WalletBalanceQuery>,
) -> Result<HttpResponse, ChainError> {
    let address = state.wallets().get(&query.wallet_name)?.address.clone();
    let balance = state.chain().balance_of(&address);

    Ok(HttpResponse::Ok().json(BalanceResponse {
        success: true,
        wallet_name: query.wallet_name.trim().to_string(),
        balance: units_to_coins(balance),
    }))
}
