mod balance;
mod chain;
mod health;
mod mining;
pub mod models;
mod stats;
mod tx;
mod wallet;

use actix_web::error::{JsonPayloadError, PathError, QueryPayloadError};
use actix_web::web::{self, ServiceConfig};
use actix_web::{Error, HttpRequest};
use log::warn;

use crate::error::ChainError;

pub use models::AppState;

fn json_error(err: JsonPayloadError, req: &HttpRequest) -> Error {
    warn!("{} {} - malformed body: {err}", req.method(), req.path());
    ChainError::Validation(err.to_string()).into()
}

fn query_error(err: QueryPayloadError, req: &HttpRequest) -> Error {
    warn!("{} {} - malformed query: {err}", req.method(), req.path());
    ChainError::Validation(err.to_string()).into()
}

fn path_error(err: PathError, req: &HttpRequest) -> Error {
    warn!("{} {} - malformed path: {err}", req.method(), req.path());
    ChainError::Validation(err.to_string()).into()
}

pub fn init_routes(cfg: &mut ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(web::JsonConfig::default().error_handler(json_error))
            .app_data(web::QueryConfig::default().error_handler(query_error))
            .app_data(web::PathConfig::default().error_handler(path_error))
            .service(health::health_check)
            .service(health::frontend_config)
            .service(wallet::create_wallet)
            .service(wallet::import_wallet)
            .service(wallet::list_wallets)
            .service(wallet::wallet_detail)
            .service(balance::wallet_balance)
            .service(tx::send_transaction)
            .service(tx::get_transaction)
            .service(mining::start_mining_round)
            .service(mining::mining_round_status)
            .service(mining::package_block)
            .service(mining::reset_mining_round)
            .service(chain::list_blocks)
            .service(chain::get_block)
            .service(chain::merkle_proof)
            .service(chain::validate_chain)
            .service(stats::blockchain_stats),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use serde_json::{Value, json};
    use std::time::{Duration, Instant};

    fn state(difficulty: u32) -> web::Data<AppState> {
        let difficulty = difficulty.to_string();
        let config = Config::from_lookup(|key| match key {
            "MINING_DIFFICULTY" | "MAX_DIFFICULTY" => Some(difficulty.clone()),
            _ => None,
        })
        .unwrap();
        web::Data::new(AppState::new(config).unwrap())
    }

    async fn call(state: &web::Data<AppState>, req: test::TestRequest) -> (StatusCode, Value) {
        let app =
            test::init_service(App::new().app_data(state.clone()).configure(init_routes)).await;
        let resp = test::call_service(&app, req.to_request()).await;
        let status = resp.status();
        (status, test::read_body_json(resp).await)
    }

    async fn get_json(state: &web::Data<AppState>, uri: &str) -> (StatusCode, Value) {
        call(state, test::TestRequest::get().uri(uri)).await
    }

    async fn post_json(state: &web::Data<AppState>, uri: &str, body: Value) -> (StatusCode, Value) {
        call(state, test::TestRequest::post().uri(uri).set_json(body)).await
    }

    async fn mine_next_block(app: &web::Data<AppState>) -> Value {
        let (status, _) = post_json(app, "/api/start_mining_round", json!({})).await;
        assert_eq!(status, StatusCode::OK);

        let deadline = Instant::now() + Duration::from_secs(30);
        loop {
            let (_, round) = get_json(app, "/api/mining_round_status").await;
            if round["block_ready"] == json!(true) {
                break;
            }
            assert!(Instant::now() < deadline, "no winner in time");
            actix_web::rt::time::sleep(Duration::from_millis(5)).await;
        }

        let (status, packaged) = post_json(app, "/api/package_block", json!({})).await;
        assert_eq!(status, StatusCode::OK, "{packaged}");
        packaged
    }

    async fn balance(app: &web::Data<AppState>, name: &str) -> f64 {
        let (_, body) = get_json(app, &format!("/api/wallet_balance?wallet_name={name}")).await;
        body["balance"].as_f64().unwrap()
    }

    #[actix_web::test]
    async fn health_and_config_respond() {
        let app = state(0);
        let service =
            test::init_service(App::new().app_data(app.clone()).configure(init_routes)).await;
        let req = test::TestRequest::get().uri("/api/health").to_request();
        let resp = test::call_service(&service, req).await;
        assert!(resp.status().is_success());

        let (status, cfg) = get_json(&app, "/api/config").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cfg["refresh_interval"], 5000);
        assert_eq!(cfg["block_reward"], 50.0);
    }

    #[actix_web::test]
    async fn seeded_wallets_are_listed_in_order() {
        let app = state(0);
        let (status, body) = get_json(&app, "/api/wallets").await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body["wallets"]
            .as_array()
            .unwrap()
            .iter()
            .map(|w| w["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["Alice", "Bob", "Charlie"]);
    }

    #[actix_web::test]
    async fn duplicate_wallet_is_a_conflict() {
        let app = state(0);
        let (status, body) = post_json(&app, "/api/create_wallet", json!({"name": "Dana"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["wallet"]["balance"], 0.0);

        let (status, body) = post_json(&app, "/api/create_wallet", json!({"name": "Alice"})).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "DuplicateName");
        assert_eq!(body["category"], "state_conflict");
    }

    #[actix_web::test]
    async fn import_rejects_bad_key_material() {
        let app = state(0);
        let (status, body) = post_json(
            &app,
            "/api/import_wallet",
            json!({"name": "Eve", "private_key": "not-a-key"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "InvalidKey");

        let key = "0000000000000000000000000000000000000000000000000000000000000003";
        let (status, body) =
            post_json(&app, "/api/import_wallet", json!({"name": "Eve", "private_key": key})).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["wallet"]["address"].as_str().unwrap().starts_with('1'));
    }

    #[actix_web::test]
    async fn malformed_requests_are_validation_errors() {
        let app = state(0);
        let req = test::TestRequest::post()
            .uri("/api/create_wallet")
            .insert_header(("content-type", "application/json"))
            .set_payload("{\"nom\":");
        let (status, body) = call(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "ValidationError");

        let (status, body) = get_json(&app, "/api/wallet_balance").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "ValidationError");

        let (status, body) = get_json(&app, "/api/wallet_balance?wallet_name=Nobody").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NotFound");
    }

    #[actix_web::test]
    async fn send_reports_typed_failures() {
        let app = state(0);
        let (status, body) = post_json(
            &app,
            "/api/send_transaction",
            json!({"from_wallet": "Alice", "to_address": "nowhere", "amount": 1.0}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "InvalidRecipient");

        let (_, wallets) = get_json(&app, "/api/wallets").await;
        let bob = wallets["wallets"][1]["address"].as_str().unwrap().to_string();
        let (status, body) = post_json(
            &app,
            "/api/send_transaction",
            json!({"from_wallet": "Alice", "to_address": bob, "amount": 1.0}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "InsufficientFunds");

        let (status, body) = post_json(
            &app,
            "/api/send_transaction",
            json!({"from_wallet": "Alice", "to_address": bob, "amount": -3.0}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "ValidationError");
    }

    #[actix_web::test]
    async fn mining_rounds_confirm_transfers() {
        let app = state(0);

        let first = mine_next_block(&app).await;
        assert_eq!(first["block_index"], 1);
        assert_eq!(first["winner"], "Alice");
        assert_eq!(first["reward"], 50.0);
        assert_eq!(balance(&app, "Alice").await, 50.0);

        let (_, wallets) = get_json(&app, "/api/wallets").await;
        let bob = wallets["wallets"][1]["address"].as_str().unwrap().to_string();
        let (status, sent) = post_json(
            &app,
            "/api/send_transaction",
            json!({"from_wallet": "Alice", "to_address": bob, "amount": 10.0}),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{sent}");
        assert!(sent["transaction_id"].is_string());
        // the whole 50-coin output is locked until confirmation
        assert_eq!(balance(&app, "Alice").await, 0.0);

        let txid = sent["transaction_id"].as_str().unwrap().to_string();
        let lookup = format!("/api/transaction/{txid}");
        let (_, pending) = get_json(&app, &lookup).await;
        assert_eq!(pending["confirmed"], false);
        assert_eq!(pending["fee"], 0.01);

        let (_, stats) = get_json(&app, "/api/blockchain_stats").await;
        assert_eq!(stats["pending_transactions"], 1);

        let second = mine_next_block(&app).await;
        assert_eq!(second["transaction_count"], 1);
        assert_eq!(second["transaction_fee"], 0.01);

        let (_, stats) = get_json(&app, "/api/blockchain_stats").await;
        assert_eq!(stats["height"], 2);
        assert_eq!(stats["pending_transactions"], 0);
        assert_eq!(stats["total_supply"], 100.01);
        assert_eq!(stats["mining_round_active"], false);
        assert_eq!(balance(&app, "Bob").await, 10.0);
        assert_eq!(balance(&app, "Alice").await, 90.0);

        let (_, detail) = get_json(&app, "/api/wallet/Alice").await;
        assert_eq!(detail["history"].as_array().unwrap().len(), 3);
        assert_eq!(detail["history"][1]["net"], -10.01);
        assert_eq!(detail["history"][2]["net"], 50.01);
        let statuses: Vec<&str> = detail["utxos"]
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["status"].as_str().unwrap())
            .collect();
        assert!(statuses.contains(&"spent"));

        let (_, confirmed) = get_json(&app, &lookup).await;
        assert_eq!(confirmed["confirmed"], true);
        assert_eq!(confirmed["block_index"], 2);
        assert_eq!(confirmed["fee"], 0.01);
        let (status, _) = get_json(&app, "/api/transaction/ffff").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, valid) = get_json(&app, "/api/validate_chain").await;
        assert_eq!(valid["valid"], true);
    }

    #[actix_web::test]
    async fn round_state_conflicts_are_reported() {
        let app = state(64);
        let (status, body) = post_json(&app, "/api/package_block", json!({})).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "InvalidRoundState");

        let (status, started) = post_json(&app, "/api/start_mining_round", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(started["participants"].as_array().unwrap().len(), 3);

        let (status, body) = post_json(&app, "/api/start_mining_round", json!({})).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "InvalidRoundState");

        let (status, body) = post_json(&app, "/api/package_block", json!({})).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "NoWinnerYet");

        let (_, round) = get_json(&app, "/api/mining_round_status").await;
        assert_eq!(round["round_active"], true);
        assert_eq!(round["state"], "computing");

        let (status, reset) = post_json(&app, "/api/reset_mining_round", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reset["mining_round_active"], false);
        let (_, round) = get_json(&app, "/api/mining_round_status").await;
        assert_eq!(round["state"], "idle");
    }

    #[actix_web::test]
    async fn blocks_are_browsable_with_proofs() {
        let app = state(0);
        mine_next_block(&app).await;

        let (status, page) = get_json(&app, "/api/blocks?page=1&per_page=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total_blocks"], 2);
        assert_eq!(page["total_pages"], 2);
        assert_eq!(page["blocks"][0]["index"], 1);

        let (status, block) = get_json(&app, "/api/block/1").await;
        assert_eq!(status, StatusCode::OK);
        let coinbase = block["block"]["transactions"][0]["txid"]
            .as_str()
            .unwrap()
            .to_string();

        let (status, proof) =
            get_json(&app, &format!("/api/block/1/merkle_proof/{coinbase}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(proof["valid"], true);

        let (status, _) = get_json(&app, "/api/block/1/merkle_proof/deadbeef").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, body) = get_json(&app, "/api/block/99").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["category"], "not_found");
    }
}
