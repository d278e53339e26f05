mod api;
mod blockchain;
mod config;
mod crypto;
mod error;
mod mining;
mod transaction;
mod wallet;

use actix_web::{App, HttpServer, web};
use dotenvy::dotenv;
use log::{error, info};
use std::io;

use api::AppState;
use config::Config;

#[actix_web::main]
async fn main() -> io::Result<()> {
    let _ = dotenv();
    env_logger::init();

    let config = Config::from_env().map_err(|e| {
        error!("invalid configuration: {e}");
        io::Error::new(io::ErrorKind::InvalidInput, e)
    })?;
    let (host, port) = (config.host.clone(), config.port);
    info!(
        "difficulty {} (max {}, step {}), reward {} units, policy {:?}",
        config.difficulty,
        config.max_difficulty,
        config.difficulty_step_blocks,
        config.block_reward,
        config.tx_policy
    );

    let state = web::Data::new(AppState::new(config).map_err(io::Error::other)?);
    let seeded: Vec<String> = state.wallets().list().iter().map(|w| w.name.clone()).collect();
    info!("seeded {} wallet(s): {seeded:?}", seeded.len());

    println!("⛓️ Starting mining-round API at http://{host}:{port}/api");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::init_routes)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
