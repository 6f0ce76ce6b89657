mod config;
mod errors;
mod services;
mod state;
mod storage;

use crate::config::Config;
use crate::state::AppState;
use actix_web::{web, App, HttpServer};
use clap::Parser;
use env_logger::Env;
use log::{error, info};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));
    let config = Config::parse();

    let state = match AppState::from_config(&config) {
        Ok(state) => state,
        Err(err) => {
            error!("Invalid configuration: {}", err);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                err.to_string(),
            ));
        }
    };

    info!("Storage: {}", storage::redact(&config.storage_uri));
    info!(
        "Record kinds: {} (default '{}')",
        state
            .registry
            .kinds()
            .map(|k| k.name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        state.default_kind
    );
    info!("Server running at http://{}:{}", config.host, config.port);

    let json_limit = config.json_limit_bytes;
    HttpServer::new(move || {
        App::new()
            .app_data(services::json_config(json_limit))
            .app_data(web::Data::new(state.clone()))
            .service(services::records::configure_ingest_routes())
            .service(services::records::configure_retrieval_routes())
            .service(services::kinds::configure_routes())
            .service(services::health::configure_routes())
    })
        .bind((config.host.as_str(), config.port))?
        .run()
        .await
}
