mod commands;
mod config;
mod db;
mod error;
mod ipc;
mod services;
mod utils;

use std::sync::Arc;

use commands::AppState;
use config::{Config, LOG_FILTER_VAR};
use services::collection_store::CollectionStore;
use services::item_store::ItemStore;
use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn open_state(config: &Config) -> Result<AppState, error::AppError> {
    let db = Arc::new(db::Database::new(&config.db_path)?);
    let collections = Arc::new(CollectionStore::new(
        db.clone(),
        config.default_collection.clone(),
    ));
    let items = Arc::new(ItemStore::new(db, collections.clone()));
    Ok(AppState { collections, items })
}

pub fn run() {
    let filter = EnvFilter::try_from_env(LOG_FILTER_VAR).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            std::process::exit(1);
        }
    };

    info!("opening database at {}", config.db_path.display());
    let state = match open_state(&config) {
        Ok(state) => Arc::new(state),
        Err(err) => {
            error!("failed to open storage: {err}");
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("failed to start runtime: {err}");
            std::process::exit(1);
        }
    };

    let served = runtime.block_on(ipc::serve(
        state,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    ));
    if let Err(err) = served {
        error!("ipc loop stopped: {err}");
        std::process::exit(1);
    }
}
