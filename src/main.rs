mod api;
mod config;
mod db;
mod error;
mod logging;
mod store;
mod types;
mod validation;

use log::{error, info};
use std::error::Error;
use std::sync::Arc;

use crate::config::{Backend, Config, LogFormat};
use crate::db::SqliteBlobStore;
use crate::store::RecordStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            logging::init(LogFormat::Text);
            error!("Unable to load configuration: {}", e);
            return Err(e.into());
        }
    };
    logging::init(config.log_format);
    info!("Starting vehicle-data with {:?} backend", config.backend);

    let store = match config.backend {
        Backend::Memory => RecordStore::in_memory(),
        Backend::Sqlite => RecordStore::new(Arc::new(SqliteBlobStore::open(
            &config.db_path,
            &config.store_name,
        )?)),
    };

    if let Err(e) = api::run(config, store).await {
        error!("Server failed: {}", e);
        return Err(e.into());
    }
    info!("Exiting main");
    Ok(())
}
