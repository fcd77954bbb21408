use reyer::error::ReyerError;
use reyer::logger::initialize as LoggerInitialize;
use reyer::shell::Shell;

use client_core::{ClientConfig, ReyerClient};

use common::ErrorLocation;

use std::fs::create_dir_all;
use std::panic::Location;
use std::path::PathBuf;

use log::{error, info};

const APP_DIR_NAME: &str = "reyer";

#[tokio::main]
async fn main() -> Result<(), ReyerError> {
    let log_dir = log_dir()?;

    create_dir_all(&log_dir).map_err(|e| ReyerError::Reyer {
        message: format!("Failed to create log directory: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    // Initialize logger FIRST
    LoggerInitialize(&log_dir)?;

    info!("Reyer control client starting");
    info!("Log directory: {}", log_dir.display());

    let config = match ClientConfig::default_dir() {
        Some(config_dir) => ClientConfig::load(&config_dir).map_err(|e| ReyerError::Core {
            message: format!("Failed to load config: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?,
        None => ClientConfig::default(),
    };

    info!(
        "Runtime endpoints: request {}, publish {}",
        config.request_address, config.publish_address
    );

    let client = ReyerClient::new(config).map_err(|e| ReyerError::Core {
        message: format!("Failed to create client: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    Shell::new(client)
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for ctrl-c: {e}");
            }
        })
        .await
}

fn log_dir() -> Result<PathBuf, ReyerError> {
    dirs::data_local_dir()
        .map(|dir| dir.join(APP_DIR_NAME).join("logs"))
        .ok_or_else(|| ReyerError::Reyer {
            message: "Failed to get log directory".to_string(),
            location: ErrorLocation::from(Location::caller()),
        })
}
