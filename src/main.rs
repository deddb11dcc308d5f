mod command_console;
mod config;
mod discovery;
mod error;
mod mqtt_manager;
mod protocol;
mod status_monitor;
mod types;

use anyhow::Result;
use clap::Parser;
use log::{error, info};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};

use crate::mqtt_manager::{MqttHandle, MqttManager};
use crate::types::{DeviceState, Scrollback};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    info!("Starting imulogger-remote");

    // Parse command-line arguments
    let cli = config::Cli::parse();

    // Load configuration
    let config = config::load_config(&cli)?;
    info!("Configuration loaded successfully");

    // Shared state: session scrollback and last-seen device values
    let scrollback = Arc::new(Mutex::new(Scrollback::new()));
    let device = Arc::new(RwLock::new(DeviceState::default()));

    // Advertise the broker endpoint on the local network
    let advertisement = if config.advertise {
        match discovery::advertise(&config) {
            Ok(ad) => Some(ad),
            Err(e) => {
                scrollback
                    .lock()
                    .await
                    .error(format!("DNS-SD registration failed: {}", e));
                None
            }
        }
    } else {
        None
    };

    let (command_tx, command_rx) = mpsc::channel(100);
    let (event_tx, event_rx) = mpsc::channel(100);

    // Spawn MQTT manager task
    let manager = MqttManager::new(&config, command_rx, event_tx);
    let manager_handle = tokio::spawn(manager.run());

    // Spawn status monitor task
    let monitor_handle = {
        let config = config.clone();
        let device = Arc::clone(&device);
        let scrollback = Arc::clone(&scrollback);

        tokio::spawn(async move { status_monitor::run(config, event_rx, device, scrollback).await })
    };

    // Spawn console task
    let console_handle = {
        let handle = MqttHandle::new(command_tx);
        let device = Arc::clone(&device);
        let scrollback = Arc::clone(&scrollback);

        tokio::spawn(async move { command_console::run(handle, device, scrollback).await })
    };

    info!("All tasks started successfully");

    // The console ends on quit/EOF; the other tasks run indefinitely
    tokio::select! {
        _ = manager_handle => {
            error!("MQTT manager task terminated unexpectedly");
        }
        _ = monitor_handle => {
            error!("Status monitor task terminated unexpectedly");
        }
        res = console_handle => {
            match res {
                Ok(Ok(())) => info!("Console closed, shutting down"),
                Ok(Err(e)) => error!("Console error: {}", e),
                Err(e) => error!("Console task failed: {}", e),
            }
        }
    }

    if let Some(ad) = advertisement {
        ad.shutdown();
    }

    Ok(())
}
