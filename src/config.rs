use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(name = "imulogger-remote", version, about)]
pub struct Cli {
    /// Path to configuration file
    #[clap(long, default_value = "./config.toml")]
    pub config: PathBuf,

    /// Override MQTT broker hostname
    #[clap(long)]
    pub broker_host: Option<String>,

    /// Override MQTT broker port
    #[clap(long)]
    pub broker_port: Option<u16>,

    /// Override MQTT client id
    #[clap(long)]
    pub client_id: Option<String>,

    /// Do not advertise the broker over DNS-SD
    #[clap(long)]
    pub no_advertise: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub ctrl_topic: String,
    pub status_topic: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub advertise: bool,
    pub advertise_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "imulogger-remote".to_string(),
            ctrl_topic: "/imulogger/ctrl".to_string(),
            status_topic: "/imulogger/status".to_string(),
            username: None,
            password: None,
            advertise: true,
            advertise_name: "imulogger-mqtt-broker".to_string(),
        }
    }
}

pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if cli.config.exists() {
        let config_content = fs::read_to_string(&cli.config)
            .with_context(|| format!("Failed to read config file: {:?}", cli.config))?;

        toml::from_str(&config_content).context("Failed to parse config file")?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(ref broker_host) = cli.broker_host {
        config.broker_host = broker_host.clone();
    }

    if let Some(broker_port) = cli.broker_port {
        config.broker_port = broker_port;
    }

    if let Some(ref client_id) = cli.client_id {
        config.client_id = client_id.clone();
    }

    if cli.no_advertise {
        config.advertise = false;
    }

    Ok(config)
}
