use crate::config::Config;
use crate::error::RemoteError;
use log::info;
use mdns_sd::{ServiceDaemon, ServiceInfo};
use std::collections::HashMap;

/// DNS-SD service type advertised for the broker endpoint.
const SERVICE_TYPE: &str = "_imulogger-mqtt._tcp.local.";

/// A live DNS-SD registration. Dropping it without calling
/// [`Advertisement::shutdown`] leaves the record to expire on its own.
pub struct Advertisement {
    daemon: ServiceDaemon,
    fullname: String,
}

/// Advertise the MQTT broker endpoint on the local network so loggers
/// can find it without static configuration.
pub fn advertise(config: &Config) -> Result<Advertisement, RemoteError> {
    let daemon = ServiceDaemon::new()?;

    let host_name = format!("{}.local.", config.advertise_name);
    let properties: HashMap<String, String> = HashMap::new();

    let service = ServiceInfo::new(
        SERVICE_TYPE,
        &config.advertise_name,
        &host_name,
        "",
        config.broker_port,
        properties,
    )?
    .enable_addr_auto();

    let fullname = service.get_fullname().to_string();
    daemon.register(service)?;

    info!("Registered DNS-SD service {}", fullname);

    Ok(Advertisement { daemon, fullname })
}

impl Advertisement {
    /// Withdraw the record and stop the responder.
    pub fn shutdown(self) {
        let _ = self.daemon.unregister(&self.fullname);
        let _ = self.daemon.shutdown();
        info!("Unregistered DNS-SD service {}", self.fullname);
    }
}
