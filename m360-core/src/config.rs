use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub port: u16,
    pub host: String,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
}

/// Tunables for the VPN Tunnel Manager (spec.md §4.2) and the reachability
/// probes it and the Credential Prober (spec.md §4.4) perform. Kept out of
/// the entity tables since this is process behaviour, not tenant data.
#[derive(Debug, Deserialize, Clone)]
pub struct NetworkSettings {
    pub routeros_port: u16,
    pub tcp_probe_timeout_ms: u64,
    pub notify_timeout_secs: u64,
    pub vpn_up_poll_attempts: u32,
    pub vpn_up_poll_interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub network: NetworkSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .set_default("server.port", 3000)?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.log_level", "info")?
            .set_default("database.url", "sqlite://m360.db")?
            .set_default("network.routeros_port", 8728)?
            .set_default("network.tcp_probe_timeout_ms", 1500)?
            .set_default("network.notify_timeout_secs", 10)?
            .set_default("network.vpn_up_poll_attempts", 30)?
            .set_default("network.vpn_up_poll_interval_ms", 100)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
