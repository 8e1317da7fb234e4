use chrono::{DateTime, Utc};
use m360_common::{EthernetStatus, PingStatus, SensorKind};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Credential {
    pub id: i64,
    pub owner_id: String,
    pub name: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VpnProfile {
    pub id: i64,
    pub owner_id: String,
    pub name: String,
    pub config_text: String,
    pub check_ip: Option<String>,
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Device {
    pub id: String,
    pub owner_id: String,
    pub client_name: String,
    pub ip: String,
    pub mac: Option<String>,
    pub node: Option<String>,
    pub status: String,
    pub credential_id: Option<i64>,
    pub is_maestro: bool,
    pub maestro_id: Option<String>,
    pub vpn_profile_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Monitor {
    pub id: i64,
    pub device_id: String,
    pub owner_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Sensor {
    pub id: i64,
    pub monitor_id: i64,
    pub kind: String,
    pub name: String,
    pub config: String,
    pub owner_id: String,
}

impl Sensor {
    pub fn kind(&self) -> Option<SensorKind> {
        match self.kind.as_str() {
            "ping" => Some(SensorKind::Ping),
            "ethernet" => Some(SensorKind::Ethernet),
            _ => None,
        }
    }

    pub fn parsed_config(&self) -> serde_json::Result<m360_common::SensorConfig> {
        serde_json::from_str(&self.config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PingSample {
    pub id: i64,
    pub sensor_id: i64,
    pub ts: DateTime<Utc>,
    pub status: String,
    pub latency_ms: Option<f64>,
}

impl PingSample {
    pub fn status(&self) -> PingStatus {
        match self.status.as_str() {
            "ok" => PingStatus::Ok,
            "high_latency" => PingStatus::HighLatency,
            "timeout" => PingStatus::Timeout,
            "error" => PingStatus::Error,
            _ => PingStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EthernetSample {
    pub id: i64,
    pub sensor_id: i64,
    pub ts: DateTime<Utc>,
    pub status: String,
    pub speed: String,
    pub rx_bitrate: String,
    pub tx_bitrate: String,
}

impl EthernetSample {
    pub fn status(&self) -> EthernetStatus {
        match self.status.as_str() {
            "link_up" => EthernetStatus::LinkUp,
            "link_down" => EthernetStatus::LinkDown,
            "error" => EthernetStatus::Error,
            _ => EthernetStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationChannel {
    pub id: i64,
    pub owner_id: String,
    pub name: String,
    pub kind: String,
    pub config: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AlertRecord {
    pub id: i64,
    pub sensor_id: i64,
    pub channel_id: i64,
    pub ts: DateTime<Utc>,
    pub details: String,
}

/// The Persistence Gateway's aggregated view, spec.md §6: one Monitor joined
/// with its Device and all of the Device's Sensors.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorWithSensors {
    pub monitor_id: i64,
    pub device_id: String,
    pub device: Device,
    pub sensors: Vec<SensorSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SensorSummary {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub config: String,
}

/// Everything the Sensor Scheduler needs to launch a worker (spec.md §4.5):
/// a Sensor joined with its Device, including the Device's maestro and VPN
/// profile.
#[derive(Debug, Clone)]
pub struct SensorContext {
    pub sensor: Sensor,
    pub device: Device,
    pub maestro: Option<Device>,
    pub vpn_profile: Option<VpnProfile>,
    pub credential: Option<Credential>,
}
