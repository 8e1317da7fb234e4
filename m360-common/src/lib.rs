use serde::{Deserialize, Serialize};

#[cfg(feature = "db")]
use sqlx::Type;

/// Which RouterOS probe a Sensor runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum SensorKind {
    Ping,
    Ethernet,
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorKind::Ping => write!(f, "ping"),
            SensorKind::Ethernet => write!(f, "ethernet"),
        }
    }
}

/// `ping_type` variant of a ping Sensor's config, per spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PingType {
    MaestroToDevice,
    SelfToTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PingStatus {
    Ok,
    HighLatency,
    Timeout,
    Error,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EthernetStatus {
    LinkUp,
    LinkDown,
    Error,
    Pending,
}

/// Alert rule kinds a Sensor's `config.alerts[]` entry can be, spec.md §3/§4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Timeout,
    HighLatency,
    SpeedChange,
    TrafficThreshold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrafficDirection {
    #[default]
    Any,
    Rx,
    Tx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannelKind {
    Webhook,
    Telegram,
}

/// One entry of `Sensor.config.alerts[]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub channel_id: i64,
    pub cooldown_minutes: i64,
    #[serde(default)]
    pub threshold_ms: Option<f64>,
    #[serde(default)]
    pub threshold_mbps: Option<f64>,
    #[serde(default)]
    pub direction: TrafficDirection,
}

/// `Sensor.config` JSON blob, spec.md §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    #[serde(default)]
    pub interval_sec: u64,
    #[serde(default)]
    pub ping_type: Option<PingType>,
    #[serde(default)]
    pub target_ip: Option<String>,
    #[serde(default)]
    pub latency_threshold_ms: Option<f64>,
    #[serde(default)]
    pub interface_name: Option<String>,
    #[serde(default)]
    pub alerts: Vec<AlertConfig>,
}

impl SensorConfig {
    pub fn interval(&self, kind: SensorKind) -> std::time::Duration {
        let configured = self.interval_sec;
        let secs = if configured == 0 {
            match kind {
                SensorKind::Ping => 60,
                SensorKind::Ethernet => 30,
            }
        } else {
            configured
        };
        std::time::Duration::from_secs(secs)
    }
}

/// Stable wire payload for a ping sample, spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingSamplePayload {
    pub sensor_id: i64,
    pub sensor_type: String,
    pub status: PingStatus,
    pub latency_ms: Option<f64>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl PingSamplePayload {
    pub fn new(sensor_id: i64, status: PingStatus, latency_ms: Option<f64>) -> Self {
        Self {
            sensor_id,
            sensor_type: "ping".to_string(),
            status,
            latency_ms,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Stable wire payload for an ethernet sample, spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EthernetSamplePayload {
    pub sensor_id: i64,
    pub sensor_type: String,
    pub status: EthernetStatus,
    pub speed: String,
    pub rx_bitrate: String,
    pub tx_bitrate: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl EthernetSamplePayload {
    pub fn new(
        sensor_id: i64,
        status: EthernetStatus,
        speed: String,
        rx_bitrate: String,
        tx_bitrate: String,
    ) -> Self {
        Self {
            sensor_id,
            sensor_type: "ethernet".to_string(),
            status,
            speed,
            rx_bitrate,
            tx_bitrate,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Either sample kind, as delivered through the Event Fan-out (spec.md §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleEvent {
    Ping(PingSamplePayload),
    Ethernet(EthernetSamplePayload),
}

impl SampleEvent {
    pub fn sensor_id(&self) -> i64 {
        match self {
            SampleEvent::Ping(p) => p.sensor_id,
            SampleEvent::Ethernet(e) => e.sensor_id,
        }
    }
}

/// Messages sent to a subscriber of the Event Fan-out, spec.md §4.8/§6.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum WsServerMessage {
    #[serde(rename = "welcome")]
    Welcome,
    #[serde(rename = "ready")]
    Ready,
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "sensor_batch")]
    SensorBatch {
        items: Vec<SensorBatchItem>,
        ts: chrono::DateTime<chrono::Utc>,
    },
    #[serde(rename = "sample")]
    Sample(SampleEvent),
    #[serde(rename = "error")]
    Error { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SensorBatchItem {
    pub sensor_id: i64,
    pub name: String,
    pub kind: SensorKind,
    pub sample: SampleEvent,
}

impl SampleEvent {
    /// A placeholder for a sensor that has never produced a sample, per spec.md §4.9.
    pub fn pending(sensor_id: i64, kind: SensorKind) -> Self {
        match kind {
            SensorKind::Ping => SampleEvent::Ping(PingSamplePayload::new(
                sensor_id,
                PingStatus::Pending,
                None,
            )),
            SensorKind::Ethernet => SampleEvent::Ethernet(EthernetSamplePayload::new(
                sensor_id,
                EthernetStatus::Pending,
                "N/A".to_string(),
                "0".to_string(),
                "0".to_string(),
            )),
        }
    }
}

/// Messages a subscriber can send, spec.md §4.8.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum WsClientMessage {
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "subscribe_sensors")]
    SubscribeSensors { sensor_ids: Vec<i64> },
    #[serde(rename = "subscribe_all")]
    SubscribeAll,
    #[serde(rename = "sync_request")]
    SyncRequest { resource: String },
}

#[cfg(test)]
mod tests;
