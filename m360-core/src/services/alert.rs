//! Alert Evaluator, spec.md §4.6: decides whether a fresh sample should fire
//! an alert, subject to a per-`(sensor_id, alert_type)` cooldown.

use crate::models::{Device, Sensor};
use crate::services::db::Database;
use crate::services::notifier::Notifier;
use chrono::{DateTime, Utc};
use m360_common::{AlertConfig, AlertType, PingStatus, SampleEvent, TrafficDirection};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::error;

#[derive(Default)]
struct CooldownState {
    last_fired: HashMap<(i64, AlertType), DateTime<Utc>>,
    last_speed: HashMap<i64, String>,
}

/// Process-memory-only state, per spec.md §4.6/§9 open question 1: cooldowns
/// and last-known-speed do not survive a restart.
pub struct AlertEvaluator {
    db: Database,
    notifier: Notifier,
    state: Mutex<CooldownState>,
}

impl AlertEvaluator {
    pub fn new(db: Database, notifier: Notifier) -> Self {
        Self {
            db,
            notifier,
            state: Mutex::new(CooldownState::default()),
        }
    }

    fn in_cooldown(&self, sensor_id: i64, alert_type: AlertType, cooldown_minutes: i64, now: DateTime<Utc>) -> bool {
        let state = self.state.lock().unwrap();
        match state.last_fired.get(&(sensor_id, alert_type)) {
            Some(last) => now.signed_duration_since(*last).num_seconds() < cooldown_minutes * 60,
            None => false,
        }
    }

    fn record_fired(&self, sensor_id: i64, alert_type: AlertType, now: DateTime<Utc>) {
        self.state.lock().unwrap().last_fired.insert((sensor_id, alert_type), now);
    }

    /// Updates the last-known speed for `sensor_id`, per spec.md §4.6 step 2:
    /// done regardless of which alerts tripped, but `"N/A"` (link down)
    /// is treated as absent rather than a real speed transition.
    fn update_last_speed(&self, sensor_id: i64, sample: &SampleEvent) {
        if let SampleEvent::Ethernet(e) = sample {
            if e.speed != "N/A" {
                self.state.lock().unwrap().last_speed.insert(sensor_id, e.speed.clone());
            }
        }
    }

    /// Evaluates every alert config attached to `sensor` against `sample`,
    /// firing and persisting an `AlertRecord` for each one that trips and
    /// isn't in cooldown, then updates the speed bookkeeping regardless of
    /// whether anything tripped.
    pub async fn evaluate(&self, sensor: &Sensor, device: &Device, alerts: &[AlertConfig], sample: &SampleEvent) {
        let now = Utc::now();

        for alert in alerts {
            if self.in_cooldown(sensor.id, alert.alert_type, alert.cooldown_minutes, now) {
                continue;
            }

            let Some(reason) = self.trip_reason(sensor.id, alert, sample) else {
                continue;
            };

            self.record_fired(sensor.id, alert.alert_type, now);

            let message =
                format!("sensor_name={} client_name={} ip={} reason={reason}", sensor.name, device.client_name, device.ip);

            if let Err(e) = self
                .db
                .insert_alert_record(sensor.id, alert.channel_id, &message)
                .await
            {
                error!(sensor_id = sensor.id, error = %e, "failed to persist alert record");
            }

            if let Ok(Some(channel)) = self.db.get_channel(alert.channel_id).await {
                self.notifier.notify(&channel, &sensor.owner_id, &message).await;
            }
        }

        self.update_last_speed(sensor.id, sample);
    }

    fn trip_reason(&self, sensor_id: i64, alert: &AlertConfig, sample: &SampleEvent) -> Option<String> {
        match (alert.alert_type, sample) {
            (AlertType::Timeout, SampleEvent::Ping(p)) if matches!(p.status, PingStatus::Timeout) => {
                Some("timed out".to_string())
            }
            (AlertType::HighLatency, SampleEvent::Ping(p)) if matches!(p.status, PingStatus::Ok) => {
                let threshold = alert.threshold_ms?;
                let latency = p.latency_ms?;
                (latency > threshold).then(|| format!("latency {latency:.1}ms exceeds {threshold:.1}ms"))
            }
            (AlertType::SpeedChange, SampleEvent::Ethernet(e)) if e.speed != "N/A" => {
                let state = self.state.lock().unwrap();
                match state.last_speed.get(&sensor_id) {
                    Some(prev) if prev != &e.speed => Some(format!("speed changed {prev} -> {}", e.speed)),
                    _ => None,
                }
            }
            (AlertType::TrafficThreshold, SampleEvent::Ethernet(e)) => {
                let threshold = alert.threshold_mbps?;
                let rx_mbps = e.rx_bitrate.parse::<f64>().unwrap_or(0.0) / 1_000_000.0;
                let tx_mbps = e.tx_bitrate.parse::<f64>().unwrap_or(0.0) / 1_000_000.0;
                let breached = match alert.direction {
                    TrafficDirection::Any => rx_mbps > threshold || tx_mbps > threshold,
                    TrafficDirection::Rx => rx_mbps > threshold,
                    TrafficDirection::Tx => tx_mbps > threshold,
                };
                breached.then(|| format!("traffic rx={rx_mbps:.1}Mbps tx={tx_mbps:.1}Mbps exceeds {threshold:.1}Mbps"))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use m360_common::{EthernetSamplePayload, EthernetStatus, PingSamplePayload, PingStatus, SensorKind};

    async fn evaluator() -> AlertEvaluator {
        let db = Database::new("sqlite::memory:").await.expect("in-memory db");
        let notifier = Notifier::new(1);
        AlertEvaluator::new(db, notifier)
    }

    #[tokio::test]
    async fn high_latency_trips_only_above_threshold() {
        let eval = evaluator().await;
        let alert = AlertConfig {
            alert_type: AlertType::HighLatency,
            channel_id: 1,
            cooldown_minutes: 5,
            threshold_ms: Some(100.0),
            threshold_mbps: None,
            direction: TrafficDirection::Any,
        };
        let low = SampleEvent::Ping(PingSamplePayload::new(1, PingStatus::Ok, Some(50.0)));
        let high = SampleEvent::Ping(PingSamplePayload::new(1, PingStatus::Ok, Some(150.0)));

        assert!(eval.trip_reason(1, &alert, &low).is_none());
        assert!(eval.trip_reason(1, &alert, &high).is_some());
    }

    #[tokio::test]
    async fn high_latency_never_trips_when_probe_already_classified_it() {
        let eval = evaluator().await;
        let alert = AlertConfig {
            alert_type: AlertType::HighLatency,
            channel_id: 1,
            cooldown_minutes: 5,
            threshold_ms: Some(100.0),
            threshold_mbps: None,
            direction: TrafficDirection::Any,
        };
        let sample = SampleEvent::Ping(PingSamplePayload::new(1, PingStatus::HighLatency, Some(150.0)));
        assert!(eval.trip_reason(1, &alert, &sample).is_none());
    }

    #[tokio::test]
    async fn cooldown_suppresses_repeated_fires() {
        let eval = evaluator().await;
        let now = Utc::now();
        eval.record_fired(1, AlertType::Timeout, now);
        assert!(eval.in_cooldown(1, AlertType::Timeout, 5, now));
        assert!(!eval.in_cooldown(1, AlertType::HighLatency, 5, now));
    }

    #[tokio::test]
    async fn unrelated_sensor_kind_never_trips() {
        let eval = evaluator().await;
        let alert = AlertConfig {
            alert_type: AlertType::Timeout,
            channel_id: 1,
            cooldown_minutes: 5,
            threshold_ms: None,
            threshold_mbps: None,
            direction: TrafficDirection::Any,
        };
        let sample = SampleEvent::pending(1, SensorKind::Ethernet);
        assert!(eval.trip_reason(1, &alert, &sample).is_none());
    }

    #[tokio::test]
    async fn speed_change_does_not_fire_on_first_observation() {
        let eval = evaluator().await;
        let alert = AlertConfig {
            alert_type: AlertType::SpeedChange,
            channel_id: 1,
            cooldown_minutes: 5,
            threshold_ms: None,
            threshold_mbps: None,
            direction: TrafficDirection::Any,
        };
        let first = SampleEvent::Ethernet(EthernetSamplePayload::new(
            1,
            EthernetStatus::LinkUp,
            "1Gbps".to_string(),
            "0".to_string(),
            "0".to_string(),
        ));
        assert!(eval.trip_reason(1, &alert, &first).is_none());
        eval.update_last_speed(1, &first);

        let changed = SampleEvent::Ethernet(EthernetSamplePayload::new(
            1,
            EthernetStatus::LinkUp,
            "100Mbps".to_string(),
            "0".to_string(),
            "0".to_string(),
        ));
        assert!(eval.trip_reason(1, &alert, &changed).is_some());
    }

    #[tokio::test]
    async fn link_down_na_speed_neither_trips_nor_overwrites_last_speed() {
        let eval = evaluator().await;
        let alert = AlertConfig {
            alert_type: AlertType::SpeedChange,
            channel_id: 1,
            cooldown_minutes: 5,
            threshold_ms: None,
            threshold_mbps: None,
            direction: TrafficDirection::Any,
        };
        let up = SampleEvent::Ethernet(EthernetSamplePayload::new(
            1,
            EthernetStatus::LinkUp,
            "1Gbps".to_string(),
            "0".to_string(),
            "0".to_string(),
        ));
        eval.update_last_speed(1, &up);

        let down = SampleEvent::Ethernet(EthernetSamplePayload::new(
            1,
            EthernetStatus::LinkDown,
            "N/A".to_string(),
            "0".to_string(),
            "0".to_string(),
        ));
        assert!(eval.trip_reason(1, &alert, &down).is_none());
        eval.update_last_speed(1, &down);
        assert_eq!(eval.state.lock().unwrap().last_speed.get(&1), Some(&"1Gbps".to_string()));
    }
}
