//! Ping Probe, spec.md §4.5.1: issues a RouterOS `/ping` against the
//! resolved origin/target pair for a sensor.

use crate::models::SensorContext;
use crate::routeros::parse::parse_avg_rtt_ms;
use crate::services::pool::DevicePool;
use m360_common::{PingSamplePayload, PingStatus, PingType, SensorConfig};
use std::net::IpAddr;

/// Resolves which device originates the probe and which IP it targets.
///
/// * `maestro_to_device`: the sensor's maestro issues `/ping` at the
///   sensor's own device.
/// * `self_to_target`: the sensor's own device issues `/ping` at
///   `config.target_ip`.
pub fn resolve_origin_and_target<'a>(
    ctx: &'a SensorContext,
    config: &SensorConfig,
) -> Option<(&'a crate::models::Device, IpAddr)> {
    match config.ping_type.unwrap_or(PingType::MaestroToDevice) {
        PingType::MaestroToDevice => {
            let origin = ctx.maestro.as_ref()?;
            let target: IpAddr = ctx.device.ip.parse().ok()?;
            Some((origin, target))
        }
        PingType::SelfToTarget => {
            let target_ip = config.target_ip.as_ref()?;
            let target: IpAddr = target_ip.parse().ok()?;
            Some((&ctx.device, target))
        }
    }
}

/// Returns why this sensor's ping config can never resolve an origin/target
/// pair, per spec.md §4.5.1/§7. Checked once before the worker loop starts —
/// callers must exit the worker rather than retry an unsatisfiable config.
pub fn config_error(ctx: &SensorContext, config: &SensorConfig) -> Option<&'static str> {
    match config.ping_type.unwrap_or(PingType::MaestroToDevice) {
        PingType::MaestroToDevice if ctx.maestro.is_none() => {
            Some("maestro_to_device ping with no maestro device")
        }
        PingType::SelfToTarget if config.target_ip.is_none() => {
            Some("self_to_target ping with no target_ip configured")
        }
        _ => None,
    }
}

/// Runs one probe tick. Errors talking to the origin device invalidate its
/// pooled session (so the next tick reconnects) and degrade to a `Timeout`
/// sample rather than propagating, per spec.md §4.5.1(b)/§7.
pub async fn probe(
    pool: &DevicePool,
    ctx: &SensorContext,
    config: &SensorConfig,
) -> PingSamplePayload {
    let Some((origin, target)) = resolve_origin_and_target(ctx, config) else {
        return PingSamplePayload::new(ctx.sensor.id, PingStatus::Timeout, None);
    };

    let Some(credential) = &ctx.credential else {
        return PingSamplePayload::new(ctx.sensor.id, PingStatus::Timeout, None);
    };

    let Ok(origin_ip) = origin.ip.parse::<IpAddr>() else {
        return PingSamplePayload::new(ctx.sensor.id, PingStatus::Timeout, None);
    };

    let target_str = target.to_string();
    let result = pool
        .command(origin_ip, credential, "/ping", &[&format!("address={target_str}"), "count=1"])
        .await;

    let rows = match result {
        Ok(rows) => rows,
        Err(_) => {
            pool.invalidate(origin_ip).await;
            return PingSamplePayload::new(ctx.sensor.id, PingStatus::Timeout, None);
        }
    };

    classify(ctx.sensor.id, &rows, config.latency_threshold_ms)
}

fn classify(sensor_id: i64, rows: &[crate::routeros::Row], latency_threshold_ms: Option<f64>) -> PingSamplePayload {
    let received = rows
        .iter()
        .filter_map(|r| r.get("received").and_then(|v| v.parse::<u32>().ok()))
        .next_back()
        .unwrap_or(0);

    if received == 0 {
        return PingSamplePayload::new(sensor_id, PingStatus::Timeout, None);
    }

    let avg_rtt = rows
        .iter()
        .rev()
        .find_map(|r| r.get("avg-rtt"))
        .map(|s| parse_avg_rtt_ms(s));

    let status = match (avg_rtt, latency_threshold_ms) {
        (Some(ms), Some(threshold)) if ms > threshold => PingStatus::HighLatency,
        _ => PingStatus::Ok,
    };

    PingSamplePayload::new(sensor_id, status, avg_rtt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn row(pairs: &[(&str, &str)]) -> crate::routeros::Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<HashMap<_, _>>()
    }

    #[test]
    fn zero_received_classifies_as_timeout() {
        let rows = vec![row(&[("received", "0"), ("sent", "3")])];
        let sample = classify(1, &rows, None);
        assert_eq!(sample.status, PingStatus::Timeout);
        assert_eq!(sample.latency_ms, None);
    }

    #[test]
    fn latency_over_threshold_classifies_as_high_latency() {
        let rows = vec![row(&[("received", "3"), ("avg-rtt", "200ms")])];
        let sample = classify(1, &rows, Some(100.0));
        assert_eq!(sample.status, PingStatus::HighLatency);
        assert_eq!(sample.latency_ms, Some(200.0));
    }

    #[test]
    fn latency_under_threshold_classifies_as_ok() {
        let rows = vec![row(&[("received", "3"), ("avg-rtt", "20ms")])];
        let sample = classify(1, &rows, Some(100.0));
        assert_eq!(sample.status, PingStatus::Ok);
    }

    #[test]
    fn no_threshold_configured_always_classifies_as_ok_when_reachable() {
        let rows = vec![row(&[("received", "3"), ("avg-rtt", "900ms")])];
        let sample = classify(1, &rows, None);
        assert_eq!(sample.status, PingStatus::Ok);
    }
}
