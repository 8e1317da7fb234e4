//! Ethernet Probe, spec.md §4.5.2: reads link status and traffic for a named
//! interface on a sensor's own device, with a RouterOS 7 -> 6 command
//! fallback and a hard rule that a traffic-only failure never demotes an
//! otherwise-healthy link status.

use crate::models::SensorContext;
use crate::routeros::parse::{is_link_up, is_truthy_flag};
use crate::services::pool::DevicePool;
use m360_common::{EthernetSamplePayload, EthernetStatus, SensorConfig};
use std::net::IpAddr;

/// Returns why this sensor's ethernet config can never run a probe, per
/// spec.md §4.5.2/§7. Checked once before the worker loop starts — callers
/// must exit the worker rather than retry an unsatisfiable config.
pub fn config_error(config: &SensorConfig) -> Option<&'static str> {
    if config.interface_name.is_none() {
        Some("ethernet sensor with no interface_name configured")
    } else {
        None
    }
}

pub async fn probe(pool: &DevicePool, ctx: &SensorContext, config: &SensorConfig) -> EthernetSamplePayload {
    let Some(iface) = &config.interface_name else {
        return degraded(ctx.sensor.id);
    };

    let Some(credential) = &ctx.credential else {
        return degraded(ctx.sensor.id);
    };

    let Ok(ip) = ctx.device.ip.parse::<IpAddr>() else {
        return degraded(ctx.sensor.id);
    };

    let link = match monitor_ethernet(pool, ip, credential, iface).await {
        Ok(link) => link,
        Err(_) => {
            pool.invalidate(ip).await;
            return degraded(ctx.sensor.id);
        }
    };

    let (rx, tx) = monitor_traffic(pool, ip, credential, iface).await.unwrap_or_default();

    EthernetSamplePayload::new(ctx.sensor.id, link.status, link.speed, rx, tx)
}

fn degraded(sensor_id: i64) -> EthernetSamplePayload {
    EthernetSamplePayload::new(
        sensor_id,
        EthernetStatus::LinkDown,
        "N/A".to_string(),
        "0".to_string(),
        "0".to_string(),
    )
}

struct LinkInfo {
    status: EthernetStatus,
    speed: String,
}

/// RouterOS 7's `/interface/ethernet/monitor`, falling back to the
/// RouterOS 6 `/interface/ethernet/get` form when the monitor reply leaves
/// the link speed unknown (neither `rate` nor `speed` present).
async fn monitor_ethernet(
    pool: &DevicePool,
    ip: IpAddr,
    credential: &crate::models::Credential,
    iface: &str,
) -> Result<LinkInfo, crate::routeros::RouterOsError> {
    let once = "once".to_string();
    let numbers_arg = format!("numbers={iface}");

    let rows = pool
        .command(ip, credential, "/interface/ethernet/monitor", &[&numbers_arg, &once])
        .await?;

    let row = rows.first();
    let status_token = row.and_then(|r| r.get("status")).cloned().unwrap_or_default();
    let speed = row.and_then(|r| r.get("rate").or_else(|| r.get("speed"))).cloned();

    if let Some(speed) = speed {
        let status = if is_link_up(&status_token) { EthernetStatus::LinkUp } else { EthernetStatus::LinkDown };
        return Ok(LinkInfo { status, speed });
    }

    let name_arg = format!("name={iface}");
    let rows = pool.command(ip, credential, "/interface/ethernet/get", &[&name_arg]).await?;
    let row = rows.first();
    let running = row.and_then(|r| r.get("running")).cloned().unwrap_or_default();
    let speed = row.and_then(|r| r.get("speed")).cloned().unwrap_or_else(|| "N/A".to_string());
    let status = if is_truthy_flag(&running) { EthernetStatus::LinkUp } else { EthernetStatus::LinkDown };

    Ok(LinkInfo { status, speed })
}

/// Best-effort only: a traffic-query failure degrades to `"0"` bitrates
/// without affecting the already-determined link status.
async fn monitor_traffic(
    pool: &DevicePool,
    ip: IpAddr,
    credential: &crate::models::Credential,
    iface: &str,
) -> Option<(String, String)> {
    let iface_arg = format!("interface={iface}");
    let once = "once".to_string();
    let rows = pool
        .command(ip, credential, "/interface/monitor-traffic", &[&iface_arg, &once])
        .await
        .ok()?;

    let row = rows.first()?;
    let rx = row.get("rx-bits-per-second").cloned().unwrap_or_else(|| "0".to_string());
    let tx = row.get("tx-bits-per-second").cloned().unwrap_or_else(|| "0".to_string());
    Some((rx, tx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degraded_sample_is_link_down_with_zero_bitrates() {
        let sample = degraded(1);
        assert_eq!(sample.status, EthernetStatus::LinkDown);
        assert_eq!(sample.speed, "N/A");
        assert_eq!(sample.rx_bitrate, "0");
        assert_eq!(sample.tx_bitrate, "0");
    }
}
