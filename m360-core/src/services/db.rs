//! Persistence Gateway (spec.md §6): the only module allowed to touch `sqlx`
//! directly. Every other subsystem goes through typed methods here.

use crate::error::AppResult;
use crate::models::{
    AlertRecord, Credential, Device, Monitor, MonitorWithSensors, NotificationChannel, Sensor,
    SensorContext, SensorSummary, VpnProfile,
};
use chrono::Utc;
use m360_common::{EthernetSamplePayload, EthernetStatus, PingSamplePayload, PingStatus};
use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(url: &str) -> AppResult<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(25)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(url)
            .await?;

        sqlx::query("PRAGMA journal_mode=WAL;").execute(&pool).await?;
        sqlx::query("PRAGMA foreign_keys=ON;").execute(&pool).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ---- Credentials ---------------------------------------------------

    pub async fn list_credentials(&self, owner_id: &str) -> AppResult<Vec<Credential>> {
        Ok(
            sqlx::query_as::<_, Credential>("SELECT * FROM credentials WHERE owner_id = ?")
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn get_credential(&self, id: i64) -> AppResult<Option<Credential>> {
        Ok(
            sqlx::query_as::<_, Credential>("SELECT * FROM credentials WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn insert_credential(
        &self,
        owner_id: &str,
        name: &str,
        username: &str,
        password: &str,
    ) -> AppResult<Credential> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO credentials (owner_id, name, username, password) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(owner_id)
        .bind(name)
        .bind(username)
        .bind(password)
        .fetch_one(&self.pool)
        .await?;

        Ok(Credential {
            id,
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    pub async fn delete_credential(&self, id: i64) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM credentials WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // ---- VPN profiles ----------------------------------------------------

    pub async fn list_vpn_profiles(&self, owner_id: &str) -> AppResult<Vec<VpnProfile>> {
        Ok(
            sqlx::query_as::<_, VpnProfile>("SELECT * FROM vpn_profiles WHERE owner_id = ?")
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn get_vpn_profile(&self, id: i64) -> AppResult<Option<VpnProfile>> {
        Ok(
            sqlx::query_as::<_, VpnProfile>("SELECT * FROM vpn_profiles WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn insert_vpn_profile(
        &self,
        owner_id: &str,
        name: &str,
        config_text: &str,
        check_ip: Option<&str>,
        is_default: bool,
    ) -> AppResult<VpnProfile> {
        if is_default {
            sqlx::query("UPDATE vpn_profiles SET is_default = 0 WHERE owner_id = ?")
                .bind(owner_id)
                .execute(&self.pool)
                .await?;
        }

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO vpn_profiles (owner_id, name, config_text, check_ip, is_default) VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(owner_id)
        .bind(name)
        .bind(config_text)
        .bind(check_ip)
        .bind(is_default)
        .fetch_one(&self.pool)
        .await?;

        Ok(VpnProfile {
            id,
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            config_text: config_text.to_string(),
            check_ip: check_ip.map(str::to_string),
            is_default,
        })
    }

    /// Fails (foreign-key violation surfaces as `sqlx::Error`) while any
    /// Device references the profile, per spec.md §3 invariant.
    pub async fn delete_vpn_profile(&self, id: i64) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM vpn_profiles WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // ---- Devices -----------------------------------------------------------

    pub async fn list_devices(&self, owner_id: &str) -> AppResult<Vec<Device>> {
        Ok(
            sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE owner_id = ?")
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn get_device(&self, id: &str) -> AppResult<Option<Device>> {
        Ok(
            sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_device(
        &self,
        owner_id: &str,
        client_name: &str,
        ip: &str,
        mac: Option<&str>,
        node: Option<&str>,
        credential_id: Option<i64>,
        is_maestro: bool,
        vpn_profile_id: Option<i64>,
    ) -> AppResult<Device> {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO devices (id, owner_id, client_name, ip, mac, node, status, credential_id, is_maestro, vpn_profile_id)
             VALUES (?, ?, ?, ?, ?, ?, 'unknown', ?, ?, ?)",
        )
        .bind(&id)
        .bind(owner_id)
        .bind(client_name)
        .bind(ip)
        .bind(mac)
        .bind(node)
        .bind(credential_id)
        .bind(is_maestro)
        .bind(vpn_profile_id)
        .execute(&self.pool)
        .await?;

        Ok(Device {
            id,
            owner_id: owner_id.to_string(),
            client_name: client_name.to_string(),
            ip: ip.to_string(),
            mac: mac.map(str::to_string),
            node: node.map(str::to_string),
            status: "unknown".to_string(),
            credential_id,
            is_maestro,
            maestro_id: None,
            vpn_profile_id,
        })
    }

    /// Promoting a device to maestro clears its own `maestro_id`, spec.md §3.
    pub async fn promote_to_maestro(&self, id: &str) -> AppResult<()> {
        sqlx::query("UPDATE devices SET is_maestro = 1, maestro_id = NULL WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_device_maestro(&self, id: &str, maestro_id: Option<&str>) -> AppResult<()> {
        sqlx::query("UPDATE devices SET maestro_id = ? WHERE id = ?")
            .bind(maestro_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_device(&self, id: &str) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM devices WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // ---- Monitors ------------------------------------------------------

    pub async fn get_monitor_by_device(&self, device_id: &str) -> AppResult<Option<Monitor>> {
        Ok(
            sqlx::query_as::<_, Monitor>("SELECT * FROM monitors WHERE device_id = ?")
                .bind(device_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn insert_monitor(&self, device_id: &str, owner_id: &str) -> AppResult<Monitor> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO monitors (device_id, owner_id) VALUES (?, ?) RETURNING id",
        )
        .bind(device_id)
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Monitor {
            id,
            device_id: device_id.to_string(),
            owner_id: owner_id.to_string(),
        })
    }

    /// The aggregated view spec.md §6 requires: every Monitor with its
    /// Device and that Device's Sensors.
    pub async fn monitors_with_sensors(&self, owner_id: &str) -> AppResult<Vec<MonitorWithSensors>> {
        let monitors =
            sqlx::query_as::<_, Monitor>("SELECT * FROM monitors WHERE owner_id = ?")
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await?;

        let mut out = Vec::with_capacity(monitors.len());
        for monitor in monitors {
            let device = sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE id = ?")
                .bind(&monitor.device_id)
                .fetch_one(&self.pool)
                .await?;

            let sensors: Vec<SensorSummary> = sqlx::query_as::<_, Sensor>(
                "SELECT * FROM sensors WHERE monitor_id = ?",
            )
            .bind(monitor.id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|s| SensorSummary {
                id: s.id,
                name: s.name,
                kind: s.kind,
                config: s.config,
            })
            .collect();

            out.push(MonitorWithSensors {
                monitor_id: monitor.id,
                device_id: monitor.device_id,
                device,
                sensors,
            });
        }

        Ok(out)
    }

    // ---- Sensors ---------------------------------------------------------

    pub async fn list_sensors(&self, owner_id: &str) -> AppResult<Vec<Sensor>> {
        Ok(
            sqlx::query_as::<_, Sensor>("SELECT * FROM sensors WHERE owner_id = ?")
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn get_sensor(&self, id: i64) -> AppResult<Option<Sensor>> {
        Ok(
            sqlx::query_as::<_, Sensor>("SELECT * FROM sensors WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn insert_sensor(
        &self,
        monitor_id: i64,
        owner_id: &str,
        kind: &str,
        name: &str,
        config: &str,
    ) -> AppResult<Sensor> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO sensors (monitor_id, kind, name, config, owner_id) VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(monitor_id)
        .bind(kind)
        .bind(name)
        .bind(config)
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Sensor {
            id,
            monitor_id,
            kind: kind.to_string(),
            name: name.to_string(),
            config: config.to_string(),
            owner_id: owner_id.to_string(),
        })
    }

    pub async fn update_sensor_config(&self, id: i64, config: &str) -> AppResult<()> {
        sqlx::query("UPDATE sensors SET config = ? WHERE id = ?")
            .bind(config)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_sensor(&self, id: i64) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM sensors WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn all_sensor_ids(&self) -> AppResult<Vec<i64>> {
        Ok(sqlx::query_scalar("SELECT id FROM sensors")
            .fetch_all(&self.pool)
            .await?)
    }

    /// Joins a Sensor with its Device, the Device's maestro (if any), its
    /// pooled credential, and its VPN profile — everything
    /// `Scheduler::launch` needs (spec.md §4.5).
    pub async fn sensor_context(&self, sensor_id: i64) -> AppResult<Option<SensorContext>> {
        let Some(sensor) = self.get_sensor(sensor_id).await? else {
            return Ok(None);
        };
        let monitor = sqlx::query_as::<_, Monitor>("SELECT * FROM monitors WHERE id = ?")
            .bind(sensor.monitor_id)
            .fetch_one(&self.pool)
            .await?;
        let device = sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE id = ?")
            .bind(&monitor.device_id)
            .fetch_one(&self.pool)
            .await?;

        let maestro = match &device.maestro_id {
            Some(mid) => sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE id = ?")
                .bind(mid)
                .fetch_optional(&self.pool)
                .await?,
            None => None,
        };

        let vpn_profile = match device.vpn_profile_id {
            Some(pid) => self.get_vpn_profile(pid).await?,
            None => None,
        };

        let credential = match device.credential_id {
            Some(cid) => self.get_credential(cid).await?,
            None => None,
        };

        Ok(Some(SensorContext {
            sensor,
            device,
            maestro,
            vpn_profile,
            credential,
        }))
    }

    // ---- Samples -----------------------------------------------------------

    pub async fn insert_ping_sample(&self, payload: &PingSamplePayload) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO ping_samples (sensor_id, ts, status, latency_ms) VALUES (?, ?, ?, ?)",
        )
        .bind(payload.sensor_id)
        .bind(payload.timestamp)
        .bind(status_str(payload.status))
        .bind(payload.latency_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_ethernet_sample(&self, payload: &EthernetSamplePayload) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO ethernet_samples (sensor_id, ts, status, speed, rx_bitrate, tx_bitrate) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(payload.sensor_id)
        .bind(payload.timestamp)
        .bind(eth_status_str(payload.status))
        .bind(&payload.speed)
        .bind(&payload.rx_bitrate)
        .bind(&payload.tx_bitrate)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn latest_ping_sample(
        &self,
        sensor_id: i64,
    ) -> AppResult<Option<crate::models::PingSample>> {
        Ok(sqlx::query_as::<_, crate::models::PingSample>(
            "SELECT * FROM ping_samples WHERE sensor_id = ? ORDER BY ts DESC LIMIT 1",
        )
        .bind(sensor_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn latest_ethernet_sample(
        &self,
        sensor_id: i64,
    ) -> AppResult<Option<crate::models::EthernetSample>> {
        Ok(sqlx::query_as::<_, crate::models::EthernetSample>(
            "SELECT * FROM ethernet_samples WHERE sensor_id = ? ORDER BY ts DESC LIMIT 1",
        )
        .bind(sensor_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    // ---- Notification channels / alert records ----------------------------

    pub async fn list_channels(&self, owner_id: &str) -> AppResult<Vec<NotificationChannel>> {
        Ok(sqlx::query_as::<_, NotificationChannel>(
            "SELECT * FROM notification_channels WHERE owner_id = ?",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get_channel(&self, id: i64) -> AppResult<Option<NotificationChannel>> {
        Ok(sqlx::query_as::<_, NotificationChannel>(
            "SELECT * FROM notification_channels WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn insert_channel(
        &self,
        owner_id: &str,
        name: &str,
        kind: &str,
        config: &str,
    ) -> AppResult<NotificationChannel> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO notification_channels (owner_id, name, kind, config) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(owner_id)
        .bind(name)
        .bind(kind)
        .bind(config)
        .fetch_one(&self.pool)
        .await?;

        Ok(NotificationChannel {
            id,
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            kind: kind.to_string(),
            config: config.to_string(),
        })
    }

    pub async fn delete_channel(&self, id: i64) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM notification_channels WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn insert_alert_record(
        &self,
        sensor_id: i64,
        channel_id: i64,
        details: &str,
    ) -> AppResult<AlertRecord> {
        let now = Utc::now();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO alert_records (sensor_id, channel_id, ts, details) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(sensor_id)
        .bind(channel_id)
        .bind(now)
        .bind(details)
        .fetch_one(&self.pool)
        .await?;

        Ok(AlertRecord {
            id,
            sensor_id,
            channel_id,
            ts: now,
            details: details.to_string(),
        })
    }

    pub async fn list_alert_records(&self, sensor_id: i64) -> AppResult<Vec<AlertRecord>> {
        Ok(sqlx::query_as::<_, AlertRecord>(
            "SELECT * FROM alert_records WHERE sensor_id = ? ORDER BY ts DESC",
        )
        .bind(sensor_id)
        .fetch_all(&self.pool)
        .await?)
    }
}

fn status_str(status: PingStatus) -> &'static str {
    match status {
        PingStatus::Ok => "ok",
        PingStatus::HighLatency => "high_latency",
        PingStatus::Timeout => "timeout",
        PingStatus::Error => "error",
        PingStatus::Pending => "pending",
    }
}

fn eth_status_str(status: EthernetStatus) -> &'static str {
    match status {
        EthernetStatus::LinkUp => "link_up",
        EthernetStatus::LinkDown => "link_down",
        EthernetStatus::Error => "error",
        EthernetStatus::Pending => "pending",
    }
}
