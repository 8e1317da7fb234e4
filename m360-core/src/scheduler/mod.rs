//! Sensor Scheduler, spec.md §4.5: one cancellable worker task per sensor,
//! polling its probe on an interval and fanning the result out.

mod ethernet;
mod ping;

use crate::services::alert::AlertEvaluator;
use crate::services::db::Database;
use crate::services::fanout::Fanout;
use crate::services::pool::DevicePool;
use crate::services::vpn::VpnManager;
use m360_common::{SampleEvent, SensorKind};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct Scheduler {
    db: Database,
    pool: Arc<DevicePool>,
    vpn: Arc<VpnManager>,
    fanout: Arc<Fanout>,
    alerts: Arc<AlertEvaluator>,
    workers: Mutex<HashMap<i64, CancellationToken>>,
}

impl Scheduler {
    pub fn new(
        db: Database,
        pool: Arc<DevicePool>,
        vpn: Arc<VpnManager>,
        fanout: Arc<Fanout>,
        alerts: Arc<AlertEvaluator>,
    ) -> Self {
        Self {
            db,
            pool,
            vpn,
            fanout,
            alerts,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Spawns a worker for every sensor currently in the database. Called
    /// once at startup.
    pub async fn start_all(self: &Arc<Self>) -> crate::error::AppResult<()> {
        for sensor_id in self.db.all_sensor_ids().await? {
            self.launch(sensor_id).await;
        }
        Ok(())
    }

    /// Starts a worker for `sensor_id` if one isn't already running.
    pub async fn launch(self: &Arc<Self>, sensor_id: i64) {
        {
            let workers = self.workers.lock().unwrap();
            if workers.contains_key(&sensor_id) {
                return;
            }
        }

        let token = CancellationToken::new();
        self.workers.lock().unwrap().insert(sensor_id, token.clone());

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            scheduler.run_worker(sensor_id, token).await;
        });
    }

    /// Cancels the worker for `sensor_id`, if any.
    pub fn stop(&self, sensor_id: i64) {
        if let Some(token) = self.workers.lock().unwrap().remove(&sensor_id) {
            token.cancel();
        }
    }

    pub async fn restart(self: &Arc<Self>, sensor_id: i64) {
        self.stop(sensor_id);
        self.launch(sensor_id).await;
    }

    async fn run_worker(self: Arc<Self>, sensor_id: i64, token: CancellationToken) {
        let Ok(Some(ctx)) = self.db.sensor_context(sensor_id).await else {
            warn!(sensor_id, "no context found for sensor, worker exiting");
            self.workers.lock().unwrap().remove(&sensor_id);
            return;
        };

        let Some(kind) = ctx.sensor.kind() else {
            warn!(sensor_id, kind = %ctx.sensor.kind, "unknown sensor kind, worker exiting");
            self.workers.lock().unwrap().remove(&sensor_id);
            return;
        };

        let Ok(config) = ctx.sensor.parsed_config() else {
            warn!(sensor_id, "invalid sensor config, worker exiting");
            self.workers.lock().unwrap().remove(&sensor_id);
            return;
        };

        let config_problem = match kind {
            SensorKind::Ping => ping::config_error(&ctx, &config),
            SensorKind::Ethernet => ethernet::config_error(&config),
        };
        if let Some(reason) = config_problem {
            warn!(sensor_id, reason, "sensor config unsatisfiable, worker exiting");
            self.workers.lock().unwrap().remove(&sensor_id);
            return;
        }

        let vpn_profile = ctx.vpn_profile.clone();
        if let Some(profile) = &vpn_profile {
            if let Err(e) = self.vpn.ensure_up(profile).await {
                error!(sensor_id, error = %e, "failed to bring up vpn tunnel, worker exiting");
                self.workers.lock().unwrap().remove(&sensor_id);
                return;
            }
        }

        let interval = config.interval(kind);
        info!(sensor_id, ?kind, interval_sec = interval.as_secs(), "sensor worker started");

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            let sample = match kind {
                SensorKind::Ping => SampleEvent::Ping(ping::probe(&self.pool, &ctx, &config).await),
                SensorKind::Ethernet => {
                    SampleEvent::Ethernet(ethernet::probe(&self.pool, &ctx, &config).await)
                }
            };

            if let Err(e) = self.persist(&sample).await {
                error!(sensor_id, error = %e, "failed to persist sample");
            }

            self.fanout.publish(&ctx.sensor.owner_id, sample.clone()).await;
            self.alerts.evaluate(&ctx.sensor, &ctx.device, &config.alerts, &sample).await;
        }

        if let Some(profile) = &vpn_profile {
            self.vpn.release(profile.id);
        }
        info!(sensor_id, "sensor worker stopped");
    }

    async fn persist(&self, sample: &SampleEvent) -> crate::error::AppResult<()> {
        match sample {
            SampleEvent::Ping(p) => self.db.insert_ping_sample(p).await,
            SampleEvent::Ethernet(e) => self.db.insert_ethernet_sample(e).await,
        }
    }
}
