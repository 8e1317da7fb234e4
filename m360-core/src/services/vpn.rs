//! VPN Tunnel Manager, spec.md §4.2: brings per-profile WireGuard tunnels
//! up/down idempotently, reference-counted across the sensor workers that
//! need them.

use crate::models::VpnProfile;
use crate::services::command::CommandRunner;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

#[derive(Error, Debug, Clone)]
pub enum VpnError {
    #[error("failed to activate vpn profile {0}: {1}")]
    ActivationFailed(i64, String),
    #[error("vpn profile {0} did not come up in time")]
    NotUp(i64),
    #[error("io error writing tunnel config for profile {0}: {1}")]
    Io(i64, String),
}

#[derive(Debug, Clone)]
struct TunnelState {
    iface_name: String,
    conf_path: std::path::PathBuf,
    refcount: u32,
    up: bool,
}

pub struct VpnManager {
    state: Mutex<HashMap<i64, TunnelState>>,
    runner: CommandRunner,
    up_poll_attempts: u32,
    up_poll_interval: Duration,
}

impl VpnManager {
    pub fn new(runner: CommandRunner, up_poll_attempts: u32, up_poll_interval_ms: u64) -> Self {
        Self {
            state: Mutex::new(HashMap::new()),
            runner,
            up_poll_attempts,
            up_poll_interval: Duration::from_millis(up_poll_interval_ms),
        }
    }

    fn iface_name(profile_id: i64) -> String {
        format!("m360-p{profile_id}")
    }

    fn conf_path(profile_id: i64) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("m360-p{profile_id}.conf"))
    }

    /// Normalizes `DNS=` lines to comments (case-insensitive, trimmed) and
    /// newline-terminates, per spec.md §4.2 step 2.
    fn normalize_config(raw: &str) -> String {
        let mut out = String::with_capacity(raw.len() + 1);
        for line in raw.lines() {
            if line.trim_start().to_ascii_uppercase().starts_with("DNS=") {
                out.push('#');
            }
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    async fn write_conf(&self, profile: &VpnProfile) -> Result<std::path::PathBuf, VpnError> {
        let path = Self::conf_path(profile.id);
        let normalized = Self::normalize_config(&profile.config_text);

        // tokio::fs::OpenOptions exposes its own `.mode()` on unix targets;
        // no std::os::unix::fs::OpenOptionsExt import needed.
        #[cfg(unix)]
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&path)
            .await
            .map_err(|e| VpnError::Io(profile.id, e.to_string()))?;
        #[cfg(not(unix))]
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| VpnError::Io(profile.id, e.to_string()))?;

        file.write_all(normalized.as_bytes())
            .await
            .map_err(|e| VpnError::Io(profile.id, e.to_string()))?;

        Ok(path)
    }

    async fn iface_is_up(&self, iface: &str) -> bool {
        let (ok, output) = self.runner.run(&["ip", "link", "show", iface], &Default::default()).await;
        ok && (output.contains("state UP") || output.contains(",UP,") || output.contains("<UP,"))
    }

    /// Brings the tunnel for `profile` up if it isn't already, incrementing
    /// its refcount either way. Returns the interface name sibling sensors
    /// should route through.
    pub async fn ensure_up(&self, profile: &VpnProfile) -> Result<String, VpnError> {
        let iface = Self::iface_name(profile.id);

        let already_up = {
            let map = self.state.lock().unwrap();
            map.get(&profile.id).map(|s| s.up).unwrap_or(false)
        };

        if already_up && self.iface_is_up(&iface).await {
            let mut map = self.state.lock().unwrap();
            if let Some(entry) = map.get_mut(&profile.id) {
                entry.refcount += 1;
            }
            return Ok(iface);
        }

        let conf_path = self.write_conf(profile).await?;
        let path_str = conf_path.to_string_lossy().to_string();

        let (ok, out) = self.runner.run_wireguard(&["wg-quick", "up", &path_str]).await;
        if !ok {
            let (show_ok, _) = self.runner.run_wireguard(&["wg", "show", &iface]).await;
            if !show_ok {
                let (_, _) = self.runner.run_wireguard(&["wg-quick", "down", &path_str]).await;
                let (retry_ok, retry_out) =
                    self.runner.run_wireguard(&["wg-quick", "up", &path_str]).await;
                if !retry_ok {
                    return Err(VpnError::ActivationFailed(profile.id, retry_out));
                }
            } else {
                warn!(profile_id = profile.id, "wg-quick up failed but wg show succeeded: {out}");
            }
        }

        for _ in 0..self.up_poll_attempts {
            if self.iface_is_up(&iface).await {
                let mut map = self.state.lock().unwrap();
                let refcount = map.get(&profile.id).map(|s| s.refcount).unwrap_or(0) + 1;
                map.insert(
                    profile.id,
                    TunnelState {
                        iface_name: iface.clone(),
                        conf_path,
                        refcount,
                        up: true,
                    },
                );
                info!(profile_id = profile.id, iface = %iface, refcount, "tunnel up");
                return Ok(iface);
            }
            tokio::time::sleep(self.up_poll_interval).await;
        }

        Err(VpnError::NotUp(profile.id))
    }

    /// Decrements the refcount (floor 0). Tunnels are deliberately not torn
    /// down here — they linger until `teardown_all`, per spec.md §4.2/§9
    /// open question 2.
    pub fn release(&self, profile_id: i64) {
        let mut map = self.state.lock().unwrap();
        if let Some(entry) = map.get_mut(&profile_id) {
            entry.refcount = entry.refcount.saturating_sub(1);
        }
    }

    pub fn refcount(&self, profile_id: i64) -> u32 {
        self.state
            .lock()
            .unwrap()
            .get(&profile_id)
            .map(|s| s.refcount)
            .unwrap_or(0)
    }

    /// Tears down every known tunnel, best-effort. Called at shutdown.
    pub async fn teardown_all(&self) {
        let entries: Vec<(i64, TunnelState)> = {
            let map = self.state.lock().unwrap();
            map.iter().map(|(k, v)| (*k, v.clone())).collect()
        };

        for (profile_id, state) in entries {
            let path_str = state.conf_path.to_string_lossy().to_string();
            let _ = self.runner.run_wireguard(&["wg-quick", "down", &path_str]).await;
            let _ = tokio::fs::remove_file(&state.conf_path).await;
            info!(profile_id, iface = %state.iface_name, "tunnel torn down");
        }

        let mut map = self.state.lock().unwrap();
        for entry in map.values_mut() {
            entry.up = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_dns_lines_case_insensitively_and_newline_terminates() {
        let raw = "[Interface]\nAddress = 10.0.0.2/32\ndns= 1.1.1.1\nDNS=8.8.8.8\n[Peer]";
        let out = VpnManager::normalize_config(raw);
        assert!(out.ends_with('\n'));
        assert!(out.contains("#dns= 1.1.1.1"));
        assert!(out.contains("#DNS=8.8.8.8"));
        assert!(out.contains("Address = 10.0.0.2/32"));
    }

    #[test]
    fn iface_name_is_deterministic() {
        assert_eq!(VpnManager::iface_name(42), "m360-p42");
    }

    #[tokio::test]
    async fn release_floors_at_zero() {
        let manager = VpnManager::new(CommandRunner::new(), 1, 10);
        manager.release(1);
        assert_eq!(manager.refcount(1), 0);
    }

    #[tokio::test]
    async fn ensure_up_then_release_is_idempotent_on_refcount() {
        // Without real wg-quick in the test sandbox, ensure_up errors out —
        // exercise the refcount bookkeeping directly instead.
        let manager = VpnManager::new(CommandRunner::new(), 1, 10);
        {
            let mut map = manager.state.lock().unwrap();
            map.insert(
                7,
                TunnelState {
                    iface_name: "m360-p7".to_string(),
                    conf_path: std::env::temp_dir().join("m360-p7.conf"),
                    refcount: 1,
                    up: true,
                },
            );
        }
        manager.release(7);
        assert_eq!(manager.refcount(7), 0);
    }
}
