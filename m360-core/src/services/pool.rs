//! Device Connection Pool, spec.md §4.3: reuses a logged-in `RouterOsClient`
//! per device IP instead of re-authenticating on every probe tick.

use crate::models::Credential;
use crate::routeros::RouterOsClient;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::Mutex;

pub struct DevicePool {
    sessions: Mutex<HashMap<String, RouterOsClient>>,
    port: u16,
    connect_timeout: Duration,
}

impl DevicePool {
    pub fn new(port: u16, connect_timeout_ms: u64) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            port,
            connect_timeout: Duration::from_millis(connect_timeout_ms),
        }
    }

    /// Issues `path`/`args` against the session for `ip`, establishing one
    /// via `credential` if none is cached. On failure the cached session (if
    /// any) is invalidated so the next call reconnects from scratch.
    pub async fn command(
        &self,
        ip: IpAddr,
        credential: &Credential,
        path: &str,
        args: &[&str],
    ) -> Result<Vec<crate::routeros::Row>, crate::routeros::RouterOsError> {
        let key = ip.to_string();
        let mut guard = self.sessions.lock().await;

        if !guard.contains_key(&key) {
            let client = RouterOsClient::connect(
                ip,
                self.port,
                &credential.username,
                &credential.password,
                self.connect_timeout,
            )
            .await?;
            guard.insert(key.clone(), client);
        }

        let client = guard.get_mut(&key).expect("just inserted or present");
        match client.command(path, args).await {
            Ok(rows) => Ok(rows),
            Err(e) => {
                guard.remove(&key);
                Err(e)
            }
        }
    }

    /// Drops the cached session for `ip`, forcing a fresh login next use.
    pub async fn invalidate(&self, ip: IpAddr) {
        self.sessions.lock().await.remove(&ip.to_string());
    }

    pub async fn is_cached(&self, ip: IpAddr) -> bool {
        self.sessions.lock().await.contains_key(&ip.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalidate_on_empty_pool_is_a_no_op() {
        let pool = DevicePool::new(8728, 1500);
        pool.invalidate("10.0.0.1".parse().unwrap()).await;
        assert!(!pool.is_cached("10.0.0.1".parse().unwrap()).await);
    }
}
