//! Credential Prober, spec.md §4.4: finds which stored credential, if any,
//! a device at a given IP accepts.

use crate::models::Credential;
use std::net::IpAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

pub struct CredentialProber {
    port: u16,
    tcp_probe_timeout: Duration,
}

impl CredentialProber {
    pub fn new(port: u16, tcp_probe_timeout_ms: u64) -> Self {
        Self {
            port,
            tcp_probe_timeout: Duration::from_millis(tcp_probe_timeout_ms),
        }
    }

    /// `None` if the device doesn't answer on the RouterOS API port at all.
    pub async fn is_reachable(&self, ip: IpAddr) -> bool {
        timeout(self.tcp_probe_timeout, TcpStream::connect((ip, self.port)))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }

    /// Tries each credential in order against `ip`, returning the first that
    /// logs in successfully. Credentials are tried sequentially, not in
    /// parallel, so a device is never hit with concurrent login attempts.
    pub async fn find_working_credential<'a>(
        &self,
        ip: IpAddr,
        candidates: &'a [Credential],
    ) -> Option<&'a Credential> {
        if !self.is_reachable(ip).await {
            return None;
        }

        for credential in candidates {
            let result = crate::routeros::RouterOsClient::connect(
                ip,
                self.port,
                &credential.username,
                &credential.password,
                self.tcp_probe_timeout,
            )
            .await;
            if result.is_ok() {
                return Some(credential);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_ip_returns_not_reachable() {
        let prober = CredentialProber::new(8728, 50);
        // TEST-NET-1 with no listener: connect should time out or refuse.
        let reachable = prober.is_reachable("192.0.2.1".parse().unwrap()).await;
        assert!(!reachable);
    }

    #[tokio::test]
    async fn no_candidates_yields_none_without_probing() {
        let prober = CredentialProber::new(8728, 50);
        let found = prober
            .find_working_credential("192.0.2.1".parse().unwrap(), &[])
            .await;
        assert!(found.is_none());
    }
}
