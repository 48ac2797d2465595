//! Locate the server: explicit host, cached hint file, DNS, then mDNS —
//! first success wins.

use crate::error::ClientError;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

const DNS_HOSTNAME: &str = "XTABLES.local";
const MDNS_SERVICE_TYPE: &str = "_xtables._tcp.local.";
const MDNS_INSTANCE_NAME: &str = "XTablesService";
/// Literal filename kept for interop with the wider XTables ecosystem —
/// not renamed.
const CACHE_FILENAME: &str = "PYTHON-XTABLES-TEMP-CONNECTION.tmp";

pub struct EndpointResolver {
    explicit: Option<String>,
    cache_path: PathBuf,
}

impl EndpointResolver {
    pub fn new(explicit: Option<String>) -> Self {
        EndpointResolver {
            explicit,
            cache_path: std::env::temp_dir().join(CACHE_FILENAME),
        }
    }

    /// Try every strategy in order; the first success wins. Fails with
    /// [`ClientError::NotFound`] once DNS and mDNS are both exhausted.
    pub async fn resolve(&self) -> Result<String, ClientError> {
        if let Some(host) = &self.explicit {
            debug!(host, "using explicit endpoint");
            return Ok(host.clone());
        }

        if let Some(cached) = self.read_cache() {
            debug!(host = %cached, "using cached endpoint (unverified)");
            return Ok(cached);
        }

        if let Some(addr) = self.resolve_dns().await {
            info!(host = %addr, "resolved endpoint via DNS");
            self.write_cache(&addr);
            return Ok(addr);
        }

        if let Some(addr) = self.resolve_mdns().await {
            info!(host = %addr, "resolved endpoint via mDNS");
            self.write_cache(&addr);
            return Ok(addr);
        }

        self.invalidate_cache();
        Err(ClientError::NotFound)
    }

    /// Call after a resolved address turns out to be unreachable. The next
    /// `resolve()` call will fall through the cache strategy and re-derive
    /// an address from DNS/mDNS.
    pub fn invalidate_cache(&self) {
        let _ = std::fs::remove_file(&self.cache_path);
    }

    /// Resolve in a loop, sleeping one second between attempts, until
    /// `stop` fires. Never blocks indefinitely — each attempt is bounded by
    /// the DNS/mDNS timeouts internal to those strategies.
    pub async fn resolve_with_retry(
        &self,
        mut stop: tokio::sync::watch::Receiver<bool>,
    ) -> Result<String, ClientError> {
        loop {
            match self.resolve().await {
                Ok(addr) => return Ok(addr),
                Err(e) => {
                    warn!(error = %e, "endpoint resolution attempt failed, retrying in 1s");
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                        _ = stop.changed() => {
                            if *stop.borrow() {
                                return Err(ClientError::NotFound);
                            }
                        }
                    }
                }
            }
        }
    }

    fn read_cache(&self) -> Option<String> {
        let contents = std::fs::read_to_string(&self.cache_path).ok()?;
        let trimmed = contents.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    fn write_cache(&self, addr: &str) {
        // Advisory only: concurrent writers from multiple processes may
        // clobber each other, which self-heals via this same resolver
        // chain.
        let _ = std::fs::write(&self.cache_path, addr);
    }

    async fn resolve_dns(&self) -> Option<String> {
        let lookup = format!("{DNS_HOSTNAME}:0");
        let mut addrs = tokio::net::lookup_host(lookup).await.ok()?;
        addrs.next().map(|a| a.ip().to_string())
    }

    async fn resolve_mdns(&self) -> Option<String> {
        tokio::task::spawn_blocking(move || {
            let daemon = ServiceDaemon::new().ok()?;
            let receiver = daemon.browse(MDNS_SERVICE_TYPE).ok()?;
            let deadline = std::time::Instant::now() + Duration::from_secs(3);
            while std::time::Instant::now() < deadline {
                let Ok(event) = receiver.recv_timeout(Duration::from_millis(250)) else {
                    continue;
                };
                if let ServiceEvent::ServiceResolved(info) = event {
                    if info.get_fullname().starts_with(MDNS_INSTANCE_NAME) {
                        if let Some(addr) = info.get_addresses().iter().next() {
                            return Some(addr.to_string());
                        }
                    }
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn explicit_host_wins_without_touching_cache() {
        let resolver = EndpointResolver::new(Some("10.0.0.5".to_string()));
        assert_eq!(resolver.resolve().await.unwrap(), "10.0.0.5");
    }

    #[tokio::test]
    async fn cached_file_is_used_verbatim_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("PYTHON-XTABLES-TEMP-CONNECTION.tmp");
        std::fs::write(&cache_path, "192.168.1.42\n").unwrap();

        let resolver = EndpointResolver {
            explicit: None,
            cache_path,
        };
        assert_eq!(resolver.resolve().await.unwrap(), "192.168.1.42");
    }

    #[test]
    fn invalidate_cache_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("PYTHON-XTABLES-TEMP-CONNECTION.tmp");
        std::fs::write(&cache_path, "192.168.1.42").unwrap();

        let resolver = EndpointResolver {
            explicit: None,
            cache_path: cache_path.clone(),
        };
        resolver.invalidate_cache();
        assert!(!cache_path.exists());
    }
}
