//! Concurrent TCP reachability checks for the `scout("hosts")` listing.
//!
//! Opens a plain TCP connection to each endpoint, closes it immediately, and
//! reports per-name reachability. No SSH handshake is performed; a connect
//! error or an elapsed timeout both read as offline.

use crate::hosts::Host;
use futures::future::join_all;
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

/// Check a single `(hostname, port)` endpoint within `limit`.
pub async fn probe_endpoint(hostname: &str, port: u16, limit: Duration) -> bool {
    match timeout(limit, TcpStream::connect((hostname, port))).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(e)) => {
            trace!("Probe of {}:{} failed: {}", hostname, port, e);
            false
        }
        Err(_) => {
            trace!("Probe of {}:{} timed out after {:?}", hostname, port, limit);
            false
        }
    }
}

/// Probe every host concurrently. Concurrency is unbounded across the input
/// set, so total wall time stays near `limit` regardless of fleet size.
pub async fn probe_hosts(hosts: &[Host], limit: Duration) -> HashMap<String, bool> {
    let checks = hosts.iter().map(|host| async move {
        let online = probe_endpoint(&host.hostname, host.port, limit).await;
        (host.name.clone(), online)
    });
    join_all(checks).await.into_iter().collect()
}
