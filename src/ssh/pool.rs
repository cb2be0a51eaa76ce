//! Connection pool: one reusable SSH session per host name.
//!
//! All mutating operations serialize on a single pool-wide mutex, which stays
//! held across the handshake. Concurrent opens to different hosts therefore
//! serialize, and duplicate opens to the same host collapse into one. The
//! mutex is never held across a caller-supplied continuation.

use crate::hosts::Host;
use crate::utils::error::{Result, ScoutError};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

/// What the pool needs from a cached session.
pub trait PooledSession: Clone + Send + Sync + 'static {
    /// Whether the underlying transport reports closed.
    fn is_closed(&self) -> impl Future<Output = bool> + Send;
    /// Best-effort teardown; must not fail.
    fn disconnect(&self) -> impl Future<Output = ()> + Send;
}

/// Opens new sessions on behalf of the pool.
pub trait Connect: Send + Sync + 'static {
    type Session: PooledSession;

    fn connect(&self, host: &Host) -> impl Future<Output = anyhow::Result<Self::Session>> + Send;
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// How long an unused entry survives before the reaper closes it.
    pub idle_timeout: Duration,
    /// Cap on connect + authenticate for one open attempt.
    pub connect_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

struct Entry<S> {
    session: S,
    last_used: Instant,
}

struct Shared<C: Connect> {
    connector: C,
    config: PoolConfig,
    entries: Mutex<HashMap<String, Entry<C::Session>>>,
    reaper_running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    reaper_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// The pool proper. Cloning shares the same state.
pub struct Pool<C: Connect> {
    shared: Arc<Shared<C>>,
}

impl<C: Connect> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// The production pool over russh sessions.
pub type SshPool = Pool<crate::ssh::client::RusshConnector>;

impl<C: Connect> Pool<C> {
    pub fn new(connector: C, config: PoolConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                connector,
                config,
                entries: Mutex::new(HashMap::new()),
                reaper_running: AtomicBool::new(false),
                shutdown_tx,
                reaper_handle: std::sync::Mutex::new(None),
            }),
        }
    }

    /// Return a live, non-stale session to `host.name`, opening one if the
    /// cache misses. A cached session that reports closed counts as a miss.
    pub async fn get(&self, host: &Host) -> Result<C::Session> {
        let mut entries = self.shared.entries.lock().await;

        let mut stale = None;
        if let Some(entry) = entries.get_mut(&host.name) {
            if entry.session.is_closed().await {
                debug!("Cached session to '{}' is stale, reopening", host.name);
                stale = entries.remove(&host.name).map(|e| e.session);
            } else {
                entry.last_used = Instant::now();
                return Ok(entry.session.clone());
            }
        }

        debug!("Opening SSH session to '{}'", host.name);
        let opened = match timeout(
            self.shared.config.connect_timeout,
            self.shared.connector.connect(host),
        )
        .await
        {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                return Err(ScoutError::ConnectFailed {
                    host: host.name.clone(),
                    source: e,
                })
            }
            Err(_) => {
                return Err(ScoutError::ConnectFailed {
                    host: host.name.clone(),
                    source: anyhow::anyhow!(
                        "connection timed out after {:?}",
                        self.shared.config.connect_timeout
                    ),
                })
            }
        };

        entries.insert(
            host.name.clone(),
            Entry {
                session: opened.clone(),
                last_used: Instant::now(),
            },
        );
        // Spawned under the entries lock so the flag handoff with a
        // terminating reaper cannot lose a wakeup.
        spawn_reaper_if_stopped(&self.shared);
        drop(entries);

        if let Some(session) = stale {
            session.disconnect().await;
        }

        Ok(opened)
    }

    /// One-retry helper: on a failed `get`, drop whatever is cached for the
    /// host and try exactly once more; the second failure surfaces.
    pub async fn get_with_retry(&self, host: &Host) -> Result<C::Session> {
        match self.get(host).await {
            Ok(session) => Ok(session),
            Err(first) => {
                warn!(
                    "Connection to '{}' failed, retrying once: {}",
                    host.name, first
                );
                self.remove(&host.name).await;
                self.get(host).await
            }
        }
    }

    /// Close and drop any cached entry for `name`; idempotent.
    pub async fn remove(&self, name: &str) {
        let removed = { self.shared.entries.lock().await.remove(name) };
        if let Some(entry) = removed {
            entry.session.disconnect().await;
            debug!("Removed pooled session to '{}'", name);
        }
    }

    /// Close every entry and stop the reaper.
    pub async fn close_all(&self) {
        let drained: Vec<(String, Entry<C::Session>)> = {
            let mut entries = self.shared.entries.lock().await;
            entries.drain().collect()
        };
        for (name, entry) in drained {
            entry.session.disconnect().await;
            debug!("Closed pooled session to '{}'", name);
        }

        let _ = self.shared.shutdown_tx.send(true);
        let handle = self.shared.reaper_handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let abort = handle.abort_handle();
            if timeout(Duration::from_secs(5), handle).await.is_err() {
                abort.abort();
            }
        }
        self.shared.reaper_running.store(false, Ordering::SeqCst);
    }

    pub async fn size(&self) -> usize {
        self.shared.entries.lock().await.len()
    }

    pub async fn active_hosts(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.entries.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    #[cfg(test)]
    fn reaper_running(&self) -> bool {
        self.shared.reaper_running.load(Ordering::SeqCst)
    }
}

/// Lazily start the idle reaper. It wakes every `idle_timeout / 2`, closes
/// entries idle past the timeout or whose session reports closed, and
/// terminates itself once the pool is empty; the next insert re-spawns it.
fn spawn_reaper_if_stopped<C: Connect>(shared: &Arc<Shared<C>>) {
    if shared.reaper_running.swap(true, Ordering::SeqCst) {
        return;
    }

    shared.shutdown_tx.send_replace(false);
    let mut shutdown_rx = shared.shutdown_tx.subscribe();
    let task_shared = Arc::clone(shared);
    let wake = shared.config.idle_timeout / 2;

    let handle = tokio::spawn(async move {
        let shared = task_shared;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(wake) => {}
                _ = shutdown_rx.changed() => {
                    let entries = shared.entries.lock().await;
                    if entries.is_empty() {
                        shared.reaper_running.store(false, Ordering::SeqCst);
                        break;
                    }
                    // An entry landed after the shutdown signal; keep going.
                    continue;
                }
            }

            let mut reaped = Vec::new();
            let mut entries = shared.entries.lock().await;
            let now = Instant::now();
            let names: Vec<String> = entries.keys().cloned().collect();
            for name in names {
                let expired = match entries.get(&name) {
                    Some(entry) => {
                        now.duration_since(entry.last_used) >= shared.config.idle_timeout
                            || entry.session.is_closed().await
                    }
                    None => false,
                };
                if expired {
                    if let Some(entry) = entries.remove(&name) {
                        debug!("Reaping idle SSH session to '{}'", name);
                        reaped.push(entry.session);
                    }
                }
            }
            let empty = entries.is_empty();
            if empty {
                shared.reaper_running.store(false, Ordering::SeqCst);
            }
            drop(entries);

            for session in reaped {
                session.disconnect().await;
            }
            if empty {
                break;
            }
        }
    });

    *shared.reaper_handle.lock().unwrap() = Some(handle);
}
