//! russh-backed SSH sessions.
//!
//! One `SshSession` wraps one authenticated connection. The underlying
//! protocol multiplexes channels, so a session handle is shared freely across
//! concurrent callers; each `run` opens its own exec channel.

use crate::exec::{RawOutput, Remote};
use crate::hosts::Host;
use crate::ssh::pool::{Connect, PooledSession};
use crate::utils::error::Result;
use anyhow::Context;
use russh::client::{self, Handle};
use russh::keys::{self, PrivateKeyWithHashAlg};
use russh::{ChannelMsg, Disconnect};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Accepts or rejects server host keys. With strict checking off (the
/// default) every key is accepted and its fingerprint logged.
#[derive(Debug)]
pub(crate) struct ClientHandler {
    strict_host_keys: bool,
}

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &keys::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint(Default::default());
        if self.strict_host_keys {
            warn!("Rejecting unverified host key {}", fingerprint);
            Ok(false)
        } else {
            debug!("Accepting host key {}", fingerprint);
            Ok(true)
        }
    }
}

/// A live, authenticated SSH session. Cloning shares the underlying handle.
#[derive(Clone)]
pub struct SshSession {
    handle: Arc<Mutex<Handle<ClientHandler>>>,
}

impl SshSession {
    /// Open and authenticate a session to `host`. Key-file auth is used when
    /// the host carries an identity file; otherwise the SSH agent is tried.
    pub async fn connect(host: &Host, strict_host_keys: bool) -> anyhow::Result<Self> {
        let config = Arc::new(client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            ..Default::default()
        });
        let handler = ClientHandler { strict_host_keys };

        let mut handle = client::connect(config, (host.hostname.as_str(), host.port), handler)
            .await
            .with_context(|| format!("connect to {}", host.address()))?;

        let auth = if let Some(identity) = &host.identity_file {
            authenticate_with_key(&mut handle, &host.user, identity).await?
        } else {
            authenticate_with_agent(&mut handle, &host.user).await?
        };
        if !auth.success() {
            anyhow::bail!("authentication rejected for {}", host.address());
        }

        debug!("SSH session established to {}", host.address());
        Ok(Self {
            handle: Arc::new(Mutex::new(handle)),
        })
    }

    /// Whether the underlying session reports closed.
    pub async fn closed(&self) -> bool {
        self.handle.lock().await.is_closed()
    }

    /// Best-effort disconnect; errors are logged and swallowed.
    pub async fn close(&self) {
        let handle = self.handle.lock().await;
        if let Err(e) = handle
            .disconnect(Disconnect::ByApplication, "closing", "en")
            .await
        {
            debug!("SSH disconnect error: {}", e);
        }
    }

    async fn exec(&self, command: &str) -> Result<RawOutput> {
        // Hold the handle only long enough to open the channel; the read
        // loop below runs unlocked so sessions multiplex.
        let handle = self.handle.lock().await;
        let mut channel = handle.channel_open_session().await?;
        channel.exec(true, command).await?;
        drop(handle);

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_status = None;

        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => stdout.extend_from_slice(&data),
                Some(ChannelMsg::ExtendedData { data, ext }) if ext == 1 => {
                    stderr.extend_from_slice(&data)
                }
                Some(ChannelMsg::ExitStatus { exit_status: code }) => {
                    exit_status = Some(code as i32)
                }
                Some(ChannelMsg::Eof) => {
                    if exit_status.is_some() {
                        break;
                    }
                }
                Some(ChannelMsg::Close) | None => break,
                Some(_) => {}
            }
        }

        let _ = channel.close().await;

        Ok(RawOutput {
            stdout,
            stderr,
            exit_status: exit_status.unwrap_or(-1),
        })
    }
}

impl Remote for SshSession {
    async fn run(&self, command: &str) -> Result<RawOutput> {
        self.exec(command).await
    }
}

impl PooledSession for SshSession {
    async fn is_closed(&self) -> bool {
        self.closed().await
    }

    async fn disconnect(&self) {
        self.close().await;
    }
}

/// Opens russh sessions for the pool.
#[derive(Debug, Clone)]
pub struct RusshConnector {
    pub strict_host_keys: bool,
}

impl Connect for RusshConnector {
    type Session = SshSession;

    async fn connect(&self, host: &Host) -> anyhow::Result<SshSession> {
        SshSession::connect(host, self.strict_host_keys).await
    }
}

async fn authenticate_with_key(
    handle: &mut Handle<ClientHandler>,
    user: &str,
    path: &Path,
) -> anyhow::Result<client::AuthResult> {
    let key = keys::load_secret_key(path, None)
        .with_context(|| format!("load private key {}", path.display()))?;

    // RSA keys must be signed with the strongest hash the server supports;
    // legacy ssh-rsa signatures get rejected by modern servers.
    let hash_alg = handle.best_supported_rsa_hash().await.ok().flatten().flatten();
    let key = PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg);

    handle
        .authenticate_publickey(user, key)
        .await
        .context("public key authentication")
}

async fn authenticate_with_agent(
    handle: &mut Handle<ClientHandler>,
    user: &str,
) -> anyhow::Result<client::AuthResult> {
    let mut agent = keys::agent::client::AgentClient::connect_env()
        .await
        .context("connect to SSH agent")?;
    let identities = agent
        .request_identities()
        .await
        .context("list SSH agent identities")?;
    if identities.is_empty() {
        anyhow::bail!("no identities available in SSH agent");
    }

    for identity in identities {
        let hash_alg = handle.best_supported_rsa_hash().await.ok().flatten().flatten();
        match handle
            .authenticate_publickey_with(user, identity.clone(), hash_alg, &mut agent)
            .await
        {
            Ok(result) if result.success() => return Ok(result),
            Ok(_) => continue,
            Err(e) => {
                debug!("Agent identity not accepted: {}", e);
                continue;
            }
        }
    }

    anyhow::bail!("SSH agent offered no accepted identity")
}
