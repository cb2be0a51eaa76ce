//! Shared test plumbing: scripted sessions standing in for SSH, and the
//! two-host table used across scenarios.
#![allow(dead_code)]

use scoutd::exec::{RawOutput, Remote};
use scoutd::hosts::{Host, HostTable};
use scoutd::ssh::pool::{Connect, PooledSession};
use scoutd::Result;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct Inner {
    responses: Mutex<Vec<(String, RawOutput)>>,
    commands: Mutex<Vec<String>>,
    closed: AtomicBool,
}

/// Substring-scripted stand-in for an SSH session; the first scripted needle
/// contained in an issued command wins, anything else exits 127.
#[derive(Clone)]
pub struct ScriptedRemote {
    inner: Arc<Inner>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                responses: Mutex::new(Vec::new()),
                commands: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn on(&self, needle: &str, output: RawOutput) -> &Self {
        self.inner
            .responses
            .lock()
            .unwrap()
            .push((needle.to_string(), output));
        self
    }

    pub fn issued(&self) -> Vec<String> {
        self.inner.commands.lock().unwrap().clone()
    }

    pub fn mark_closed(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }
}

impl Remote for ScriptedRemote {
    async fn run(&self, command: &str) -> Result<RawOutput> {
        self.inner
            .commands
            .lock()
            .unwrap()
            .push(command.to_string());
        let responses = self.inner.responses.lock().unwrap();
        for (needle, output) in responses.iter() {
            if command.contains(needle.as_str()) {
                return Ok(output.clone());
            }
        }
        Ok(RawOutput {
            stdout: Vec::new(),
            stderr: b"command not scripted".to_vec(),
            exit_status: 127,
        })
    }
}

impl PooledSession for ScriptedRemote {
    async fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) {
        self.mark_closed();
    }
}

/// Hands the same scripted session to every `connect`, optionally failing
/// the first N attempts.
pub struct ScriptedConnector {
    pub remote: ScriptedRemote,
    pub opened: Arc<AtomicUsize>,
    failures_left: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub fn new(remote: ScriptedRemote) -> Self {
        Self::failing(remote, 0)
    }

    pub fn failing(remote: ScriptedRemote, failures: usize) -> Self {
        Self {
            remote,
            opened: Arc::new(AtomicUsize::new(0)),
            failures_left: Arc::new(AtomicUsize::new(failures)),
        }
    }
}

impl Connect for ScriptedConnector {
    type Session = ScriptedRemote;

    async fn connect(&self, _host: &Host) -> anyhow::Result<ScriptedRemote> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            anyhow::bail!("synthetic connect failure");
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(self.remote.clone())
    }
}

pub fn host(name: &str, hostname: &str, port: u16) -> Host {
    Host {
        name: name.to_string(),
        hostname: hostname.to_string(),
        port,
        user: "root".to_string(),
        identity_file: None,
    }
}

/// The canonical two-host table: dookie at 1.1.1.1:22, tootie at
/// 2.2.2.2:29229, both as root.
pub fn two_hosts() -> HostTable {
    HostTable::new(vec![
        host("dookie", "1.1.1.1", 22),
        host("tootie", "2.2.2.2", 29229),
    ])
    .unwrap()
}

pub fn ok(stdout: &str) -> RawOutput {
    RawOutput {
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
        exit_status: 0,
    }
}

pub fn ok_bytes(stdout: Vec<u8>) -> RawOutput {
    RawOutput {
        stdout,
        stderr: Vec::new(),
        exit_status: 0,
    }
}

pub fn fail(exit_status: i32, stderr: &str) -> RawOutput {
    RawOutput {
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
        exit_status,
    }
}
