//! Remote command executors.
//!
//! Each executor builds a single shell command string with every
//! user-controlled token quoted, runs it over an established session, and
//! turns the output into typed results. Executors fail only when the command
//! itself could not be run; "feature absent" and "item not found" conditions
//! are encoded in the return values so nonzero exit codes never surface as
//! errors.

use crate::utils::error::Result;
use serde::Serialize;
use std::borrow::Cow;
use std::future::Future;

pub mod docker;
pub mod fs;
pub mod syslog;
pub mod zfs;

pub use docker::{compose_file, compose_logs, compose_ls, docker_logs, docker_ps};
pub use fs::{cat_file, ls_dir, run_command, stat_path, tree_dir, PathKind};
pub use syslog::{syslog_read, SyslogSource};
pub use zfs::{zfs_check, zfs_datasets, zfs_pools, zfs_snapshots};

/// The executor-facing view of a live remote session. The SSH-backed session
/// is the production implementation; tests drive the executors and dispatch
/// cores with scripted fakes.
pub trait Remote: Sync {
    /// Run one shell command and capture its raw output. Nonzero exit codes
    /// are data, not errors.
    fn run(&self, command: &str) -> impl Future<Output = Result<RawOutput>> + Send;
}

/// Undecoded bytes captured from one remote command.
#[derive(Debug, Clone, Default)]
pub struct RawOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_status: i32,
}

impl RawOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Decoded result of an ad-hoc query: always populated, never an error.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub returncode: i32,
}

impl From<RawOutput> for CommandResult {
    fn from(raw: RawOutput) -> Self {
        Self {
            stdout: raw.stdout_lossy(),
            stderr: raw.stderr_lossy(),
            returncode: raw.exit_status,
        }
    }
}

/// Shell-quote one user-controlled token for interpolation into a remote
/// command string. Spaces, quotes, `$`, backticks, and newlines all survive.
pub(crate) fn quote(token: &str) -> Cow<'_, str> {
    shell_words::quote(token)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{RawOutput, Remote};
    use crate::utils::error::Result;
    use std::sync::Mutex;

    /// Substring-scripted remote: the first scripted needle contained in the
    /// issued command wins. Unscripted commands exit 127.
    pub(crate) struct ScriptedRemote {
        responses: Vec<(String, RawOutput)>,
        pub commands: Mutex<Vec<String>>,
    }

    impl ScriptedRemote {
        pub fn new() -> Self {
            Self {
                responses: Vec::new(),
                commands: Mutex::new(Vec::new()),
            }
        }

        pub fn on(mut self, needle: &str, output: RawOutput) -> Self {
            self.responses.push((needle.to_string(), output));
            self
        }

        pub fn ok(stdout: &str) -> RawOutput {
            RawOutput {
                stdout: stdout.as_bytes().to_vec(),
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

        pub fn issued(&self) -> Vec<String> {
            self.commands.lock().unwrap().clone()
        }
    }

    impl Remote for ScriptedRemote {
        async fn run(&self, command: &str) -> Result<RawOutput> {
            self.commands.lock().unwrap().push(command.to_string());
            for (needle, output) in &self.responses {
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
}
