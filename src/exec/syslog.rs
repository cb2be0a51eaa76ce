//! System log executor: journalctl first, classic syslog file second.

use crate::exec::Remote;
use crate::utils::error::Result;

/// Where the log lines came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyslogSource {
    Journalctl,
    Syslog,
    None,
}

impl SyslogSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Journalctl => "journalctl",
            Self::Syslog => "syslog",
            Self::None => "none",
        }
    }
}

/// Read the last `lines` system log lines. A host with neither journalctl
/// nor `/var/log/syslog` yields empty text and `SyslogSource::None`.
pub async fn syslog_read<R: Remote>(remote: &R, lines: u32) -> Result<(String, SyslogSource)> {
    let out = remote
        .run(&format!(
            "command -v journalctl >/dev/null 2>&1 && journalctl -n {} --no-pager",
            lines
        ))
        .await?;
    if out.success() && !out.stdout.is_empty() {
        return Ok((out.stdout_lossy(), SyslogSource::Journalctl));
    }

    let out = remote
        .run(&format!("tail -n {} /var/log/syslog", lines))
        .await?;
    if out.success() && !out.stdout.is_empty() {
        return Ok((out.stdout_lossy(), SyslogSource::Syslog));
    }

    Ok((String::new(), SyslogSource::None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedRemote;

    #[tokio::test]
    async fn prefers_journalctl() {
        let remote =
            ScriptedRemote::new().on("journalctl -n 100", ScriptedRemote::ok("kernel: up\n"));
        let (text, source) = syslog_read(&remote, 100).await.unwrap();
        assert_eq!(source, SyslogSource::Journalctl);
        assert_eq!(text, "kernel: up\n");
    }

    #[tokio::test]
    async fn falls_back_to_syslog_file() {
        let remote = ScriptedRemote::new()
            .on("journalctl", ScriptedRemote::fail(1, ""))
            .on("/var/log/syslog", ScriptedRemote::ok("daemon: ok\n"));
        let (text, source) = syslog_read(&remote, 50).await.unwrap();
        assert_eq!(source, SyslogSource::Syslog);
        assert_eq!(text, "daemon: ok\n");
    }

    #[tokio::test]
    async fn reports_none_when_no_source_exists() {
        let remote = ScriptedRemote::new();
        let (text, source) = syslog_read(&remote, 100).await.unwrap();
        assert_eq!(source, SyslogSource::None);
        assert!(text.is_empty());
    }
}
