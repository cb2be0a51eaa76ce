//! Filesystem executors: stat, bounded reads, listings, and the ad-hoc
//! query escape hatch.

use crate::exec::{quote, CommandResult, Remote};
use crate::utils::error::{Result, ScoutError};

/// What a remote path turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    File,
    Directory,
}

/// Classify a remote path. A failed `stat` means the path does not exist (or
/// is unreadable), which reads as `None` rather than an error.
pub async fn stat_path<R: Remote>(remote: &R, path: &str) -> Result<Option<PathKind>> {
    let out = remote
        .run(&format!("stat -c %F -- {}", quote(path)))
        .await?;
    if !out.success() {
        return Ok(None);
    }
    let kind = out.stdout_lossy().trim().to_lowercase();
    if kind.contains("directory") {
        Ok(Some(PathKind::Directory))
    } else if kind.contains("regular") || kind.contains("file") {
        Ok(Some(PathKind::File))
    } else {
        Ok(None)
    }
}

/// Read at most `max_size` bytes of a file. The truncation flag compares
/// byte length, not character count, against the cap.
pub async fn cat_file<R: Remote>(remote: &R, path: &str, max_size: u64) -> Result<(String, bool)> {
    let out = remote
        .run(&format!("head -c {} -- {}", max_size, quote(path)))
        .await?;
    if !out.success() && out.stdout.is_empty() {
        return Err(ScoutError::ReadFailed(format!(
            "{}: {}",
            path,
            out.stderr_lossy().trim()
        )));
    }
    let truncated = out.stdout.len() as u64 == max_size;
    Ok((out.stdout_lossy(), truncated))
}

/// Long listing of a directory.
pub async fn ls_dir<R: Remote>(remote: &R, path: &str) -> Result<String> {
    let out = remote.run(&format!("ls -la -- {}", quote(path))).await?;
    if !out.success() && out.stdout.is_empty() {
        return Err(ScoutError::ReadFailed(format!(
            "{}: {}",
            path,
            out.stderr_lossy().trim()
        )));
    }
    Ok(out.stdout_lossy())
}

/// Depth-limited tree view. Prefers `tree`; falls back to `find` capped at
/// 100 entries. Depth 0 always takes the `find` form, which lists just the
/// root entry.
pub async fn tree_dir<R: Remote>(remote: &R, path: &str, max_depth: u32) -> Result<String> {
    let q = quote(path);
    let cmd = if max_depth == 0 {
        format!("find {} -maxdepth 0 | head -n 100", q)
    } else {
        format!(
            "if command -v tree >/dev/null 2>&1; then tree -L {depth} --noreport -- {q}; \
             else find {q} -maxdepth {depth} | head -n 100; fi",
            depth = max_depth,
            q = q
        )
    };
    let out = remote.run(&cmd).await?;
    if !out.success() && out.stdout.is_empty() {
        return Err(ScoutError::ReadFailed(format!(
            "{}: {}",
            path,
            out.stderr_lossy().trim()
        )));
    }
    Ok(out.stdout_lossy())
}

/// Run a caller-supplied shell command under `cwd`, bounded by the remote
/// `timeout` wrapper. The command is deliberately not quoted; only the
/// working directory is. Nonzero exit codes, including 124 from `timeout`,
/// come back as data.
pub async fn run_command<R: Remote>(
    remote: &R,
    cwd: &str,
    cmd: &str,
    timeout_secs: u64,
) -> Result<CommandResult> {
    let shell = format!("cd {} && timeout {} {}", quote(cwd), timeout_secs, cmd);
    Ok(remote.run(&shell).await?.into())
}
