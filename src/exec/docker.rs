//! Docker and Compose executors. A host without Docker answers with empty
//! lists; a missing container or project is a flag or typed not-found, never
//! a raw failure.

use crate::exec::{quote, Remote};
use crate::utils::error::{Result, ScoutError};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One running container, as reported by `docker ps`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerInfo {
    #[serde(rename = "Names")]
    pub name: String,
    #[serde(rename = "Image", default)]
    pub image: String,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "Ports", default)]
    pub ports: String,
    #[serde(rename = "State", default)]
    pub state: String,
}

/// One Compose project, as reported by `docker compose ls`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComposeProject {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "ConfigFiles", default)]
    pub config_files: String,
}

/// List running containers. A host without Docker yields `[]`.
pub async fn docker_ps<R: Remote>(remote: &R) -> Result<Vec<ContainerInfo>> {
    let out = remote.run("docker ps --format '{{json .}}'").await?;
    if !out.success() {
        return Ok(Vec::new());
    }

    let mut containers = Vec::new();
    for line in out.stdout_lossy().lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<ContainerInfo>(line) {
            Ok(container) => containers.push(container),
            Err(e) => debug!("Skipping unparseable docker ps line: {}", e),
        }
    }
    Ok(containers)
}

/// Fetch a container's recent log lines. The flag is false when the
/// container does not exist.
pub async fn docker_logs<R: Remote>(
    remote: &R,
    container: &str,
    tail: u32,
    timestamps: bool,
) -> Result<(String, bool)> {
    let mut cmd = format!("docker logs --tail {}", tail);
    if timestamps {
        cmd.push_str(" --timestamps");
    }
    cmd.push(' ');
    cmd.push_str(&quote(container));
    cmd.push_str(" 2>&1");

    let out = remote.run(&cmd).await?;
    let text = out.stdout_lossy();
    if !out.success() && text.contains("No such container") {
        return Ok((String::new(), false));
    }
    Ok((text, true))
}

/// List Compose projects. Hosts without the compose plugin, and any
/// unparseable output, read as "not available" and yield `[]`.
pub async fn compose_ls<R: Remote>(remote: &R) -> Result<Vec<ComposeProject>> {
    let out = remote.run("docker compose ls --format json").await?;
    if !out.success() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Vec<ComposeProject>>(out.stdout_lossy().trim()) {
        Ok(projects) => Ok(projects),
        Err(e) => {
            debug!("Compose listing not parseable, treating as unavailable: {}", e);
            Ok(Vec::new())
        }
    }
}

/// Read a project's compose config file. Unknown projects are not-found.
pub async fn compose_file<R: Remote>(remote: &R, project: &str) -> Result<String> {
    let projects = compose_ls(remote).await?;
    let Some(entry) = projects.iter().find(|p| p.name == project) else {
        return Err(ScoutError::ResourceNotFound(format!(
            "Compose project '{}' not found",
            project
        )));
    };

    // ConfigFiles may list several comma-separated paths; the first is the
    // project's primary file.
    let Some(path) = entry
        .config_files
        .split(',')
        .map(str::trim)
        .find(|p| !p.is_empty())
    else {
        return Err(ScoutError::ResourceNotFound(format!(
            "Compose project '{}' has no config file",
            project
        )));
    };

    let out = remote.run(&format!("cat -- {}", quote(path))).await?;
    if !out.success() {
        return Err(ScoutError::ReadFailed(format!(
            "{}: {}",
            path,
            out.stderr_lossy().trim()
        )));
    }
    Ok(out.stdout_lossy())
}

/// Timestamped logs across all services of a project.
pub async fn compose_logs<R: Remote>(remote: &R, project: &str, tail: u32) -> Result<String> {
    let cmd = format!(
        "docker compose -p {} logs --tail {} --timestamps 2>&1",
        quote(project),
        tail
    );
    let out = remote.run(&cmd).await?;
    Ok(out.stdout_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedRemote;

    #[tokio::test]
    async fn docker_ps_parses_json_lines() {
        let body = concat!(
            r#"{"Names":"plex","Image":"plexinc/pms","Status":"Up 3 days","Ports":"32400/tcp","State":"running"}"#,
            "\n",
            r#"{"Names":"db","Image":"postgres:16","Status":"Up 9 hours","Ports":"","State":"running"}"#,
            "\n",
        );
        let remote = ScriptedRemote::new().on("docker ps", ScriptedRemote::ok(body));
        let containers = docker_ps(&remote).await.unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].name, "plex");
        assert_eq!(containers[1].image, "postgres:16");
    }

    #[tokio::test]
    async fn docker_absent_yields_empty_list() {
        let remote =
            ScriptedRemote::new().on("docker ps", ScriptedRemote::fail(127, "docker: not found"));
        assert!(docker_ps(&remote).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn docker_logs_flags_missing_container() {
        let mut missing = ScriptedRemote::fail(1, "");
        missing.stdout = b"Error response from daemon: No such container: nope\n".to_vec();
        let remote = ScriptedRemote::new().on("docker logs", missing);

        let (text, exists) = docker_logs(&remote, "nope", 100, true).await.unwrap();
        assert!(!exists);
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn docker_logs_passes_tail_and_timestamps() {
        let remote = ScriptedRemote::new().on("docker logs", ScriptedRemote::ok("line\n"));
        let (text, exists) = docker_logs(&remote, "plex", 50, true).await.unwrap();
        assert!(exists);
        assert_eq!(text, "line\n");

        let issued = remote.issued();
        assert!(issued[0].starts_with("docker logs --tail 50 --timestamps plex"));
    }

    #[tokio::test]
    async fn compose_ls_tolerates_unparseable_output() {
        let remote =
            ScriptedRemote::new().on("docker compose ls", ScriptedRemote::ok("NAME STATUS\n"));
        assert!(compose_ls(&remote).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn compose_file_resolves_and_reads_config() {
        let listing =
            r#"[{"Name":"media","Status":"running(2)","ConfigFiles":"/srv/media/compose.yaml"}]"#;
        let remote = ScriptedRemote::new()
            .on("docker compose ls", ScriptedRemote::ok(listing))
            .on("cat -- /srv/media/compose.yaml", ScriptedRemote::ok("services: {}\n"));

        let text = compose_file(&remote, "media").await.unwrap();
        assert_eq!(text, "services: {}\n");
    }

    #[tokio::test]
    async fn compose_file_unknown_project_is_not_found() {
        let remote = ScriptedRemote::new().on("docker compose ls", ScriptedRemote::ok("[]"));
        let err = compose_file(&remote, "ghost").await.unwrap_err();
        assert_eq!(err.kind(), "ResourceNotFound");
    }
}
