//! Request dispatch: the tool and resource entry points.
//!
//! The dispatcher owns the configuration, host table, pool, router, and
//! middlewares outright; nothing here is process-global. Every request runs
//! through the middleware chain. The tool boundary converts every failure
//! into an `"Error: ..."` string; the resource boundary raises typed errors
//! for the transport to serialize.

use crate::config::Config;
use crate::exec::{self, PathKind, Remote, SyslogSource};
use crate::hosts::probe::probe_hosts;
use crate::hosts::{Host, HostTable};
use crate::middleware::{Describe, ErrorMiddleware, LoggingMiddleware, RequestContext};
use crate::routing::{parse_resource_uri, parse_target, HandlerId, Router, Target};
use crate::ssh::client::RusshConnector;
use crate::ssh::pool::{Connect, Pool, PoolConfig};
use crate::utils::error::{Result, ScoutError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Depth used when the tool asks for a tree view.
const TREE_DEPTH: u32 = 3;
/// Tail length for container, compose, and syslog reads via resources.
const LOG_TAIL: u32 = 100;
/// Default cap on listed ZFS snapshots.
const SNAPSHOT_LIMIT: usize = 50;

/// Arguments of the single `scout` tool.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScoutArgs {
    pub target: String,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub tree: Option<bool>,
}

/// What a tool call hands back to the transport. Never an error across the
/// boundary; failures are rendered into `text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub text: String,
    pub is_error: bool,
}

/// One resource read result: payload plus MIME type.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResourceContent {
    pub uri: String,
    pub mime_type: String,
    pub text: String,
}

impl Describe for ResourceContent {
    fn describe(&self) -> String {
        format!("{} ({} chars)", self.mime_type, self.text.len())
    }
}

/// The dispatcher. Generic over the pool's connector so the full request
/// path runs against scripted sessions in tests; `SshDispatcher` is the
/// production instantiation.
pub struct Dispatcher<C: Connect = RusshConnector>
where
    C::Session: Remote,
{
    config: Config,
    hosts: HostTable,
    pool: Pool<C>,
    router: Router,
    logging: LoggingMiddleware,
    errors: ErrorMiddleware,
}

pub type SshDispatcher = Dispatcher<RusshConnector>;

impl<C: Connect> Dispatcher<C>
where
    C::Session: Remote,
{
    pub fn new(config: Config, hosts: HostTable, connector: C) -> Result<Self> {
        let mut router = Router::new();
        router.register_global()?;
        for host in hosts.iter() {
            router.register_host(&host.name)?;
        }

        let pool = Pool::new(
            connector,
            PoolConfig {
                idle_timeout: Duration::from_secs(config.ssh.idle_timeout_secs),
                ..PoolConfig::default()
            },
        );
        let logging = LoggingMiddleware::new(&config.logging);
        let errors = ErrorMiddleware::new(config.logging.include_traceback);

        Ok(Self {
            config,
            hosts,
            pool,
            router,
            logging,
            errors,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn hosts(&self) -> &HostTable {
        &self.hosts
    }

    pub fn pool(&self) -> &Pool<C> {
        &self.pool
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn logging(&self) -> &LoggingMiddleware {
        &self.logging
    }

    pub fn errors(&self) -> &ErrorMiddleware {
        &self.errors
    }

    /// Tool entry point. Runs the middleware chain and renders any failure
    /// as an `"Error: ..."` string; this boundary never raises.
    pub async fn call_tool(&self, name: &str, arguments: serde_json::Value) -> ToolOutput {
        let ctx = RequestContext::tool(name, &arguments);
        let result = self
            .logging
            .call(&ctx, || {
                self.errors.call(&ctx, || self.run_tool(name, &arguments))
            })
            .await;

        match result {
            Ok(text) => ToolOutput {
                text,
                is_error: false,
            },
            Err(e) => ToolOutput {
                text: format!("Error: {}", e),
                is_error: true,
            },
        }
    }

    /// Resource entry point. `ResourceNotFound` and resource errors
    /// propagate; anything else is wrapped as a resource error carrying the
    /// cause. The error counter sees the original kind either way.
    pub async fn read_resource(&self, uri: &str) -> Result<ResourceContent> {
        let ctx = RequestContext::resource(uri);
        let result = self
            .logging
            .call(&ctx, || self.errors.call(&ctx, || self.run_resource(uri)))
            .await;

        result.map_err(|e| match e {
            e @ (ScoutError::ResourceNotFound(_) | ScoutError::Resource(_)) => e,
            other => ScoutError::Resource(other.to_string()),
        })
    }

    async fn run_tool(&self, name: &str, arguments: &serde_json::Value) -> Result<String> {
        if name != "scout" {
            return Err(ScoutError::InvalidTarget(format!(
                "unknown tool '{}'",
                name
            )));
        }
        let args: ScoutArgs = serde_json::from_value(arguments.clone())
            .map_err(|e| ScoutError::InvalidTarget(format!("bad arguments: {}", e)))?;
        self.scout(&args).await
    }

    async fn scout(&self, args: &ScoutArgs) -> Result<String> {
        match parse_target(&args.target)? {
            Target::Hosts => Ok(self.list_hosts().await),
            Target::Path { host, path } => {
                let host = self.resolve_host(&host)?;
                let session = self.pool.get_with_retry(host).await?;
                match args.query.as_deref().map(str::trim) {
                    Some(query) if !query.is_empty() => {
                        run_query(
                            &session,
                            &path,
                            query,
                            self.config.limits.command_timeout_secs,
                        )
                        .await
                    }
                    _ => {
                        browse_path(
                            &session,
                            &path,
                            args.tree.unwrap_or(false),
                            self.config.limits.max_file_size,
                        )
                        .await
                    }
                }
            }
        }
    }

    async fn run_resource(&self, raw: &str) -> Result<ResourceContent> {
        let uri = parse_resource_uri(raw)?;
        let Some(matched) = self.router.resolve(&uri) else {
            return Err(ScoutError::ResourceNotFound(format!(
                "No resource matches '{}'",
                raw
            )));
        };

        let mut mime_type = "text/plain";
        let text = match matched.handler {
            HandlerId::HostsList => self.list_hosts().await,
            HandlerId::ScoutPath => {
                let host = self.resolve_host(matched.param("host"))?;
                let session = self.pool.get_with_retry(host).await?;
                let path = normalize_path(matched.param("path"));
                resource_browse(
                    &session,
                    &host.name,
                    &path,
                    self.config.limits.max_file_size,
                )
                .await?
            }
            HandlerId::HostPath => {
                let (host, session) = self.bound_session(&matched.bound_host).await?;
                let path = normalize_path(matched.param("path"));
                resource_browse(
                    &session,
                    &host.name,
                    &path,
                    self.config.limits.max_file_size,
                )
                .await?
            }
            HandlerId::DockerList => {
                let (_, session) = self.bound_session(&matched.bound_host).await?;
                format_containers(&exec::docker_ps(&session).await?)
            }
            HandlerId::DockerLogs => {
                let (_, session) = self.bound_session(&matched.bound_host).await?;
                let container = matched.param("container");
                let (text, exists) =
                    exec::docker_logs(&session, container, LOG_TAIL, true).await?;
                if !exists {
                    return Err(ScoutError::ResourceNotFound(format!(
                        "Container '{}' not found",
                        container
                    )));
                }
                text
            }
            HandlerId::ComposeList => {
                let (_, session) = self.bound_session(&matched.bound_host).await?;
                format_compose_projects(&exec::compose_ls(&session).await?)
            }
            HandlerId::ComposeFile => {
                let (_, session) = self.bound_session(&matched.bound_host).await?;
                mime_type = "text/yaml";
                exec::compose_file(&session, matched.param("project")).await?
            }
            HandlerId::ComposeLogs => {
                let (_, session) = self.bound_session(&matched.bound_host).await?;
                exec::compose_logs(&session, matched.param("project"), LOG_TAIL).await?
            }
            HandlerId::ZfsSummary => {
                let (_, session) = self.bound_session(&matched.bound_host).await?;
                self.zfs_summary(&session).await?
            }
            HandlerId::ZfsPool => {
                let (_, session) = self.bound_session(&matched.bound_host).await?;
                self.zfs_pool_detail(&session, matched.param("pool")).await?
            }
            HandlerId::ZfsDatasets => {
                let (_, session) = self.bound_session(&matched.bound_host).await?;
                format_datasets(&exec::zfs_datasets(&session, Some(matched.param("pool"))).await?)
            }
            HandlerId::ZfsSnapshots => {
                let (_, session) = self.bound_session(&matched.bound_host).await?;
                format_snapshots(&exec::zfs_snapshots(&session, None, SNAPSHOT_LIMIT).await?)
            }
            HandlerId::Syslog => {
                let (_, session) = self.bound_session(&matched.bound_host).await?;
                let (text, source) = exec::syslog_read(&session, LOG_TAIL).await?;
                match source {
                    SyslogSource::None => "No system log source available".to_string(),
                    source => format!("# Source: {}\n\n{}", source.as_str(), text),
                }
            }
        };

        Ok(ResourceContent {
            uri: raw.trim().to_string(),
            mime_type: mime_type.to_string(),
            text,
        })
    }

    fn resolve_host(&self, name: &str) -> Result<&Host> {
        self.hosts.get(name).ok_or_else(|| ScoutError::UnknownHost {
            name: name.to_string(),
            available: self.hosts.available(),
        })
    }

    async fn bound_session(&self, bound_host: &Option<&str>) -> Result<(&Host, C::Session)> {
        let name = bound_host.unwrap_or("");
        let host = self.resolve_host(name)?;
        let session = self.pool.get_with_retry(host).await?;
        Ok((host, session))
    }

    async fn list_hosts(&self) -> String {
        let statuses = probe_hosts(
            self.hosts.as_slice(),
            Duration::from_secs_f64(self.config.limits.probe_timeout_secs),
        )
        .await;
        format_host_listing(self.hosts.as_slice(), &statuses)
    }

    async fn zfs_summary(&self, session: &C::Session) -> Result<String> {
        if !exec::zfs_check(session).await? {
            return Ok("ZFS is not available on this host".to_string());
        }
        Ok(format_zfs_pools(&exec::zfs_pools(session).await?))
    }

    async fn zfs_pool_detail(&self, session: &C::Session, pool: &str) -> Result<String> {
        // "zfs/{pool}" precedes "zfs/snapshots" in the canonical pattern
        // order, so snapshot reads arrive here with pool == "snapshots".
        if pool == "snapshots" {
            return Ok(format_snapshots(
                &exec::zfs_snapshots(session, None, SNAPSHOT_LIMIT).await?,
            ));
        }

        let pools = exec::zfs_pools(session).await?;
        let Some(found) = pools.iter().find(|p| p.name == pool) else {
            return Err(ScoutError::ResourceNotFound(format!(
                "ZFS pool '{}' not found",
                pool
            )));
        };

        let datasets = exec::zfs_datasets(session, Some(pool)).await?;
        Ok(format!(
            "{}\n\n{}",
            format_zfs_pools(std::slice::from_ref(found)),
            format_datasets(&datasets)
        ))
    }
}

/// Run an ad-hoc query under `cwd` and render stdout, `[stderr]`-prefixed
/// stderr, and the exit code.
pub async fn run_query<R: Remote>(
    remote: &R,
    cwd: &str,
    query: &str,
    timeout_secs: u64,
) -> Result<String> {
    let result = exec::run_command(remote, cwd, query, timeout_secs).await?;

    let mut out = String::new();
    if !result.stdout.is_empty() {
        out.push_str(&result.stdout);
        if !out.ends_with('\n') {
            out.push('\n');
        }
    }
    for line in result.stderr.lines() {
        out.push_str("[stderr] ");
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(&format!("[exit code: {}]", result.returncode));
    Ok(out)
}

/// The tool's browse flow: stat, then read a file or list a directory.
pub async fn browse_path<R: Remote>(
    remote: &R,
    path: &str,
    tree: bool,
    max_file_size: u64,
) -> Result<String> {
    match exec::stat_path(remote, path).await? {
        None => Err(ScoutError::PathNotFound(path.to_string())),
        Some(PathKind::File) => {
            let (text, truncated) = exec::cat_file(remote, path, max_file_size).await?;
            if truncated {
                Ok(format!("{}\n\n[truncated at {} bytes]", text, max_file_size))
            } else {
                Ok(text)
            }
        }
        Some(PathKind::Directory) => {
            if tree {
                exec::tree_dir(remote, path, TREE_DEPTH).await
            } else {
                exec::ls_dir(remote, path).await
            }
        }
    }
}

/// The resource browse flow: like the tool's, but a missing path is typed
/// not-found and directory listings carry the `# Directory:` header.
pub async fn resource_browse<R: Remote>(
    remote: &R,
    host: &str,
    path: &str,
    max_file_size: u64,
) -> Result<String> {
    match exec::stat_path(remote, path).await? {
        None => Err(ScoutError::ResourceNotFound(format!(
            "Path not found: {}",
            path
        ))),
        Some(PathKind::File) => {
            let (text, truncated) = exec::cat_file(remote, path, max_file_size).await?;
            if truncated {
                Ok(format!("{}\n\n[truncated at {} bytes]", text, max_file_size))
            } else {
                Ok(text)
            }
        }
        Some(PathKind::Directory) => {
            let listing = exec::ls_dir(remote, path).await?;
            Ok(format!("# Directory: {}:{}\n\n{}", host, path, listing))
        }
    }
}

/// Prefix a wildcard-extracted path with `/`; an empty remainder means the
/// filesystem root.
fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

pub(crate) fn format_host_listing(hosts: &[Host], statuses: &HashMap<String, bool>) -> String {
    if hosts.is_empty() {
        return "No hosts configured".to_string();
    }

    let width = hosts.iter().map(|h| h.name.len()).max().unwrap_or(0);
    let mut out = String::from("Configured hosts:\n\n");
    for host in hosts {
        let marker = match statuses.get(&host.name) {
            Some(true) => "online",
            _ => "offline",
        };
        out.push_str(&format!(
            "{:width$}  {:7}  {}\n",
            host.name,
            marker,
            host.address(),
            width = width
        ));
    }
    out
}

pub(crate) fn format_containers(containers: &[exec::docker::ContainerInfo]) -> String {
    if containers.is_empty() {
        return "No running containers (or Docker not installed)".to_string();
    }
    let mut out = String::from("NAME\tIMAGE\tSTATUS\tPORTS\n");
    for c in containers {
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\n",
            c.name, c.image, c.status, c.ports
        ));
    }
    out
}

pub(crate) fn format_compose_projects(projects: &[exec::docker::ComposeProject]) -> String {
    if projects.is_empty() {
        return "No compose projects (or Compose not available)".to_string();
    }
    let mut out = String::from("NAME\tSTATUS\tCONFIG FILES\n");
    for p in projects {
        out.push_str(&format!("{}\t{}\t{}\n", p.name, p.status, p.config_files));
    }
    out
}

pub(crate) fn format_zfs_pools(pools: &[exec::zfs::ZfsPool]) -> String {
    if pools.is_empty() {
        return "No ZFS pools found".to_string();
    }
    let mut out = String::from("NAME\tSIZE\tALLOC\tFREE\tCAP\tHEALTH\n");
    for p in pools {
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\t{}\n",
            p.name, p.size, p.alloc, p.free, p.capacity, p.health
        ));
    }
    out
}

pub(crate) fn format_datasets(datasets: &[exec::zfs::ZfsDataset]) -> String {
    if datasets.is_empty() {
        return "No datasets found".to_string();
    }
    let mut out = String::from("NAME\tUSED\tAVAIL\tREFER\tMOUNTPOINT\n");
    for d in datasets {
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\n",
            d.name, d.used, d.avail, d.refer, d.mountpoint
        ));
    }
    out
}

pub(crate) fn format_snapshots(snapshots: &[exec::zfs::ZfsSnapshot]) -> String {
    if snapshots.is_empty() {
        return "No snapshots found".to_string();
    }
    let mut out = String::from("NAME\tUSED\tCREATION\n");
    for s in snapshots {
        out.push_str(&format!("{}\t{}\t{}\n", s.name, s.used, s.creation));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedRemote;

    #[tokio::test]
    async fn query_rendering_includes_stderr_and_exit_code() {
        let mut out = ScriptedRemote::ok("./a:1:foo");
        out.stderr = b"grep: warning\n".to_vec();
        let remote = ScriptedRemote::new().on("grep -n foo", out);

        let text = run_query(&remote, "/etc", "grep -n foo .", 30).await.unwrap();
        assert!(text.contains("./a:1:foo"));
        assert!(text.contains("[stderr] grep: warning"));
        assert!(text.ends_with("[exit code: 0]"));
    }

    #[tokio::test]
    async fn browse_missing_path_is_path_not_found() {
        let remote = ScriptedRemote::new().on("stat -c %F", ScriptedRemote::fail(1, "no such"));
        let err = browse_path(&remote, "/gone", false, 1024).await.unwrap_err();
        assert_eq!(err.kind(), "PathNotFound");
    }

    #[tokio::test]
    async fn browse_file_appends_truncation_notice() {
        let body = "x".repeat(32);
        let remote = ScriptedRemote::new()
            .on("stat -c %F", ScriptedRemote::ok("regular file\n"))
            .on("head -c 32", ScriptedRemote::ok(&body));

        let text = browse_path(&remote, "/big.log", false, 32).await.unwrap();
        assert!(text.ends_with("\n\n[truncated at 32 bytes]"));
    }

    #[tokio::test]
    async fn browse_directory_uses_tree_only_when_asked() {
        let remote = ScriptedRemote::new()
            .on("stat -c %F", ScriptedRemote::ok("directory\n"))
            .on("ls -la", ScriptedRemote::ok("total 0\n"));
        let text = browse_path(&remote, "/etc", false, 1024).await.unwrap();
        assert_eq!(text, "total 0\n");

        let remote = ScriptedRemote::new()
            .on("stat -c %F", ScriptedRemote::ok("directory\n"))
            .on("command -v tree", ScriptedRemote::ok(".\n"));
        browse_path(&remote, "/etc", true, 1024).await.unwrap();
        assert!(remote.issued()[1].contains("tree -L 3"));
    }

    #[tokio::test]
    async fn resource_browse_prefixes_directory_listings() {
        let remote = ScriptedRemote::new()
            .on("stat -c %F", ScriptedRemote::ok("directory\n"))
            .on("ls -la", ScriptedRemote::ok("total 0\n"));

        let text = resource_browse(&remote, "dookie", "/etc", 1024).await.unwrap();
        assert!(text.starts_with("# Directory: dookie:/etc\n\n"));
    }

    #[test]
    fn host_listing_shows_probe_markers() {
        let hosts = vec![
            Host {
                name: "dookie".to_string(),
                hostname: "1.1.1.1".to_string(),
                port: 22,
                user: "root".to_string(),
                identity_file: None,
            },
            Host {
                name: "tootie".to_string(),
                hostname: "2.2.2.2".to_string(),
                port: 29229,
                user: "root".to_string(),
                identity_file: None,
            },
        ];
        let statuses =
            HashMap::from([("dookie".to_string(), true), ("tootie".to_string(), false)]);

        let listing = format_host_listing(&hosts, &statuses);
        assert!(listing.contains("dookie"));
        assert!(listing.contains("tootie"));
        assert!(listing.contains("online"));
        assert!(listing.contains("offline"));
        assert!(listing.contains("root@2.2.2.2:29229"));
    }

    #[test]
    fn path_normalization_adds_leading_slash() {
        assert_eq!(normalize_path("etc/hosts"), "/etc/hosts");
        assert_eq!(normalize_path("/etc/hosts"), "/etc/hosts");
        assert_eq!(normalize_path(""), "/");
    }
}
