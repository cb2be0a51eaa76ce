//! Resource reads through the dispatcher: pattern precedence, per-handler
//! rendering, and typed not-found behavior.

mod common;

use common::{fail, ok, two_hosts, ScriptedConnector, ScriptedRemote};
use scoutd::config::Config;
use scoutd::dispatch::Dispatcher;

fn dispatcher(remote: ScriptedRemote) -> Dispatcher<ScriptedConnector> {
    Dispatcher::new(Config::default(), two_hosts(), ScriptedConnector::new(remote)).unwrap()
}

#[tokio::test]
async fn docker_list_routes_to_the_docker_handler_not_the_path_wildcard() {
    let remote = ScriptedRemote::new();
    remote.on(
        "docker ps",
        ok(r#"{"Names":"plex","Image":"plexinc/pms","Status":"Up 3 days","Ports":"32400/tcp","State":"running"}"#),
    );
    let d = dispatcher(remote.clone());

    let content = d.read_resource("dookie://docker").await.unwrap();
    assert!(content.text.contains("plex"));
    assert!(content.text.contains("plexinc/pms"));

    // The docker handler ran; no stat/ls was attempted for a "/docker" path.
    let issued = remote.issued();
    assert_eq!(issued.len(), 1);
    assert!(issued[0].starts_with("docker ps"));
}

#[tokio::test]
async fn container_logs_route_to_the_logs_handler() {
    let remote = ScriptedRemote::new();
    remote.on("docker logs", ok("log line\n"));
    let d = dispatcher(remote.clone());

    let content = d.read_resource("dookie://docker/plex/logs").await.unwrap();
    assert_eq!(content.text, "log line\n");

    let issued = remote.issued();
    assert!(issued[0].contains("docker logs --tail 100 --timestamps plex"));
}

#[tokio::test]
async fn missing_container_is_resource_not_found() {
    let remote = ScriptedRemote::new();
    let mut missing = fail(1, "");
    missing.stdout = b"Error response from daemon: No such container: ghost\n".to_vec();
    remote.on("docker logs", missing);
    let d = dispatcher(remote);

    let err = d
        .read_resource("dookie://docker/ghost/logs")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "ResourceNotFound");
    assert!(err.to_string().contains("ghost"));
}

#[tokio::test]
async fn unclaimed_paths_fall_through_to_the_catch_all() {
    let remote = ScriptedRemote::new();
    remote
        .on("stat -c %F", ok("directory\n"))
        .on("ls -la", ok("total 0\n"));
    let d = dispatcher(remote.clone());

    let content = d.read_resource("dookie://etc/nginx").await.unwrap();
    assert!(content.text.starts_with("# Directory: dookie:/etc/nginx\n\n"));

    // The wildcard remainder got its leading slash back.
    let issued = remote.issued();
    assert!(issued[0].contains("'/etc/nginx'") || issued[0].contains("/etc/nginx"));
}

#[tokio::test]
async fn compose_file_reads_yaml_with_the_right_mime() {
    let remote = ScriptedRemote::new();
    remote
        .on(
            "docker compose ls",
            ok(r#"[{"Name":"media","Status":"running(2)","ConfigFiles":"/srv/media/compose.yaml"}]"#),
        )
        .on("cat -- /srv/media/compose.yaml", ok("services: {}\n"));
    let d = dispatcher(remote);

    let content = d.read_resource("dookie://compose/media").await.unwrap();
    assert_eq!(content.mime_type, "text/yaml");
    assert_eq!(content.text, "services: {}\n");
}

#[tokio::test]
async fn zfs_summary_reports_unavailable_hosts_gently() {
    let remote = ScriptedRemote::new();
    remote.on("command -v zpool", fail(127, ""));
    let d = dispatcher(remote);

    let content = d.read_resource("dookie://zfs").await.unwrap();
    assert_eq!(content.text, "ZFS is not available on this host");
}

#[tokio::test]
async fn zfs_snapshot_reads_work_despite_the_pool_pattern_shadow() {
    let remote = ScriptedRemote::new();
    remote.on(
        "zfs list -H -t snapshot",
        ok("tank@auto-1\t0B\tSat Aug  1 03:00 2026\n"),
    );
    let d = dispatcher(remote.clone());

    let content = d.read_resource("dookie://zfs/snapshots").await.unwrap();
    assert!(content.text.contains("tank@auto-1"));

    let issued = remote.issued();
    assert!(issued[0].contains("-t snapshot"));
}

#[tokio::test]
async fn unknown_zfs_pool_is_resource_not_found() {
    let remote = ScriptedRemote::new();
    remote.on("zpool list", ok("tank\t10T\t4T\t6T\t38%\tONLINE\n"));
    let d = dispatcher(remote);

    let err = d.read_resource("dookie://zfs/scratch").await.unwrap_err();
    assert_eq!(err.kind(), "ResourceNotFound");
}

#[tokio::test]
async fn syslog_resource_names_its_source() {
    let remote = ScriptedRemote::new();
    remote.on("journalctl -n 100", ok("kernel: up\n"));
    let d = dispatcher(remote);

    let content = d.read_resource("dookie://syslog").await.unwrap();
    assert!(content.text.starts_with("# Source: journalctl\n\n"));
}

#[tokio::test]
async fn unmatched_uris_are_resource_not_found() {
    let d = dispatcher(ScriptedRemote::new());
    let err = d.read_resource("nosuchscheme://x").await.unwrap_err();
    assert_eq!(err.kind(), "ResourceNotFound");
}
