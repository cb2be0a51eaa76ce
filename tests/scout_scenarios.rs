//! End-to-end tool and resource scenarios through the full dispatcher:
//! middleware chain, routing, pool, and scripted sessions.

mod common;

use common::{fail, host, ok, ok_bytes, two_hosts, ScriptedConnector, ScriptedRemote};
use scoutd::config::Config;
use scoutd::dispatch::Dispatcher;
use scoutd::hosts::HostTable;
use serde_json::json;
use std::sync::atomic::Ordering;

fn dispatcher(remote: ScriptedRemote) -> Dispatcher<ScriptedConnector> {
    Dispatcher::new(Config::default(), two_hosts(), ScriptedConnector::new(remote)).unwrap()
}

async fn scout(
    dispatcher: &Dispatcher<ScriptedConnector>,
    args: serde_json::Value,
) -> scoutd::dispatch::ToolOutput {
    dispatcher.call_tool("scout", args).await
}

#[tokio::test]
async fn unknown_host_renders_available_names() {
    let d = dispatcher(ScriptedRemote::new());

    let out = scout(&d, json!({"target": "unknown:/x"})).await;
    assert!(out.is_error);
    assert_eq!(
        out.text,
        "Error: Unknown host 'unknown'. Available: dookie, tootie"
    );
}

#[tokio::test]
async fn file_read_returns_literal_contents() {
    let remote = ScriptedRemote::new();
    remote
        .on("stat -c %F", ok("regular file\n"))
        .on("head -c", ok("127.0.0.1 localhost\n"));
    let d = dispatcher(remote);

    let out = scout(&d, json!({"target": "dookie:/etc/hosts"})).await;
    assert!(!out.is_error);
    assert_eq!(out.text, "127.0.0.1 localhost\n");
}

#[tokio::test]
async fn file_read_at_the_byte_cap_gets_a_truncation_notice() {
    let cap = 1_048_576usize;
    let remote = ScriptedRemote::new();
    remote
        .on("stat -c %F", ok("regular file\n"))
        .on("head -c", ok_bytes(vec![b'x'; cap]));
    let d = dispatcher(remote);

    let out = scout(&d, json!({"target": "dookie:/big.log"})).await;
    assert!(!out.is_error);
    assert!(out.text.ends_with("\n\n[truncated at 1048576 bytes]"));
    assert!(out.text.starts_with("xxx"));
}

#[tokio::test]
async fn query_returns_stdout_and_exit_code() {
    let remote = ScriptedRemote::new();
    remote.on("grep -n foo", ok("./a:1:foo"));
    let d = dispatcher(remote);

    let out = scout(&d, json!({"target": "dookie:/etc", "query": "grep -n foo ."})).await;
    assert!(!out.is_error);
    assert!(out.text.contains("./a:1:foo"));
    assert!(out.text.contains("[exit code: 0]"));
}

#[tokio::test]
async fn query_runs_under_cd_and_remote_timeout() {
    let remote = ScriptedRemote::new();
    remote.on("grep -n foo", ok("./a:1:foo"));
    let d = dispatcher(remote.clone());

    scout(&d, json!({"target": "dookie:/etc", "query": "grep -n foo ."})).await;

    let issued = remote.issued();
    assert_eq!(issued[0], "cd /etc && timeout 30 grep -n foo .");
}

#[tokio::test]
async fn missing_path_is_an_error_string() {
    let remote = ScriptedRemote::new();
    remote.on("stat -c %F", fail(1, "stat: cannot statx"));
    let d = dispatcher(remote);

    let out = scout(&d, json!({"target": "dookie:/gone"})).await;
    assert!(out.is_error);
    assert_eq!(out.text, "Error: Path not found: /gone");
}

#[tokio::test]
async fn malformed_target_never_raises() {
    let d = dispatcher(ScriptedRemote::new());

    let out = scout(&d, json!({"target": "dookie"})).await;
    assert!(out.is_error);
    assert!(out.text.starts_with("Error: "));
}

#[tokio::test]
async fn resource_read_for_unknown_host_raises_resource_error() {
    let only_dookie = HostTable::new(vec![host("dookie", "1.1.1.1", 22)]).unwrap();
    let d = Dispatcher::new(
        Config::default(),
        only_dookie,
        ScriptedConnector::new(ScriptedRemote::new()),
    )
    .unwrap();

    let err = d.read_resource("scout://tootie/etc/hosts").await.unwrap_err();
    assert_eq!(err.kind(), "ResourceError");
    assert_eq!(err.to_string(), "Unknown host 'tootie'. Available: dookie");
}

#[tokio::test]
async fn one_retry_recovers_and_pools_the_connection() {
    let remote = ScriptedRemote::new();
    remote
        .on("stat -c %F", ok("regular file\n"))
        .on("head -c", ok("contents\n"));
    let connector = ScriptedConnector::failing(remote, 1);
    let opened = connector.opened.clone();
    let d = Dispatcher::new(Config::default(), two_hosts(), connector).unwrap();

    let out = scout(&d, json!({"target": "dookie:/etc/hosts"})).await;
    assert!(!out.is_error);
    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert_eq!(d.pool().size().await, 1);
}

#[tokio::test]
async fn second_connect_failure_surfaces_as_error_string() {
    let connector = ScriptedConnector::failing(ScriptedRemote::new(), 2);
    let d = Dispatcher::new(Config::default(), two_hosts(), connector).unwrap();

    let out = scout(&d, json!({"target": "dookie:/etc/hosts"})).await;
    assert!(out.is_error);
    assert!(out.text.starts_with("Error: Failed to connect to dookie"));
    assert_eq!(d.pool().size().await, 0);
}

#[tokio::test]
async fn error_counter_sees_the_original_kind() {
    let d = dispatcher(ScriptedRemote::new());

    scout(&d, json!({"target": "unknown:/x"})).await;
    scout(&d, json!({"target": "unknown:/x"})).await;
    let _ = d.read_resource("scout://ghost/etc").await;

    let stats = d.errors().get_stats();
    assert_eq!(stats.get("UnknownHost"), Some(&3));

    d.errors().reset_stats();
    assert!(d.errors().get_stats().is_empty());
}

#[tokio::test]
async fn timing_stats_accumulate_per_operation_key() {
    let remote = ScriptedRemote::new();
    remote
        .on("stat -c %F", ok("regular file\n"))
        .on("head -c", ok("contents\n"));
    let d = dispatcher(remote);

    scout(&d, json!({"target": "dookie:/etc/hosts"})).await;
    scout(&d, json!({"target": "dookie:/etc/hosts"})).await;

    let stats = d.logging().get_stats();
    let timing = stats.get("tool:scout").unwrap();
    assert_eq!(timing.count, 2);
    assert!(timing.total_ms >= 0.0);
    assert!(timing.max_ms >= timing.min_ms);
}

#[tokio::test]
async fn sessions_are_reused_across_requests() {
    let remote = ScriptedRemote::new();
    remote
        .on("stat -c %F", ok("regular file\n"))
        .on("head -c", ok("contents\n"));
    let connector = ScriptedConnector::new(remote);
    let opened = connector.opened.clone();
    let d = Dispatcher::new(Config::default(), two_hosts(), connector).unwrap();

    for _ in 0..3 {
        let out = scout(&d, json!({"target": "dookie:/etc/hosts"})).await;
        assert!(!out.is_error);
    }

    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert_eq!(d.pool().size().await, 1);
}
