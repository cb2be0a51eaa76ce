//! ZFS executors. Hosts without ZFS answer with `false`/empty lists.

use crate::exec::{quote, Remote};
use crate::utils::error::Result;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ZfsPool {
    pub name: String,
    pub size: String,
    pub alloc: String,
    pub free: String,
    pub capacity: String,
    pub health: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ZfsDataset {
    pub name: String,
    pub used: String,
    pub avail: String,
    pub refer: String,
    pub mountpoint: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ZfsSnapshot {
    pub name: String,
    pub used: String,
    pub creation: String,
}

/// Whether the host has a working zpool setup.
pub async fn zfs_check<R: Remote>(remote: &R) -> Result<bool> {
    let out = remote
        .run("command -v zpool >/dev/null 2>&1 && zpool status >/dev/null 2>&1")
        .await?;
    Ok(out.success())
}

pub async fn zfs_pools<R: Remote>(remote: &R) -> Result<Vec<ZfsPool>> {
    let out = remote
        .run("zpool list -H -o name,size,alloc,free,cap,health")
        .await?;
    if !out.success() {
        return Ok(Vec::new());
    }

    let mut pools = Vec::new();
    for line in out.stdout_lossy().lines() {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 6 {
            debug!("Skipping malformed zpool line: {:?}", line);
            continue;
        }
        pools.push(ZfsPool {
            name: fields[0].to_string(),
            size: fields[1].to_string(),
            alloc: fields[2].to_string(),
            free: fields[3].to_string(),
            capacity: fields[4].to_string(),
            health: fields[5].to_string(),
        });
    }
    Ok(pools)
}

pub async fn zfs_datasets<R: Remote>(remote: &R, pool: Option<&str>) -> Result<Vec<ZfsDataset>> {
    let mut cmd = "zfs list -H -o name,used,avail,refer,mountpoint".to_string();
    if let Some(pool) = pool {
        cmd.push_str(" -r ");
        cmd.push_str(&quote(pool));
    }

    let out = remote.run(&cmd).await?;
    if !out.success() {
        return Ok(Vec::new());
    }

    let mut datasets = Vec::new();
    for line in out.stdout_lossy().lines() {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 5 {
            debug!("Skipping malformed zfs list line: {:?}", line);
            continue;
        }
        datasets.push(ZfsDataset {
            name: fields[0].to_string(),
            used: fields[1].to_string(),
            avail: fields[2].to_string(),
            refer: fields[3].to_string(),
            mountpoint: fields[4].to_string(),
        });
    }
    Ok(datasets)
}

/// Recent snapshots, newest last, capped on the remote side with `tail`.
pub async fn zfs_snapshots<R: Remote>(
    remote: &R,
    dataset: Option<&str>,
    limit: usize,
) -> Result<Vec<ZfsSnapshot>> {
    let mut cmd = "zfs list -H -t snapshot -o name,used,creation".to_string();
    if let Some(dataset) = dataset {
        cmd.push_str(" -r ");
        cmd.push_str(&quote(dataset));
    }
    cmd.push_str(&format!(" | tail -n {}", limit));

    let out = remote.run(&cmd).await?;
    if !out.success() {
        return Ok(Vec::new());
    }

    let mut snapshots = Vec::new();
    for line in out.stdout_lossy().lines() {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 3 {
            debug!("Skipping malformed snapshot line: {:?}", line);
            continue;
        }
        snapshots.push(ZfsSnapshot {
            name: fields[0].to_string(),
            used: fields[1].to_string(),
            creation: fields[2].to_string(),
        });
    }
    Ok(snapshots)
}
