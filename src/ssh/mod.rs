pub mod client;
pub mod pool;

pub use client::{RusshConnector, SshSession};
pub use pool::{Pool, PoolConfig, SshPool};
