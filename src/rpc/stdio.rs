//! Newline-delimited JSON-RPC over stdin/stdout. All logging goes to
//! stderr; stdout carries protocol frames only.

use crate::exec::Remote;
use crate::rpc::RpcService;
use crate::ssh::pool::Connect;
use crate::utils::error::Result;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, info};

/// Serve requests until stdin closes.
pub async fn serve<C: Connect>(service: RpcService<C>) -> Result<()>
where
    C::Session: Remote,
{
    info!("STDIO transport ready");

    let mut lines = FramedRead::new(tokio::io::stdin(), LinesCodec::new());
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next().await {
        let line = line.map_err(|e| std::io::Error::other(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }

        if let Some(response) = service.handle_line(&line).await {
            stdout.write_all(response.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        } else {
            debug!("Notification handled, no response written");
        }
    }

    info!("stdin closed, STDIO transport shutting down");
    Ok(())
}
