use clap::Parser;
use scoutd::config::{Config, Transport};
use scoutd::dispatch::Dispatcher;
use scoutd::hosts::HostTable;
use scoutd::rpc::RpcService;
use scoutd::ssh::RusshConnector;
use scoutd::Result;
use std::io::IsTerminal;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "scoutd")]
#[command(about = "Remote-operations gateway over pooled SSH", long_about = None)]
#[command(version)]
struct Args {
    /// Transport to serve: http or stdio (overrides SCOUT_TRANSPORT)
    #[arg(long)]
    transport: Option<String>,

    /// HTTP bind address (overrides SCOUT_HTTP_HOST)
    #[arg(long)]
    bind: Option<String>,

    /// HTTP port (overrides SCOUT_HTTP_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Log level (overrides SCOUT_LOG_LEVEL)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::from_env()?;
    if let Some(transport) = args.transport {
        config.transport = match transport.to_lowercase().as_str() {
            "http" => Transport::Http,
            "stdio" => Transport::Stdio,
            other => {
                return Err(scoutd::ScoutError::Config(format!(
                    "Invalid --transport: {}. Must be 'http' or 'stdio'",
                    other
                )))
            }
        };
    }
    if let Some(bind) = args.bind {
        config.http.host = bind;
    }
    if let Some(port) = args.port {
        config.http.port = port;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level.to_lowercase();
    }

    init_logging(&config)?;

    info!("scoutd v{} starting", env!("CARGO_PKG_VERSION"));

    let hosts = HostTable::load(&config.ssh)?;
    info!(
        "Loaded {} host(s) from {}",
        hosts.len(),
        config.ssh.config_path.display()
    );

    let connector = RusshConnector {
        strict_host_keys: config.ssh.strict_host_keys,
    };
    let transport = config.transport;
    let http_host = config.http.host.clone();
    let http_port = config.http.port;

    let dispatcher = Arc::new(Dispatcher::new(config, hosts, connector)?);
    let service = RpcService::new(Arc::clone(&dispatcher));

    let shutdown = tokio::spawn(async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        info!("Received Ctrl+C, shutting down gracefully...");
    });

    let served = match transport {
        Transport::Http => {
            tokio::select! {
                result = scoutd::rpc::http::serve(service, &http_host, http_port) => result,
                _ = shutdown => Ok(()),
            }
        }
        Transport::Stdio => {
            tokio::select! {
                result = scoutd::rpc::stdio::serve(service) => result,
                _ = shutdown => Ok(()),
            }
        }
    };

    dispatcher.pool().close_all().await;

    if let Err(e) = served {
        error!("Transport error: {}", e);
        return Err(e);
    }

    info!("Shutdown complete");
    Ok(())
}

fn init_logging(config: &Config) -> Result<()> {
    let env_filter = EnvFilter::try_new(&config.logging.level)
        .map_err(|e| scoutd::ScoutError::Config(format!("Invalid log level: {}", e)))?;

    let ansi = config.logging.colors && std::io::stderr().is_terminal();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_ansi(ansi))
        .init();

    Ok(())
}
