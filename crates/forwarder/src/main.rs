//! usbip-forward
//!
//! Forwards USB/IP traffic between a remote peer and a local virtual host
//! controller for the lifetime of one connection.

use anyhow::{Context, Result};
use clap::Parser;
use common::setup_logging;
use forwarder::config::{ForwardConfig, RemoteMode};
use forwarder::connect::{self, LocalEndpoint};
use forwarder::{Flow, ForwardingSession, SessionReport};
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "usbip-forward")]
#[command(author, version, about = "Forward USB/IP traffic between a remote peer and a local host controller")]
#[command(long_about = "
Forwards USB/IP URB messages between a remote peer (network byte order) and a
local virtual host controller or stub driver (host byte order).

EXAMPLES:
    # Export local vhci traffic to a remote peer
    usbip-forward --flow outbound --remote 192.0.2.10:3240 --local unix:/run/usbip/vhci.sock

    # Accept one remote peer and feed a local stub driver
    usbip-forward --flow inbound --listen --remote 0.0.0.0:3240 --local tcp:127.0.0.1:3241

CONFIGURATION:
    The forwarder looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/usbip-forward/forward.toml
    3. /etc/usbip-forward/forward.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Traffic direction
    #[arg(long, value_enum)]
    flow: Option<FlowArg>,

    /// Remote peer address (host:port)
    #[arg(short, long, value_name = "ADDR")]
    remote: Option<String>,

    /// Accept the remote peer instead of connecting to it
    #[arg(long)]
    listen: bool,

    /// Local endpoint (unix:<path> or tcp:<host:port>)
    #[arg(long, value_name = "ENDPOINT")]
    local: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FlowArg {
    Inbound,
    Outbound,
}

impl From<FlowArg> for Flow {
    fn from(arg: FlowArg) -> Self {
        match arg {
            FlowArg::Inbound => Flow::Inbound,
            FlowArg::Outbound => Flow::Outbound,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = ForwardConfig::default();
        let path = ForwardConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let mut config = if let Some(ref path) = args.config {
        ForwardConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        ForwardConfig::load_or_default()
    };
    apply_overrides(&mut config, &args);
    config.validate().context("Invalid configuration")?;

    setup_logging(&config.forward.log_level).context("Failed to setup logging")?;

    info!("usbip-forward v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", config.forward.log_level);
    debug!(
        "Config: flow={}, remote={} ({:?}), local={}",
        config.forward.flow,
        config.remote.address,
        config.remote.mode,
        config.local.endpoint
    );

    let (interrupt_tx, interrupt) = watch::channel(false);
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down...");
                interrupt_tx.send_replace(true);
            }
            Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    let remote = connect::open_remote(&config.remote.address, config.remote.mode)
        .await
        .context("Failed to open remote stream")?;

    let local = config.local_endpoint()?;
    info!("Opening local endpoint {}", local);
    let result = match local {
        #[cfg(unix)]
        LocalEndpoint::Unix(path) => {
            let stream = connect::open_local_unix(&path)
                .await
                .context("Failed to open local endpoint")?;
            forward(&config, remote, stream, interrupt).await
        }
        #[cfg(not(unix))]
        LocalEndpoint::Unix(path) => Err(anyhow::anyhow!(
            "Unix sockets are not supported on this platform: {}",
            path.display()
        )),
        LocalEndpoint::Tcp(address) => {
            let stream = connect::open_local_tcp(&address)
                .await
                .context("Failed to open local endpoint")?;
            forward(&config, remote, stream, interrupt).await
        }
    };

    match &result {
        Ok(report) => info!(
            "Session ended ({}): {} PDUs from {}, {} PDUs from {}, {} OUT requests unanswered",
            report.end,
            report.source.pdus_framed,
            report.source.label,
            report.destination.pdus_framed,
            report.destination.label,
            report.unanswered_out_requests
        ),
        Err(e) => error!("Session failed: {:#}", e),
    }

    info!("usbip-forward shutting down...");
    result.map(|_| ())
}

/// CLI flags override config values
fn apply_overrides(config: &mut ForwardConfig, args: &Args) {
    if let Some(flow) = args.flow {
        config.forward.flow = flow.into();
    }
    if let Some(remote) = &args.remote {
        config.remote.address = remote.clone();
    }
    if args.listen {
        config.remote.mode = RemoteMode::Listen;
    }
    if let Some(local) = &args.local {
        config.local.endpoint = local.clone();
    }
    if let Some(level) = &args.log_level {
        config.forward.log_level = level.clone();
    }
}

/// Run one session with the remote and local streams in flow order
async fn forward<L>(
    config: &ForwardConfig,
    remote: tokio::net::TcpStream,
    local: L,
    interrupt: watch::Receiver<bool>,
) -> Result<SessionReport>
where
    L: AsyncRead + AsyncWrite + Send + 'static,
{
    let flow = config.forward.flow;
    let session_config = config.session_config();
    let session = match flow {
        Flow::Outbound => ForwardingSession::new(flow, local, remote, session_config),
        Flow::Inbound => ForwardingSession::new(flow, remote, local, session_config),
    };

    session
        .run(interrupt)
        .await
        .with_context(|| format!("{} forwarding session failed", flow))
}
