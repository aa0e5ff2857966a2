//! Stream establishment for the binary
//!
//! Just enough to hand a session two open streams: a TCP stream to the remote
//! peer (dialled or accepted once) and a Unix or TCP stream to the local side.

use crate::config::RemoteMode;
use common::{Error, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tokio::net::{TcpListener, TcpStream};
use tracing::info;

/// Address of the local virtual host controller or stub driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalEndpoint {
    Unix(PathBuf),
    Tcp(String),
}

impl FromStr for LocalEndpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some(("unix", path)) if !path.is_empty() => Ok(LocalEndpoint::Unix(PathBuf::from(
                shellexpand::tilde(path).as_ref(),
            ))),
            Some(("tcp", addr)) if !addr.is_empty() => Ok(LocalEndpoint::Tcp(addr.to_string())),
            _ => Err(Error::Config(format!(
                "expected 'unix:<path>' or 'tcp:<host:port>', got '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for LocalEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalEndpoint::Unix(path) => write!(f, "unix:{}", path.display()),
            LocalEndpoint::Tcp(addr) => write!(f, "tcp:{}", addr),
        }
    }
}

/// Open the stream to the remote peer
pub async fn open_remote(address: &str, mode: RemoteMode) -> Result<TcpStream> {
    let stream = match mode {
        RemoteMode::Connect => {
            info!("Connecting to remote peer {}", address);
            TcpStream::connect(address)
                .await
                .map_err(|e| Error::Network(format!("connect to {} failed: {}", address, e)))?
        }
        RemoteMode::Listen => {
            let listener = TcpListener::bind(address)
                .await
                .map_err(|e| Error::Network(format!("bind {} failed: {}", address, e)))?;
            info!("Waiting for remote peer on {}", listener.local_addr()?);
            let (stream, peer) = listener.accept().await?;
            info!("Accepted remote peer {}", peer);
            stream
        }
    };
    stream.set_nodelay(true)?;
    Ok(stream)
}

#[cfg(unix)]
pub async fn open_local_unix(path: &std::path::Path) -> Result<tokio::net::UnixStream> {
    tokio::net::UnixStream::connect(path)
        .await
        .map_err(|e| Error::Network(format!("connect to {} failed: {}", path.display(), e)))
}

pub async fn open_local_tcp(address: &str) -> Result<TcpStream> {
    let stream = TcpStream::connect(address)
        .await
        .map_err(|e| Error::Network(format!("connect to {} failed: {}", address, e)))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}
