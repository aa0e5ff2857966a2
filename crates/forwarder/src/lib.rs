//! USB/IP PDU forwarding engine
//!
//! Forwards URB messages between a remote peer, which speaks USB/IP in
//! network byte order, and a local virtual host controller or stub driver,
//! which uses host byte order. The byte streams carry no length prefixes, so
//! every message is reassembled from its header before it is converted and
//! republished on the opposite stream.
//!
//! # Example
//!
//! ```no_run
//! use forwarder::{Flow, ForwardingSession, SessionConfig};
//! use tokio::net::{TcpStream, UnixStream};
//! use tokio::sync::watch;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let vhci = UnixStream::connect("/run/usbip/vhci.sock").await?;
//! let remote = TcpStream::connect("192.0.2.10:3240").await?;
//!
//! let (_interrupt_tx, interrupt) = watch::channel(false);
//! let session = ForwardingSession::new(Flow::Outbound, vhci, remote, SessionConfig::default());
//! let report = session.run(interrupt).await?;
//! println!("session ended: {}", report.end);
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod config;
pub mod connect;
pub mod endpoint;
pub mod error;
pub mod framer;
pub mod session;

pub use buffer::{BufferLimits, EndpointBuffer, EndpointSummary, ReadingPhase};
pub use endpoint::{Completion, EndpointIo, IoOutcome, ReadRequest, Side, WakeQueue};
pub use error::{ForwardError, Result};
pub use framer::{FrameStep, FramedPdu, frame_next};
pub use session::{Flow, ForwardingSession, SessionConfig, SessionEnd, SessionReport};
