//! Forwarding session errors
//!
//! Every variant is fatal to the session that raised it. Orderly peer close
//! is not an error; it ends the session through [`crate::SessionEnd`].

use protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForwardError {
    /// The byte stream no longer describes valid URB messages
    #[error("Framing error on {endpoint}: {source}")]
    Framing {
        endpoint: &'static str,
        #[source]
        source: ProtocolError,
    },

    /// Buffer growth cannot proceed
    #[error("Failed to grow {endpoint} buffer to {requested} bytes (limit {limit})")]
    Allocation {
        endpoint: &'static str,
        requested: usize,
        limit: usize,
    },

    /// Read or write completed with an error other than orderly close
    #[error("I/O error on {endpoint}: {source}")]
    Io {
        endpoint: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The worker task owning the endpoint handle has exited
    #[error("I/O worker for {endpoint} is gone")]
    WorkerGone { endpoint: &'static str },
}

pub type Result<T> = std::result::Result<T, ForwardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framing_error_display() {
        let err = ForwardError::Framing {
            endpoint: "socket",
            source: ProtocolError::UnknownCommand(0x42),
        };
        let msg = err.to_string();
        assert!(msg.contains("socket"));
        assert!(msg.contains("Unknown USB/IP command"));
    }

    #[test]
    fn test_allocation_error_display() {
        let err = ForwardError::Allocation {
            endpoint: "vhci",
            requested: 32 * 1024 * 1024,
            limit: 16 * 1024 * 1024,
        };
        assert!(err.to_string().contains("limit 16777216"));
    }
}
