//! Protocol error types

use thiserror::Error;

/// Protocol-level errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Command word is not one of the four URB commands
    #[error("Unknown USB/IP command: {0:#010x}")]
    UnknownCommand(u32),

    /// Buffer too small for operation
    #[error("Buffer too small: needed {needed}, got {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// PDU length derived from header fields does not fit in memory
    #[error("PDU length overflow: {payload} payload bytes + {packets} iso descriptors")]
    LengthOverflow { payload: u32, packets: u32 },
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;
