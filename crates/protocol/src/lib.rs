//! Protocol library for usbip-forward
//!
//! This crate defines the USB/IP URB messages exchanged between a remote peer
//! and a local virtual host controller: the 48-byte header, the command
//! specific body, isochronous packet descriptors, in-place byte-order
//! conversion, and the length rules a framer needs to find message boundaries
//! in a byte stream.
//!
//! # Example
//!
//! ```
//! use protocol::{BasicHeader, CmdSubmit, Direction, HeaderBody, Pdu, PduHeader, WireOrder};
//!
//! let header = PduHeader::new(
//!     BasicHeader::new(1, 0x10002, Direction::Out, 2),
//!     HeaderBody::CmdSubmit(CmdSubmit {
//!         transfer_buffer_length: 4,
//!         ..Default::default()
//!     }),
//! );
//! let pdu = Pdu::new(header).with_payload(vec![1, 2, 3, 4]);
//!
//! let bytes = pdu.encode(WireOrder::Network);
//! let decoded = Pdu::decode(&bytes, WireOrder::Network).unwrap();
//! assert_eq!(decoded, pdu);
//! ```
//!
//! # Length inference
//!
//! ```
//! use protocol::{BasicHeader, CmdSubmit, Direction, HeaderBody, PduHeader, SeqTracker};
//! use protocol::submit_payload_length;
//!
//! let mut tracker = SeqTracker::new();
//! let header = PduHeader::new(
//!     BasicHeader::new(7, 1, Direction::Out, 2),
//!     HeaderBody::CmdSubmit(CmdSubmit {
//!         transfer_buffer_length: 512,
//!         ..Default::default()
//!     }),
//! );
//!
//! let length = submit_payload_length(&header, &tracker);
//! tracker.apply(length.effect);
//! assert_eq!(length.bytes, 512);
//! assert!(tracker.contains(7));
//! ```

pub mod error;
pub mod length;
pub mod pdu;
pub mod tracker;

pub use error::{ProtocolError, Result};
pub use length::{
    BodyLayout, PayloadLength, TrackerEffect, iso_descriptor_bytes, submit_payload_length,
};
pub use pdu::{
    BASIC_HEADER_SIZE, BasicHeader, CmdSubmit, CmdUnlink, Command, Direction, HEADER_SIZE,
    HeaderBody, ISO_DESCRIPTOR_SIZE, IsoPacketDescriptor, Pdu, PduHeader, RetSubmit, RetUnlink,
    Role, WireOrder, reorder_header, reorder_iso_descriptors, reply_packet_count,
};
pub use tracker::{DEFAULT_TRACKER_CAPACITY, EffectOutcome, SeqTracker};
