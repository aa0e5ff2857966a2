//! PDU length inference
//!
//! The byte length of a URB message is only known once its header has been
//! decoded. Transfer data travels with the request for OUT transfers and with
//! the reply for IN transfers, and the reply header alone does not say which.
//! [`submit_payload_length`] therefore consults the [`SeqTracker`] and returns
//! the tracker update alongside the length, so the caller applies both in the
//! same framing step.

use crate::error::{ProtocolError, Result};
use crate::pdu::{Direction, HEADER_SIZE, HeaderBody, ISO_DESCRIPTOR_SIZE, PduHeader};
use crate::tracker::SeqTracker;

/// Tracker update implied by framing one header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerEffect {
    None,
    /// An OUT request is now in flight
    Record(u32),
    /// The reply for a tracked OUT request arrived
    Take(u32),
}

/// Transfer data length plus the tracker update that decided it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadLength {
    pub bytes: usize,
    pub effect: TrackerEffect,
}

impl PayloadLength {
    fn empty() -> Self {
        Self {
            bytes: 0,
            effect: TrackerEffect::None,
        }
    }
}

/// Sizes of the variable parts of one PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyLayout {
    pub payload_len: usize,
    pub iso_len: usize,
}

impl BodyLayout {
    /// Full PDU length including the header, `None` on overflow
    pub fn total_len(&self) -> Option<usize> {
        HEADER_SIZE
            .checked_add(self.payload_len)?
            .checked_add(self.iso_len)
    }

    /// Offset of the iso descriptor array from the start of the PDU
    pub fn iso_offset(&self) -> usize {
        HEADER_SIZE + self.payload_len
    }
}

/// Length of the transfer data following `header`.
///
/// - CMD_UNLINK / RET_UNLINK: 0
/// - CMD_SUBMIT: `transfer_buffer_length` for OUT, 0 for IN; OUT requests are recorded
/// - RET_SUBMIT: 0 if the sequence number belongs to a tracked OUT request
///   (taken from the tracker), `actual_length` otherwise
///
/// The command alone decides the length. A command arriving on the side that
/// does not normally send it is framed by the same rules; see
/// [`Command::origin`](crate::Command::origin).
pub fn submit_payload_length(header: &PduHeader, tracker: &SeqTracker) -> PayloadLength {
    let seqnum = header.seqnum();
    match &header.body {
        HeaderBody::CmdUnlink(_) | HeaderBody::RetUnlink(_) => PayloadLength::empty(),
        HeaderBody::CmdSubmit(cmd) => match header.direction() {
            Direction::In => PayloadLength::empty(),
            Direction::Out => PayloadLength {
                bytes: cmd.transfer_buffer_length as usize,
                effect: TrackerEffect::Record(seqnum),
            },
        },
        HeaderBody::RetSubmit(ret) => {
            if tracker.contains(seqnum) {
                PayloadLength {
                    bytes: 0,
                    effect: TrackerEffect::Take(seqnum),
                }
            } else {
                PayloadLength {
                    bytes: ret.actual_length as usize,
                    effect: TrackerEffect::None,
                }
            }
        }
    }
}

/// Byte length of the iso descriptor array following the transfer data
pub fn iso_descriptor_bytes(header: &PduHeader) -> Result<usize> {
    let packets = header.iso_packet_count();
    (packets as usize)
        .checked_mul(ISO_DESCRIPTOR_SIZE)
        .ok_or(ProtocolError::LengthOverflow { payload: 0, packets })
}
