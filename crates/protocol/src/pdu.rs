//! USB/IP URB wire format
//!
//! Every URB message starts with a fixed 48-byte header:
//!
//! ```text
//! 0      4       8      12         16   20                    48
//! +------+-------+------+----------+----+---------------------+
//! | cmd  | seqnum| devid| direction| ep | command union (28)  |
//! +------+-------+------+----------+----+---------------------+
//! ```
//!
//! The command union carries five integer words for CMD_SUBMIT/RET_SUBMIT
//! (CMD_SUBMIT adds an 8-byte setup packet) and a single word for the unlink
//! commands. A SUBMIT header may be followed by transfer data and then by
//! `number_of_packets` 16-byte isochronous packet descriptors.
//!
//! The same layout travels in two byte orders: network order on the remote
//! link and host order on the local virtual host controller. [`reorder_header`]
//! and [`reorder_iso_descriptors`] convert a buffer in place between the two.

use crate::error::{ProtocolError, Result};
use crate::length::iso_descriptor_bytes;
use byteorder::{BigEndian, ByteOrder, NativeEndian};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of the URB header in bytes
pub const HEADER_SIZE: usize = 48;

/// Size of the basic header shared by all commands
pub const BASIC_HEADER_SIZE: usize = 20;

/// Size of one isochronous packet descriptor
pub const ISO_DESCRIPTOR_SIZE: usize = 16;

const BASIC_HEADER_WORDS: usize = BASIC_HEADER_SIZE / 4;

/// `number_of_packets` word, at the same offset in both submit layouts
const PACKET_COUNT_OFFSET: usize = BASIC_HEADER_SIZE + 12;

/// Byte order of integer fields on one side of the forwarder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireOrder {
    /// Big-endian, used on the remote link
    Network,
    /// Native order of this machine, used by the local host controller
    Host,
}

impl WireOrder {
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        match self {
            WireOrder::Network => BigEndian::read_u32(bytes),
            WireOrder::Host => NativeEndian::read_u32(bytes),
        }
    }

    pub fn write_u32(self, bytes: &mut [u8], value: u32) {
        match self {
            WireOrder::Network => BigEndian::write_u32(bytes, value),
            WireOrder::Host => NativeEndian::write_u32(bytes, value),
        }
    }
}

impl fmt::Display for WireOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireOrder::Network => write!(f, "network"),
            WireOrder::Host => write!(f, "host"),
        }
    }
}

/// Which half of the SUBMIT/UNLINK exchange an endpoint produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Produces CMD_SUBMIT and CMD_UNLINK
    Request,
    /// Produces RET_SUBMIT and RET_UNLINK
    Reply,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Request => write!(f, "request"),
            Role::Reply => write!(f, "reply"),
        }
    }
}

/// URB command codes
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Submit a USB request (URB)
    CmdSubmit = 0x0001,
    /// Unlink a USB request
    CmdUnlink = 0x0002,
    /// Return from USB request
    RetSubmit = 0x0003,
    /// Return from unlink
    RetUnlink = 0x0004,
}

impl Command {
    pub fn from_u32(value: u32) -> Result<Self> {
        match value {
            0x0001 => Ok(Self::CmdSubmit),
            0x0002 => Ok(Self::CmdUnlink),
            0x0003 => Ok(Self::RetSubmit),
            0x0004 => Ok(Self::RetUnlink),
            _ => Err(ProtocolError::UnknownCommand(value)),
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::CmdSubmit => "CMD_SUBMIT",
            Self::CmdUnlink => "CMD_UNLINK",
            Self::RetSubmit => "RET_SUBMIT",
            Self::RetUnlink => "RET_UNLINK",
        }
    }

    /// Side of the exchange that normally sends this command
    pub fn origin(self) -> Role {
        match self {
            Self::CmdSubmit | Self::CmdUnlink => Role::Request,
            Self::RetSubmit | Self::RetUnlink => Role::Reply,
        }
    }

    /// Integer words of the command union that carry values.
    /// Everything after them (setup packet, padding) is never reordered.
    fn union_words(self) -> usize {
        match self {
            Self::CmdSubmit | Self::RetSubmit => 5,
            Self::CmdUnlink | Self::RetUnlink => 1,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Transfer direction relative to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Host to device (USBIP_DIR_OUT = 0)
    Out,
    /// Device to host (any nonzero value)
    In,
}

impl Direction {
    pub fn from_u32(value: u32) -> Self {
        if value == 0 { Self::Out } else { Self::In }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::Out => 0,
            Self::In => 1,
        }
    }
}

/// Basic header fields shared by every command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicHeader {
    /// Sequence number for matching requests/responses
    pub seqnum: u32,
    /// Device ID
    pub devid: u32,
    pub direction: Direction,
    /// Endpoint number
    pub ep: u32,
}

impl BasicHeader {
    pub fn new(seqnum: u32, devid: u32, direction: Direction, ep: u32) -> Self {
        Self {
            seqnum,
            devid,
            direction,
            ep,
        }
    }
}

/// CMD_SUBMIT union
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CmdSubmit {
    pub transfer_flags: u32,
    pub transfer_buffer_length: u32,
    pub start_frame: u32,
    pub number_of_packets: u32,
    pub interval: u32,
    /// Setup packet for control transfers, forwarded byte for byte
    pub setup: [u8; 8],
}

/// RET_SUBMIT union
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetSubmit {
    /// Status code (0 = success, negative errno = error)
    pub status: i32,
    pub actual_length: u32,
    pub start_frame: u32,
    pub number_of_packets: u32,
    pub error_count: u32,
}

/// CMD_UNLINK union
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CmdUnlink {
    /// Sequence number of the URB to cancel
    pub unlink_seqnum: u32,
}

/// RET_UNLINK union
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetUnlink {
    pub status: i32,
}

/// Command-specific part of the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderBody {
    CmdSubmit(CmdSubmit),
    RetSubmit(RetSubmit),
    CmdUnlink(CmdUnlink),
    RetUnlink(RetUnlink),
}

impl HeaderBody {
    pub fn command(&self) -> Command {
        match self {
            Self::CmdSubmit(_) => Command::CmdSubmit,
            Self::RetSubmit(_) => Command::RetSubmit,
            Self::CmdUnlink(_) => Command::CmdUnlink,
            Self::RetUnlink(_) => Command::RetUnlink,
        }
    }
}

/// Decoded 48-byte URB header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PduHeader {
    pub base: BasicHeader,
    pub body: HeaderBody,
}

impl PduHeader {
    pub fn new(base: BasicHeader, body: HeaderBody) -> Self {
        Self { base, body }
    }

    pub fn command(&self) -> Command {
        self.body.command()
    }

    pub fn seqnum(&self) -> u32 {
        self.base.seqnum
    }

    pub fn direction(&self) -> Direction {
        self.base.direction
    }

    /// Number of isochronous descriptors trailing this PDU
    pub fn iso_packet_count(&self) -> u32 {
        match &self.body {
            HeaderBody::CmdSubmit(cmd) => cmd.number_of_packets,
            HeaderBody::RetSubmit(ret) => ret.number_of_packets,
            HeaderBody::CmdUnlink(_) | HeaderBody::RetUnlink(_) => 0,
        }
    }

    /// Decode a header stored in `order`
    pub fn read_from(bytes: &[u8], order: WireOrder) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::BufferTooSmall {
                needed: HEADER_SIZE,
                available: bytes.len(),
            });
        }

        let word = |index: usize| order.read_u32(&bytes[index * 4..index * 4 + 4]);

        let command = Command::from_u32(word(0))?;
        let base = BasicHeader {
            seqnum: word(1),
            devid: word(2),
            direction: Direction::from_u32(word(3)),
            ep: word(4),
        };

        let body = match command {
            Command::CmdSubmit => {
                let mut setup = [0u8; 8];
                setup.copy_from_slice(&bytes[40..48]);
                HeaderBody::CmdSubmit(CmdSubmit {
                    transfer_flags: word(5),
                    transfer_buffer_length: word(6),
                    start_frame: word(7),
                    number_of_packets: word(8),
                    interval: word(9),
                    setup,
                })
            }
            Command::RetSubmit => HeaderBody::RetSubmit(RetSubmit {
                status: word(5) as i32,
                actual_length: word(6),
                start_frame: word(7),
                number_of_packets: word(8),
                error_count: word(9),
            }),
            Command::CmdUnlink => HeaderBody::CmdUnlink(CmdUnlink {
                unlink_seqnum: word(5),
            }),
            Command::RetUnlink => HeaderBody::RetUnlink(RetUnlink {
                status: word(5) as i32,
            }),
        };

        Ok(Self { base, body })
    }

    /// Encode the header in `order`, zeroing all padding
    pub fn to_bytes(&self, order: WireOrder) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        let mut put = |index: usize, value: u32| {
            order.write_u32(&mut out[index * 4..index * 4 + 4], value);
        };

        put(0, self.command().as_u32());
        put(1, self.base.seqnum);
        put(2, self.base.devid);
        put(3, self.base.direction.as_u32());
        put(4, self.base.ep);

        match &self.body {
            HeaderBody::CmdSubmit(cmd) => {
                put(5, cmd.transfer_flags);
                put(6, cmd.transfer_buffer_length);
                put(7, cmd.start_frame);
                put(8, cmd.number_of_packets);
                put(9, cmd.interval);
            }
            HeaderBody::RetSubmit(ret) => {
                put(5, ret.status as u32);
                put(6, ret.actual_length);
                put(7, ret.start_frame);
                put(8, ret.number_of_packets);
                put(9, ret.error_count);
            }
            HeaderBody::CmdUnlink(unlink) => put(5, unlink.unlink_seqnum),
            HeaderBody::RetUnlink(ret) => put(5, ret.status as u32),
        }

        if let HeaderBody::CmdSubmit(cmd) = &self.body {
            out[40..48].copy_from_slice(&cmd.setup);
        }
        out
    }
}

impl fmt::Display for PduHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.base.direction {
            Direction::Out => "out",
            Direction::In => "in",
        };
        write!(
            f,
            "{} seq:{} devid:{:#x} dir:{} ep:{:#x}",
            self.command(),
            self.base.seqnum,
            self.base.devid,
            dir,
            self.base.ep
        )?;

        match &self.body {
            HeaderBody::CmdSubmit(cmd) => {
                write!(
                    f,
                    " flags:{:#x} len:{} sf:{} #p:{} intv:{} setup:",
                    cmd.transfer_flags,
                    cmd.transfer_buffer_length,
                    cmd.start_frame,
                    cmd.number_of_packets,
                    cmd.interval
                )?;
                for byte in cmd.setup {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            HeaderBody::RetSubmit(ret) => write!(
                f,
                " st:{} al:{} sf:{} #p:{} ec:{}",
                ret.status, ret.actual_length, ret.start_frame, ret.number_of_packets, ret.error_count
            ),
            HeaderBody::CmdUnlink(unlink) => write!(f, " unlink:{}", unlink.unlink_seqnum),
            HeaderBody::RetUnlink(ret) => write!(f, " st:{}", ret.status),
        }
    }
}

/// Isochronous packet descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IsoPacketDescriptor {
    pub offset: u32,
    pub length: u32,
    pub actual_length: u32,
    pub status: i32,
}

impl IsoPacketDescriptor {
    /// Decode one descriptor; `bytes` must hold at least [`ISO_DESCRIPTOR_SIZE`] bytes
    pub fn read_from(bytes: &[u8], order: WireOrder) -> Result<Self> {
        if bytes.len() < ISO_DESCRIPTOR_SIZE {
            return Err(ProtocolError::BufferTooSmall {
                needed: ISO_DESCRIPTOR_SIZE,
                available: bytes.len(),
            });
        }
        Ok(Self {
            offset: order.read_u32(&bytes[0..4]),
            length: order.read_u32(&bytes[4..8]),
            actual_length: order.read_u32(&bytes[8..12]),
            status: order.read_u32(&bytes[12..16]) as i32,
        })
    }

    pub fn to_bytes(&self, order: WireOrder) -> [u8; ISO_DESCRIPTOR_SIZE] {
        let mut out = [0u8; ISO_DESCRIPTOR_SIZE];
        order.write_u32(&mut out[0..4], self.offset);
        order.write_u32(&mut out[4..8], self.length);
        order.write_u32(&mut out[8..12], self.actual_length);
        order.write_u32(&mut out[12..16], self.status as u32);
        out
    }
}

impl fmt::Display for IsoPacketDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "o:{},l:{},al:{},st:{}",
            self.offset, self.length, self.actual_length, self.status
        )
    }
}

/// A complete URB message: header, transfer data and iso descriptors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub header: PduHeader,
    pub payload: Bytes,
    pub iso_descriptors: Vec<IsoPacketDescriptor>,
}

impl Pdu {
    pub fn new(header: PduHeader) -> Self {
        Self {
            header,
            payload: Bytes::new(),
            iso_descriptors: Vec::new(),
        }
    }

    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_iso_descriptors(mut self, descriptors: Vec<IsoPacketDescriptor>) -> Self {
        self.iso_descriptors = descriptors;
        self
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len() + self.iso_descriptors.len() * ISO_DESCRIPTOR_SIZE
    }

    /// Encode the whole message with every integer field in `order`
    pub fn encode(&self, order: WireOrder) -> BytesMut {
        let mut out = BytesMut::with_capacity(self.encoded_len());
        out.put_slice(&self.header.to_bytes(order));
        out.put_slice(&self.payload);
        for desc in &self.iso_descriptors {
            out.put_slice(&desc.to_bytes(order));
        }
        out
    }

    /// Decode one complete message.
    ///
    /// Message boundaries are not self-describing for RET_SUBMIT, so `bytes`
    /// must span exactly one PDU: everything between the header and the
    /// trailing descriptor array is taken as transfer data.
    pub fn decode(bytes: &[u8], order: WireOrder) -> Result<Self> {
        let header = PduHeader::read_from(bytes, order)?;
        let iso_len = iso_descriptor_bytes(&header)?;

        let needed = HEADER_SIZE.saturating_add(iso_len);
        if bytes.len() < needed {
            return Err(ProtocolError::BufferTooSmall {
                needed,
                available: bytes.len(),
            });
        }

        let payload_end = bytes.len() - iso_len;
        let payload = Bytes::copy_from_slice(&bytes[HEADER_SIZE..payload_end]);
        let iso_descriptors = bytes[payload_end..]
            .chunks_exact(ISO_DESCRIPTOR_SIZE)
            .map(|chunk| IsoPacketDescriptor::read_from(chunk, order))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            header,
            payload,
            iso_descriptors,
        })
    }
}

/// Convert the integer fields of a header in place from `from` to `to`.
///
/// The command word is read in `from` order before anything is rewritten, so
/// the same call works in both directions. Returns the decoded command.
pub fn reorder_header(bytes: &mut [u8], from: WireOrder, to: WireOrder) -> Result<Command> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::BufferTooSmall {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let command = Command::from_u32(from.read_u32(&bytes[0..4]))?;
    if from != to {
        reorder_words(
            &mut bytes[..HEADER_SIZE],
            BASIC_HEADER_WORDS + command.union_words(),
            from,
            to,
        );
    }
    Ok(command)
}

/// Convert `count` isochronous descriptors in place from `from` to `to`
pub fn reorder_iso_descriptors(
    bytes: &mut [u8],
    count: usize,
    from: WireOrder,
    to: WireOrder,
) -> Result<()> {
    let needed = count
        .checked_mul(ISO_DESCRIPTOR_SIZE)
        .ok_or(ProtocolError::LengthOverflow {
            payload: 0,
            packets: count as u32,
        })?;
    if bytes.len() < needed {
        return Err(ProtocolError::BufferTooSmall {
            needed,
            available: bytes.len(),
        });
    }
    if from != to {
        reorder_words(&mut bytes[..needed], needed / 4, from, to);
    }
    Ok(())
}

/// Packet count used when reordering iso descriptors.
///
/// Always read through the RET_SUBMIT layout, even for CMD_SUBMIT headers.
/// Both layouts keep `number_of_packets` in the same word, so the value agrees
/// with [`PduHeader::iso_packet_count`] for every submit header.
pub fn reply_packet_count(header: &[u8], order: WireOrder) -> Result<u32> {
    if header.len() < HEADER_SIZE {
        return Err(ProtocolError::BufferTooSmall {
            needed: HEADER_SIZE,
            available: header.len(),
        });
    }
    Ok(order.read_u32(&header[PACKET_COUNT_OFFSET..PACKET_COUNT_OFFSET + 4]))
}

fn reorder_words(bytes: &mut [u8], words: usize, from: WireOrder, to: WireOrder) {
    for word in bytes.chunks_exact_mut(4).take(words) {
        let value = from.read_u32(word);
        to.write_u32(word, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submit_header() -> PduHeader {
        PduHeader::new(
            BasicHeader::new(42, 0x0001_0002, Direction::In, 1),
            HeaderBody::CmdSubmit(CmdSubmit {
                transfer_flags: 0x200,
                transfer_buffer_length: 18,
                start_frame: 0,
                number_of_packets: 0,
                interval: 0,
                setup: [0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x12, 0x00],
            }),
        )
    }

    #[test]
    fn test_command_codes() {
        assert_eq!(Command::from_u32(1).unwrap(), Command::CmdSubmit);
        assert_eq!(Command::from_u32(2).unwrap(), Command::CmdUnlink);
        assert_eq!(Command::from_u32(3).unwrap(), Command::RetSubmit);
        assert_eq!(Command::from_u32(4).unwrap(), Command::RetUnlink);
        assert!(matches!(
            Command::from_u32(0x8003),
            Err(ProtocolError::UnknownCommand(0x8003))
        ));
    }

    #[test]
    fn test_direction_nonzero_is_in() {
        assert_eq!(Direction::from_u32(0), Direction::Out);
        assert_eq!(Direction::from_u32(1), Direction::In);
        assert_eq!(Direction::from_u32(7), Direction::In);
    }

    #[test]
    fn test_header_layout_network_order() {
        let bytes = submit_header().to_bytes(WireOrder::Network);

        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[0..4], &[0, 0, 0, 1]);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 42]);
        assert_eq!(&bytes[8..12], &[0, 1, 0, 2]);
        assert_eq!(&bytes[12..16], &[0, 0, 0, 1]);
        assert_eq!(&bytes[24..28], &[0, 0, 0, 18]);
        assert_eq!(&bytes[40..48], &[0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x12, 0x00]);
    }

    #[test]
    fn test_reorder_header_leaves_setup_untouched() {
        let header = submit_header();
        let mut bytes = header.to_bytes(WireOrder::Network);

        let command = reorder_header(&mut bytes, WireOrder::Network, WireOrder::Host).unwrap();
        assert_eq!(command, Command::CmdSubmit);
        assert_eq!(bytes, header.to_bytes(WireOrder::Host));
        assert_eq!(&bytes[40..48], &header.to_bytes(WireOrder::Network)[40..48]);

        let command = reorder_header(&mut bytes, WireOrder::Host, WireOrder::Network).unwrap();
        assert_eq!(command, Command::CmdSubmit);
        assert_eq!(bytes, header.to_bytes(WireOrder::Network));
    }

    #[test]
    fn test_reorder_unlink_leaves_padding_untouched() {
        let header = PduHeader::new(
            BasicHeader::new(9, 1, Direction::Out, 0),
            HeaderBody::CmdUnlink(CmdUnlink { unlink_seqnum: 7 }),
        );
        let mut bytes = header.to_bytes(WireOrder::Network);
        bytes[30] = 0xAA;

        reorder_header(&mut bytes, WireOrder::Network, WireOrder::Host).unwrap();
        assert_eq!(bytes[30], 0xAA);
        assert_eq!(PduHeader::read_from(&bytes, WireOrder::Host).unwrap(), header);
    }

    #[test]
    fn test_reorder_unknown_command_fails() {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[3] = 0x09;
        assert!(matches!(
            reorder_header(&mut bytes, WireOrder::Network, WireOrder::Host),
            Err(ProtocolError::UnknownCommand(9))
        ));
    }

    #[test]
    fn test_read_header_too_short() {
        let bytes = [0u8; 20];
        assert!(matches!(
            PduHeader::read_from(&bytes, WireOrder::Host),
            Err(ProtocolError::BufferTooSmall {
                needed: HEADER_SIZE,
                available: 20
            })
        ));
    }

    #[test]
    fn test_reply_packet_count_matches_request_field() {
        let mut header = submit_header();
        if let HeaderBody::CmdSubmit(cmd) = &mut header.body {
            cmd.number_of_packets = 3;
        }
        let bytes = header.to_bytes(WireOrder::Network);
        assert_eq!(reply_packet_count(&bytes, WireOrder::Network).unwrap(), 3);
        assert_eq!(header.iso_packet_count(), 3);
    }

    #[test]
    fn test_reorder_iso_descriptors() {
        let descs = [
            IsoPacketDescriptor {
                offset: 0,
                length: 192,
                actual_length: 188,
                status: 0,
            },
            IsoPacketDescriptor {
                offset: 192,
                length: 192,
                actual_length: 0,
                status: -18,
            },
        ];
        let mut bytes: Vec<u8> = descs
            .iter()
            .flat_map(|d| d.to_bytes(WireOrder::Network))
            .collect();

        reorder_iso_descriptors(&mut bytes, 2, WireOrder::Network, WireOrder::Host).unwrap();
        for (chunk, desc) in bytes.chunks_exact(ISO_DESCRIPTOR_SIZE).zip(descs.iter()) {
            assert_eq!(&IsoPacketDescriptor::read_from(chunk, WireOrder::Host).unwrap(), desc);
        }

        assert!(matches!(
            reorder_iso_descriptors(&mut bytes, 3, WireOrder::Host, WireOrder::Network),
            Err(ProtocolError::BufferTooSmall { .. })
        ));
    }

    #[test]
    fn test_display_dump() {
        let dump = submit_header().to_string();
        assert!(dump.starts_with("CMD_SUBMIT seq:42"));
        assert!(dump.contains("dir:in"));
        assert!(dump.contains("setup:8006000100001200"));

        let ret = PduHeader::new(
            BasicHeader::new(42, 2, Direction::In, 1),
            HeaderBody::RetSubmit(RetSubmit {
                status: -110,
                ..Default::default()
            }),
        );
        assert!(ret.to_string().contains("st:-110"));
    }
}
