//! Test utilities for usbip-forward
//!
//! Provides URB builders and helper functions for testing across crates.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{create_mock_cmd_submit, encode_stream};
//! use protocol::{Direction, WireOrder};
//!
//! # fn main() {
//! let pdu = create_mock_cmd_submit(1, Direction::Out, 64, 0);
//! assert_eq!(pdu.payload.len(), 64);
//!
//! let stream = encode_stream(&[pdu], WireOrder::Network);
//! assert_eq!(stream.len(), 48 + 64);
//! # }
//! ```

use protocol::{
    BasicHeader, CmdSubmit, CmdUnlink, Direction, HeaderBody, IsoPacketDescriptor, Pdu, PduHeader,
    RetSubmit, RetUnlink, WireOrder,
};
use std::future::Future;
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Device ID used by the mock builders (bus 1, device 2)
pub const MOCK_DEVID: u32 = 0x0001_0002;

/// Create a mock CMD_SUBMIT
///
/// OUT requests carry `length` bytes of [`create_mock_bulk_data`]; IN
/// requests carry none. `packets` isochronous descriptors are appended.
///
/// # Example
/// ```
/// use common::test_utils::create_mock_cmd_submit;
/// use protocol::Direction;
///
/// let pdu = create_mock_cmd_submit(7, Direction::In, 18, 0);
/// assert!(pdu.payload.is_empty());
/// ```
pub fn create_mock_cmd_submit(seqnum: u32, direction: Direction, length: u32, packets: u32) -> Pdu {
    let setup = if packets == 0 && direction == Direction::In {
        create_mock_setup_packet(0x80, 0x06, 0x0100, 0x0000, length as u16)
    } else {
        [0u8; 8]
    };
    let header = PduHeader::new(
        BasicHeader::new(seqnum, MOCK_DEVID, direction, 1),
        HeaderBody::CmdSubmit(CmdSubmit {
            transfer_flags: 0,
            transfer_buffer_length: length,
            start_frame: 0,
            number_of_packets: packets,
            interval: if packets > 0 { 1 } else { 0 },
            setup,
        }),
    );

    let pdu = Pdu::new(header).with_iso_descriptors(create_mock_iso_descriptors(packets, 0));
    match direction {
        Direction::Out => pdu.with_payload(create_mock_bulk_data(length as usize)),
        Direction::In => pdu,
    }
}

/// Create a mock RET_SUBMIT
///
/// `with_data` controls whether `actual_length` bytes of transfer data follow
/// the header, as they do for replies to IN requests.
pub fn create_mock_ret_submit(seqnum: u32, actual_length: u32, packets: u32, with_data: bool) -> Pdu {
    let header = PduHeader::new(
        BasicHeader::new(seqnum, MOCK_DEVID, Direction::Out, 1),
        HeaderBody::RetSubmit(RetSubmit {
            status: 0,
            actual_length,
            start_frame: 0,
            number_of_packets: packets,
            error_count: 0,
        }),
    );

    let pdu = Pdu::new(header).with_iso_descriptors(create_mock_iso_descriptors(packets, 0));
    if with_data {
        pdu.with_payload(create_mock_bulk_data(actual_length as usize))
    } else {
        pdu
    }
}

/// Create a mock CMD_UNLINK cancelling `target`
pub fn create_mock_cmd_unlink(seqnum: u32, target: u32) -> Pdu {
    Pdu::new(PduHeader::new(
        BasicHeader::new(seqnum, MOCK_DEVID, Direction::Out, 0),
        HeaderBody::CmdUnlink(CmdUnlink {
            unlink_seqnum: target,
        }),
    ))
}

/// Create a mock RET_UNLINK
pub fn create_mock_ret_unlink(seqnum: u32, status: i32) -> Pdu {
    Pdu::new(PduHeader::new(
        BasicHeader::new(seqnum, MOCK_DEVID, Direction::Out, 0),
        HeaderBody::RetUnlink(RetUnlink { status }),
    ))
}

/// Create `count` isochronous descriptors of 192 bytes each
pub fn create_mock_iso_descriptors(count: u32, status: i32) -> Vec<IsoPacketDescriptor> {
    (0..count)
        .map(|i| IsoPacketDescriptor {
            offset: i * 192,
            length: 192,
            actual_length: 192 - i,
            status,
        })
        .collect()
}

/// Concatenate encoded PDUs into one byte stream
pub fn encode_stream(pdus: &[Pdu], order: WireOrder) -> Vec<u8> {
    let mut stream = Vec::with_capacity(pdus.iter().map(Pdu::encoded_len).sum());
    for pdu in pdus {
        stream.extend_from_slice(&pdu.encode(order));
    }
    stream
}

/// Run a future with a timeout
///
/// # Arguments
/// * `duration` - Maximum time to wait
/// * `future` - The async operation to run
///
/// # Returns
/// Result containing the operation result or a timeout error
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}

/// Create mock bulk transfer data of specified size
pub fn create_mock_bulk_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i & 0xFF) as u8).collect()
}

/// Create a mock control transfer setup packet
///
/// # Arguments
/// * `request_type` - bmRequestType
/// * `request` - bRequest
/// * `value` - wValue
/// * `index` - wIndex
/// * `length` - wLength
pub fn create_mock_setup_packet(
    request_type: u8,
    request: u8,
    value: u16,
    index: u16,
    length: u16,
) -> [u8; 8] {
    let [value_lo, value_hi] = value.to_le_bytes();
    let [index_lo, index_hi] = index.to_le_bytes();
    let [length_lo, length_hi] = length.to_le_bytes();
    [
        request_type,
        request,
        value_lo,
        value_hi,
        index_lo,
        index_hi,
        length_lo,
        length_hi,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{Command, HEADER_SIZE, ISO_DESCRIPTOR_SIZE};

    #[test]
    fn test_out_submit_carries_payload() {
        let pdu = create_mock_cmd_submit(1, Direction::Out, 512, 0);

        assert_eq!(pdu.header.command(), Command::CmdSubmit);
        assert_eq!(pdu.payload.len(), 512);
        assert_eq!(pdu.encoded_len(), HEADER_SIZE + 512);
    }

    #[test]
    fn test_in_submit_has_setup_and_no_payload() {
        let pdu = create_mock_cmd_submit(2, Direction::In, 18, 0);

        assert!(pdu.payload.is_empty());
        match pdu.header.body {
            HeaderBody::CmdSubmit(cmd) => {
                assert_eq!(cmd.setup[1], 0x06); // GET_DESCRIPTOR
                assert_eq!(cmd.setup[6], 18);
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_iso_submit() {
        let pdu = create_mock_cmd_submit(3, Direction::In, 0, 4);
        assert_eq!(pdu.iso_descriptors.len(), 4);
        assert_eq!(pdu.encoded_len(), HEADER_SIZE + 4 * ISO_DESCRIPTOR_SIZE);
    }

    #[test]
    fn test_ret_submit_with_and_without_data() {
        assert_eq!(create_mock_ret_submit(1, 64, 0, true).payload.len(), 64);
        assert!(create_mock_ret_submit(1, 64, 0, false).payload.is_empty());
    }

    #[test]
    fn test_encode_stream_concatenates() {
        let pdus = [create_mock_cmd_unlink(5, 1), create_mock_ret_unlink(5, 0)];
        let stream = encode_stream(&pdus, WireOrder::Network);
        assert_eq!(stream.len(), 2 * HEADER_SIZE);
        assert_eq!(&stream[0..4], &[0, 0, 0, 2]);
        assert_eq!(&stream[48..52], &[0, 0, 0, 4]);
    }

    #[test]
    fn test_create_mock_bulk_data() {
        let data = create_mock_bulk_data(1024);

        assert_eq!(data.len(), 1024);
        assert_eq!(data[0], 0);
        assert_eq!(data[255], 255);
        assert_eq!(data[256], 0); // Wraps around
    }

    #[test]
    fn test_create_mock_setup_packet() {
        let setup = create_mock_setup_packet(0x80, 0x06, 0x0100, 0x0000, 0x0012);

        assert_eq!(setup[0], 0x80); // bmRequestType (Device-to-host, Standard, Device)
        assert_eq!(setup[1], 0x06); // bRequest (GET_DESCRIPTOR)
        assert_eq!(setup[3], 0x01); // wValue high (Descriptor type: Device)
        assert_eq!(setup[6], 0x12); // wLength low (18 bytes)
    }

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await;

        assert!(result.is_ok());
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_failure() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            42
        })
        .await;

        assert!(result.is_err());
    }
}
