//! PDU framing
//!
//! Finds PDU boundaries in the bytes an endpoint has produced, converts each
//! complete PDU to the byte order of the endpoint that will receive it, and
//! moves it to the consumer side of the buffer. Framing is incremental: each
//! call either completes one PDU or asks for exactly the bytes still missing.

use crate::buffer::{EndpointBuffer, ReadingPhase};
use crate::endpoint::ReadRequest;
use crate::error::{ForwardError, Result};
use bytes::Bytes;
use protocol::{
    BodyLayout, EffectOutcome, HEADER_SIZE, ISO_DESCRIPTOR_SIZE, IsoPacketDescriptor, PduHeader,
    ProtocolError, SeqTracker, WireOrder, iso_descriptor_bytes, reorder_header,
    reorder_iso_descriptors, reply_packet_count, submit_payload_length,
};
use tracing::{Level, enabled, trace, warn};

/// A PDU ready to be written to the peer endpoint
#[derive(Debug, Clone)]
pub struct FramedPdu {
    /// Header as decoded in host order
    pub header: PduHeader,
    /// Stream offset of the first byte
    pub start: u64,
    /// Encoded bytes in the peer's byte order
    pub bytes: Bytes,
}

impl FramedPdu {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Result of one framing step
#[derive(Debug)]
pub enum FrameStep {
    Ready(FramedPdu),
    /// Issue this read; the PDU is incomplete
    NeedMore(ReadRequest),
    /// Nothing to do until the endpoint's read completes
    Pending,
}

fn framing(endpoint: &'static str) -> impl Fn(ProtocolError) -> ForwardError {
    move |source| ForwardError::Framing { endpoint, source }
}

/// Advance framing on `buffer` by one step.
///
/// `peer_order` is the byte order of the endpoint the PDU is written to.
pub fn frame_next(
    buffer: &mut EndpointBuffer,
    tracker: &mut SeqTracker,
    peer_order: WireOrder,
) -> Result<FrameStep> {
    if buffer.read_in_flight() || buffer.is_invalid() {
        return Ok(FrameStep::Pending);
    }

    let available = buffer.unframed().len();
    if available < HEADER_SIZE {
        buffer.set_phase(ReadingPhase::AwaitingHeader);
        return buffer
            .request_more(HEADER_SIZE - available)
            .map(FrameStep::NeedMore);
    }

    let layout = match buffer.phase() {
        ReadingPhase::AwaitingBody(layout) => layout,
        ReadingPhase::Idle | ReadingPhase::AwaitingHeader => {
            let layout = enter_body(buffer, tracker)?;
            buffer.set_phase(ReadingPhase::AwaitingBody(layout));
            layout
        }
    };

    // Bounded by max_pdu_size in enter_body
    let total = HEADER_SIZE + layout.payload_len + layout.iso_len;
    if available < total {
        return buffer
            .request_more(total - available)
            .map(FrameStep::NeedMore);
    }

    finish(buffer, layout, total, peer_order).map(FrameStep::Ready)
}

/// Convert the buffered header to host order and work out the PDU layout
fn enter_body(buffer: &mut EndpointBuffer, tracker: &mut SeqTracker) -> Result<BodyLayout> {
    let label = buffer.label();
    let role = buffer.role();
    let order = buffer.order();
    let max_pdu_size = buffer.max_pdu_size();

    let header_bytes = &mut buffer.unframed_mut()[..HEADER_SIZE];
    reorder_header(header_bytes, order, WireOrder::Host).map_err(framing(label))?;
    let header = PduHeader::read_from(header_bytes, WireOrder::Host).map_err(framing(label))?;
    trace!(endpoint = label, "{}", header);

    let command = header.command();
    if command.origin() != role {
        warn!(
            endpoint = label,
            %command,
            seqnum = header.seqnum(),
            "{} arrived on the {} side; framing it anyway",
            command,
            role
        );
    }

    let length = submit_payload_length(&header, tracker);
    let iso_len = iso_descriptor_bytes(&header).map_err(framing(label))?;
    let layout = BodyLayout {
        payload_len: length.bytes,
        iso_len,
    };

    match layout.total_len() {
        Some(total) if total <= max_pdu_size => {}
        total => {
            return Err(ForwardError::Allocation {
                endpoint: label,
                requested: total.unwrap_or(usize::MAX),
                limit: max_pdu_size,
            });
        }
    }

    if tracker.apply(length.effect) == EffectOutcome::TableFull {
        warn!(
            endpoint = label,
            seqnum = header.seqnum(),
            capacity = tracker.capacity(),
            "Failed to record OUT request: sequence table full"
        );
    }

    Ok(layout)
}

/// Convert a complete PDU to `peer_order` and commit it
fn finish(
    buffer: &mut EndpointBuffer,
    layout: BodyLayout,
    total: usize,
    peer_order: WireOrder,
) -> Result<FramedPdu> {
    let label = buffer.label();
    let order = buffer.order();
    let start = buffer.header_offset();

    let header = {
        let pdu = &mut buffer.unframed_mut()[..total];

        if layout.iso_len > 0 {
            let count = reply_packet_count(&pdu[..HEADER_SIZE], WireOrder::Host)
                .map_err(framing(label))? as usize;
            let iso = &mut pdu[layout.iso_offset()..];
            reorder_iso_descriptors(iso, count, order, WireOrder::Host).map_err(framing(label))?;
            if enabled!(Level::TRACE) {
                for descriptor in iso.chunks_exact(ISO_DESCRIPTOR_SIZE) {
                    if let Ok(descriptor) = IsoPacketDescriptor::read_from(descriptor, WireOrder::Host) {
                        trace!(endpoint = label, "  {}", descriptor);
                    }
                }
            }
            reorder_iso_descriptors(iso, count, WireOrder::Host, peer_order)
                .map_err(framing(label))?;
        }

        let header =
            PduHeader::read_from(&pdu[..HEADER_SIZE], WireOrder::Host).map_err(framing(label))?;
        reorder_header(&mut pdu[..HEADER_SIZE], WireOrder::Host, peer_order)
            .map_err(framing(label))?;
        header
    };

    let bytes = buffer.commit_pdu(total);
    Ok(FramedPdu {
        header,
        start,
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferLimits;
    use crate::endpoint::IoOutcome;
    use bytes::BufMut;
    use common::test_utils::{
        create_mock_cmd_submit, create_mock_cmd_unlink, create_mock_ret_submit, encode_stream,
    };
    use proptest::prelude::*;
    use protocol::{Command, Direction, Pdu, Role};

    fn request_buffer(order: WireOrder) -> EndpointBuffer {
        EndpointBuffer::new("source", Role::Request, order, BufferLimits::default())
    }

    fn reply_buffer(order: WireOrder) -> EndpointBuffer {
        EndpointBuffer::new("destination", Role::Reply, order, BufferLimits::default())
    }

    /// Run the framer over `stream`, delivering at most `chunk` bytes per read
    fn frame_all(
        buffer: &mut EndpointBuffer,
        tracker: &mut SeqTracker,
        peer_order: WireOrder,
        stream: &[u8],
        chunk: usize,
    ) -> Vec<FramedPdu> {
        let mut framed = Vec::new();
        let mut fed = 0;
        loop {
            match frame_next(buffer, tracker, peer_order).unwrap() {
                FrameStep::Ready(pdu) => framed.push(pdu),
                FrameStep::NeedMore(mut request) => {
                    if fed == stream.len() {
                        buffer.complete_read(request.buf, &IoOutcome::Cancelled);
                        return framed;
                    }
                    let n = request.len.min(chunk).min(stream.len() - fed);
                    request.buf.put_slice(&stream[fed..fed + n]);
                    fed += n;
                    buffer.complete_read(request.buf, &IoOutcome::Transferred(n));
                }
                FrameStep::Pending => panic!("framer stalled with no read in flight"),
            }
        }
    }

    #[test]
    fn test_out_request_is_framed_and_recorded() {
        let mut buffer = request_buffer(WireOrder::Host);
        let mut tracker = SeqTracker::new();
        let pdu = create_mock_cmd_submit(9, Direction::Out, 512, 0);
        let stream = encode_stream(std::slice::from_ref(&pdu), WireOrder::Host);

        let framed = frame_all(&mut buffer, &mut tracker, WireOrder::Network, &stream, usize::MAX);

        assert_eq!(framed.len(), 1);
        assert_eq!(framed[0].header.command(), Command::CmdSubmit);
        assert_eq!(framed[0].start, 0);
        assert_eq!(&framed[0].bytes[..], &pdu.encode(WireOrder::Network)[..]);
        assert!(tracker.contains(9));
        assert_eq!(buffer.phase(), ReadingPhase::AwaitingHeader);
    }

    #[test]
    fn test_reads_request_exactly_the_missing_bytes() {
        let mut buffer = request_buffer(WireOrder::Network);
        let mut tracker = SeqTracker::new();
        let stream = create_mock_cmd_submit(1, Direction::Out, 100, 0).encode(WireOrder::Network);

        let FrameStep::NeedMore(mut request) =
            frame_next(&mut buffer, &mut tracker, WireOrder::Host).unwrap()
        else {
            panic!("expected a header read");
        };
        assert_eq!(request.len, HEADER_SIZE);
        request.buf.put_slice(&stream[..20]);
        buffer.complete_read(request.buf, &IoOutcome::Transferred(20));

        let FrameStep::NeedMore(mut request) =
            frame_next(&mut buffer, &mut tracker, WireOrder::Host).unwrap()
        else {
            panic!("expected the rest of the header");
        };
        assert_eq!(request.len, HEADER_SIZE - 20);
        request.buf.put_slice(&stream[20..HEADER_SIZE]);
        buffer.complete_read(request.buf, &IoOutcome::Transferred(28));

        let FrameStep::NeedMore(request) =
            frame_next(&mut buffer, &mut tracker, WireOrder::Host).unwrap()
        else {
            panic!("expected a body read");
        };
        assert_eq!(request.len, 100);
        assert!(matches!(buffer.phase(), ReadingPhase::AwaitingBody(layout) if layout.payload_len == 100));
        assert!(tracker.contains(1));

        // Body length is fixed once the header is seen
        buffer.complete_read(request.buf, &IoOutcome::Cancelled);
        let FrameStep::NeedMore(request) =
            frame_next(&mut buffer, &mut tracker, WireOrder::Host).unwrap()
        else {
            panic!("expected a body read");
        };
        assert_eq!(request.len, 100);
        buffer.complete_read(request.buf, &IoOutcome::Cancelled);
    }

    #[test]
    fn test_pending_while_read_in_flight() {
        let mut buffer = request_buffer(WireOrder::Network);
        let mut tracker = SeqTracker::new();
        let FrameStep::NeedMore(request) =
            frame_next(&mut buffer, &mut tracker, WireOrder::Host).unwrap()
        else {
            panic!("expected a header read");
        };
        assert!(matches!(
            frame_next(&mut buffer, &mut tracker, WireOrder::Host).unwrap(),
            FrameStep::Pending
        ));
        buffer.complete_read(request.buf, &IoOutcome::Closed);
        assert!(matches!(
            frame_next(&mut buffer, &mut tracker, WireOrder::Host).unwrap(),
            FrameStep::Pending
        ));
    }

    #[test]
    fn test_reply_correlates_with_tracked_request() {
        let mut requests = request_buffer(WireOrder::Host);
        let mut replies = reply_buffer(WireOrder::Network);
        let mut tracker = SeqTracker::new();

        let out_req = create_mock_cmd_submit(1, Direction::Out, 64, 0);
        let in_req = create_mock_cmd_submit(2, Direction::In, 32, 0);
        let stream = encode_stream(&[out_req, in_req], WireOrder::Host);
        let framed = frame_all(&mut requests, &mut tracker, WireOrder::Network, &stream, usize::MAX);
        assert_eq!(framed.len(), 2);
        assert!(tracker.contains(1));
        assert!(!tracker.contains(2));

        let out_rep = create_mock_ret_submit(1, 64, 0, false);
        let in_rep = create_mock_ret_submit(2, 32, 0, true);
        let stream = encode_stream(&[out_rep.clone(), in_rep.clone()], WireOrder::Network);
        let framed = frame_all(&mut replies, &mut tracker, WireOrder::Host, &stream, usize::MAX);

        assert_eq!(framed.len(), 2);
        assert_eq!(&framed[0].bytes[..], &out_rep.encode(WireOrder::Host)[..]);
        assert_eq!(&framed[1].bytes[..], &in_rep.encode(WireOrder::Host)[..]);
        assert_eq!(framed[1].start, HEADER_SIZE as u64);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_iso_descriptors_follow_payload() {
        let mut replies = reply_buffer(WireOrder::Host);
        let mut tracker = SeqTracker::new();
        let reply = create_mock_ret_submit(4, 3 * 192, 3, true);
        let stream = reply.encode(WireOrder::Host);

        let framed = frame_all(&mut replies, &mut tracker, WireOrder::Network, &stream, 7);

        assert_eq!(framed.len(), 1);
        assert_eq!(&framed[0].bytes[..], &reply.encode(WireOrder::Network)[..]);
        let decoded = Pdu::decode(&framed[0].bytes, WireOrder::Network).unwrap();
        assert_eq!(decoded.iso_descriptors, reply.iso_descriptors);
    }

    #[test]
    fn test_command_from_the_wrong_side_is_framed() {
        let mut replies = reply_buffer(WireOrder::Network);
        let mut tracker = SeqTracker::new();
        let stray = create_mock_cmd_submit(5, Direction::Out, 32, 0);
        let follow_up = create_mock_ret_submit(6, 16, 0, true);
        let stream = encode_stream(&[stray.clone(), follow_up.clone()], WireOrder::Network);

        let framed = frame_all(&mut replies, &mut tracker, WireOrder::Host, &stream, 11);

        assert_eq!(framed.len(), 2);
        assert_eq!(framed[0].len(), HEADER_SIZE + 32);
        assert_eq!(&framed[0].bytes[..], &stray.encode(WireOrder::Host)[..]);
        assert_eq!(&framed[1].bytes[..], &follow_up.encode(WireOrder::Host)[..]);
        assert!(tracker.contains(5));
    }

    #[test]
    fn test_unknown_command_is_framing_error() {
        let mut buffer = request_buffer(WireOrder::Network);
        let mut tracker = SeqTracker::new();
        let mut request = match frame_next(&mut buffer, &mut tracker, WireOrder::Host).unwrap() {
            FrameStep::NeedMore(request) => request,
            other => panic!("unexpected step {:?}", other),
        };
        let mut garbage = [0u8; HEADER_SIZE];
        garbage[3] = 0x09;
        request.buf.put_slice(&garbage);
        buffer.complete_read(request.buf, &IoOutcome::Transferred(HEADER_SIZE));

        let err = frame_next(&mut buffer, &mut tracker, WireOrder::Host).unwrap_err();
        assert!(matches!(
            err,
            ForwardError::Framing {
                source: ProtocolError::UnknownCommand(9),
                ..
            }
        ));
    }

    #[test]
    fn test_oversized_pdu_is_allocation_error() {
        let mut buffer = EndpointBuffer::new(
            "source",
            Role::Request,
            WireOrder::Host,
            BufferLimits {
                initial_capacity: 64,
                max_pdu_size: 1024,
            },
        );
        let mut tracker = SeqTracker::new();
        let pdu = create_mock_cmd_submit(3, Direction::Out, 4096, 0);
        let header = pdu.encode(WireOrder::Host);

        let mut request = match frame_next(&mut buffer, &mut tracker, WireOrder::Network).unwrap() {
            FrameStep::NeedMore(request) => request,
            other => panic!("unexpected step {:?}", other),
        };
        request.buf.put_slice(&header[..HEADER_SIZE]);
        buffer.complete_read(request.buf, &IoOutcome::Transferred(HEADER_SIZE));

        let err = frame_next(&mut buffer, &mut tracker, WireOrder::Network).unwrap_err();
        assert!(matches!(
            err,
            ForwardError::Allocation {
                requested,
                limit: 1024,
                ..
            } if requested == HEADER_SIZE + 4096
        ));
        assert!(!tracker.contains(3));
    }

    #[test]
    fn test_full_tracker_still_frames() {
        let mut buffer = request_buffer(WireOrder::Host);
        let mut tracker = SeqTracker::with_capacity(1);
        let stream = encode_stream(
            &[
                create_mock_cmd_submit(1, Direction::Out, 8, 0),
                create_mock_cmd_submit(2, Direction::Out, 8, 0),
                create_mock_cmd_unlink(3, 1),
            ],
            WireOrder::Host,
        );

        let framed = frame_all(&mut buffer, &mut tracker, WireOrder::Network, &stream, usize::MAX);

        assert_eq!(framed.len(), 3);
        assert!(tracker.contains(1));
        assert!(!tracker.contains(2));
    }

    proptest! {
        #[test]
        fn prop_chunking_does_not_change_output(
            chunk in 1usize..200,
            lengths in prop::collection::vec(0u32..300, 1..8),
        ) {
            let pdus: Vec<Pdu> = lengths
                .iter()
                .enumerate()
                .map(|(i, &len)| {
                    let direction = if i % 2 == 0 { Direction::Out } else { Direction::In };
                    create_mock_cmd_submit(i as u32, direction, len, (i % 3) as u32)
                })
                .collect();
            let stream = encode_stream(&pdus, WireOrder::Network);

            let mut whole = request_buffer(WireOrder::Network);
            let mut chunked = request_buffer(WireOrder::Network);
            let mut t1 = SeqTracker::new();
            let mut t2 = SeqTracker::new();

            let a = frame_all(&mut whole, &mut t1, WireOrder::Host, &stream, usize::MAX);
            let b = frame_all(&mut chunked, &mut t2, WireOrder::Host, &stream, chunk);

            prop_assert_eq!(a.len(), pdus.len());
            prop_assert_eq!(b.len(), pdus.len());
            for ((x, y), pdu) in a.iter().zip(&b).zip(&pdus) {
                prop_assert_eq!(&x.bytes[..], &y.bytes[..]);
                prop_assert_eq!(&x.bytes[..], &pdu.encode(WireOrder::Host)[..]);
            }
        }
    }
}
