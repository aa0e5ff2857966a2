//! Per-endpoint byte buffer
//!
//! Bytes read from an endpoint land in the producer region. Once the framer
//! has a complete PDU it is frozen into a consumer segment that waits to be
//! written to the peer endpoint. All offsets are positions in the logical
//! byte stream read from the endpoint:
//!
//! ```text
//!   consumer_offset <= header_offset <= producer_offset
//!
//!   |--- sent ---|--- framed, unsent ---|--- partial PDU ---|--- spare ---|
//!                ^                      ^                   ^
//!         consumer_offset         header_offset      producer_offset
//! ```
//!
//! Framed segments share their allocation with the producer until growth is
//! needed. Growing while a segment still refers to the current allocation
//! moves the producer to a fresh allocation carrying only the partial PDU;
//! the old allocation lives on in the segments until they are written. The
//! buffer is *split* while any segment belongs to an older allocation.

use crate::endpoint::{IoOutcome, ReadRequest};
use crate::error::{ForwardError, Result};
use bytes::{Bytes, BytesMut};
use protocol::{BodyLayout, Role, WireOrder};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, trace};

/// Initial producer allocation
pub const DEFAULT_INITIAL_CAPACITY: usize = 1024;

/// Largest single PDU the buffer will assemble (16 MiB)
pub const DEFAULT_MAX_PDU_SIZE: usize = 16 * 1024 * 1024;

/// Allocation limits of one endpoint buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLimits {
    pub initial_capacity: usize,
    pub max_pdu_size: usize,
}

impl Default for BufferLimits {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            max_pdu_size: DEFAULT_MAX_PDU_SIZE,
        }
    }
}

/// Framing state of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingPhase {
    /// Between PDUs
    Idle,
    /// Fewer than 48 bytes of the next PDU are buffered
    AwaitingHeader,
    /// Header decoded and converted to host order; waiting for the rest
    AwaitingBody(BodyLayout),
}

impl fmt::Display for ReadingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingPhase::Idle => write!(f, "idle"),
            ReadingPhase::AwaitingHeader => write!(f, "awaiting header"),
            ReadingPhase::AwaitingBody(layout) => write!(
                f,
                "awaiting body ({} data, {} iso bytes)",
                layout.payload_len, layout.iso_len
            ),
        }
    }
}

#[derive(Debug)]
struct Segment {
    bytes: Bytes,
    sent: usize,
    generation: u64,
}

impl Segment {
    fn is_drained(&self) -> bool {
        self.sent >= self.bytes.len()
    }

    fn unsent(&self) -> usize {
        self.bytes.len() - self.sent
    }
}

/// Counters of one endpoint reported when its buffer is released
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSummary {
    pub label: &'static str,
    pub role: Role,
    pub order: WireOrder,
    pub pdus_framed: u64,
    /// Bytes read from the endpoint
    pub bytes_received: u64,
    /// Bytes that became part of a complete PDU
    pub bytes_framed: u64,
    /// Framed bytes written to the peer endpoint
    pub bytes_forwarded: u64,
    pub phase: ReadingPhase,
}

impl fmt::Display for EndpointSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {} order): {} PDUs, {} bytes received, {} framed, {} forwarded, {}",
            self.label,
            self.role,
            self.order,
            self.pdus_framed,
            self.bytes_received,
            self.bytes_framed,
            self.bytes_forwarded,
            self.phase
        )
    }
}

/// Byte buffer and framing state for one endpoint
#[derive(Debug)]
pub struct EndpointBuffer {
    label: &'static str,
    role: Role,
    order: WireOrder,
    limits: BufferLimits,

    /// Holds `[header_offset, producer_offset)`; empty while a read is in flight
    producer: BytesMut,
    generation: u64,
    segments: VecDeque<Segment>,

    header_offset: u64,
    producer_offset: u64,
    consumer_offset: u64,

    phase: ReadingPhase,
    invalid: bool,
    read_in_flight: bool,
    write_in_flight: bool,
    pdus_framed: u64,
}

impl EndpointBuffer {
    pub fn new(label: &'static str, role: Role, order: WireOrder, limits: BufferLimits) -> Self {
        Self {
            label,
            role,
            order,
            limits,
            producer: BytesMut::with_capacity(limits.initial_capacity),
            generation: 0,
            segments: VecDeque::new(),
            header_offset: 0,
            producer_offset: 0,
            consumer_offset: 0,
            phase: ReadingPhase::Idle,
            invalid: false,
            read_in_flight: false,
            write_in_flight: false,
            pdus_framed: 0,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn order(&self) -> WireOrder {
        self.order
    }

    pub fn max_pdu_size(&self) -> usize {
        self.limits.max_pdu_size
    }

    pub fn phase(&self) -> ReadingPhase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: ReadingPhase) {
        self.phase = phase;
    }

    pub fn header_offset(&self) -> u64 {
        self.header_offset
    }

    pub fn producer_offset(&self) -> u64 {
        self.producer_offset
    }

    pub fn consumer_offset(&self) -> u64 {
        self.consumer_offset
    }

    /// Set once the endpoint has reported an orderly close
    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    pub fn read_in_flight(&self) -> bool {
        self.read_in_flight
    }

    pub fn write_in_flight(&self) -> bool {
        self.write_in_flight
    }

    pub fn has_pending_io(&self) -> bool {
        self.read_in_flight || self.write_in_flight
    }

    pub fn pdus_framed(&self) -> u64 {
        self.pdus_framed
    }

    /// Bytes of the PDU currently being assembled
    pub fn unframed(&self) -> &[u8] {
        &self.producer
    }

    pub(crate) fn unframed_mut(&mut self) -> &mut [u8] {
        &mut self.producer
    }

    /// Framed bytes not yet written to the peer
    pub fn backlog(&self) -> usize {
        self.segments.iter().map(Segment::unsent).sum()
    }

    /// True while framed bytes wait in an allocation the producer has left
    pub fn is_split(&self) -> bool {
        self.segments.iter().any(|s| s.generation != self.generation)
    }

    fn shares_producer_allocation(&self) -> bool {
        self.segments.iter().any(|s| s.generation == self.generation)
    }

    /// Prepare a read of `additional` bytes past `producer_offset`.
    ///
    /// The returned request owns the producer region until
    /// [`complete_read`](Self::complete_read) hands it back.
    pub fn request_more(&mut self, additional: usize) -> Result<ReadRequest> {
        debug_assert!(!self.read_in_flight, "read already in flight on {}", self.label);

        let buffered = self.producer.len();
        let needed = buffered
            .checked_add(additional)
            .filter(|&needed| needed <= self.limits.max_pdu_size)
            .ok_or(ForwardError::Allocation {
                endpoint: self.label,
                requested: buffered.saturating_add(additional),
                limit: self.limits.max_pdu_size,
            })?;

        if self.producer.capacity() - buffered < additional {
            if self.shares_producer_allocation() {
                let mut fresh = BytesMut::with_capacity(needed.max(self.limits.initial_capacity));
                fresh.extend_from_slice(&self.producer);
                self.producer = fresh;
                self.generation += 1;
                debug!(
                    endpoint = self.label,
                    carried = buffered,
                    capacity = self.producer.capacity(),
                    "Producer moved to a new allocation; framed data stays behind"
                );
            } else {
                self.producer.reserve(additional);
                trace!(
                    endpoint = self.label,
                    capacity = self.producer.capacity(),
                    "Producer grown in place"
                );
            }
        }

        self.read_in_flight = true;
        Ok(ReadRequest {
            buf: std::mem::take(&mut self.producer),
            len: additional,
        })
    }

    /// Take back the producer region from a finished read.
    ///
    /// Returns the number of bytes received. An orderly close marks the
    /// endpoint invalid.
    pub fn complete_read(&mut self, buf: BytesMut, outcome: &IoOutcome) -> usize {
        let previous = self.producer_offset;
        self.producer = buf;
        self.producer_offset = self.header_offset + self.producer.len() as u64;
        self.read_in_flight = false;
        let received = (self.producer_offset - previous) as usize;

        if matches!(outcome, IoOutcome::Closed) {
            self.invalid = true;
        }
        received
    }

    /// Freeze the first `len` producer bytes as a complete PDU
    pub(crate) fn commit_pdu(&mut self, len: usize) -> Bytes {
        let pdu = self.producer.split_to(len).freeze();
        self.header_offset += len as u64;
        self.segments.push_back(Segment {
            bytes: pdu.clone(),
            sent: 0,
            generation: self.generation,
        });
        self.phase = ReadingPhase::Idle;
        self.pdus_framed += 1;
        pdu
    }

    /// Unsent bytes of the oldest framed PDU
    pub fn next_write(&self) -> Option<Bytes> {
        self.segments
            .front()
            .filter(|segment| !segment.is_drained())
            .map(|segment| segment.bytes.slice(segment.sent..))
    }

    /// Account for `written` bytes of [`next_write`](Self::next_write) reaching the peer
    pub fn complete_write(&mut self, written: usize) {
        let mut remaining = written;
        while remaining > 0 {
            let Some(front) = self.segments.front_mut() else {
                break;
            };
            let step = remaining.min(front.unsent());
            front.sent += step;
            remaining -= step;
            self.consumer_offset += step as u64;
            if front.is_drained() {
                self.segments.pop_front();
            }
        }
        self.release_consumed_prefix();
    }

    /// Mark a write to this buffer's endpoint as in flight.
    ///
    /// The flag belongs to the endpoint being written to, not to the buffer
    /// whose framed bytes are being sent.
    pub fn begin_write(&mut self) {
        self.write_in_flight = true;
    }

    /// Clear this endpoint's write flag; an orderly close on the write marks
    /// this endpoint invalid
    pub fn finish_write(&mut self, outcome: &IoOutcome) {
        self.write_in_flight = false;
        if matches!(outcome, IoOutcome::Closed) {
            self.invalid = true;
        }
    }

    /// Drop fully written segments. Returns true if the split collapsed.
    pub fn release_consumed_prefix(&mut self) -> bool {
        let was_split = self.is_split();
        while self.segments.front().is_some_and(Segment::is_drained) {
            self.segments.pop_front();
        }

        let collapsed = was_split && !self.is_split();
        if collapsed {
            debug!(
                endpoint = self.label,
                consumer_offset = self.consumer_offset,
                "Old allocation fully forwarded; buffer no longer split"
            );
        }
        collapsed
    }

    /// Counters of this buffer
    pub fn summary(&self) -> EndpointSummary {
        EndpointSummary {
            label: self.label,
            role: self.role,
            order: self.order,
            pdus_framed: self.pdus_framed,
            bytes_received: self.producer_offset,
            bytes_framed: self.header_offset,
            bytes_forwarded: self.consumer_offset,
            phase: self.phase,
        }
    }

    /// Free the buffer.
    ///
    /// Refused while a read or write still refers to it; the buffer is handed
    /// back unchanged in that case.
    pub fn release(self) -> std::result::Result<EndpointSummary, Self> {
        if self.has_pending_io() {
            return Err(self);
        }
        Ok(self.summary())
    }
}
