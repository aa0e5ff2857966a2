//! Forwarding loop
//!
//! A [`ForwardingSession`] pairs a request-producing *source* endpoint with a
//! reply-producing *destination* endpoint. Each iteration frames whatever
//! each side has produced, hands the oldest unsent PDU of each side to the
//! opposite endpoint, then sleeps on the shared [`WakeQueue`] until an I/O
//! worker posts a completion or the wake interval elapses.
//!
//! Whatever ends the session (peer close, interrupt or a fatal error), the
//! same shutdown runs exactly once: cancel both endpoints, drain every
//! outstanding operation, release both buffers, then stop the workers.

use crate::buffer::{BufferLimits, EndpointBuffer, EndpointSummary};
use crate::endpoint::{Completion, EndpointIo, IoOutcome, Side, WakeQueue};
use crate::error::{ForwardError, Result};
use crate::framer::{self, FrameStep};
use protocol::{DEFAULT_TRACKER_CAPACITY, Role, SeqTracker, WireOrder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Default wake interval
pub const DEFAULT_WAKE_INTERVAL: Duration = Duration::from_millis(500);

/// Default poll interval while draining at shutdown
pub const DEFAULT_DRAIN_POLL: Duration = Duration::from_millis(1000);

/// Default limit on framed but unsent bytes per endpoint (4 MiB)
pub const DEFAULT_MAX_BACKLOG_BYTES: usize = 4 * 1024 * 1024;

/// Direction of traffic through a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flow {
    /// Requests from the remote socket to a local stub driver
    Inbound,
    /// Requests from the local virtual host controller to the remote socket
    Outbound,
}

/// Label, role and byte order of one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointLayout {
    pub label: &'static str,
    pub role: Role,
    pub order: WireOrder,
}

impl Flow {
    /// Layouts of the source and destination endpoints
    pub fn layouts(self) -> (EndpointLayout, EndpointLayout) {
        match self {
            Flow::Inbound => (
                EndpointLayout {
                    label: "socket",
                    role: Role::Request,
                    order: WireOrder::Network,
                },
                EndpointLayout {
                    label: "stub",
                    role: Role::Reply,
                    order: WireOrder::Host,
                },
            ),
            Flow::Outbound => (
                EndpointLayout {
                    label: "vhci",
                    role: Role::Request,
                    order: WireOrder::Host,
                },
                EndpointLayout {
                    label: "socket",
                    role: Role::Reply,
                    order: WireOrder::Network,
                },
            ),
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flow::Inbound => write!(f, "inbound"),
            Flow::Outbound => write!(f, "outbound"),
        }
    }
}

/// Tunables of one forwarding session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub wake_interval: Duration,
    pub drain_poll: Duration,
    pub tracker_capacity: usize,
    pub limits: BufferLimits,
    pub max_backlog_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            wake_interval: DEFAULT_WAKE_INTERVAL,
            drain_poll: DEFAULT_DRAIN_POLL,
            tracker_capacity: DEFAULT_TRACKER_CAPACITY,
            limits: BufferLimits::default(),
            max_backlog_bytes: DEFAULT_MAX_BACKLOG_BYTES,
        }
    }
}

/// Why a session ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The named endpoint shut down its stream
    PeerClosed { endpoint: &'static str },
    /// The interrupt signal was raised
    Interrupted,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::PeerClosed { endpoint } => write!(f, "{} closed", endpoint),
            SessionEnd::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Outcome of a session that ended without error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub flow: Flow,
    pub end: SessionEnd,
    pub source: EndpointSummary,
    pub destination: EndpointSummary,
    /// OUT requests still awaiting their reply
    pub unanswered_out_requests: usize,
}

struct Endpoint {
    buffer: EndpointBuffer,
    io: EndpointIo,
}

impl Endpoint {
    fn spawn<T>(
        side: Side,
        layout: EndpointLayout,
        stream: T,
        limits: BufferLimits,
        wake: &WakeQueue,
    ) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self {
            buffer: EndpointBuffer::new(layout.label, layout.role, layout.order, limits),
            io: EndpointIo::spawn(side, layout.label, stream, wake.poster()),
        }
    }
}

/// One bidirectional forwarding session
pub struct ForwardingSession {
    flow: Flow,
    config: SessionConfig,
    source: Endpoint,
    destination: Endpoint,
    tracker: SeqTracker,
    wake: WakeQueue,
}

impl ForwardingSession {
    /// Create a session over two open streams and start their I/O workers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<S, D>(flow: Flow, source: S, destination: D, config: SessionConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
        D: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (source_layout, destination_layout) = flow.layouts();
        let wake = WakeQueue::new();
        let source = Endpoint::spawn(Side::Source, source_layout, source, config.limits, &wake);
        let destination = Endpoint::spawn(
            Side::Destination,
            destination_layout,
            destination,
            config.limits,
            &wake,
        );

        Self {
            flow,
            config,
            source,
            destination,
            tracker: SeqTracker::with_capacity(config.tracker_capacity),
            wake,
        }
    }

    pub fn flow(&self) -> Flow {
        self.flow
    }

    /// Forward until an endpoint closes, `interrupt` turns true, or a fatal
    /// error occurs.
    ///
    /// Outstanding I/O is always drained before this returns, including on error.
    pub async fn run(mut self, mut interrupt: watch::Receiver<bool>) -> Result<SessionReport> {
        info!(
            flow = %self.flow,
            source = self.source.buffer.label(),
            destination = self.destination.buffer.label(),
            "Forwarding session started"
        );

        let flow = self.flow;
        let outcome = self.steady_state(&mut interrupt).await;
        self.shutdown().await;
        let (source, destination, unanswered_out_requests) = self.release().await;

        match outcome {
            Ok(end) => {
                info!(flow = %flow, "Forwarding session ended: {}", end);
                info!("  {}", source);
                info!("  {}", destination);
                Ok(SessionReport {
                    flow,
                    end,
                    source,
                    destination,
                    unanswered_out_requests,
                })
            }
            Err(e) => {
                debug!("  {}", source);
                debug!("  {}", destination);
                Err(e)
            }
        }
    }

    async fn steady_state(&mut self, interrupt: &mut watch::Receiver<bool>) -> Result<SessionEnd> {
        loop {
            if let Some(end) = self.termination(interrupt) {
                return Ok(end);
            }

            self.pump(Side::Source)?;
            self.pump(Side::Destination)?;

            if let Some(end) = self.termination(interrupt) {
                return Ok(end);
            }

            let completion = tokio::select! {
                completion = self.wake.wait(self.config.wake_interval) => completion,
                Ok(()) = interrupt.changed() => None,
            };
            if let Some(completion) = completion {
                self.on_completion(completion)?;
            }
        }
    }

    fn termination(&self, interrupt: &watch::Receiver<bool>) -> Option<SessionEnd> {
        for endpoint in [&self.source, &self.destination] {
            if endpoint.buffer.is_invalid() {
                return Some(SessionEnd::PeerClosed {
                    endpoint: endpoint.buffer.label(),
                });
            }
        }
        if *interrupt.borrow() {
            return Some(SessionEnd::Interrupted);
        }
        None
    }

    /// Frame what `side` has produced and forward its oldest unsent PDU
    fn pump(&mut self, side: Side) -> Result<()> {
        let Self {
            source,
            destination,
            tracker,
            config,
            ..
        } = self;
        let (producer, consumer) = match side {
            Side::Source => (source, destination),
            Side::Destination => (destination, source),
        };

        while producer.buffer.backlog() < config.max_backlog_bytes {
            match framer::frame_next(&mut producer.buffer, tracker, consumer.buffer.order())? {
                FrameStep::Ready(pdu) => {
                    debug!(
                        endpoint = producer.buffer.label(),
                        command = %pdu.header.command(),
                        seqnum = pdu.header.seqnum(),
                        offset = pdu.start,
                        len = pdu.len(),
                        "Framed PDU"
                    );
                }
                FrameStep::NeedMore(request) => {
                    trace!(
                        endpoint = producer.buffer.label(),
                        len = request.len,
                        offset = producer.buffer.producer_offset(),
                        "Read requested"
                    );
                    if let Err(request) = producer.io.async_read(request) {
                        producer
                            .buffer
                            .complete_read(request.buf, &IoOutcome::Cancelled);
                        return Err(ForwardError::WorkerGone {
                            endpoint: producer.buffer.label(),
                        });
                    }
                    break;
                }
                FrameStep::Pending => break,
            }
        }

        if consumer.buffer.write_in_flight() || consumer.buffer.is_invalid() {
            return Ok(());
        }
        if let Some(chunk) = producer.buffer.next_write() {
            trace!(
                endpoint = consumer.buffer.label(),
                len = chunk.len(),
                offset = producer.buffer.consumer_offset(),
                "Write requested"
            );
            consumer.io.async_write(chunk)?;
            consumer.buffer.begin_write();
        }
        Ok(())
    }

    /// Endpoint at `side` and its peer
    fn pair_mut(&mut self, side: Side) -> (&mut Endpoint, &mut Endpoint) {
        match side {
            Side::Source => (&mut self.source, &mut self.destination),
            Side::Destination => (&mut self.destination, &mut self.source),
        }
    }

    fn on_completion(&mut self, completion: Completion) -> Result<()> {
        match completion {
            Completion::Read { side, buf, outcome } => {
                let (endpoint, _) = self.pair_mut(side);
                let label = endpoint.buffer.label();
                let received = endpoint.buffer.complete_read(buf, &outcome);
                match outcome {
                    IoOutcome::Transferred(_) => trace!(endpoint = label, received, "Read completed"),
                    IoOutcome::Closed => info!(endpoint = label, "Peer closed connection"),
                    IoOutcome::Cancelled => debug!(endpoint = label, "Read cancelled"),
                    IoOutcome::Failed(source) => {
                        return Err(ForwardError::Io {
                            endpoint: label,
                            source,
                        });
                    }
                }
            }
            Completion::Write { side, outcome } => {
                let (writer, peer) = self.pair_mut(side);
                let label = writer.buffer.label();
                writer.buffer.finish_write(&outcome);
                match outcome {
                    IoOutcome::Transferred(written) => {
                        trace!(endpoint = label, written, "Write completed");
                        peer.buffer.complete_write(written);
                    }
                    IoOutcome::Closed => warn!(endpoint = label, "Write accepted no bytes; endpoint closed"),
                    IoOutcome::Cancelled => debug!(endpoint = label, "Write cancelled"),
                    IoOutcome::Failed(source) => {
                        return Err(ForwardError::Io {
                            endpoint: label,
                            source,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Cancel everything in flight and wait until both endpoints are idle
    async fn shutdown(&mut self) {
        self.source.io.cancel_pending();
        self.destination.io.cancel_pending();

        while self.source.buffer.has_pending_io() || self.destination.buffer.has_pending_io() {
            match self.wake.wait(self.config.drain_poll).await {
                Some(completion) => {
                    if let Err(e) = self.on_completion(completion) {
                        debug!("I/O error while draining: {}", e);
                    }
                }
                None => debug!(
                    source_pending = self.source.buffer.has_pending_io(),
                    destination_pending = self.destination.buffer.has_pending_io(),
                    "Waiting for in-flight I/O to finish"
                ),
            }
        }
    }

    /// Release both buffers, stop the workers and drop the wake queue
    async fn release(self) -> (EndpointSummary, EndpointSummary, usize) {
        let Self {
            source,
            destination,
            tracker,
            wake,
            ..
        } = self;

        let source_summary = release_buffer(source.buffer);
        let destination_summary = release_buffer(destination.buffer);
        source.io.close().await;
        destination.io.close().await;
        drop(wake);

        (source_summary, destination_summary, tracker.len())
    }
}

fn release_buffer(buffer: EndpointBuffer) -> EndpointSummary {
    match buffer.release() {
        Ok(summary) => summary,
        Err(buffer) => {
            // Unreachable after a completed drain
            warn!(endpoint = buffer.label(), "Releasing buffer with I/O in flight");
            buffer.summary()
        }
    }
}
