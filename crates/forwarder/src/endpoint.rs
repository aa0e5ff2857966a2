//! Asynchronous endpoint I/O
//!
//! An endpoint handle is any tokio stream. It is split into a read half and a
//! write half, each owned by a worker task that executes one operation at a
//! time. Operations are submitted over a channel and their completions are
//! posted to the session's [`WakeQueue`]; the forwarding loop is the only
//! consumer of completions.
//!
//! A read owns its `BytesMut` for the lifetime of the operation and hands it
//! back inside [`Completion::Read`], whether the read finished, failed or was
//! cancelled. The session can therefore not release a buffer that an
//! outstanding read still refers to.

use crate::error::{ForwardError, Result};
use async_channel::{Receiver, Sender, unbounded};
use bytes::{Bytes, BytesMut};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// Position of an endpoint within a forwarding session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Produces requests
    Source,
    /// Produces replies
    Destination,
}

impl Side {
    pub fn peer(self) -> Self {
        match self {
            Side::Source => Side::Destination,
            Side::Destination => Side::Source,
        }
    }
}

/// How an asynchronous operation ended
#[derive(Debug)]
pub enum IoOutcome {
    /// Bytes moved (always nonzero)
    Transferred(usize),
    /// Zero-byte completion: the peer shut down in an orderly way
    Closed,
    /// Abandoned after `cancel_pending`
    Cancelled,
    Failed(io::Error),
}

impl IoOutcome {
    fn from_result(result: io::Result<usize>) -> Self {
        match result {
            Ok(0) => IoOutcome::Closed,
            Ok(n) => IoOutcome::Transferred(n),
            Err(e) => IoOutcome::Failed(e),
        }
    }
}

/// Read of at most `len` bytes appended to `buf`
#[derive(Debug)]
pub struct ReadRequest {
    pub buf: BytesMut,
    pub len: usize,
}

/// Completion event posted by an I/O worker
#[derive(Debug)]
pub enum Completion {
    Read {
        side: Side,
        buf: BytesMut,
        outcome: IoOutcome,
    },
    Write {
        side: Side,
        outcome: IoOutcome,
    },
}

/// Wake primitive shared by both endpoints of a session.
///
/// Every completion is one post; `wait` returns the next one or `None` once
/// the timeout elapses.
pub struct WakeQueue {
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
}

impl WakeQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Sender handed to I/O workers
    pub fn poster(&self) -> Sender<Completion> {
        self.tx.clone()
    }

    pub async fn wait(&self, timeout: Duration) -> Option<Completion> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Ok(completion)) => Some(completion),
            Ok(Err(_)) | Err(_) => None,
        }
    }
}

impl Default for WakeQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to the I/O workers of one endpoint
pub struct EndpointIo {
    label: &'static str,
    reads: Sender<ReadRequest>,
    writes: Sender<Bytes>,
    cancel: watch::Sender<bool>,
    workers: [JoinHandle<()>; 2],
}

impl EndpointIo {
    /// Split `stream` and spawn its read and write workers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<T>(side: Side, label: &'static str, stream: T, wake: Sender<Completion>) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (read_tx, read_rx) = unbounded();
        let (write_tx, write_rx) = unbounded();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let read_worker = tokio::spawn(read_loop(side, reader, read_rx, wake.clone(), cancel_rx.clone()));
        let write_worker = tokio::spawn(write_loop(side, writer, write_rx, wake, cancel_rx));

        Self {
            label,
            reads: read_tx,
            writes: write_tx,
            cancel: cancel_tx,
            workers: [read_worker, write_worker],
        }
    }

    /// Queue a read. The request comes back unchanged if the worker is gone.
    pub fn async_read(&self, request: ReadRequest) -> std::result::Result<(), ReadRequest> {
        self.reads.try_send(request).map_err(|e| e.into_inner())
    }

    /// Queue a write of `chunk`
    pub fn async_write(&self, chunk: Bytes) -> Result<()> {
        self.writes
            .try_send(chunk)
            .map_err(|_| ForwardError::WorkerGone { endpoint: self.label })
    }

    /// Abandon the operation in progress and every later one.
    ///
    /// Each abandoned operation still posts a `Cancelled` completion.
    pub fn cancel_pending(&self) {
        self.cancel.send_replace(true);
    }

    /// Stop both workers and wait for them to exit
    pub async fn close(self) {
        let Self {
            label,
            reads,
            writes,
            workers,
            ..
        } = self;
        drop(reads);
        drop(writes);
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(endpoint = label, "I/O worker ended abnormally: {}", e);
            }
        }
    }
}

async fn read_loop<R>(
    side: Side,
    mut reader: R,
    ops: Receiver<ReadRequest>,
    wake: Sender<Completion>,
    mut cancel: watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin,
{
    while let Ok(ReadRequest { mut buf, len }) = ops.recv().await {
        let outcome = {
            let mut limited = (&mut reader).take(len as u64);
            tokio::select! {
                result = limited.read_buf(&mut buf) => IoOutcome::from_result(result),
                Ok(_) = cancel.wait_for(|cancelled| *cancelled) => IoOutcome::Cancelled,
            }
        };
        trace!(?side, ?outcome, "Read completed");

        if wake.send(Completion::Read { side, buf, outcome }).await.is_err() {
            break;
        }
    }
}

async fn write_loop<W>(
    side: Side,
    mut writer: W,
    ops: Receiver<Bytes>,
    wake: Sender<Completion>,
    mut cancel: watch::Receiver<bool>,
) where
    W: AsyncWrite + Unpin,
{
    while let Ok(chunk) = ops.recv().await {
        let outcome = tokio::select! {
            result = write_chunk(&mut writer, &chunk) => IoOutcome::from_result(result),
            Ok(_) = cancel.wait_for(|cancelled| *cancelled) => IoOutcome::Cancelled,
        };
        trace!(?side, ?outcome, "Write completed");

        if wake.send(Completion::Write { side, outcome }).await.is_err() {
            break;
        }
    }

    // Propagate the end of the session to the peer
    let _ = writer.shutdown().await;
}

async fn write_chunk<W>(writer: &mut W, chunk: &[u8]) -> io::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let written = writer.write(chunk).await?;
    writer.flush().await?;
    Ok(written)
}
