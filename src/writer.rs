//! Dedicated writer task for outbound frames.
//!
//! Every producer (the session API, the liveness task) sends fully framed
//! messages through an mpsc channel to a single task that owns the write
//! half of the transport. Frames are written in submission order.
//!
//! # Architecture
//!
//! ```text
//! Session API ─┐
//!              ├─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► Transport
//! Liveness ────┘
//! ```
//!
//! Queued frames are batched into vectored writes, and a pending counter
//! provides backpressure with a configurable limit.

use std::io::IoSlice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{LinkError, Result};

/// Default maximum pending frames before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 64;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Default backpressure timeout.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 16;

/// A wire frame queued for the transport.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// SOP-to-EOP bytes, already stuffed.
    pub bytes: Bytes,
}

impl OutboundFrame {
    /// Queue an already wrapped frame.
    #[inline]
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }

    /// Size of this frame on the wire.
    #[inline]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

impl From<Bytes> for OutboundFrame {
    fn from(bytes: Bytes) -> Self {
        Self::new(bytes)
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Maximum pending frames before backpressure kicks in.
    pub max_pending_frames: usize,
    /// Channel capacity for frame queue.
    pub channel_capacity: usize,
    /// Timeout when waiting for backpressure to clear.
    pub backpressure_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
        }
    }
}

/// Handle for sending frames to the writer task.
///
/// This is cheaply cloneable and can be shared across tasks.
#[derive(Clone)]
pub struct WriterHandle {
    /// Channel sender for frames.
    tx: mpsc::Sender<OutboundFrame>,
    /// Pending frame count (for backpressure).
    pending: Arc<AtomicUsize>,
    /// Maximum pending frames.
    max_pending: usize,
    /// Backpressure timeout.
    timeout: Duration,
}

impl WriterHandle {
    fn new(
        tx: mpsc::Sender<OutboundFrame>,
        pending: Arc<AtomicUsize>,
        max_pending: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            tx,
            pending,
            max_pending,
            timeout,
        }
    }

    /// Send a frame to the writer task.
    ///
    /// Waits while backpressure is active, timing out after the configured
    /// duration.
    pub async fn send(&self, frame: impl Into<OutboundFrame>) -> Result<()> {
        if self.pending.load(Ordering::Acquire) >= self.max_pending {
            self.wait_for_backpressure().await?;
        }

        // Increment pending count BEFORE sending
        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.send(frame.into()).await.map_err(|_| {
            self.pending.fetch_sub(1, Ordering::Release);
            LinkError::ConnectionClosed
        })
    }

    /// Wait for backpressure to clear with timeout.
    async fn wait_for_backpressure(&self) -> Result<()> {
        let start = Instant::now();
        let check_interval = Duration::from_millis(1);

        loop {
            if self.pending.load(Ordering::Acquire) < self.max_pending {
                return Ok(());
            }

            if self.tx.is_closed() {
                return Err(LinkError::ConnectionClosed);
            }

            if start.elapsed() > self.timeout {
                return Err(LinkError::BackpressureTimeout);
            }

            tokio::time::sleep(check_interval).await;
        }
    }

    /// Try to send a frame without waiting for backpressure.
    ///
    /// Returns `Err(BackpressureTimeout)` immediately if at capacity.
    pub fn try_send(&self, frame: impl Into<OutboundFrame>) -> Result<()> {
        if self.pending.load(Ordering::Acquire) >= self.max_pending {
            return Err(LinkError::BackpressureTimeout);
        }

        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.try_send(frame.into()).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::Release);
            match e {
                mpsc::error::TrySendError::Full(_) => LinkError::BackpressureTimeout,
                mpsc::error::TrySendError::Closed(_) => LinkError::ConnectionClosed,
            }
        })
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.pending.load(Ordering::Acquire) >= self.max_pending
    }

    /// Get current pending frame count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Whether the writer task has stopped.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task ends cleanly when every handle is dropped or when `shutdown`
/// flips to `true`; frames still queued at that point are dropped.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
    shutdown: watch::Receiver<bool>,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle::new(
        tx,
        pending.clone(),
        config.max_pending_frames,
        config.backpressure_timeout,
    );

    let task = tokio::spawn(writer_loop(rx, writer, pending, shutdown));

    (handle, task)
}

/// Main writer loop - receives frames and writes them to the transport.
async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        if *shutdown.borrow() {
            tracing::debug!("Writer stopping on shutdown");
            return Ok(());
        }

        let first = tokio::select! {
            frame = rx.recv() => match frame {
                Some(f) => f,
                // Channel closed, clean shutdown
                None => return Ok(()),
            },
            changed = shutdown.changed() => {
                // A dropped sender means the session is gone.
                if changed.is_err() {
                    return Ok(());
                }
                continue;
            }
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        let batch_size = batch.len();
        write_batch(&mut writer, &batch).await?;

        pending.fetch_sub(batch_size, Ordering::Release);
    }
}

/// Write a batch of frames using scatter/gather I/O (write_vectored).
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(OutboundFrame::size).sum();
    if total_size == 0 {
        return Ok(());
    }

    let mut total_written = 0;

    while total_written < total_size {
        let slices = remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for the data not yet written.
fn remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut offset = 0;

    for frame in batch {
        let start = offset;
        let end = offset + frame.size();
        offset = end;

        if frame.bytes.is_empty() || skip_bytes >= end {
            continue;
        }
        let from = skip_bytes.saturating_sub(start);
        slices.push(IoSlice::new(&frame.bytes[from..]));
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::{duplex, AsyncReadExt};

    use crate::protocol::MessageBuilder;

    fn no_shutdown() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    fn status_frame() -> Bytes {
        MessageBuilder::default().status_request()
    }

    #[test]
    fn test_writer_config_default() {
        let config = WriterConfig::default();
        assert_eq!(config.max_pending_frames, DEFAULT_MAX_PENDING_FRAMES);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.backpressure_timeout, DEFAULT_BACKPRESSURE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_writer_handle_send() {
        let (client, mut server) = duplex(4096);
        let (_stop, shutdown) = no_shutdown();
        let (handle, _task) = spawn_writer_task(client, WriterConfig::default(), shutdown);

        let frame = status_frame();
        handle.send(frame.clone()).await.unwrap();

        let mut buf = vec![0u8; frame.len()];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[..], &frame[..]);
    }

    #[tokio::test]
    async fn test_writer_preserves_order() {
        let (client, mut server) = duplex(4096);
        let (_stop, shutdown) = no_shutdown();
        let (handle, _task) = spawn_writer_task(client, WriterConfig::default(), shutdown);

        let builder = MessageBuilder::default();
        let frames: Vec<Bytes> = (0..10u8).map(|i| builder.frame(25, &[i; 4])).collect();
        for frame in &frames {
            handle.send(frame.clone()).await.unwrap();
        }

        let expected: Vec<u8> = frames.iter().flat_map(|f| f.iter().copied()).collect();
        let mut buf = vec![0u8; expected.len()];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, expected);
    }

    #[tokio::test]
    async fn test_writer_handle_pending_count() {
        let (client, _server) = duplex(4096);
        let (_stop, shutdown) = no_shutdown();
        let (handle, _task) = spawn_writer_task(client, WriterConfig::default(), shutdown);

        assert_eq!(handle.pending_count(), 0);
        assert!(!handle.is_backpressure_active());
    }

    #[tokio::test]
    async fn test_try_send_at_capacity() {
        let (tx, _rx) = mpsc::channel::<OutboundFrame>(10);
        let pending = Arc::new(AtomicUsize::new(8));

        let handle = WriterHandle::new(tx, pending, 8, Duration::from_secs(1));

        let result = handle.try_send(status_frame());
        assert!(matches!(result, Err(LinkError::BackpressureTimeout)));
    }

    #[tokio::test]
    async fn test_send_after_writer_gone() {
        let (tx, rx) = mpsc::channel::<OutboundFrame>(10);
        drop(rx);
        let handle = WriterHandle::new(tx, Arc::new(AtomicUsize::new(0)), 8, Duration::from_secs(1));

        let result = handle.send(status_frame()).await;
        assert!(matches!(result, Err(LinkError::ConnectionClosed)));
        assert_eq!(handle.pending_count(), 0);
        assert!(handle.is_closed());
    }

    #[test]
    fn test_remaining_slices() {
        let batch = vec![
            OutboundFrame::new(Bytes::from_static(b"abcd")),
            OutboundFrame::new(Bytes::from_static(b"efg")),
        ];

        let all = remaining_slices(&batch, 0);
        assert_eq!(all.len(), 2);

        let partial = remaining_slices(&batch, 2);
        assert_eq!(partial.len(), 2);
        assert_eq!(&*partial[0], b"cd");

        let second_only = remaining_slices(&batch, 5);
        assert_eq!(second_only.len(), 1);
        assert_eq!(&*second_only[0], b"fg");
    }

    #[tokio::test]
    async fn test_write_batch_multiple() {
        let mut buf = Cursor::new(Vec::new());

        let batch: Vec<_> = (0..5).map(|_| OutboundFrame::new(status_frame())).collect();
        write_batch(&mut buf, &batch).await.unwrap();

        assert_eq!(buf.into_inner().len(), 5 * status_frame().len());
    }

    #[tokio::test]
    async fn test_writer_shutdown_on_channel_close() {
        let (client, _server) = duplex(4096);
        let (_stop, shutdown) = no_shutdown();
        let (handle, task) = spawn_writer_task(client, WriterConfig::default(), shutdown);

        drop(handle);

        let result = task.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_writer_stops_on_shutdown_signal() {
        let (client, _server) = duplex(4096);
        let (stop, shutdown) = no_shutdown();
        let (handle, task) = spawn_writer_task(client, WriterConfig::default(), shutdown);

        stop.send(true).unwrap();

        let result = task.await.unwrap();
        assert!(result.is_ok());
        assert!(handle.is_closed());
    }
}
