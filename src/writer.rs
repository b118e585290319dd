//! Dedicated writer task for the outbound frame path.
//!
//! All channels of a connection share one ordered byte stream, and a
//! method's bytes must never interleave with another's. Instead of an
//! `Arc<Mutex<W>>` around the write half, a dedicated task owns it and
//! receives work over an mpsc channel:
//!
//! ```text
//! Channel 1 ─┐
//! Channel 2 ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► Stream
//! Channel N ─┘
//! ```
//!
//! Each [`OutboundFrame`] is written whole, so submission order is wire
//! order and a multi-frame unit (publish's method + header + body) stays
//! contiguous. Ready frames are batched into a single vectored write.

use std::io::IoSlice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{AmqpError, Result};

/// Default maximum pending frames before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 1024;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default backpressure timeout.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum outbound units to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// One unit of outbound work: one wire frame, or several that must stay
/// contiguous on the stream.
#[derive(Debug)]
pub struct OutboundFrame {
    frames: Vec<Bytes>,
}

impl OutboundFrame {
    /// A single pre-encoded wire frame.
    pub fn single(frame: Bytes) -> Self {
        Self {
            frames: vec![frame],
        }
    }

    /// Several wire frames written back to back with nothing in between.
    ///
    /// `basic.publish` uses this for its method + header + body sequence.
    pub fn group(frames: Vec<Bytes>) -> Self {
        Self { frames }
    }

    /// Total wire size of this unit.
    #[inline]
    pub fn size(&self) -> usize {
        self.frames.iter().map(|f| f.len()).sum()
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum pending frames before backpressure kicks in.
    pub max_pending_frames: usize,
    /// Channel capacity for the frame queue.
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

/// Handle for submitting frames to the writer task.
///
/// Cheaply cloneable; every channel of a connection holds one.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
    pending: Arc<AtomicUsize>,
    max_pending: usize,
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

    /// Submit a frame to the writer task.
    ///
    /// Waits if backpressure is active, timing out after the configured
    /// duration. Fails with `ConnectionClosed` once the writer task is
    /// gone.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        let current = self.pending.load(Ordering::Acquire);
        if current >= self.max_pending {
            self.wait_for_backpressure().await?;
        }

        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.send(frame).await.map_err(|_| {
            self.pending.fetch_sub(1, Ordering::Release);
            AmqpError::ConnectionClosed
        })
    }

    /// Wait for backpressure to clear with timeout.
    async fn wait_for_backpressure(&self) -> Result<()> {
        let start = Instant::now();
        let check_interval = Duration::from_micros(100);

        loop {
            if self.pending.load(Ordering::Acquire) < self.max_pending {
                return Ok(());
            }

            if start.elapsed() > self.timeout {
                return Err(AmqpError::BackpressureTimeout);
            }

            tokio::time::sleep(check_interval).await;
        }
    }

    /// Try to submit without waiting for backpressure.
    pub fn try_send(&self, frame: OutboundFrame) -> Result<()> {
        let current = self.pending.load(Ordering::Acquire);
        if current >= self.max_pending {
            return Err(AmqpError::BackpressureTimeout);
        }

        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.try_send(frame).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::Release);
            match e {
                mpsc::error::TrySendError::Full(_) => AmqpError::BackpressureTimeout,
                mpsc::error::TrySendError::Closed(_) => AmqpError::ConnectionClosed,
            }
        })
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.pending.load(Ordering::Acquire) >= self.max_pending
    }

    /// Get the current pending frame count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

/// Spawn the writer task and return a handle for submitting frames.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle::new(
        tx,
        pending.clone(),
        config.max_pending_frames,
        config.backpressure_timeout,
    );

    let task = tokio::spawn(writer_loop(rx, writer, pending));

    (handle, task)
}

/// Main writer loop - receives frame units and writes them to the stream.
async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(f) => f,
            None => {
                // Channel closed, clean shutdown.
                return Ok(());
            }
        };

        // Collect additional ready units (non-blocking).
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

/// Write a batch of frame units using scatter/gather I/O.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let chunks: Vec<&Bytes> = batch.iter().flat_map(|u| u.frames.iter()).collect();
    let total_size: usize = chunks.iter().map(|c| c.len()).sum();

    let slices: Vec<IoSlice<'_>> = chunks.iter().map(|c| IoSlice::new(c)).collect();

    // Fast path: the whole batch usually fits one vectored write.
    let written = writer.write_vectored(&slices).await?;

    if written == total_size {
        writer.flush().await?;
        return Ok(());
    }

    if written == 0 {
        return Err(AmqpError::Io(std::io::Error::new(
            std::io::ErrorKind::WriteZero,
            "write_vectored returned 0",
        )));
    }

    // Slow path: partial write, continue with the remaining bytes.
    let mut total_written = written;

    while total_written < total_size {
        let remaining_slices = build_remaining_slices(&chunks, total_written);
        if remaining_slices.is_empty() {
            break;
        }

        let written = writer.write_vectored(&remaining_slices).await?;
        if written == 0 {
            return Err(AmqpError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }

        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build the IoSlice array for the data left after a partial write.
fn build_remaining_slices<'a>(chunks: &[&'a Bytes], skip_bytes: usize) -> Vec<IoSlice<'a>> {
    let mut slices = Vec::with_capacity(chunks.len());
    let mut skipped = 0;

    for chunk in chunks {
        let chunk_end = skipped + chunk.len();
        if skip_bytes < chunk_end {
            let start_in_chunk = skip_bytes.saturating_sub(skipped);
            slices.push(IoSlice::new(&chunk[start_in_chunk..]));
        }
        skipped = chunk_end;
    }

    slices
}
