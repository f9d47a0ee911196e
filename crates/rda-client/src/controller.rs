//! Foreground façade: connect, perform the RDA handshake, spawn the ingest
//! worker, and expose polling reads against the shared ring.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rda_proto::{discard_body, FrameHeader, MessageType, StartMessage};
use rda_ring::{AvailabilityCode, DataType, RingBuffer, RowView};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant as TokioInstant;
use tracing::{info, warn};

use crate::error::{ClientError, Result};
use crate::worker::{self, WorkerCommand};

/// Ring dimensions chosen by the caller before the channel count is known
/// from the server's start frame; `n_channels` itself is filled in at
/// handshake time.
#[derive(Debug, Clone, Copy)]
pub struct RingConfig {
    /// Rows the data section holds.
    pub buf_capacity: u64,
    /// Rows mirrored in the pocket for zero-copy wrap reads.
    pub pocket_capacity: u64,
}

struct WorkerHandle {
    join: JoinHandle<Result<()>>,
    commands: mpsc::Sender<WorkerCommand>,
}

/// Size of the worker's command channel. Only `Stop` and `SaveTimelog` ever
/// flow through it, so a small bound is plenty.
const COMMAND_CHANNEL_CAPACITY: usize = 4;

/// The controller owns the socket until streaming starts, at which point
/// the socket is handed to the ingest worker and the controller switches to
/// reading the shared ring only — it never touches the socket again while
/// streaming.
pub struct Controller {
    ring_path: PathBuf,
    timelog_path: PathBuf,
    ring_config: RingConfig,
    stream: Option<TcpStream>,
    ring: Option<Arc<RingBuffer>>,
    start_message: Option<StartMessage>,
    worker: Option<WorkerHandle>,
}

impl Controller {
    /// Open a TCP connection to `addr` and disable Nagle's algorithm. The
    /// ring will be created at `ring_path` once the server's start frame is
    /// known; `timelog_path` is where `stop_streaming(save_timelog=true)`
    /// writes its diagnostic put-timestamp log.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        ring_path: impl Into<PathBuf>,
        timelog_path: impl Into<PathBuf>,
        ring_config: RingConfig,
    ) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        info!("connected to RDA server");
        Ok(Controller {
            ring_path: ring_path.into(),
            timelog_path: timelog_path.into(),
            ring_config,
            stream: Some(stream),
            ring: None,
            start_message: None,
            worker: None,
        })
    }

    /// Perform the start → data* handshake, allocate the
    /// ring once `nChannels` is known, and spawn the ingest worker.
    ///
    /// Fails with [`ClientError::AlreadyStreaming`] if a worker is already
    /// running, or [`ClientError::HandshakeTimeout`] if neither a start
    /// frame nor a resumed float-data frame arrives within `timeout`.
    pub async fn start_streaming(&mut self, timeout: Duration) -> Result<()> {
        if self.worker.is_some() {
            return Err(ClientError::AlreadyStreaming);
        }
        let mut stream = self.stream.take().ok_or(ClientError::NotStreaming)?;

        let handshake = tokio::time::timeout(timeout, async {
            loop {
                let header = FrameHeader::read_from(&mut stream).await?;
                match MessageType::from_u32(header.n_type) {
                    MessageType::Start => {
                        let msg = StartMessage::read(&mut stream, &header).await?;
                        return Ok::<_, ClientError>(msg);
                    }
                    MessageType::FloatData if self.start_message.is_some() => {
                        info!("resumed session: float data arrived without a new start frame");
                        discard_body(&mut stream, &header).await?;
                        return Ok(self.start_message.clone().expect("checked above"));
                    }
                    _ => {
                        discard_body(&mut stream, &header).await?;
                    }
                }
            }
        })
        .await;

        let start_message = match handshake {
            Ok(result) => result?,
            Err(_) => {
                self.stream = Some(stream);
                return Err(ClientError::HandshakeTimeout(timeout));
            }
        };

        let ring = match &self.ring {
            Some(ring) => Arc::clone(ring),
            None => {
                let ring = RingBuffer::initialize(
                    &self.ring_path,
                    start_message.n_channels as u64,
                    self.ring_config.buf_capacity,
                    self.ring_config.pocket_capacity,
                    DataType::F32,
                )?;
                let ring = Arc::new(ring);
                self.ring = Some(Arc::clone(&ring));
                ring
            }
        };

        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let n_channels = start_message.n_channels;
        let worker_ring = Arc::clone(&ring);
        let join = tokio::spawn(worker::run(stream, worker_ring, n_channels, rx));

        self.worker = Some(WorkerHandle { join, commands: tx });
        self.start_message = Some(start_message);
        info!(n_channels, "ingest worker started");
        Ok(())
    }

    /// Send `stop` (and optionally `save_timelog`) to the worker and join
    /// it. Fails with [`ClientError::NotStreaming`] if no worker is
    /// running.
    pub async fn stop_streaming(&mut self, save_timelog: bool) -> Result<()> {
        let handle = self.worker.take().ok_or(ClientError::NotStreaming)?;
        let _ = handle.commands.send(WorkerCommand::Stop).await;
        if save_timelog {
            let _ = handle
                .commands
                .send(WorkerCommand::SaveTimelog(self.timelog_path.clone()))
                .await;
        }
        let outcome = handle.join.await.map_err(|_| ClientError::WorkerDead)?;
        outcome?;
        info!("ingest worker stopped");
        Ok(())
    }

    /// Close the socket. Only valid before `start_streaming` (once
    /// streaming, the socket belongs to the worker task and is closed when
    /// it exits); calling this while streaming returns
    /// [`ClientError::AlreadyStreaming`].
    pub fn disconnect(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(ClientError::AlreadyStreaming);
        }
        self.stream.take();
        Ok(())
    }

    /// Whether the ingest worker is still running.
    #[must_use]
    pub fn alive(&self) -> bool {
        matches!(&self.worker, Some(h) if !h.join.is_finished())
    }

    /// Cumulative number of samples ever written (exclusive upper bound of
    /// readable indices), or `0` before the first `put`.
    #[must_use]
    pub fn last_sample(&self) -> u64 {
        self.ring_ref().map_or(0, RingBuffer::samples_written)
    }

    /// Read rows `[start, end)`. Any error (not ready, overwritten,
    /// negative index, or no ring yet) is translated to an empty sentinel;
    /// callers distinguish "empty because error" from "empty because
    /// `start == end`" via [`Controller::last_sample`].
    #[must_use]
    pub fn get(&self, start: i64, end: i64) -> RowView<'_> {
        self.ring_ref()
            .and_then(|ring| ring.get(start, end).ok())
            .unwrap_or(RowView::Borrowed(&[]))
    }

    /// Poll `ring.get(start, end)` until it succeeds, the span is reported
    /// overwritten (return empty immediately), or `timeout` elapses
    /// (return empty). The only intentional busy-wait in this crate.
    pub async fn wait(&self, start: i64, end: i64, timeout: Duration, sleep: Duration) -> RowView<'_> {
        let Some(ring) = self.ring_ref() else {
            return RowView::Borrowed(&[]);
        };
        let deadline = TokioInstant::now() + timeout;
        loop {
            match ring.check_availability(start, end) {
                AvailabilityCode::Ok => {
                    return ring.get(start, end).unwrap_or(RowView::Borrowed(&[]))
                }
                AvailabilityCode::Overwritten | AvailabilityCode::NegativeIndex => {
                    return RowView::Borrowed(&[])
                }
                AvailabilityCode::NotReady => {
                    if TokioInstant::now() >= deadline {
                        return RowView::Borrowed(&[]);
                    }
                    tokio::time::sleep(sleep).await;
                }
            }
        }
    }

    /// Wait for at least one new sample, then return the most recent
    /// `n_samples` rows ending at the new [`Controller::last_sample`].
    pub async fn poll(&self, n_samples: u64, timeout: Duration, sleep: Duration) -> RowView<'_> {
        let Some(ring) = self.ring_ref() else {
            return RowView::Borrowed(&[]);
        };
        let ls = ring.samples_written();
        let _ = self.wait(ls as i64, ls as i64 + 1, timeout, sleep).await;
        let latest = ring.samples_written();
        if latest <= ls {
            // timed out without a new sample.
            warn!(last_sample = latest, "poll timed out waiting for a new sample");
            return RowView::Borrowed(&[]);
        }
        let start = latest.saturating_sub(n_samples) as i64;
        ring.get(start, latest as i64).unwrap_or(RowView::Borrowed(&[]))
    }

    fn ring_ref(&self) -> Option<&RingBuffer> {
        self.ring.as_deref()
    }
}
