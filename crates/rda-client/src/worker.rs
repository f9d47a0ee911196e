//! Background ingest loop: reads RDA frames off a socket and deposits
//! float-data blocks into the shared ring, until told to stop.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rda_proto::{read_frame, Frame};
use rda_ring::RingBuffer;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};

/// Commands the controller sends to a running ingest worker over its
/// bounded command channel. No reply is ever sent back.
#[derive(Debug)]
pub enum WorkerCommand {
    /// Stop draining the socket and exit the read loop.
    Stop,
    /// Once stopped, write the put-timestamp diagnostic log to this path.
    SaveTimelog(PathBuf),
}

/// Lifecycle state of the ingest loop:
/// `Init -> Running <-> Running -> Draining -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    Init,
    Running,
    Draining,
    Stopped,
}

/// Matches the reference implementation's `deque(maxlen=100000)` time-log.
const TIMELOG_CAPACITY: usize = 100_000;
/// Grace period after observing a stop so an in-flight `put` can finish
/// committing before the socket is dropped.
const DRAIN_GRACE: Duration = Duration::from_millis(20);

/// Run the ingest loop against `socket`, depositing float-data blocks into
/// `ring` until a stop arrives (via `commands` or the server itself) or the
/// connection ends unexpectedly.
///
/// Returns `Ok(())` on a clean stop. An `Err` return means the socket ended
/// or a frame could not be decoded — an unexpected EOF is fatal:
/// the controller is expected to observe this through [`crate::Controller::alive`]
/// rather than have it raised into it directly.
pub async fn run<R>(
    mut socket: R,
    ring: Arc<RingBuffer>,
    n_channels: u32,
    mut commands: mpsc::Receiver<WorkerCommand>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut state = WorkerState::Running;
    let mut timelog: VecDeque<Instant> = VecDeque::new();
    let mut pending_save: Option<PathBuf> = None;

    let result = loop {
        tokio::select! {
            biased;
            cmd = commands.recv() => {
                match cmd {
                    Some(WorkerCommand::Stop) | None => {
                        state = WorkerState::Draining;
                        sleep(DRAIN_GRACE).await;
                        break Ok(());
                    }
                    Some(WorkerCommand::SaveTimelog(path)) => {
                        pending_save = Some(path);
                    }
                }
            }
            frame = read_frame(&mut socket, Some(n_channels)) => {
                match frame {
                    Ok((_, Frame::FloatData(data))) => {
                        match ring.put(&data.samples) {
                            Ok(()) => push_timelog(&mut timelog, Instant::now()),
                            Err(e) => warn!(error = %e, "dropping float data block"),
                        }
                    }
                    Ok((_, Frame::Stop)) => {
                        info!("server sent a stop frame");
                        state = WorkerState::Draining;
                        sleep(DRAIN_GRACE).await;
                        break Ok(());
                    }
                    Ok((_, Frame::Start(_))) => {
                        warn!("unexpected start frame mid-stream; ignoring");
                    }
                    Ok((_, Frame::IntData | Frame::Unknown(_))) => {
                        debug!("skipped non-float frame");
                    }
                    Err(e) => break Err(ClientError::from(e)),
                }
            }
        }
    };

    state = WorkerState::Stopped;
    debug!(?state, "ingest worker exiting");

    // Exactly one post-exit command may still be queued.
    if let Ok(WorkerCommand::SaveTimelog(path)) = commands.try_recv() {
        pending_save = Some(path);
    }
    if let Some(path) = pending_save {
        write_timelog(&path, &timelog)?;
    }

    result
}

fn push_timelog(log: &mut VecDeque<Instant>, at: Instant) {
    if log.len() >= TIMELOG_CAPACITY {
        log.pop_front();
    }
    log.push_back(at);
}

fn write_timelog(path: &Path, log: &VecDeque<Instant>) -> Result<()> {
    use std::io::Write;
    let start = log.front().copied().unwrap_or_else(Instant::now);
    let mut out = std::fs::File::create(path)?;
    for instant in log {
        writeln!(out, "{}", instant.duration_since(start).as_millis())?;
    }
    Ok(())
}
