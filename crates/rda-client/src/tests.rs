use std::io::Cursor;
use std::sync::Arc;

use rda_proto::{encode_stop, FloatDataMessage};
use rda_ring::{DataType, RingBuffer};
use tempfile::tempdir;
use tokio::sync::mpsc;

use crate::worker::{run, WorkerCommand};

fn new_ring(n_channels: u64) -> (tempfile::TempDir, Arc<RingBuffer>) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ring.bin");
    let ring = RingBuffer::initialize(&path, n_channels, 100, 10, DataType::F32).unwrap();
    (dir, Arc::new(ring))
}

#[tokio::test]
async fn stop_command_ends_the_loop_cleanly() {
    let (_dir, ring) = new_ring(2);
    let (tx, rx) = mpsc::channel(4);
    tx.send(WorkerCommand::Stop).await.unwrap();

    let socket = Cursor::new(Vec::<u8>::new());
    let result = run(socket, ring, 2, rx).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn unexpected_eof_is_fatal() {
    let (_dir, ring) = new_ring(2);
    let (_tx, rx) = mpsc::channel(4);

    let socket = Cursor::new(Vec::<u8>::new());
    let result = run(socket, ring, 2, rx).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn float_data_frames_are_deposited_into_the_ring() {
    let (_dir, ring) = new_ring(2);
    // Keep the sender alive so the command channel never closes — the
    // loop should end on the socket's own stop frame instead.
    let (_tx, rx) = mpsc::channel(4);

    let data = FloatDataMessage {
        n_block: 0,
        n_points: 3,
        samples: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        markers: vec![],
    };
    let mut bytes = data.encode(2);
    bytes.extend_from_slice(&encode_stop());
    let socket = Cursor::new(bytes);

    let result = run(socket, Arc::clone(&ring), 2, rx).await;
    assert!(result.is_ok());
    assert_eq!(ring.samples_written(), 3);
    let view = ring.get(0, 3).unwrap();
    assert_eq!(&*view, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0][..]);
}

#[tokio::test]
async fn server_stop_frame_wins_a_race_against_a_pending_command() {
    // The command channel outranks the socket (the select is biased toward
    // it), but with no command ever sent the server's own stop frame must
    // still end the loop rather than the worker spinning forever.
    let (_dir, ring) = new_ring(1);
    let (_tx, rx) = mpsc::channel(4);
    let socket = Cursor::new(encode_stop());

    let result = run(socket, ring, 1, rx).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn save_timelog_command_writes_a_diagnostic_file_after_stop() {
    // The command channel is checked before the socket on every loop
    // iteration, so a queued SaveTimelog lands before the data frame below
    // is even read — it only sets a flag, the file itself is written once
    // the loop actually exits on the encoded stop frame that follows.
    let (_dir, ring) = new_ring(2);
    let (tx, rx) = mpsc::channel(4);

    let data = FloatDataMessage {
        n_block: 0,
        n_points: 1,
        samples: vec![1.0, 2.0],
        markers: vec![],
    };
    let mut bytes = data.encode(2);
    bytes.extend_from_slice(&encode_stop());
    let socket = Cursor::new(bytes);

    let log_dir = tempdir().unwrap();
    let log_path = log_dir.path().join("timelog.log");
    tx.send(WorkerCommand::SaveTimelog(log_path.clone()))
        .await
        .unwrap();

    let result = run(socket, ring, 2, rx).await;
    assert!(result.is_ok());
    assert_eq!(ring.samples_written(), 1);

    let contents = std::fs::read_to_string(&log_path).unwrap();
    assert_eq!(contents.lines().count(), 1);
}

#[tokio::test]
async fn unknown_frame_types_are_skipped_without_ending_the_loop() {
    let (_dir, ring) = new_ring(1);
    // Kept alive and never sent to: the command branch must stay pending
    // so the unknown frame is skipped and the loop reaches the real stop
    // frame on its own.
    let (_tx, rx) = mpsc::channel(4);

    let mut bytes = Vec::new();
    bytes.extend_from_slice(
        &rda_proto::FrameHeader {
            guid: rda_proto::RDA_GUID,
            n_size: rda_proto::HEADER_SIZE as u32 + 4,
            n_type: 10_000,
        }
        .to_bytes(),
    );
    bytes.extend_from_slice(&[0, 1, 2, 3]);
    bytes.extend_from_slice(&encode_stop());

    let socket = Cursor::new(bytes);
    let result = run(socket, ring, 1, rx).await;
    assert!(result.is_ok());
}
