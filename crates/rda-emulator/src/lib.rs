//! Reference RDA server emulator.
//!
//! Speaks just enough of the protocol to drive a real client end to end:
//! send one start frame, then float-data blocks of a noisy sinusoid at a
//! configured block size and sampling rate, until asked to stop, then one
//! stop frame. It exists only so `rda-client`'s integration tests and
//! `rda-ring`'s benchmarks have something real to dial into — it is not a
//! product surface of this workspace.

use std::f64::consts::TAU;
use std::time::Duration;

use rand::Rng;
use rda_proto::{encode_stop, write_frame, FloatDataMessage, ProtoError, StartMessage};
use tokio::io::AsyncWrite;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::interval;
use tracing::{debug, info};

/// BrainVision's real-world default RDA port, kept as this emulator's
/// default so a quick manual run looks like talking to a real amplifier.
pub const DEFAULT_PORT: u16 = 51244;

/// Parameters for one emulated streaming session.
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    /// Number of channels to announce in the start frame and stream.
    pub n_channels: u32,
    /// Sampling interval, in milliseconds, reported in the start frame.
    pub sampling_interval_ms: f64,
    /// Samples per channel sent in each float-data block.
    pub block_size: u32,
    /// Sinusoid frequency, in Hz, shared by every channel (each channel is
    /// phase-shifted so they are visibly distinct).
    pub signal_hz: f64,
    /// Peak noise amplitude added to the sinusoid, uniformly distributed.
    pub noise_amplitude: f32,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        EmulatorConfig {
            n_channels: 4,
            sampling_interval_ms: 2.0,
            block_size: 10,
            signal_hz: 10.0,
            noise_amplitude: 0.05,
        }
    }
}

/// Accept exactly one connection on `listener` and stream a session to it
/// per `config`, until `stop` fires.
pub async fn accept_and_run(
    listener: TcpListener,
    config: EmulatorConfig,
    stop: oneshot::Receiver<()>,
) -> Result<(), ProtoError> {
    let (socket, peer) = listener.accept().await?;
    info!(%peer, "rda-emulator accepted a connection");
    run(socket, config, stop).await
}

/// Stream one session over `sink`: a start frame, float-data blocks at the
/// configured rate, and a stop frame once `stop` fires or is dropped.
pub async fn run<W: AsyncWrite + Unpin>(
    mut sink: W,
    config: EmulatorConfig,
    mut stop: oneshot::Receiver<()>,
) -> Result<(), ProtoError> {
    let start = StartMessage {
        n_channels: config.n_channels,
        d_sampling_interval: config.sampling_interval_ms,
        d_resolutions: vec![1.0; config.n_channels as usize],
        channel_names: (1..=config.n_channels).map(|c| c.to_string()).collect(),
    };
    write_frame(&mut sink, &start.encode()).await?;
    info!(n_channels = config.n_channels, "rda-emulator sent start frame");

    let block_period =
        Duration::from_secs_f64(config.sampling_interval_ms / 1000.0 * f64::from(config.block_size));
    let mut ticker = interval(block_period.max(Duration::from_micros(1)));
    let mut rng = rand::thread_rng();
    let mut block: u32 = 0;
    let mut samples_sent: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            _ = ticker.tick() => {
                let samples = synthesize_block(&config, samples_sent, &mut rng);
                let msg = FloatDataMessage {
                    n_block: block,
                    n_points: config.block_size,
                    samples,
                    markers: Vec::new(),
                };
                write_frame(&mut sink, &msg.encode(config.n_channels)).await?;
                block = block.wrapping_add(1);
                samples_sent += u64::from(config.block_size);
                debug!(block, samples_sent, "rda-emulator sent a float data block");
            }
        }
    }

    write_frame(&mut sink, &encode_stop()).await?;
    info!(samples_sent, "rda-emulator sent stop frame");
    Ok(())
}

fn synthesize_block(config: &EmulatorConfig, start_sample: u64, rng: &mut impl Rng) -> Vec<f32> {
    let dt = config.sampling_interval_ms / 1000.0;
    let mut out =
        Vec::with_capacity(config.block_size as usize * config.n_channels as usize);
    for p in 0..u64::from(config.block_size) {
        let t = (start_sample + p) as f64 * dt;
        for ch in 0..config.n_channels {
            let phase = TAU * config.signal_hz * t + f64::from(ch) * 0.3;
            let noise = if config.noise_amplitude > 0.0 {
                rng.gen_range(-config.noise_amplitude..=config.noise_amplitude)
            } else {
                0.0
            };
            out.push(phase.sin() as f32 + noise);
        }
    }
    out
}
