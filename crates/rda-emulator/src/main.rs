//! Standalone binary wrapping [`rda_emulator::accept_and_run`] for manual
//! testing against a real `rda-client` without a physical amplifier.

use anyhow::{Context, Result};
use rda_emulator::{EmulatorConfig, DEFAULT_PORT};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| format!("127.0.0.1:{DEFAULT_PORT}"));
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "rda-emulator listening");

    let (stop_tx, stop_rx) = oneshot::channel();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = stop_tx.send(());
    });

    rda_emulator::accept_and_run(listener, EmulatorConfig::default(), stop_rx).await?;
    Ok(())
}
