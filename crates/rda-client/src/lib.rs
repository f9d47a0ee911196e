//! Ingest worker and foreground controller for the BrainVision Remote Data
//! Access (RDA) streaming protocol.
//!
//! [`Controller`] connects to an RDA server, performs the start/data
//! handshake, and spawns a background ingest task (see [`worker`]) that
//! drains the socket into a shared [`rda_ring::RingBuffer`]. Consumers poll
//! the controller's [`Controller::get`]/[`Controller::wait`]/
//! [`Controller::poll`] methods for recent windows of samples; there is no
//! push-based subscription, since the ring's monotonic write counter is the
//! only signal shared across the controller/worker split.

mod controller;
mod error;
#[cfg(test)]
mod tests;
pub mod worker;

pub use controller::{Controller, RingConfig};
pub use error::{ClientError, Result};
pub use worker::WorkerCommand;
