//! Device edge: the output sink the scheduler dispatches into, and live
//! input capture from the performer's device.
//!
//! The core only ever sees the `OutputDevice` trait and raw input bytes on a
//! channel; midir stays confined to this module.

use std::sync::Arc;

use crossbeam::channel::Sender;
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::CoreError;

/// Fire-and-forget MIDI sink. Delivery is at-least-once and non-blocking;
/// the core does not retry.
pub trait OutputDevice: Send {
    fn send(&mut self, message: &[u8], timestamp_ms: f64);
}

/// Output handle shared between the scheduler and the live performer's
/// controller-substitution path.
pub type SharedDevice = Arc<Mutex<Box<dyn OutputDevice>>>;

pub fn share(device: impl OutputDevice + 'static) -> SharedDevice {
    Arc::new(Mutex::new(Box::new(device)))
}

/// A midir-backed output connection.
pub struct MidirOutput {
    connection: MidiOutputConnection,
}

impl MidirOutput {
    /// Connect to the first output port, or the first whose name contains
    /// `port_hint`.
    pub fn connect(port_hint: Option<&str>) -> Result<Self, CoreError> {
        let output = MidiOutput::new("concertino").map_err(|e| CoreError::Device(e.to_string()))?;
        let ports = output.ports();
        let port = ports
            .iter()
            .find(|p| match (port_hint, output.port_name(p)) {
                (Some(hint), Ok(name)) => name.contains(hint),
                (None, _) => true,
                _ => false,
            })
            .ok_or_else(|| CoreError::Device("no matching MIDI output port".into()))?;
        let name = output
            .port_name(port)
            .unwrap_or_else(|_| "<unknown>".into());
        let connection = output
            .connect(port, "concertino")
            .map_err(|e| CoreError::Device(e.to_string()))?;
        info!(port = %name, "connected MIDI output");
        Ok(Self { connection })
    }
}

impl OutputDevice for MidirOutput {
    fn send(&mut self, message: &[u8], _timestamp_ms: f64) {
        if let Err(e) = self.connection.send(message) {
            warn!(error = %e, "MIDI send failed");
        }
    }
}

/// Keeps the live-input connection alive for the duration of a performance.
pub struct LiveInput {
    _connection: MidiInputConnection<()>,
}

/// Capture the live performer's device into a channel of
/// `(raw bytes, receipt timestamp in ms)`.
pub fn capture_live_input(
    port_hint: Option<&str>,
    tx: Sender<(Vec<u8>, f64)>,
) -> Result<LiveInput, CoreError> {
    let mut input = MidiInput::new("concertino-in").map_err(|e| CoreError::Device(e.to_string()))?;
    input.ignore(Ignore::None);
    let ports = input.ports();
    let port = ports
        .iter()
        .find(|p| match (port_hint, input.port_name(p)) {
            (Some(hint), Ok(name)) => name.contains(hint),
            (None, _) => true,
            _ => false,
        })
        .ok_or_else(|| CoreError::Device("no matching MIDI input port".into()))?;
    let name = input.port_name(port).unwrap_or_else(|_| "<unknown>".into());
    let connection = input
        .connect(
            port,
            "concertino-in",
            move |timestamp_us, bytes, _| {
                let _ = tx.send((bytes.to_vec(), timestamp_us as f64 / 1000.0));
            },
            (),
        )
        .map_err(|e| CoreError::Device(e.to_string()))?;
    info!(port = %name, "listening for live performer input");
    Ok(LiveInput {
        _connection: connection,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Buffers every sent message for inspection.
    pub(crate) struct TestDevice {
        pub log: Arc<Mutex<Vec<(Vec<u8>, f64)>>>,
    }

    impl TestDevice {
        pub fn new() -> (Self, Arc<Mutex<Vec<(Vec<u8>, f64)>>>) {
            let log = Arc::new(Mutex::new(Vec::new()));
            (Self { log: log.clone() }, log)
        }
    }

    impl OutputDevice for TestDevice {
        fn send(&mut self, message: &[u8], timestamp_ms: f64) {
            self.log.lock().push((message.to_vec(), timestamp_ms));
        }
    }
}
