//! Actuator abstraction: where dispatched action codes go.
//!
//! The controller fires and forgets. A sink takes an [`ActionCode`] and must
//! return quickly; it never reports whether the peer acted on it. Sinks that
//! talk over a bidirectional link may also surface inbound peer messages,
//! which the loop uses to flip the sunset switch.
//!
//! ## Sinks
//!
//! - **Serial**: peer microcontroller on a tty, `"<code>\n"` per action
//! - **Recorder**: external command run as `start`, wait, `stop`
//! - **Recording**: in-memory, for tests and simulation

use anyhow::Result;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::common::constants::*;
use crate::config::{Config, SinkKind};
use crate::scheduler::ActionCode;

pub mod recorder;
pub mod serial;

pub use recorder::RecorderSink;
pub use serial::SerialSink;

/// A line received from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerMessage {
    SunsetToggle,
    SunsetOn,
    SunsetOff,
    Ack,
    Other(String),
}

impl PeerMessage {
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            PEER_SUNSET_TOGGLE => PeerMessage::SunsetToggle,
            PEER_SUNSET_ON => PeerMessage::SunsetOn,
            PEER_SUNSET_OFF => PeerMessage::SunsetOff,
            PEER_ACK => PeerMessage::Ack,
            other => PeerMessage::Other(other.to_string()),
        }
    }
}

pub trait ActuatorSink {
    /// Hand an action to the actuator. Must not block on the peer.
    fn dispatch(&mut self, action: &ActionCode) -> Result<()>;

    /// Drain any complete inbound lines without blocking.
    fn poll_inbound(&mut self) -> Vec<PeerMessage> {
        Vec::new()
    }

    fn sink_name(&self) -> &'static str;

    /// Release the device or finish outstanding work at shutdown.
    fn cleanup(self: Box<Self>, debug_enabled: bool) {
        let _ = debug_enabled;
    }
}

/// Build the sink selected in the configuration.
pub fn create_sink(config: &Config, debug_enabled: bool) -> Result<Box<dyn ActuatorSink>> {
    match config.sink() {
        SinkKind::Serial => Ok(Box::new(SerialSink::open(
            config.serial_device(),
            config.baud_rate(),
            debug_enabled,
        )?)),
        SinkKind::Recorder => Ok(Box::new(RecorderSink::new(
            config.recorder_command(),
            config.recording_durations(),
            debug_enabled,
        ))),
    }
}

/// In-memory sink. Clones share storage, so a test can keep a handle while
/// the controller owns the boxed sink.
#[derive(Clone, Default)]
pub struct RecordingSink {
    dispatched: Arc<Mutex<Vec<ActionCode>>>,
    inbound: Arc<Mutex<VecDeque<PeerMessage>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatched(&self) -> Vec<ActionCode> {
        self.dispatched
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Codes dispatched so far as plain strings.
    pub fn codes(&self) -> Vec<String> {
        self.dispatched()
            .iter()
            .map(|a| a.as_str().to_string())
            .collect()
    }

    /// Queue a message the next `poll_inbound` will return.
    pub fn push_inbound(&self, message: PeerMessage) {
        self.inbound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(message);
    }
}

impl ActuatorSink for RecordingSink {
    fn dispatch(&mut self, action: &ActionCode) -> Result<()> {
        self.dispatched
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(action.clone());
        Ok(())
    }

    fn poll_inbound(&mut self) -> Vec<PeerMessage> {
        self.inbound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect()
    }

    fn sink_name(&self) -> &'static str {
        "memory"
    }
}
