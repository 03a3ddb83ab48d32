//! Unix signal handling.
//!
//! A background thread turns signals into [`SignalMessage`]s on a channel. The
//! control loop waits on that channel with a timeout, so a signal also wakes
//! the loop early.
//!
//! - SIGINT, SIGTERM, SIGHUP: shut down
//! - SIGUSR1: the durable clock was changed externally (`bugler set-time`)

use anyhow::{Context, Result};
use signal_hook::{
    consts::signal::{SIGHUP, SIGINT, SIGTERM, SIGUSR1},
    iterator::Signals,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalMessage {
    Shutdown,
    /// Re-read the durable clock
    TimeChange,
}

/// Signal handling state shared between the signal thread and the loop.
pub struct SignalState {
    pub running: Arc<AtomicBool>,
    pub signal_receiver: Receiver<SignalMessage>,
    /// Kept so tests and the simulator can inject messages
    pub signal_sender: Sender<SignalMessage>,
}

impl SignalState {
    /// A state with no OS signal thread behind it.
    pub fn detached() -> Self {
        let (signal_sender, signal_receiver) = channel();
        Self {
            running: Arc::new(AtomicBool::new(true)),
            signal_receiver,
            signal_sender,
        }
    }
}

pub fn setup_signal_handler(debug_enabled: bool) -> Result<SignalState> {
    let state = SignalState::detached();

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP, SIGUSR1])
        .context("failed to register signal handlers")?;

    let running = state.running.clone();
    let sender = state.signal_sender.clone();

    thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            for sig in signals.forever() {
                let message = match sig {
                    SIGUSR1 => {
                        log_pipe!();
                        log_info!("Received time change signal");
                        SignalMessage::TimeChange
                    }
                    SIGINT | SIGTERM | SIGHUP => {
                        if debug_enabled {
                            log_pipe!();
                            log_debug!("Received signal {sig}, shutting down");
                        }
                        running.store(false, Ordering::SeqCst);
                        SignalMessage::Shutdown
                    }
                    _ => continue,
                };

                let shutdown = message == SignalMessage::Shutdown;
                if sender.send(message).is_err() || shutdown {
                    break;
                }
            }
        })
        .context("failed to spawn signal thread")?;

    Ok(state)
}
