//! Capture Source abstraction
//!
//! A capture source watches the OS input stream for a fixed allow-list of key
//! codes and hands every matching key-down to a single consumer.
//!
//! - `start` blocks the calling thread (OS hooks are tied to the thread that
//!   installed them), so callers run it on a dedicated blocking thread.
//! - `stop` may be called from any thread, any number of times.
//! - Delivery goes through `KeyHandoff`, a single-slot channel whose producer
//!   side never blocks: a key arriving while the previous one is still pending
//!   is dropped. Blocking inside an OS hook callback stalls input system-wide.

#[cfg(test)]
mod mock;
#[cfg(unix)]
mod linux;
#[cfg(windows)]
mod windows;

#[cfg(test)]
pub use mock::MockCapture;
#[cfg(unix)]
pub use linux::Capture;
#[cfg(windows)]
pub use windows::Capture;

use crate::key::KeyCode;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to install keyboard hook: {0}")]
    Install(String),

    #[error("input device error: {0}")]
    Device(#[from] std::io::Error),

    #[error("capture thread failed: {0}")]
    Thread(#[from] tokio::task::JoinError),
}

/// Interface contract for input capture implementations.
pub trait CaptureSource: Send + Sync + 'static {
    /// Install the input hook and pump events until `stop` is called.
    ///
    /// Only key-down events whose code is in `allowed` are offered to
    /// `handoff`. Installation failure is returned immediately.
    fn start(&self, allowed: &[KeyCode], handoff: KeyHandoff) -> Result<(), CaptureError>;

    /// Ask a running (or future) `start` call to unwind and uninstall its hook.
    fn stop(&self);
}

/// Producer side of the single-slot key handoff
#[derive(Debug, Clone)]
pub struct KeyHandoff {
    tx: mpsc::Sender<KeyCode>,
}

impl KeyHandoff {
    /// Offer a captured key to the consumer without blocking.
    ///
    /// Returns false when the key was dropped, either because the previous key
    /// has not been drained yet or because the consumer is gone.
    pub fn offer(&self, key: KeyCode) -> bool {
        match self.tx.try_send(key) {
            Ok(()) => true,
            Err(TrySendError::Full(key)) => {
                trace!(%key, "consumer busy, dropping captured key");
                false
            }
            Err(TrySendError::Closed(key)) => {
                trace!(%key, "consumer gone, dropping captured key");
                false
            }
        }
    }
}

/// Create a single-slot handoff channel
pub fn handoff() -> (KeyHandoff, mpsc::Receiver<KeyCode>) {
    let (tx, rx) = mpsc::channel(1);
    (KeyHandoff { tx }, rx)
}

/// Latching stop flag that blocking capture loops can wait on
#[cfg(any(unix, test))]
#[derive(Debug)]
pub(crate) struct StopSignal(tokio::sync::watch::Sender<bool>);

#[cfg(any(unix, test))]
impl StopSignal {
    pub fn new() -> Self {
        Self(tokio::sync::watch::Sender::new(false))
    }

    pub fn fire(&self) {
        self.0.send_replace(true);
    }

    /// Resolves once `fire` has been called, including before this call
    pub async fn wait(&self) {
        let mut rx = self.0.subscribe();
        // The sender lives in self, so the channel cannot close under us
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}
