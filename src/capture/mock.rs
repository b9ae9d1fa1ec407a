//! Scripted capture source for testing
//!
//! Behaves like a real hook (blocks in `start` until `stop`, filters by the
//! allow-list, offers keys through the handoff) but keys are pressed by the
//! test instead of the OS.

use super::{CaptureError, CaptureSource, KeyHandoff, StopSignal};
use crate::key::KeyCode;
use std::sync::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;

pub struct MockCapture {
    hook: Mutex<Option<(Vec<KeyCode>, KeyHandoff)>>,
    started: watch::Sender<bool>,
    stop: StopSignal,
    fail_install: bool,
}

impl MockCapture {
    pub fn new() -> Self {
        Self {
            hook: Mutex::new(None),
            started: watch::Sender::new(false),
            stop: StopSignal::new(),
            fail_install: false,
        }
    }

    /// A capture source whose hook installation always fails
    pub fn failing() -> Self {
        Self {
            fail_install: true,
            ..Self::new()
        }
    }

    /// Wait until `start` has installed the (simulated) hook
    pub async fn wait_started(&self) {
        let mut rx = self.started.subscribe();
        let _ = rx.wait_for(|started| *started).await;
    }

    /// Simulate the OS reporting a key-down.
    ///
    /// Keeps delivering after `stop`, like a hook that has not finished
    /// uninstalling. Returns whether the key reached the handoff slot.
    pub fn press(&self, key: KeyCode) -> bool {
        let hook = self.hook.lock().unwrap();
        match hook.as_ref() {
            Some((allowed, handoff)) if allowed.contains(&key) => handoff.offer(key),
            _ => false,
        }
    }
}

impl CaptureSource for MockCapture {
    fn start(&self, allowed: &[KeyCode], handoff: KeyHandoff) -> Result<(), CaptureError> {
        if self.fail_install {
            return Err(CaptureError::Install("mock hook refused".to_string()));
        }
        *self.hook.lock().unwrap() = Some((allowed.to_vec(), handoff));
        self.started.send_replace(true);

        Handle::current().block_on(self.stop.wait());
        Ok(())
    }

    fn stop(&self) {
        self.stop.fire();
    }
}
