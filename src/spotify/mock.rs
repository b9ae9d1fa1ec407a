//! Mock Web API for testing
//!
//! Records every call instead of talking to Spotify. Clones share state, so a
//! test keeps one handle while the controller owns another.

use super::{ApiError, Device, PlaybackApi, PlayerState};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Recorded API call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    PlayerState,
    Play(String),
    Pause(String),
    Next(String),
    Previous(String),
    Devices,
}

#[derive(Clone, Default)]
pub struct MockApi {
    calls: Arc<Mutex<Vec<ApiCall>>>,
    state: Arc<Mutex<Option<PlayerState>>>,
    devices: Arc<Mutex<Vec<Device>>>,
    failing: Arc<AtomicBool>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `device_id` as the active device with the given playing flag
    pub fn set_state(&self, device_id: &str, is_playing: bool) {
        *self.state.lock().unwrap() = Some(PlayerState {
            device: device(device_id, "Mock Device"),
            is_playing,
        });
    }

    pub fn set_devices(&self, devices: Vec<Device>) {
        *self.devices.lock().unwrap() = devices;
    }

    /// Make every subsequent call fail with a 503
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded calls that change playback (state queries excluded)
    pub fn playback_calls(&self) -> Vec<ApiCall> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, ApiCall::PlayerState | ApiCall::Devices))
            .collect()
    }

    /// Assert that no calls were made
    pub fn assert_no_calls(&self) {
        let calls = self.calls();
        assert!(calls.is_empty(), "Expected no calls but got: {:?}", calls);
    }

    fn record(&self, call: ApiCall) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(call);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 503,
                message: "mock failure".to_string(),
            });
        }
        Ok(())
    }
}

/// Convenience constructor for test devices
pub fn device(id: &str, name: &str) -> Device {
    Device {
        id: Some(id.to_string()),
        name: name.to_string(),
        kind: "Speaker".to_string(),
        is_active: false,
    }
}

#[async_trait]
impl PlaybackApi for MockApi {
    async fn player_state(&self) -> Result<Option<PlayerState>, ApiError> {
        self.record(ApiCall::PlayerState)?;
        Ok(self.state.lock().unwrap().clone())
    }

    async fn play(&self, device_id: &str) -> Result<(), ApiError> {
        self.record(ApiCall::Play(device_id.to_string()))
    }

    async fn pause(&self, device_id: &str) -> Result<(), ApiError> {
        self.record(ApiCall::Pause(device_id.to_string()))
    }

    async fn next(&self, device_id: &str) -> Result<(), ApiError> {
        self.record(ApiCall::Next(device_id.to_string()))
    }

    async fn previous(&self, device_id: &str) -> Result<(), ApiError> {
        self.record(ApiCall::Previous(device_id.to_string()))
    }

    async fn devices(&self) -> Result<Vec<Device>, ApiError> {
        self.record(ApiCall::Devices)?;
        Ok(self.devices.lock().unwrap().clone())
    }
}
