//! Device Controller
//!
//! Wraps the authenticated session and the configured target device. Every
//! operation is a no-op until a session has been attached, and remote failures
//! never propagate: they come back as an `Outcome` the caller logs and drops.

use crate::spotify::{ApiError, PlaybackApi, PlayerState};
use std::io::Write;
use tracing::{debug, info, warn};

/// Result of a fire-and-forget remote operation
#[derive(Debug)]
#[must_use = "log the outcome before discarding it"]
pub enum Outcome {
    Done,
    /// No session attached yet
    Skipped,
    Failed(ApiError),
}

impl Outcome {
    fn from_result(result: Result<(), ApiError>) -> Self {
        match result {
            Ok(()) => Outcome::Done,
            Err(e) => Outcome::Failed(e),
        }
    }

    pub fn log(&self, operation: &str) {
        match self {
            Outcome::Done => debug!(operation, "remote call succeeded"),
            Outcome::Skipped => debug!(operation, "not authenticated, skipped"),
            Outcome::Failed(e) => warn!(operation, "remote call failed: {e}"),
        }
    }
}

/// Playback control for one remote device
pub struct DeviceController<A> {
    device_id: String,
    session: Option<A>,
    /// Last fetched playback state, `None` after a failed fetch
    player_state: Option<PlayerState>,
}

impl<A: PlaybackApi> DeviceController<A> {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            session: None,
            player_state: None,
        }
    }

    /// Attach the authenticated session produced by the OAuth flow
    pub fn attach(&mut self, session: A) {
        if self.session.is_some() {
            warn!("replacing an already attached session");
        }
        self.session = Some(session);
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    async fn refresh_player_state(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        self.player_state = match session.player_state().await {
            Ok(state) => state,
            Err(e) => {
                warn!("failed to fetch player state: {e}");
                None
            }
        };
    }

    /// Whether the configured device is the active one and is playing.
    ///
    /// Always re-fetches the player state; a failed fetch counts as not playing.
    pub async fn is_playing(&mut self) -> bool {
        self.refresh_player_state().await;
        self.player_state
            .as_ref()
            .is_some_and(|state| state.is_playing_on(&self.device_id))
    }

    pub async fn play(&self) -> Outcome {
        let Some(session) = &self.session else {
            return Outcome::Skipped;
        };
        info!(device = %self.device_id, "playing on Spotify device");
        Outcome::from_result(session.play(&self.device_id).await)
    }

    pub async fn pause(&self) -> Outcome {
        let Some(session) = &self.session else {
            return Outcome::Skipped;
        };
        info!(device = %self.device_id, "pausing Spotify device");
        Outcome::from_result(session.pause(&self.device_id).await)
    }

    pub async fn next_track(&self) -> Outcome {
        let Some(session) = &self.session else {
            return Outcome::Skipped;
        };
        info!(device = %self.device_id, "next track on Spotify device");
        Outcome::from_result(session.next(&self.device_id).await)
    }

    pub async fn previous_track(&self) -> Outcome {
        let Some(session) = &self.session else {
            return Outcome::Skipped;
        };
        info!(device = %self.device_id, "previous track on Spotify device");
        Outcome::from_result(session.previous(&self.device_id).await)
    }

    /// Write one `<id> <name>` line per device visible to the account
    pub async fn list_devices(&self, out: &mut dyn Write) -> Outcome {
        let Some(session) = &self.session else {
            return Outcome::Skipped;
        };
        let devices = match session.devices().await {
            Ok(devices) => devices,
            Err(e) => return Outcome::Failed(e),
        };
        debug!("{} device(s) visible", devices.len());

        for device in devices {
            debug!(kind = %device.kind, active = device.is_active, "{device}");
            if let Err(e) = writeln!(out, "{device}") {
                warn!("failed to write device list: {e}");
                break;
            }
        }
        Outcome::Done
    }
}
