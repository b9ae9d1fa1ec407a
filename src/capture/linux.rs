//! Linux capture using evdev
//!
//! Every input device that advertises at least one allow-listed key is opened
//! (not grabbed: other applications keep receiving the keys) and read on its
//! own task. `start` parks the calling blocking thread on the runtime until
//! `stop` fires or every device stream has closed.

use super::{CaptureError, CaptureSource, KeyHandoff, StopSignal};
use crate::key::KeyCode;
use evdev::{Device, EventStream, EventType};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

/// Linux keyboard capture
#[derive(Debug)]
pub struct Capture {
    stop: StopSignal,
}

impl Capture {
    pub fn new() -> Self {
        Self {
            stop: StopSignal::new(),
        }
    }
}

impl Default for Capture {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSource for Capture {
    fn start(&self, allowed: &[KeyCode], handoff: KeyHandoff) -> Result<(), CaptureError> {
        info!("starting Linux input capture");

        check_permissions()?;

        let devices = find_media_key_devices(allowed)?;
        if devices.is_empty() {
            return Err(CaptureError::Install(
                "no input device reports any media key".to_string(),
            ));
        }
        info!("found {} input device(s) with media keys", devices.len());

        let runtime = Handle::try_current()
            .map_err(|e| CaptureError::Install(format!("no async runtime available: {e}")))?;
        let allowed: Arc<[KeyCode]> = allowed.into();

        runtime.block_on(async {
            let mut readers = JoinSet::new();
            for (path, device) in devices {
                info!(
                    "listening on {} ({})",
                    device.name().unwrap_or("unknown"),
                    path.display()
                );
                // Registers the fd with the reactor, so must run inside the runtime
                let stream = device.into_event_stream()?;
                readers.spawn(read_device(
                    stream,
                    path,
                    Arc::clone(&allowed),
                    handoff.clone(),
                ));
            }

            tokio::select! {
                _ = self.stop.wait() => debug!("capture stop requested"),
                _ = async { while readers.join_next().await.is_some() {} } => {
                    warn!("all input devices closed");
                }
            }

            readers.shutdown().await;
            info!("input capture stopped");
            Ok::<(), CaptureError>(())
        })
    }

    fn stop(&self) {
        self.stop.fire();
    }
}

/// Find all input devices that can emit at least one allowed key
fn find_media_key_devices(allowed: &[KeyCode]) -> Result<Vec<(PathBuf, Device)>, CaptureError> {
    let mut devices = Vec::new();

    for entry in std::fs::read_dir("/dev/input")? {
        let path = entry?.path();

        // Only check event* devices
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !filename.starts_with("event") {
            continue;
        }

        let Ok(device) = Device::open(&path) else {
            continue;
        };

        let has_media_key = device
            .supported_keys()
            .map(|keys| {
                allowed
                    .iter()
                    .any(|key| keys.contains(evdev::KeyCode::new(key.raw() as u16)))
            })
            .unwrap_or(false);

        if has_media_key {
            devices.push((path, device));
        }
    }

    Ok(devices)
}

/// Forward allowed key-down events from a single device
async fn read_device(
    mut stream: EventStream,
    path: PathBuf,
    allowed: Arc<[KeyCode]>,
    handoff: KeyHandoff,
) {
    loop {
        match stream.next_event().await {
            Ok(event) => {
                if let Some(key) = key_down(&event)
                    && allowed.contains(&key)
                {
                    trace!(%key, device = %path.display(), "captured key down");
                    handoff.offer(key);
                }
            }
            Err(e) => {
                warn!("device {} stopped: {}", path.display(), e);
                return;
            }
        }
    }
}

/// Key code of a press event; releases and auto-repeat (value 2) are ignored
fn key_down(event: &evdev::InputEvent) -> Option<KeyCode> {
    (event.event_type() == EventType::KEY && event.value() == 1)
        .then(|| KeyCode::new(event.code() as u32))
}

/// Check that input devices are readable, with a helpful error if not
fn check_permissions() -> Result<(), CaptureError> {
    if !Path::new("/dev/input").exists() {
        return Err(CaptureError::Install(
            "/dev/input not found. Are you running on Linux?".to_string(),
        ));
    }

    let readable = std::fs::read_dir("/dev/input")?
        .filter_map(|e| e.ok())
        .any(|e| {
            let path = e.path();
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("event"))
                .unwrap_or(false)
                && std::fs::File::open(&path).is_ok()
        });

    if !readable {
        return Err(CaptureError::Install(
            "Cannot read /dev/input devices.\n\
            Add yourself to the 'input' group:\n  \
            sudo usermod -aG input $USER\n\
            Then log out and back in."
                .to_string(),
        ));
    }

    Ok(())
}
