//! Dispatcher
//!
//! Owns the capture source and the device controller. `start` runs the
//! capture source on a blocking thread and a single event loop that drains the
//! key handoff; `stop` tears both down and returns only once the event loop has
//! exited, so no key is processed afterwards.

mod action;

pub use action::{Action, KeyRole, classify};

use crate::capture::{self, CaptureError, CaptureSource};
use crate::device::DeviceController;
use crate::key::{KeyCode, MediaKey};
use crate::spotify::PlaybackApi;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

struct EventLoop<A> {
    terminate: oneshot::Sender<()>,
    /// Hands the controller back once the loop exits
    task: JoinHandle<DeviceController<A>>,
}

pub struct Player<C, A> {
    capture: Arc<C>,
    /// Present while idle; moved into the event loop while running
    controller: Option<DeviceController<A>>,
    capture_task: Option<JoinHandle<Result<(), CaptureError>>>,
    event_loop: Option<EventLoop<A>>,
}

impl<C, A> Player<C, A>
where
    C: CaptureSource,
    A: PlaybackApi + 'static,
{
    pub fn new(capture: Arc<C>, controller: DeviceController<A>) -> Self {
        Self {
            capture,
            controller: Some(controller),
            capture_task: None,
            event_loop: None,
        }
    }

    /// Start capturing media keys and forwarding them to the device
    pub fn start(&mut self) {
        let Some(controller) = self.controller.take() else {
            warn!("player already running");
            return;
        };
        if !controller.is_authenticated() {
            warn!("no Spotify session attached, media keys will be ignored");
        }
        info!(device = %controller.device_id(), "forwarding media keys");

        let (handoff, keys) = capture::handoff();
        let capture = Arc::clone(&self.capture);
        self.capture_task = Some(tokio::task::spawn_blocking(move || {
            capture.start(&MediaKey::allow_list(), handoff)
        }));

        let (terminate, terminated) = oneshot::channel();
        self.event_loop = Some(EventLoop {
            terminate,
            task: tokio::spawn(run_event_loop(controller, keys, terminated)),
        });
    }

    /// Resolves when the capture source returns on its own, e.g. because the
    /// hook could not be installed. Never resolves while idle.
    pub async fn capture_finished(&mut self) -> Result<(), CaptureError> {
        let Some(task) = self.capture_task.as_mut() else {
            return std::future::pending().await;
        };
        let result = task.await;
        self.capture_task = None;
        result?
    }

    /// Stop capturing and wait for the event loop to acknowledge.
    ///
    /// Returns the capture source's own result if it had not been collected yet.
    pub async fn stop(&mut self) -> Result<(), CaptureError> {
        self.capture.stop();

        if let Some(event_loop) = self.event_loop.take() {
            // A loop that already exited has dropped its receiver
            let _ = event_loop.terminate.send(());
            match event_loop.task.await {
                Ok(controller) => self.controller = Some(controller),
                Err(e) => warn!("event loop failed: {e}"),
            }
        }

        match self.capture_task.take() {
            Some(task) => task.await?,
            None => Ok(()),
        }
    }
}

async fn run_event_loop<A: PlaybackApi>(
    mut controller: DeviceController<A>,
    mut keys: mpsc::Receiver<KeyCode>,
    mut terminate: oneshot::Receiver<()>,
) -> DeviceController<A> {
    loop {
        tokio::select! {
            biased;

            _ = &mut terminate => {
                debug!("event loop terminated");
                break;
            }
            key = keys.recv() => match key {
                Some(key) => dispatch(&mut controller, key).await,
                None => {
                    debug!("capture source released the key handoff");
                    break;
                }
            },
        }
    }
    controller
}

/// Map one captured key to an action and run it against the controller
async fn dispatch<A: PlaybackApi>(controller: &mut DeviceController<A>, key: KeyCode) {
    let action = match classify(key) {
        KeyRole::Fixed(action) => action,
        KeyRole::Toggle => Action::toggle(controller.is_playing().await),
    };
    trace!(%key, %action, "key pressed");

    let outcome = match action {
        Action::None => return,
        Action::Play => controller.play().await,
        Action::Pause => controller.pause().await,
        Action::Next => controller.next_track().await,
        Action::Previous => controller.previous_track().await,
    };
    outcome.log(&action.to_string());
}
