//! Key to playback action mapping
//!
//! Mapping is a pure lookup. The one state-dependent key, the play/pause
//! toggle, is reported as `KeyRole::Toggle` so the caller fetches playback
//! state only when it is actually needed.

use crate::key::{KeyCode, MediaKey};
use std::fmt;

/// Semantic playback command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Play,
    Pause,
    Next,
    Previous,
}

impl Action {
    /// Resolve the toggle key against the current playing flag
    pub fn toggle(playing: bool) -> Self {
        if playing { Action::Pause } else { Action::Play }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::None => "none",
            Action::Play => "play",
            Action::Pause => "pause",
            Action::Next => "next",
            Action::Previous => "previous",
        };
        f.write_str(name)
    }
}

/// How a captured key turns into an action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    Fixed(Action),
    /// Depends on whether the target device is playing
    Toggle,
}

pub fn classify(code: KeyCode) -> KeyRole {
    let Some(key) = MediaKey::from_code(code) else {
        return KeyRole::Fixed(Action::None);
    };
    match key {
        MediaKey::Play => KeyRole::Fixed(Action::Play),
        MediaKey::Pause | MediaKey::Stop => KeyRole::Fixed(Action::Pause),
        MediaKey::Next => KeyRole::Fixed(Action::Next),
        MediaKey::Previous => KeyRole::Fixed(Action::Previous),
        MediaKey::PlayPause => KeyRole::Toggle,
    }
}
