//! Platform-agnostic key code abstraction
//!
//! Key codes are platform-native (VK codes on Windows, evdev codes on Linux).
//! Only a fixed set of media keys is ever forwarded; `MediaKey` names them and
//! the per-platform tables at the bottom of this module translate between the
//! two representations.

use std::fmt;

/// Platform-agnostic key code.
///
/// Stores the raw OS-specific key code internally. The capture layer produces
/// these and the dispatcher resolves them to a `MediaKey`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCode(u32);

impl KeyCode {
    /// Create a KeyCode from a raw platform-native code
    pub const fn new(code: u32) -> Self {
        Self(code)
    }

    /// The raw platform-native code
    #[allow(dead_code)] // Used by platform-specific code
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match MediaKey::from_code(*self) {
            Some(media) => write!(f, "{media} ({:#04X})", self.0),
            None => write!(f, "{:#04X}", self.0),
        }
    }
}

/// The media keys this program listens for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKey {
    Play,
    Pause,
    Stop,
    Next,
    Previous,
    /// The combined play/pause toggle key found on most keyboards
    PlayPause,
}

impl MediaKey {
    pub const ALL: [MediaKey; 6] = [
        MediaKey::Play,
        MediaKey::Pause,
        MediaKey::Stop,
        MediaKey::Next,
        MediaKey::Previous,
        MediaKey::PlayPause,
    ];

    /// Platform-native code for this key
    pub fn code(self) -> KeyCode {
        MEDIA_KEY_CODES
            .iter()
            .find(|(key, _)| *key == self)
            .map(|(_, code)| KeyCode(*code))
            .unwrap_or(KeyCode(0))
    }

    /// Resolve a captured code back to a media key
    pub fn from_code(code: KeyCode) -> Option<Self> {
        MEDIA_KEY_CODES
            .iter()
            .find(|(_, raw)| *raw == code.0)
            .map(|(key, _)| *key)
    }

    /// Codes handed to the capture source as its allow-list
    pub fn allow_list() -> Vec<KeyCode> {
        Self::ALL.iter().map(|key| key.code()).collect()
    }
}

impl fmt::Display for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediaKey::Play => "media-play",
            MediaKey::Pause => "media-pause",
            MediaKey::Stop => "media-stop",
            MediaKey::Next => "media-next",
            MediaKey::Previous => "media-previous",
            MediaKey::PlayPause => "media-play-pause",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Platform key tables
// ============================================================================

#[cfg(windows)]
const MEDIA_KEY_CODES: [(MediaKey, u32); 6] = [
    (MediaKey::Play, 0xFA),      // VK_PLAY
    (MediaKey::Pause, 0x13),     // VK_PAUSE
    (MediaKey::Stop, 0xB2),      // VK_MEDIA_STOP
    (MediaKey::Next, 0xB0),      // VK_MEDIA_NEXT_TRACK
    (MediaKey::Previous, 0xB1),  // VK_MEDIA_PREV_TRACK
    (MediaKey::PlayPause, 0xB3), // VK_MEDIA_PLAY_PAUSE
];

#[cfg(unix)]
const MEDIA_KEY_CODES: [(MediaKey, u32); 6] = [
    (MediaKey::Play, evdev::KeyCode::KEY_PLAYCD.0 as u32),
    (MediaKey::Pause, evdev::KeyCode::KEY_PAUSECD.0 as u32),
    (MediaKey::Stop, evdev::KeyCode::KEY_STOPCD.0 as u32),
    (MediaKey::Next, evdev::KeyCode::KEY_NEXTSONG.0 as u32),
    (MediaKey::Previous, evdev::KeyCode::KEY_PREVIOUSSONG.0 as u32),
    (MediaKey::PlayPause, evdev::KeyCode::KEY_PLAYPAUSE.0 as u32),
];
