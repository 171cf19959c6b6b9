//! Value types shared by every player implementation

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Coarse playback state reported by a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    Unstarted,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Unstarted => "unstarted",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of the two players bound to a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerSlot {
    A,
    B,
}

impl PlayerSlot {
    /// The other slot
    pub fn other(self) -> Self {
        match self {
            PlayerSlot::A => PlayerSlot::B,
            PlayerSlot::B => PlayerSlot::A,
        }
    }
}

impl Default for PlayerSlot {
    fn default() -> Self {
        PlayerSlot::A
    }
}

impl fmt::Display for PlayerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerSlot::A => f.write_str("A"),
            PlayerSlot::B => f.write_str("B"),
        }
    }
}

/// Native time unit of a player's position and seek API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionUnit {
    #[default]
    Seconds,
    Millis,
}

impl PositionUnit {
    /// Convert a position in seconds to this unit
    pub fn secs_to_native(self, secs: f64) -> f64 {
        match self {
            PositionUnit::Seconds => secs,
            PositionUnit::Millis => secs * 1000.0,
        }
    }

    /// Convert a position in this unit to seconds
    pub fn native_to_secs(self, value: f64) -> f64 {
        match self {
            PositionUnit::Seconds => value,
            PositionUnit::Millis => value / 1000.0,
        }
    }
}

impl std::str::FromStr for PositionUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "s" | "sec" | "secs" | "seconds" => Ok(Self::Seconds),
            "ms" | "millis" | "milliseconds" => Ok(Self::Millis),
            other => Err(format!("unknown position unit: {other}")),
        }
    }
}

static NEXT_COMMAND_ID: AtomicU64 = AtomicU64::new(1);

/// Correlation identifier attached to a programmatic command.
///
/// A player echoes it back on the state-change notification the command
/// causes, which lets the controller tell its own echoes apart from
/// independent transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(u64);

impl CommandId {
    /// Allocate a fresh, process-unique identifier
    pub fn next() -> Self {
        CommandId(NEXT_COMMAND_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A state-change notification delivered to a player's observer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    /// The state the player moved into
    pub state: PlaybackState,
    /// Identifier of the command that caused the change, if any
    pub cause: Option<CommandId>,
}

impl StateChange {
    /// A transition nobody in this process asked for (user clicked the player)
    pub fn spontaneous(state: PlaybackState) -> Self {
        Self { state, cause: None }
    }

    /// A transition caused by a tagged command
    pub fn caused_by(state: PlaybackState, cause: Option<CommandId>) -> Self {
        Self { state, cause }
    }
}
