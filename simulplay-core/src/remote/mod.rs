//! Remote Player
//!
//! A Player Capability for players that expose a playback REST API.

mod client;
mod player;
mod types;

pub use client::{PlaybackClient, PlaybackError};
pub use player::{RemotePlayer, RemotePlayerConfig};
pub use types::*;
