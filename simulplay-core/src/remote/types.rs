//! Types for playback API requests and responses

use serde::{Deserialize, Serialize};

/// Response wrapper for most playback API endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    #[serde(flatten)]
    pub data: T,
}

/// Item currently loaded in the remote player
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlaying {
    /// Total duration in milliseconds
    #[serde(default)]
    pub duration_in_millis: u64,

    /// Current playback position, in the player's native unit
    #[serde(default)]
    pub current_playback_time: f64,
}

impl NowPlaying {
    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.duration_in_millis as f64 / 1000.0
    }
}

/// Response for is-playing endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct IsPlayingResponse {
    pub is_playing: bool,
}

/// Response for now-playing endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct NowPlayingResponse {
    pub info: NowPlaying,
}

/// Request body for play-item endpoint
#[derive(Debug, Clone, Serialize)]
pub struct PlayItemRequest {
    #[serde(rename = "type")]
    pub item_type: String,
    pub id: String,
}

/// Request body for seek endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SeekRequest {
    pub position: f64,
}
