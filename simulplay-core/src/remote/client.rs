//! Playback API HTTP Client

use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::types::*;

/// Default connection timeout (short since players live on the local network)
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(1);

/// Default request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors that can occur when talking to a remote player
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Player is not running or not reachable")]
    NotReachable,

    #[error("Invalid API token")]
    Unauthorized,

    #[error("API error: {0}")]
    Api(String),
}

impl PlaybackError {
    /// Whether the player itself went away (as opposed to a bad request)
    pub fn is_unreachable(&self) -> bool {
        match self {
            PlaybackError::NotReachable => true,
            PlaybackError::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

/// Client for a player's playback REST API
#[derive(Debug, Clone)]
pub struct PlaybackClient {
    http: Client,
    base_url: String,
    api_token: Option<String>,
}

impl PlaybackClient {
    /// Create a client for the API rooted at `base_url` (e.g. `http://127.0.0.1:10767`)
    pub fn new(base_url: impl Into<String>) -> Result<Self, PlaybackError> {
        let http = Client::builder()
            .connect_timeout(CONNECTION_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            // Limit connection pool to avoid stale connections
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: None,
        })
    }

    /// Set the API token for authentication
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a request with optional authentication
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/api/v1/playback{}", self.base_url, path);
        let mut req = self.http.request(method, &url);

        if let Some(token) = &self.api_token {
            req = req.header("apitoken", token);
        }

        req
    }

    /// Check if the player is up and accepting commands
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn is_active(&self) -> Result<(), PlaybackError> {
        let resp = self
            .request(reqwest::Method::GET, "/active")
            .send()
            .await
            .map_err(|e| {
                debug!("Connection error: {:?}", e);
                if e.is_connect() || e.is_timeout() {
                    PlaybackError::NotReachable
                } else {
                    PlaybackError::Http(e)
                }
            })?;

        match resp.status().as_u16() {
            200 | 204 => Ok(()),
            401 | 403 => Err(PlaybackError::Unauthorized),
            code => {
                warn!("Unexpected readiness response (HTTP {})", code);
                Err(PlaybackError::Api(format!("Unexpected response (HTTP {})", code)))
            }
        }
    }

    /// Check if the player is currently playing
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn is_playing(&self) -> Result<bool, PlaybackError> {
        let resp: ApiResponse<IsPlayingResponse> = self
            .request(reqwest::Method::GET, "/is-playing")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(resp.data.is_playing)
    }

    /// Get the loaded item (returns None if nothing is loaded)
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn now_playing(&self) -> Result<Option<NowPlaying>, PlaybackError> {
        let resp = self
            .request(reqwest::Method::GET, "/now-playing")
            .send()
            .await?;

        if resp.status() == 404 || resp.status() == 204 {
            return Ok(None);
        }

        let data: ApiResponse<NowPlayingResponse> = resp
            .error_for_status()?
            .json()
            .await
            .map_err(|e| {
                if e.is_decode() {
                    PlaybackError::Api(format!("Malformed now-playing response: {}", e))
                } else {
                    PlaybackError::Http(e)
                }
            })?;

        Ok(Some(data.data.info))
    }

    /// Resume playback
    pub async fn play(&self) -> Result<(), PlaybackError> {
        self.request(reqwest::Method::POST, "/play")
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Pause playback
    pub async fn pause(&self) -> Result<(), PlaybackError> {
        self.request(reqwest::Method::POST, "/pause")
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Seek to a position in the player's native unit
    pub async fn seek(&self, position: f64) -> Result<(), PlaybackError> {
        self.request(reqwest::Method::POST, "/seek")
            .json(&SeekRequest { position })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Load an item by type and ID
    pub async fn play_item(&self, item_type: &str, id: &str) -> Result<(), PlaybackError> {
        self.request(reqwest::Method::POST, "/play-item")
            .json(&PlayItemRequest {
                item_type: item_type.to_string(),
                id: id.to_string(),
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
