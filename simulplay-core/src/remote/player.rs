//! Player Capability backed by a remote playback API
//!
//! Readiness is discovered by probing the API; state transitions are
//! discovered by polling it. Positions are cached from the last poll and
//! extrapolated while playing, so reads stay synchronous.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::player::{
    CommandId, ObserverSlot, PendingLoad, PlaybackState, Player, PositionUnit, StateChange, StateObserver,
};

use super::client::{PlaybackClient, PlaybackError};
use super::types::NowPlaying;

/// Default interval between state polls
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Item type sent with play-item requests
const DEFAULT_ITEM_TYPE: &str = "songs";

/// Minimum time a tagged command may take to show up as a polled
/// transition. Covers the request timeout plus a few default polls.
const ECHO_WINDOW: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct RemotePlayerConfig {
    /// Unit the API uses for positions and seeks
    pub unit: PositionUnit,
    /// How often the API is polled for state
    pub poll_interval: Duration,
    /// Item type passed to play-item
    pub item_type: String,
}

impl Default for RemotePlayerConfig {
    fn default() -> Self {
        Self {
            unit: PositionUnit::Seconds,
            poll_interval: DEFAULT_POLL_INTERVAL,
            item_type: DEFAULT_ITEM_TYPE.to_string(),
        }
    }
}

impl RemotePlayerConfig {
    pub fn with_unit(mut self, unit: PositionUnit) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_item_type(mut self, item_type: impl Into<String>) -> Self {
        self.item_type = item_type.into();
        self
    }
}

/// Last observed player state
#[derive(Debug, Clone, Copy)]
struct Snapshot {
    state: PlaybackState,
    position_secs: f64,
    duration_secs: f64,
    observed_at: Instant,
}

impl Snapshot {
    fn estimate_position(&self) -> f64 {
        let mut position = self.position_secs;
        if self.state == PlaybackState::Playing {
            position += self.observed_at.elapsed().as_secs_f64();
        }
        if self.duration_secs > 0.0 {
            position = position.min(self.duration_secs);
        }
        position.max(0.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingTag {
    id: CommandId,
    issued_at: Instant,
}

/// Tagged commands waiting for the player to reach their target state,
/// at most one per target.
///
/// A command is only recorded if it should cause a transition, judged
/// against the state the player will be in once earlier pending commands
/// land. Tags older than the window are dropped: their command either
/// never reached the player or was undone before a poll saw it.
#[derive(Debug)]
struct EchoTags {
    window: Duration,
    playing: Option<PendingTag>,
    paused: Option<PendingTag>,
}

impl EchoTags {
    fn new(poll_interval: Duration) -> Self {
        Self {
            window: ECHO_WINDOW.max(poll_interval * 4),
            playing: None,
            paused: None,
        }
    }

    fn slot(&mut self, state: PlaybackState) -> Option<&mut Option<PendingTag>> {
        match state {
            PlaybackState::Playing => Some(&mut self.playing),
            PlaybackState::Paused => Some(&mut self.paused),
            PlaybackState::Unstarted => None,
        }
    }

    fn expire(&mut self, now: Instant) {
        let window = self.window;
        for tag in [&mut self.playing, &mut self.paused] {
            if tag.is_some_and(|t| now.duration_since(t.issued_at) > window) {
                *tag = None;
            }
        }
    }

    /// Target of the most recent pending command
    fn expected(&self) -> Option<PlaybackState> {
        match (self.playing, self.paused) {
            (Some(play), Some(pause)) if play.id.value() > pause.id.value() => Some(PlaybackState::Playing),
            (_, Some(_)) => Some(PlaybackState::Paused),
            (Some(_), None) => Some(PlaybackState::Playing),
            (None, None) => None,
        }
    }

    fn record(&mut self, target: PlaybackState, id: CommandId, current: PlaybackState, now: Instant) {
        self.expire(now);
        if self.expected().unwrap_or(current) == target {
            return;
        }
        if let Some(slot) = self.slot(target) {
            *slot = Some(PendingTag { id, issued_at: now });
        }
    }

    /// Take the tag of the command that caused a transition into `state`
    fn claim(&mut self, state: PlaybackState, now: Instant) -> Option<CommandId> {
        self.expire(now);
        let claimed = self.slot(state)?.take()?;

        // A command issued before this one that never showed up is moot
        for tag in [&mut self.playing, &mut self.paused] {
            if tag.is_some_and(|t| t.id.value() < claimed.id.value()) {
                *tag = None;
            }
        }

        Some(claimed.id)
    }
}

pub struct RemotePlayer {
    label: String,
    client: PlaybackClient,
    config: RemotePlayerConfig,
    runtime: Handle,
    load_gate: Mutex<PendingLoad>,
    snapshot: Mutex<Snapshot>,
    echo_tags: Mutex<EchoTags>,
    observer: ObserverSlot,
    poll_cancel: Mutex<Option<oneshot::Sender<()>>>,
}

impl RemotePlayer {
    /// Create the player and start polling its API.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime, as the poll task and every
    /// command request are spawned onto the current runtime.
    pub fn spawn(label: impl Into<String>, client: PlaybackClient, config: RemotePlayerConfig) -> Arc<Self> {
        let echo_tags = EchoTags::new(config.poll_interval);
        let player = Arc::new(Self {
            label: label.into(),
            client,
            config,
            runtime: Handle::current(),
            load_gate: Mutex::new(PendingLoad::new()),
            snapshot: Mutex::new(Snapshot {
                state: PlaybackState::Unstarted,
                position_secs: 0.0,
                duration_secs: 0.0,
                observed_at: Instant::now(),
            }),
            echo_tags: Mutex::new(echo_tags),
            observer: ObserverSlot::new(),
            poll_cancel: Mutex::new(None),
        });

        let (cancel_tx, cancel_rx) = oneshot::channel();
        *player.poll_cancel.lock() = Some(cancel_tx);
        player
            .runtime
            .spawn(poll_loop(Arc::downgrade(&player), player.config.poll_interval, cancel_rx));

        info!(player = %player.label, base_url = player.client.base_url(), "Remote player started");
        player
    }

    /// Whether the API has answered the readiness probe
    pub fn is_ready(&self) -> bool {
        self.load_gate.lock().is_ready()
    }

    /// Stop polling. Commands still work; state stops updating.
    pub fn shutdown(&self) {
        if let Some(tx) = self.poll_cancel.lock().take() {
            let _ = tx.send(());
            debug!(player = %self.label, "Remote player polling stopped");
        }
    }

    /// Run a request in the background, logging its failure
    fn dispatch<F>(&self, what: &'static str, request: F)
    where
        F: Future<Output = Result<(), PlaybackError>> + Send + 'static,
    {
        let label = self.label.clone();
        self.runtime.spawn(async move {
            if let Err(e) = request.await {
                warn!(player = %label, "{} failed: {}", what, e);
            }
        });
    }

    fn command(&self, target: PlaybackState, cause: Option<CommandId>) {
        if !self.is_ready() {
            debug!(player = %self.label, state = %target, "Player not ready, ignoring command");
            return;
        }

        if let Some(id) = cause {
            let current = self.snapshot.lock().state;
            self.echo_tags.lock().record(target, id, current, Instant::now());
        }

        let client = self.client.clone();
        match target {
            PlaybackState::Playing => self.dispatch("play", async move { client.play().await }),
            PlaybackState::Paused => self.dispatch("pause", async move { client.pause().await }),
            PlaybackState::Unstarted => {}
        }
    }

    async fn poll_once(&self) {
        if !self.is_ready() {
            match self.client.is_active().await {
                Ok(()) => self.on_ready().await,
                Err(e) => {
                    debug!(player = %self.label, "Not ready yet: {}", e);
                    return;
                }
            }
        }

        let (now_playing, is_playing) = tokio::join!(self.client.now_playing(), self.client.is_playing());
        match (now_playing, is_playing) {
            (Ok(now_playing), Ok(is_playing)) => self.apply(now_playing, is_playing),
            (Err(e), _) | (_, Err(e)) => {
                if e.is_unreachable() {
                    warn!(player = %self.label, "Player went away: {}", e);
                    self.load_gate.lock().reset();
                } else {
                    warn!(player = %self.label, "State poll failed: {}", e);
                }
            }
        }
    }

    async fn on_ready(&self) {
        let flushed = self.load_gate.lock().mark_ready();
        info!(player = %self.label, "Player ready");

        if let Some(item_id) = flushed {
            debug!(player = %self.label, item = %item_id, "Applying pending load");
            if let Err(e) = self.client.play_item(&self.config.item_type, &item_id).await {
                warn!(player = %self.label, "Pending load failed: {}", e);
            }
        }
    }

    /// Fold a poll result into the snapshot and notify on transitions
    fn apply(&self, now_playing: Option<NowPlaying>, is_playing: bool) {
        let state = match (&now_playing, is_playing) {
            (None, _) => PlaybackState::Unstarted,
            (Some(_), true) => PlaybackState::Playing,
            (Some(_), false) => PlaybackState::Paused,
        };

        let previous = {
            let mut snapshot = self.snapshot.lock();
            let previous = snapshot.state;
            snapshot.state = state;
            snapshot.observed_at = Instant::now();
            match &now_playing {
                Some(np) => {
                    snapshot.position_secs = self.config.unit.native_to_secs(np.current_playback_time);
                    snapshot.duration_secs = np.duration_secs();
                }
                None => {
                    snapshot.position_secs = 0.0;
                    snapshot.duration_secs = 0.0;
                }
            }
            previous
        };

        if state == previous {
            return;
        }

        let cause = self.echo_tags.lock().claim(state, Instant::now());

        debug!(player = %self.label, from = %previous, to = %state, ?cause, "State changed");
        self.observer.notify(StateChange::caused_by(state, cause));
    }
}

async fn poll_loop(player: Weak<RemotePlayer>, period: Duration, mut cancel_rx: oneshot::Receiver<()>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut cancel_rx => break,
            _ = ticker.tick() => {
                let Some(player) = player.upgrade() else {
                    break;
                };
                player.poll_once().await;
            }
        }
    }
}

impl Player for RemotePlayer {
    fn label(&self) -> &str {
        &self.label
    }

    fn load(&self, item_id: &str) {
        let Some(item_id) = self.load_gate.lock().request(item_id) else {
            debug!(player = %self.label, item = %item_id, "Player not ready, load buffered");
            return;
        };

        let client = self.client.clone();
        let item_type = self.config.item_type.clone();
        self.dispatch("load", async move { client.play_item(&item_type, &item_id).await });
    }

    fn play(&self, cause: Option<CommandId>) {
        self.command(PlaybackState::Playing, cause);
    }

    fn pause(&self, cause: Option<CommandId>) {
        self.command(PlaybackState::Paused, cause);
    }

    fn seek_to(&self, position_secs: f64) {
        if !self.is_ready() {
            return;
        }

        // Assume the seek lands so the next drift tick does not re-seek
        // before the following poll
        {
            let mut snapshot = self.snapshot.lock();
            snapshot.position_secs = position_secs;
            snapshot.observed_at = Instant::now();
        }

        let native = self.config.unit.secs_to_native(position_secs);
        let client = self.client.clone();
        self.dispatch("seek", async move { client.seek(native).await });
    }

    fn current_time(&self) -> f64 {
        self.snapshot.lock().estimate_position()
    }

    fn duration(&self) -> f64 {
        self.snapshot.lock().duration_secs
    }

    fn state(&self) -> PlaybackState {
        self.snapshot.lock().state
    }

    fn set_observer(&self, observer: Option<Arc<dyn StateObserver>>) {
        self.observer.set(observer);
    }
}

impl Drop for RemotePlayer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for RemotePlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemotePlayer")
            .field("label", &self.label)
            .field("base_url", &self.client.base_url())
            .field("config", &self.config)
            .finish()
    }
}
