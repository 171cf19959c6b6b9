//! In-process simulated player
//!
//! Behaves like a network-backed player from the controller's point of view:
//! it has its own clock (which may run fast or slow), becomes ready only when
//! told to, works in its own native time unit and delivers notifications
//! asynchronously, optionally late.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::time::Instant;
use tracing::debug;

use crate::player::{
    CommandId, ObserverSlot, PendingLoad, PlaybackState, Player, PositionUnit, StateChange, StateObserver,
};

#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Unit of seeks and positions inside the player
    pub unit: PositionUnit,
    /// Media seconds advanced per wall-clock second while playing
    pub clock_rate: f64,
    /// Fixed delay before a notification is delivered
    pub notify_delay: Duration,
    /// Upper bound of random extra delay added to each notification
    pub notify_jitter: Duration,
    /// Reported duration in seconds (0 for unknown)
    pub duration_secs: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            unit: PositionUnit::Seconds,
            clock_rate: 1.0,
            notify_delay: Duration::ZERO,
            notify_jitter: Duration::ZERO,
            duration_secs: 0.0,
        }
    }
}

impl SimConfig {
    pub fn with_unit(mut self, unit: PositionUnit) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_clock_rate(mut self, rate: f64) -> Self {
        self.clock_rate = rate.max(0.0);
        self
    }

    pub fn with_notify_delay(mut self, delay: Duration, jitter: Duration) -> Self {
        self.notify_delay = delay;
        self.notify_jitter = jitter;
        self
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = secs.max(0.0);
        self
    }
}

/// A command as received by the simulated player. Seek positions are native.
#[derive(Debug, Clone, PartialEq)]
pub enum SimCommand {
    Load(String),
    Play(Option<CommandId>),
    Pause(Option<CommandId>),
    Seek(f64),
}

#[derive(Debug)]
struct SimState {
    load_gate: PendingLoad,
    loaded: Option<String>,
    state: PlaybackState,
    /// Native position at `anchor`
    position: f64,
    anchor: Instant,
    commands: Vec<SimCommand>,
}

pub struct SimulatedPlayer {
    label: String,
    config: SimConfig,
    inner: Mutex<SimState>,
    observer: Arc<ObserverSlot>,
}

impl SimulatedPlayer {
    pub fn new(label: impl Into<String>, config: SimConfig) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            config,
            inner: Mutex::new(SimState {
                load_gate: PendingLoad::new(),
                loaded: None,
                state: PlaybackState::Unstarted,
                position: 0.0,
                anchor: Instant::now(),
                commands: Vec::new(),
            }),
            observer: Arc::new(ObserverSlot::new()),
        })
    }

    /// Finish the readiness lifecycle, applying any buffered load
    pub fn mark_ready(&self) {
        let mut inner = self.inner.lock();
        if let Some(item_id) = inner.load_gate.mark_ready() {
            debug!(player = %self.label, item = %item_id, "Applying pending load");
            inner.loaded = Some(item_id);
        }
    }

    pub fn is_ready(&self) -> bool {
        self.inner.lock().load_gate.is_ready()
    }

    /// The item currently loaded
    pub fn loaded(&self) -> Option<String> {
        self.inner.lock().loaded.clone()
    }

    /// Every command received so far
    pub fn commands(&self) -> Vec<SimCommand> {
        self.inner.lock().commands.clone()
    }

    /// The user pressed play on the player itself
    pub fn simulate_user_play(&self) {
        self.transition(PlaybackState::Playing, None);
    }

    /// The user pressed pause on the player itself
    pub fn simulate_user_pause(&self) {
        self.transition(PlaybackState::Paused, None);
    }

    /// The user dragged the player's own scrubber
    pub fn simulate_user_seek(&self, position_secs: f64) {
        let mut inner = self.inner.lock();
        inner.position = self.config.unit.secs_to_native(position_secs.max(0.0));
        inner.anchor = Instant::now();
    }

    fn native_position(&self, inner: &SimState) -> f64 {
        let mut position = inner.position;
        if inner.state == PlaybackState::Playing {
            let media_secs = inner.anchor.elapsed().as_secs_f64() * self.config.clock_rate;
            position += self.config.unit.secs_to_native(media_secs);
        }
        if self.config.duration_secs > 0.0 {
            position = position.min(self.config.unit.secs_to_native(self.config.duration_secs));
        }
        position
    }

    /// Move into `target`, notifying if the state actually changed
    fn transition(&self, target: PlaybackState, cause: Option<CommandId>) {
        {
            let mut inner = self.inner.lock();
            if inner.state == target {
                return;
            }
            inner.position = self.native_position(&inner);
            inner.anchor = Instant::now();
            inner.state = target;
        }
        self.emit(StateChange::caused_by(target, cause));
    }

    fn emit(&self, change: StateChange) {
        let mut delay = self.config.notify_delay;
        let jitter_ms = self.config.notify_jitter.as_millis() as u64;
        if jitter_ms > 0 {
            delay += Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms));
        }

        let observer = Arc::clone(&self.observer);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    observer.notify(change);
                });
            }
            // Without a runtime there is nothing to defer onto
            Err(_) => observer.notify(change),
        }
    }
}

impl Player for SimulatedPlayer {
    fn label(&self) -> &str {
        &self.label
    }

    fn load(&self, item_id: &str) {
        let mut inner = self.inner.lock();
        inner.commands.push(SimCommand::Load(item_id.to_string()));
        if let Some(item_id) = inner.load_gate.request(item_id) {
            inner.loaded = Some(item_id);
            inner.position = 0.0;
            inner.anchor = Instant::now();
        }
    }

    fn play(&self, cause: Option<CommandId>) {
        {
            let mut inner = self.inner.lock();
            if !inner.load_gate.is_ready() {
                return;
            }
            inner.commands.push(SimCommand::Play(cause));
        }
        self.transition(PlaybackState::Playing, cause);
    }

    fn pause(&self, cause: Option<CommandId>) {
        {
            let mut inner = self.inner.lock();
            if !inner.load_gate.is_ready() {
                return;
            }
            inner.commands.push(SimCommand::Pause(cause));
        }
        self.transition(PlaybackState::Paused, cause);
    }

    fn seek_to(&self, position_secs: f64) {
        let mut inner = self.inner.lock();
        if !inner.load_gate.is_ready() {
            return;
        }
        let native = self.config.unit.secs_to_native(position_secs.max(0.0));
        inner.commands.push(SimCommand::Seek(native));
        inner.position = native;
        inner.anchor = Instant::now();
    }

    fn current_time(&self) -> f64 {
        let inner = self.inner.lock();
        if !inner.load_gate.is_ready() {
            return 0.0;
        }
        self.config.unit.native_to_secs(self.native_position(&inner))
    }

    fn duration(&self) -> f64 {
        if !self.inner.lock().load_gate.is_ready() {
            return 0.0;
        }
        self.config.duration_secs
    }

    fn state(&self) -> PlaybackState {
        self.inner.lock().state
    }

    fn set_observer(&self, observer: Option<Arc<dyn StateObserver>>) {
        self.observer.set(observer);
    }
}

impl std::fmt::Debug for SimulatedPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedPlayer")
            .field("label", &self.label)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{SyncConfig, SyncController};

    fn recorder(player: &SimulatedPlayer) -> Arc<Mutex<Vec<StateChange>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        player.set_observer(Some(Arc::new(move |change: StateChange| sink.lock().push(change))));
        seen
    }

    fn ready(label: &str, config: SimConfig) -> Arc<SimulatedPlayer> {
        let player = SimulatedPlayer::new(label, config);
        player.mark_ready();
        player
    }

    fn count(player: &SimulatedPlayer, pred: impl Fn(&SimCommand) -> bool) -> usize {
        player.commands().iter().filter(|c| pred(*c)).count()
    }

    #[test]
    fn test_duration_unknown_until_ready() {
        let player = SimulatedPlayer::new("sim", SimConfig::default().with_duration(120.0));
        assert_eq!(player.duration(), 0.0);

        player.mark_ready();
        assert_eq!(player.duration(), 120.0);
    }

    #[test]
    fn test_unready_player_ignores_commands() {
        let player = SimulatedPlayer::new("sim", SimConfig::default());
        player.play(None);
        player.seek_to(5.0);

        assert_eq!(player.state(), PlaybackState::Unstarted);
        assert_eq!(player.current_time(), 0.0);
        assert!(player.commands().is_empty());
    }

    #[test]
    fn test_pending_load_overwritten_then_flushed() {
        let player = SimulatedPlayer::new("sim", SimConfig::default());
        player.load("first");
        player.load("second");
        assert_eq!(player.loaded(), None);

        player.mark_ready();
        assert_eq!(player.loaded(), Some("second".to_string()));

        player.mark_ready();
        player.load("third");
        assert_eq!(player.loaded(), Some("third".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_advances_while_playing() {
        let player = ready("sim", SimConfig::default().with_unit(PositionUnit::Millis).with_clock_rate(1.5));
        player.play(None);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!((player.current_time() - 3.0).abs() < 0.01);

        player.pause(None);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!((player.current_time() - 3.0).abs() < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_uses_native_unit() {
        let player = ready("sim", SimConfig::default().with_unit(PositionUnit::Millis));
        player.seek_to(10.0);

        assert_eq!(player.commands(), vec![SimCommand::Seek(10_000.0)]);
        assert_eq!(player.current_time(), 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notification_is_async_and_tagged() {
        let player = ready("sim", SimConfig::default().with_notify_delay(Duration::from_millis(100), Duration::ZERO));
        let seen = recorder(&player);

        let id = CommandId::next();
        player.play(Some(id));
        assert!(seen.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(*seen.lock(), vec![StateChange::caused_by(PlaybackState::Playing, Some(id))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_notification_without_transition() {
        let player = ready("sim", SimConfig::default());
        let seen = recorder(&player);

        player.pause(None);
        player.pause(None);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_actions_are_untagged() {
        let player = ready("sim", SimConfig::default());
        let seen = recorder(&player);

        player.simulate_user_play();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(*seen.lock(), vec![StateChange::spontaneous(PlaybackState::Playing)]);
        assert!(player.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_controller_keeps_simulated_players_together() {
        let video = ready("video", SimConfig::default());
        let audio = ready(
            "audio",
            SimConfig::default()
                .with_unit(PositionUnit::Millis)
                .with_clock_rate(1.1)
                .with_notify_delay(Duration::from_millis(50), Duration::from_millis(100)),
        );
        let controller = SyncController::new(video.clone(), audio.clone(), SyncConfig::default());

        controller.play();
        controller.start();
        tokio::time::sleep(Duration::from_secs(20)).await;

        // The fast audio clock was pulled back to the video at least once
        assert!(count(&audio, |c| matches!(c, SimCommand::Seek(_))) >= 1);
        assert_eq!(count(&video, |c| matches!(c, SimCommand::Seek(_))), 0);
        assert!((video.current_time() - audio.current_time()).abs() <= 1.6);

        // A pause on the audio player is mirrored once, with no ping-pong
        audio.simulate_user_pause();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(video.state(), PlaybackState::Paused);
        assert_eq!(count(&video, |c| matches!(c, SimCommand::Pause(_))), 1);
        assert_eq!(count(&audio, |c| matches!(c, SimCommand::Pause(_))), 0);
        assert_eq!(count(&audio, |c| matches!(c, SimCommand::Play(_))), 1);

        // Audio is now the leader: a jump on it drags the video along
        audio.simulate_user_seek(100.0);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!((video.current_time() - 100.0).abs() < 0.01);

        controller.stop();
        assert!(!controller.is_running());
    }
}
