//! Sync Controller

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::player::{CommandId, PlaybackState, Player, PlayerSlot, StateChange, StateObserver};

use super::config::SyncConfig;
use super::echo::EchoTracker;

/// State mutated by the notification handler and read by the tick
#[derive(Debug)]
struct MirrorState {
    leader: PlayerSlot,
    echoes: EchoTracker,
}

/// Keeps two players at the same position and play/pause state.
///
/// Position drift is corrected one-sidedly on a periodic tick: the follower
/// is seeked to the leader. Play/pause transitions reported by either player
/// are mirrored onto the other; the mirrored command's own notification is
/// recognised by its [`CommandId`] and discarded.
pub struct SyncController {
    player_a: Arc<dyn Player>,
    player_b: Arc<dyn Player>,
    config: SyncConfig,
    mirror: Mutex<MirrorState>,
    /// Cancels the drift tick task
    tick_cancel: Mutex<Option<oneshot::Sender<()>>>,
}

/// Observer registered on one player, forwarding to the controller
struct SlotObserver {
    controller: Weak<SyncController>,
    slot: PlayerSlot,
}

impl StateObserver for SlotObserver {
    fn on_state_change(&self, change: StateChange) {
        if let Some(controller) = self.controller.upgrade() {
            controller.handle_state_change(self.slot, change);
        }
    }
}

impl SyncController {
    /// Bind two players and register as their state-change observer,
    /// replacing whatever observer they had.
    pub fn new(player_a: Arc<dyn Player>, player_b: Arc<dyn Player>, config: SyncConfig) -> Arc<Self> {
        let controller = Arc::new(Self {
            player_a,
            player_b,
            mirror: Mutex::new(MirrorState {
                leader: config.initial_leader,
                echoes: EchoTracker::new(),
            }),
            config,
            tick_cancel: Mutex::new(None),
        });

        for slot in [PlayerSlot::A, PlayerSlot::B] {
            controller.player(slot).set_observer(Some(Arc::new(SlotObserver {
                controller: Arc::downgrade(&controller),
                slot,
            })));
        }

        info!(
            a = controller.player_a.label(),
            b = controller.player_b.label(),
            leader = %controller.config.initial_leader,
            "Sync controller created"
        );

        controller
    }

    fn player(&self, slot: PlayerSlot) -> &Arc<dyn Player> {
        match slot {
            PlayerSlot::A => &self.player_a,
            PlayerSlot::B => &self.player_b,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Start the periodic drift tick. A running tick is stopped first.
    pub fn start(self: &Arc<Self>) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No async runtime available, drift correction not started");
                return;
            }
        };

        // Stop any existing loop first
        self.stop();

        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        *self.tick_cancel.lock() = Some(cancel_tx);

        let controller = Arc::downgrade(self);
        let period = self.config.tick_interval;

        runtime.spawn(async move {
            debug!(period_ms = period.as_millis() as u64, "Drift correction loop started");

            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    // Fires on stop() and when the sender is dropped with the controller
                    _ = &mut cancel_rx => break,
                    _ = ticker.tick() => {
                        let Some(controller) = controller.upgrade() else {
                            break;
                        };
                        controller.tick();
                    }
                }
            }

            debug!("Drift correction loop ended");
        });
    }

    /// Cancel the drift tick. Safe to call at any time, any number of times.
    pub fn stop(&self) {
        if let Some(tx) = self.tick_cancel.lock().take() {
            let _ = tx.send(());
            info!("Drift correction stopped");
        }
    }

    /// Whether a drift tick is currently scheduled
    pub fn is_running(&self) -> bool {
        self.tick_cancel
            .lock()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Resume both players, A then B
    pub fn play(&self) {
        for slot in [PlayerSlot::A, PlayerSlot::B] {
            let id = self.tag_command(slot);
            self.player(slot).play(Some(id));
        }
    }

    /// Pause both players, A then B
    pub fn pause(&self) {
        for slot in [PlayerSlot::A, PlayerSlot::B] {
            let id = self.tag_command(slot);
            self.player(slot).pause(Some(id));
        }
    }

    /// Seek both players to the same absolute position
    pub fn seek_to(&self, position_secs: f64) {
        let position_secs = position_secs.max(0.0);
        self.player_a.seek_to(position_secs);
        self.player_b.seek_to(position_secs);
    }

    fn tag_command(&self, slot: PlayerSlot) -> CommandId {
        let id = CommandId::next();
        self.mirror.lock().echoes.track(slot, id);
        id
    }

    /// Run one drift-correction pass
    pub fn tick(&self) {
        let pos_a = self.player_a.current_time();
        let pos_b = self.player_b.current_time();
        let drift = (pos_a - pos_b).abs();

        if drift <= self.config.drift_threshold_secs() {
            return;
        }

        let leader = self.mirror.lock().leader;
        let (target, follower) = match leader {
            PlayerSlot::A => (pos_a, PlayerSlot::B),
            PlayerSlot::B => (pos_b, PlayerSlot::A),
        };

        info!(
            drift_s = drift,
            leader = self.player(leader).label(),
            follower = self.player(follower).label(),
            target_s = target,
            "Drift over threshold, seeking follower"
        );
        self.player(follower).seek_to(target);
    }

    /// Mirror a transition from `slot` onto the other player, unless it is
    /// the echo of a command we issued.
    fn handle_state_change(&self, slot: PlayerSlot, change: StateChange) {
        let source = self.player(slot).label();

        let command = {
            let mut mirror = self.mirror.lock();
            if mirror.echoes.consume(slot, change.cause) {
                debug!(player = source, state = %change.state, "Discarding echo");
                return;
            }

            mirror.leader = slot;

            match change.state {
                PlaybackState::Playing | PlaybackState::Paused => {
                    let id = CommandId::next();
                    mirror.echoes.track(slot.other(), id);
                    Some((change.state, id))
                }
                PlaybackState::Unstarted => None,
            }
        };

        let follower = self.player(slot.other());
        match command {
            Some((PlaybackState::Playing, id)) => {
                info!(leader = source, follower = follower.label(), command = %id, "Mirroring play");
                follower.play(Some(id));
            }
            Some((PlaybackState::Paused, id)) => {
                info!(leader = source, follower = follower.label(), command = %id, "Mirroring pause");
                follower.pause(Some(id));
            }
            _ => {
                debug!(leader = source, state = %change.state, "Leader changed, nothing to mirror");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn leader(&self) -> PlayerSlot {
        self.mirror.lock().leader
    }

    #[cfg(test)]
    pub(crate) fn outstanding_echoes(&self, slot: PlayerSlot) -> usize {
        self.mirror.lock().echoes.outstanding(slot)
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SyncController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncController")
            .field("player_a", &self.player_a.label())
            .field("player_b", &self.player_b.label())
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::ObserverSlot;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Load(String),
        Play(Option<CommandId>),
        Pause(Option<CommandId>),
        Seek(f64),
    }

    /// Records commands; position and state are set by the test
    struct MockPlayer {
        label: &'static str,
        position: Mutex<f64>,
        state: Mutex<PlaybackState>,
        calls: Mutex<Vec<Call>>,
        observer: ObserverSlot,
    }

    impl MockPlayer {
        fn new(label: &'static str) -> Arc<Self> {
            Arc::new(Self {
                label,
                position: Mutex::new(0.0),
                state: Mutex::new(PlaybackState::Unstarted),
                calls: Mutex::new(Vec::new()),
                observer: ObserverSlot::new(),
            })
        }

        fn set_position(&self, secs: f64) {
            *self.position.lock() = secs;
        }

        fn set_state(&self, state: PlaybackState) {
            *self.state.lock() = state;
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        fn clear(&self) {
            self.calls.lock().clear();
        }

        fn seeks(&self) -> Vec<f64> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Seek(p) => Some(p),
                    _ => None,
                })
                .collect()
        }

        /// Emit a notification as the real player would
        fn emit(&self, state: PlaybackState, cause: Option<CommandId>) {
            self.set_state(state);
            self.observer.notify(StateChange::caused_by(state, cause));
        }

        /// The tag of the most recent play/pause command
        fn last_tag(&self) -> Option<CommandId> {
            self.calls().into_iter().rev().find_map(|c| match c {
                Call::Play(tag) | Call::Pause(tag) => tag,
                _ => None,
            })
        }
    }

    impl Player for MockPlayer {
        fn label(&self) -> &str {
            self.label
        }

        fn load(&self, item_id: &str) {
            self.calls.lock().push(Call::Load(item_id.to_string()));
        }

        fn play(&self, cause: Option<CommandId>) {
            self.calls.lock().push(Call::Play(cause));
        }

        fn pause(&self, cause: Option<CommandId>) {
            self.calls.lock().push(Call::Pause(cause));
        }

        fn seek_to(&self, position_secs: f64) {
            self.calls.lock().push(Call::Seek(position_secs));
        }

        fn current_time(&self) -> f64 {
            *self.position.lock()
        }

        fn duration(&self) -> f64 {
            0.0
        }

        fn state(&self) -> PlaybackState {
            *self.state.lock()
        }

        fn set_observer(&self, observer: Option<Arc<dyn StateObserver>>) {
            self.observer.set(observer);
        }
    }

    fn setup() -> (Arc<MockPlayer>, Arc<MockPlayer>, Arc<SyncController>) {
        let video = MockPlayer::new("video");
        let audio = MockPlayer::new("audio");
        let controller = SyncController::new(video.clone(), audio.clone(), SyncConfig::default());
        (video, audio, controller)
    }

    #[test]
    fn test_registers_as_observer() {
        let (video, audio, _controller) = setup();
        assert!(video.observer.is_set());
        assert!(audio.observer.is_set());
    }

    #[test]
    fn test_drift_over_threshold_seeks_follower() {
        let (video, audio, controller) = setup();
        video.set_position(10.0);
        audio.set_position(8.0);

        controller.tick();

        assert_eq!(audio.seeks(), vec![10.0]);
        assert!(video.seeks().is_empty());
    }

    #[test]
    fn test_drift_within_threshold_does_nothing() {
        let (video, audio, controller) = setup();
        video.set_position(10.0);
        audio.set_position(9.0);
        controller.tick();

        // Exactly at the threshold is still tolerated
        audio.set_position(8.5);
        controller.tick();

        assert!(video.seeks().is_empty());
        assert!(audio.seeks().is_empty());
    }

    #[test]
    fn test_drift_correction_follows_leader() {
        let (video, audio, controller) = setup();
        video.set_position(10.0);
        video.set_state(PlaybackState::Playing);
        audio.set_position(30.0);

        // Audio becomes leader by reporting a genuine transition
        audio.emit(PlaybackState::Playing, None);
        assert_eq!(controller.leader(), PlayerSlot::B);

        controller.tick();
        assert_eq!(video.seeks(), vec![30.0]);
        assert!(audio.seeks().is_empty());
    }

    #[test]
    fn test_mirrors_pause_and_discards_echo() {
        let (video, audio, controller) = setup();
        video.set_state(PlaybackState::Playing);
        audio.set_state(PlaybackState::Playing);

        audio.emit(PlaybackState::Paused, None);

        assert_eq!(controller.leader(), PlayerSlot::B);
        let tag = video.last_tag();
        assert!(matches!(video.calls().as_slice(), [Call::Pause(Some(_))]));
        assert_eq!(controller.outstanding_echoes(PlayerSlot::A), 1);

        // The video player's echo is discarded and nothing is mirrored back
        video.emit(PlaybackState::Paused, tag);
        assert!(audio.calls().is_empty());
        assert_eq!(controller.outstanding_echoes(PlayerSlot::A), 0);
        assert_eq!(controller.leader(), PlayerSlot::B);
    }

    #[test]
    fn test_mirrors_play() {
        let (video, audio, controller) = setup();
        video.emit(PlaybackState::Playing, None);

        assert_eq!(controller.leader(), PlayerSlot::A);
        assert!(matches!(audio.calls().as_slice(), [Call::Play(Some(_))]));
        assert!(video.calls().is_empty());
    }

    #[test]
    fn test_unstarted_changes_leader_without_command() {
        let (video, audio, controller) = setup();
        audio.emit(PlaybackState::Unstarted, None);

        assert_eq!(controller.leader(), PlayerSlot::B);
        assert!(video.calls().is_empty());
        assert_eq!(controller.outstanding_echoes(PlayerSlot::A), 0);
    }

    #[test]
    fn test_at_most_one_mirror_per_echo_pair() {
        let (video, audio, _controller) = setup();

        for round in 0..5 {
            let state = if round % 2 == 0 { PlaybackState::Playing } else { PlaybackState::Paused };
            video.clear();
            audio.clear();

            video.emit(state, None);
            let tag = audio.last_tag();
            audio.emit(state, tag);

            assert_eq!(audio.calls().len(), 1, "round {round}");
            assert!(video.calls().is_empty(), "round {round}");
        }
    }

    #[test]
    fn test_concurrent_genuine_transition_is_not_swallowed() {
        let (video, audio, controller) = setup();

        // Video pauses; the pause mirrored to audio is still in flight when
        // the user independently presses play on the audio player.
        video.emit(PlaybackState::Paused, None);
        let pending_tag = audio.last_tag();
        audio.clear();

        audio.emit(PlaybackState::Playing, None);
        assert_eq!(controller.leader(), PlayerSlot::B);
        assert!(matches!(video.calls().last(), Some(Call::Play(Some(_)))));

        // The late echo is still recognised
        audio.emit(PlaybackState::Paused, pending_tag);
        assert!(audio.calls().is_empty());
        assert_eq!(controller.leader(), PlayerSlot::B);
    }

    #[test]
    fn test_echo_tag_from_other_player_is_not_an_echo() {
        let (video, audio, controller) = setup();
        video.emit(PlaybackState::Playing, None);
        let audio_tag = audio.last_tag();
        video.clear();

        // A tag that belongs to audio, reported by video, is a genuine change
        video.emit(PlaybackState::Paused, audio_tag);
        assert_eq!(controller.leader(), PlayerSlot::A);
        assert!(matches!(audio.calls().last(), Some(Call::Pause(Some(_)))));
    }

    #[test]
    fn test_user_commands_hit_both_players_and_leave_leader_alone() {
        let (video, audio, controller) = setup();
        controller.play();

        let video_tag = video.last_tag();
        let audio_tag = audio.last_tag();
        assert!(matches!(video.calls().as_slice(), [Call::Play(Some(_))]));
        assert!(matches!(audio.calls().as_slice(), [Call::Play(Some(_))]));

        // Both echoes are discarded, so no mirroring and no leader change
        audio.emit(PlaybackState::Playing, audio_tag);
        video.emit(PlaybackState::Playing, video_tag);
        assert_eq!(video.calls().len(), 1);
        assert_eq!(audio.calls().len(), 1);
        assert_eq!(controller.leader(), PlayerSlot::A);

        controller.pause();
        assert!(matches!(video.calls().last(), Some(Call::Pause(Some(_)))));
        assert!(matches!(audio.calls().last(), Some(Call::Pause(Some(_)))));
    }

    #[test]
    fn test_seek_hits_both_players() {
        let (video, audio, controller) = setup();
        controller.seek_to(42.5);
        assert_eq!(video.seeks(), vec![42.5]);
        assert_eq!(audio.seeks(), vec![42.5]);
    }

    #[test]
    fn test_initial_leader_is_configurable() {
        let video = MockPlayer::new("video");
        let audio = MockPlayer::new("audio");
        let controller = SyncController::new(
            video.clone(),
            audio.clone(),
            SyncConfig::default().with_initial_leader(PlayerSlot::B),
        );
        video.set_position(0.0);
        audio.set_position(5.0);

        controller.tick();
        assert_eq!(video.seeks(), vec![5.0]);
    }

    #[test]
    fn test_stop_without_start() {
        let (_video, _audio, controller) = setup();
        controller.stop();
        controller.stop();
        assert!(!controller.is_running());
    }

    #[test]
    fn test_start_outside_runtime_is_noop() {
        let (_video, _audio, controller) = setup();
        controller.start();
        assert!(!controller.is_running());
    }

    #[test]
    fn test_dropped_controller_stops_observing() {
        let (video, audio, controller) = setup();
        drop(controller);

        video.emit(PlaybackState::Playing, None);
        assert!(audio.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_runs_periodically() {
        let (video, audio, controller) = setup();
        video.set_position(10.0);
        audio.set_position(8.0);

        controller.start();
        assert!(controller.is_running());

        tokio::time::sleep(Duration::from_millis(750)).await;
        assert_eq!(audio.seeks(), vec![10.0]);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(audio.seeks().len(), 2);

        controller.stop();
        controller.stop();
        assert!(!controller.is_running());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(audio.seeks().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_keeps_single_timer() {
        let (video, audio, controller) = setup();
        video.set_position(10.0);
        audio.set_position(0.0);

        controller.start();
        controller.start();

        tokio::time::sleep(Duration::from_millis(750)).await;
        assert_eq!(audio.seeks().len(), 1);

        controller.stop();
        assert!(!controller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_task_ends_with_controller() {
        let (video, audio, controller) = setup();
        video.set_position(10.0);
        audio.set_position(0.0);

        controller.start();
        drop(controller);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(audio.seeks().is_empty());
    }
}
