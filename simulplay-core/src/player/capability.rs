//! The contract every playback source satisfies

use std::sync::Arc;

use parking_lot::RwLock;

use super::types::{CommandId, PlaybackState, StateChange};

/// Receives state-change notifications from a single player
pub trait StateObserver: Send + Sync {
    fn on_state_change(&self, change: StateChange);
}

impl<F> StateObserver for F
where
    F: Fn(StateChange) + Send + Sync,
{
    fn on_state_change(&self, change: StateChange) {
        self(change)
    }
}

/// A controllable playback source.
///
/// Every method is synchronous and infallible. Commands are fire-and-forget:
/// their outcome is only observable through a later notification or a later
/// position read. Positions crossing this trait are always in seconds;
/// implementations convert to their native unit internally.
pub trait Player: Send + Sync {
    /// Short name used in logs
    fn label(&self) -> &str;

    /// Prepare a content item. Buffered until the player is ready; a later
    /// call before readiness replaces the buffered item.
    fn load(&self, item_id: &str);

    /// Resume playback. `cause` is echoed back on the resulting notification.
    fn play(&self, cause: Option<CommandId>);

    /// Pause playback. `cause` is echoed back on the resulting notification.
    fn pause(&self, cause: Option<CommandId>);

    /// Jump to an absolute position
    fn seek_to(&self, position_secs: f64);

    /// Best available position estimate, `0.0` if unknown
    fn current_time(&self) -> f64;

    /// Best available duration estimate, `0.0` if unknown
    fn duration(&self) -> f64;

    fn state(&self) -> PlaybackState;

    /// Register the single state-change observer, replacing any previous one.
    /// `None` unregisters.
    fn set_observer(&self, observer: Option<Arc<dyn StateObserver>>);
}

/// Single-subscriber observer registration, shared by the player implementations
#[derive(Default)]
pub struct ObserverSlot {
    observer: RwLock<Option<Arc<dyn StateObserver>>>,
}

impl ObserverSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the registered observer
    pub fn set(&self, observer: Option<Arc<dyn StateObserver>>) {
        *self.observer.write() = observer;
    }

    pub fn is_set(&self) -> bool {
        self.observer.read().is_some()
    }

    /// Deliver a notification to the current observer, if any.
    ///
    /// The observer is cloned out before the call so it may re-register
    /// (or issue commands that notify again) without deadlocking.
    pub fn notify(&self, change: StateChange) {
        let observer = self.observer.read().clone();
        if let Some(observer) = observer {
            observer.on_state_change(change);
        }
    }
}

impl std::fmt::Debug for ObserverSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSlot")
            .field("registered", &self.is_set())
            .finish()
    }
}
