//! Controller tuning

use std::time::Duration;

use crate::player::PlayerSlot;

/// How often drift is measured
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Drift tolerated before the follower is re-seeked
pub const DEFAULT_DRIFT_THRESHOLD: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Period of the drift-correction tick
    pub tick_interval: Duration,
    /// Drift at or below this is left alone
    pub drift_threshold: Duration,
    /// Leader before any notification has been accepted
    pub initial_leader: PlayerSlot,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            drift_threshold: DEFAULT_DRIFT_THRESHOLD,
            initial_leader: PlayerSlot::A,
        }
    }
}

impl SyncConfig {
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        // tokio intervals panic on a zero period
        self.tick_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_drift_threshold(mut self, threshold: Duration) -> Self {
        self.drift_threshold = threshold;
        self
    }

    pub fn with_initial_leader(mut self, leader: PlayerSlot) -> Self {
        self.initial_leader = leader;
        self
    }

    pub(crate) fn drift_threshold_secs(&self) -> f64 {
        self.drift_threshold.as_secs_f64()
    }
}
