//! Load buffering for players that are not ready yet

/// Holds at most one load request until the player becomes ready
#[derive(Debug, Default)]
pub struct PendingLoad {
    ready: bool,
    pending: Option<String>,
}

impl PendingLoad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// The buffered item, if any
    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Request a load. Returns the item to apply now if the player is ready,
    /// otherwise buffers it (replacing any earlier buffered item).
    pub fn request(&mut self, item_id: &str) -> Option<String> {
        if self.ready {
            return Some(item_id.to_string());
        }
        self.pending = Some(item_id.to_string());
        None
    }

    /// Record the readiness transition. Returns the buffered item the first
    /// time only.
    pub fn mark_ready(&mut self) -> Option<String> {
        if self.ready {
            return None;
        }
        self.ready = true;
        self.pending.take()
    }

    /// Forget readiness (player went away); the next `mark_ready` flushes again
    pub fn reset(&mut self) {
        self.ready = false;
    }
}
