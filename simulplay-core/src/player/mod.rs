//! Player Capability
//!
//! The interface the sync controller requires from any playback source.

mod capability;
mod pending;
mod types;

pub use capability::{ObserverSlot, Player, StateObserver};
pub use pending::PendingLoad;
pub use types::*;
