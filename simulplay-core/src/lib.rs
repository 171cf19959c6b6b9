//! SimulPlay - Core Library
//!
//! Keeps a video player and an audio player perceptually in sync: same
//! position, same play/pause state, even though each player has its own
//! clock, readiness lifecycle and notification timing.

pub mod player;
pub mod remote;
pub mod sim;
pub mod sync;

// Re-exports for convenience
pub use player::{CommandId, PlaybackState, Player, PlayerSlot, PositionUnit, StateChange, StateObserver};
pub use remote::{PlaybackClient, RemotePlayer, RemotePlayerConfig};
pub use sim::{SimConfig, SimulatedPlayer};
pub use sync::{SyncConfig, SyncController};
