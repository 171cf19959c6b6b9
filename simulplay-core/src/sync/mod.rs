//! Sync Engine
//!
//! Keeps two players aligned: drift correction on a timer, play/pause
//! mirroring with echo suppression.

mod config;
mod controller;
mod echo;

pub use config::*;
pub use controller::SyncController;
pub use echo::EchoTracker;
