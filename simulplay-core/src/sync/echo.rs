//! Echo suppression
//!
//! Every command the controller issues carries a [`CommandId`]. The player it
//! was sent to echoes that identifier on the notification the command causes.
//! Only a notification carrying an identifier still outstanding for the same
//! player is an echo; anything else is a genuine transition, even if it
//! arrives while an echo is still in flight from the other player.

use std::collections::VecDeque;

use crate::player::{CommandId, PlayerSlot};

/// Outstanding identifiers kept per player. Commands that never cause a
/// transition (pausing a paused player) leave their identifier behind; the
/// oldest ones are evicted past this bound.
const MAX_OUTSTANDING: usize = 8;

#[derive(Debug, Default)]
pub struct EchoTracker {
    outstanding: [VecDeque<CommandId>; 2],
}

fn index(slot: PlayerSlot) -> usize {
    match slot {
        PlayerSlot::A => 0,
        PlayerSlot::B => 1,
    }
}

impl EchoTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a command issued to `slot` whose echo must be discarded
    pub fn track(&mut self, slot: PlayerSlot, id: CommandId) {
        let queue = &mut self.outstanding[index(slot)];
        if queue.len() >= MAX_OUTSTANDING {
            queue.pop_front();
        }
        queue.push_back(id);
    }

    /// Returns true, consuming the identifier, if a notification from `slot`
    /// caused by `cause` is an echo
    pub fn consume(&mut self, slot: PlayerSlot, cause: Option<CommandId>) -> bool {
        let Some(id) = cause else {
            return false;
        };
        let queue = &mut self.outstanding[index(slot)];
        match queue.iter().position(|pending| *pending == id) {
            Some(pos) => {
                queue.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Number of echoes still expected from `slot`
    pub fn outstanding(&self, slot: PlayerSlot) -> usize {
        self.outstanding[index(slot)].len()
    }
}
