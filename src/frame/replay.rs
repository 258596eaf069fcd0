//! Anti-replay window for one direction of one connection.

use crate::core::constants::REPLAY_WINDOW;

/// Tracks the highest accepted sequence number on the receive side of a
/// stream and rejects anything at or behind the reorder tolerance.
#[derive(Debug, Default)]
pub struct ReplayWindow {
    highest_accepted: Option<u32>,
}

impl ReplayWindow {
    /// A fresh window with nothing accepted yet.
    pub fn new() -> Self {
        Self {
            highest_accepted: None,
        }
    }

    /// Check whether `seq` should be accepted, updating the window if so.
    ///
    /// Returns `Ok(())` on acceptance, `Err(floor)` with the lowest still-
    /// acceptable sequence number on rejection.
    pub fn check_and_update(&mut self, seq: u32) -> Result<(), u32> {
        match self.highest_accepted {
            None => {
                self.highest_accepted = Some(seq);
                Ok(())
            }
            Some(highest) => {
                let floor = highest.saturating_sub(REPLAY_WINDOW);
                if seq <= floor && highest >= REPLAY_WINDOW {
                    return Err(floor);
                }
                if seq > highest {
                    self.highest_accepted = Some(seq);
                }
                Ok(())
            }
        }
    }
}
