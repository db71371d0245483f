//! Consecutive-frame confirmation for attendance toggling.
//!
//! A single live, matched frame is not enough to act on: the same
//! identity must be confirmed for a configured number of consecutive
//! qualifying frames before a toggle is attempted. After a successful
//! toggle the debouncer holds the identity in cooldown so one continuous
//! presence cannot re-trigger; any interruption (no face, liveness
//! failure, different identity) requires a fresh streak.

/// Current debouncer state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Confirming { employee_id: String, frames: u32 },
    Cooldown { employee_id: String },
}

pub struct Debouncer {
    state: DebounceState,
    threshold: u32,
}

impl Debouncer {
    pub fn new(threshold: u32) -> Self {
        Self {
            state: DebounceState::Idle,
            threshold: threshold.max(1),
        }
    }

    /// Advance with a frame where `employee_id` was matched and live.
    /// Returns `true` when the streak has reached the threshold and a
    /// toggle should be attempted.
    ///
    /// The counter saturates at the threshold rather than resetting, so
    /// a rate-limited attempt retries on the next qualifying frame
    /// without rebuilding the streak.
    pub fn observe_confirmed(&mut self, employee_id: &str) -> bool {
        match &mut self.state {
            DebounceState::Cooldown { employee_id: held } if held == employee_id => {
                // Same continuous presence — suppressed until interrupted.
                false
            }
            DebounceState::Confirming {
                employee_id: current,
                frames,
            } if current == employee_id => {
                *frames = (*frames + 1).min(self.threshold);
                *frames >= self.threshold
            }
            _ => {
                // Idle, a different identity, or cooldown broken by a new face.
                self.state = DebounceState::Confirming {
                    employee_id: employee_id.to_string(),
                    frames: 1,
                };
                1 >= self.threshold
            }
        }
    }

    /// Advance with a frame where no face was present, liveness failed,
    /// or the face was unknown. Resets the streak; a cooldown identity is
    /// released so its next appearance starts a fresh confirmation.
    pub fn observe_break(&mut self) {
        self.state = DebounceState::Idle;
    }

    /// Record a successful toggle: hold this identity in cooldown.
    pub fn record_toggle(&mut self, employee_id: &str) {
        self.state = DebounceState::Cooldown {
            employee_id: employee_id.to_string(),
        };
    }

    pub fn state(&self) -> &DebounceState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.state = DebounceState::Idle;
    }
}
