//! Simple (change-point) pattern evaluation. See spec §4.1.

use crate::model::{ChangeAt, SimpleOutput, SimplePattern};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Per-tick state for a [`SimplePattern`]: total elapsed time (wrapped by `duration`) and the
/// index of the currently-active change point.
pub struct SimplePatternState {
    pub elapsed_ms: u32,
    pub change_index: usize,
}

impl SimplePatternState {
    /// Reset to the pattern's initial state.
    pub fn reset(&mut self) {
        self.elapsed_ms = 0;
        self.change_index = 0;
    }

    /// Advance this state by `delta_ms`, following spec §4.1's algorithm exactly:
    /// wrap `elapsed_ms` modulo `duration`, then walk `change_index` forward or backward until it
    /// names the largest change point whose `ms` does not exceed `elapsed_ms`.
    pub fn advance(&mut self, pattern: &SimplePattern, delta_ms: u32) {
        if pattern.duration == 0 || pattern.change_at.is_empty() {
            self.reset();
            return;
        }

        let duration = pattern.duration;
        let mut elapsed = self.elapsed_ms + delta_ms;
        while elapsed >= duration {
            elapsed -= duration;
            self.change_index = 0;
        }
        self.elapsed_ms = elapsed;

        let count = pattern.change_at.len();
        while self.change_index + 1 < count
            && pattern.change_at[self.change_index + 1].ms <= self.elapsed_ms
        {
            self.change_index += 1;
        }
        while self.change_index > 0 && pattern.change_at[self.change_index].ms > self.elapsed_ms {
            self.change_index -= 1;
        }
    }

    /// Look up the currently-active change point, if any.
    ///
    /// Returns `None` when the pattern has no change points at all. `change_index` is clamped
    /// into range in case a mode swap left it stale relative to a differently-shaped pattern.
    pub fn current(&self, pattern: &SimplePattern) -> Option<SimpleOutput> {
        if pattern.change_at.is_empty() {
            return None;
        }
        let index = self.change_index.min(pattern.change_at.len() - 1);
        Some(pattern.change_at[index].output)
    }
}

/// Build a [`ChangeAt`] for tests and callers that only care about bulb levels.
#[cfg(test)]
pub(crate) fn bulb_change(ms: u32, high: bool) -> ChangeAt {
    use crate::model::BulbLevel;
    ChangeAt {
        ms,
        output: SimpleOutput::Bulb {
            value: if high { BulbLevel::High } else { BulbLevel::Low },
        },
    }
}
