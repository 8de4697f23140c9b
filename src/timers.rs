//! Phase timing for the batch search.

use std::time::{Duration, Instant};

/// Adds the time between its creation and its drop to `slot`.
///
/// Used to split batch time between pruning and leaf evaluation. The time is
/// recorded on every exit path, including `?` returns.
///
/// ```rust,ignore
/// let mut prune_time = Duration::ZERO;
/// {
///     let _timer = PhaseTimer::new(&mut prune_time);
///     // partially evaluate policies
/// }
/// ```
pub struct PhaseTimer<'a> {
    start: Instant,
    slot: &'a mut Duration,
}

impl<'a> PhaseTimer<'a> {
    pub fn new(slot: &'a mut Duration) -> Self {
        Self {
            start: Instant::now(),
            slot,
        }
    }
}

impl Drop for PhaseTimer<'_> {
    fn drop(&mut self) {
        *self.slot += self.start.elapsed();
    }
}
