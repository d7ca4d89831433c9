use std::time::Duration;

/// Debounce check for artifact emission.
///
/// Returns `true` if nothing has been emitted yet, or if at least
/// `min_interval` has passed since `last_emitted_ms`. Timestamps are Unix
/// millis; a clock that went backwards counts as no time elapsed.
pub fn admit(now_ms: i64, last_emitted_ms: Option<i64>, min_interval: Duration) -> bool {
    match last_emitted_ms {
        None => true,
        Some(last) => {
            let elapsed = now_ms.saturating_sub(last).max(0) as u128;
            elapsed >= min_interval.as_millis()
        }
    }
}

/// Turns capture timestamps into a clock that never runs backwards.
///
/// Each reading advances by the time since the previous capture; a
/// backwards wall-clock step adds nothing but becomes the new reference, so
/// the gate only stalls for that one cycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct Timeline {
    last_wall_ms: Option<i64>,
    elapsed_ms: i64,
}

impl Timeline {
    /// Record a capture taken at `wall_ms` and return its monotonic time.
    pub fn advance(&mut self, wall_ms: i64) -> i64 {
        if let Some(last) = self.last_wall_ms {
            let step = wall_ms.saturating_sub(last).max(0);
            self.elapsed_ms = self.elapsed_ms.saturating_add(step);
        }
        self.last_wall_ms = Some(wall_ms);
        self.elapsed_ms
    }
}
