//! Frame timing
//!
//! The clock is an explicit value owned by the caller and threaded through
//! the per-frame uniform update, rather than hidden static state.

use std::time::Instant;

/// High-precision clock driving the per-frame transform animation
pub struct RenderClock {
    last_frame: Instant,
    delta_time: f32,
    total_time: f32,
    frame_count: u64,
}

impl Default for RenderClock {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderClock {
    /// Create a new clock starting at zero elapsed time
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
            delta_time: 0.0,
            total_time: 0.0,
            frame_count: 0,
        }
    }

    /// Advance the clock (call once per frame)
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta_time = now.duration_since(self.last_frame).as_secs_f32();
        self.total_time += self.delta_time;
        self.last_frame = now;
        self.frame_count += 1;
    }

    /// Time since the last tick in seconds
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Total elapsed time since clock creation in seconds
    pub fn total_time(&self) -> f32 {
        self.total_time
    }

    /// Number of ticks so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        let clock = RenderClock::new();
        assert_eq!(clock.total_time(), 0.0);
        assert_eq!(clock.delta_time(), 0.0);
        assert_eq!(clock.frame_count(), 0);
    }

    #[test]
    fn tick_accumulates_monotonically() {
        let mut clock = RenderClock::new();
        clock.tick();
        let first = clock.total_time();
        clock.tick();
        assert!(clock.total_time() >= first);
        assert_eq!(clock.frame_count(), 2);
    }
}
