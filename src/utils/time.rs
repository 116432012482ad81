use std::time::{Duration, Instant};

/// Frame clock for the render loop.
///
/// Runs on wall-clock time via [`tick`](Self::tick) or on caller-supplied
/// time via [`advance_to`](Self::advance_to). The time step of the first
/// frame is zero.
#[derive(Debug, Clone)]
pub struct FrameClock {
    start_time: Instant,
    /// Seconds at the current frame
    time: f64,
    /// Seconds since the previous frame
    step: f64,
    /// Total number of frames
    frame_count: u64,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            time: 0.0,
            step: 0.0,
            frame_count: 0,
        }
    }

    /// Starts a frame at the current wall-clock time.
    pub fn tick(&mut self) {
        let elapsed = self.start_time.elapsed();
        self.advance_to(elapsed.as_secs_f64());
    }

    /// Starts a frame at `time` seconds.
    pub fn advance_to(&mut self, time: f64) {
        self.step = if self.frame_count == 0 { 0.0 } else { time - self.time };
        self.time = time;
        self.frame_count += 1;
    }

    #[inline]
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    #[inline]
    #[must_use]
    pub fn step(&self) -> f64 {
        self.step
    }

    #[must_use]
    pub fn step_duration(&self) -> Duration {
        Duration::from_secs_f64(self.step.max(0.0))
    }

    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}
