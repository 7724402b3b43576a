/// Performance profiling helpers for tracking pipeline stage timing.
///
/// Provides RAII-style profiling scopes and a rolling frame timer.
use std::time::Instant;
use tracing::trace;

/// A profiling scope that measures elapsed time using RAII.
///
/// The elapsed time is logged at `trace` level when the scope is dropped.
pub struct ProfilerScope {
    start: Instant,
    name: &'static str,
}

impl ProfilerScope {
    /// Creates a new profiling scope.
    pub fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    /// Gets elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for ProfilerScope {
    fn drop(&mut self) {
        trace!(stage = self.name, elapsed_ms = self.elapsed_ms(), "Pipeline stage finished");
    }
}

/// Frame timer keeping the last and a smoothed frame time.
pub struct FrameTimer {
    last_frame_time_ms: f64,
    average_frame_time_ms: f64,
    frames: u64,
}

impl FrameTimer {
    /// Weight of the newest frame in the running average
    const SMOOTHING: f64 = 0.1;

    /// Creates a new frame timer.
    pub fn new() -> Self {
        Self {
            last_frame_time_ms: 0.0,
            average_frame_time_ms: 0.0,
            frames: 0,
        }
    }

    /// Records frame time in milliseconds.
    pub fn record(&mut self, time_ms: f64) {
        self.last_frame_time_ms = time_ms;
        self.average_frame_time_ms = if self.frames == 0 {
            time_ms
        } else {
            self.average_frame_time_ms + (time_ms - self.average_frame_time_ms) * Self::SMOOTHING
        };
        self.frames += 1;
    }

    /// Gets the last recorded frame time.
    pub fn last_frame_time_ms(&self) -> f64 {
        self.last_frame_time_ms
    }

    /// Gets the exponentially smoothed frame time.
    pub fn average_frame_time_ms(&self) -> f64 {
        self.average_frame_time_ms
    }

    /// Number of frames recorded.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}
