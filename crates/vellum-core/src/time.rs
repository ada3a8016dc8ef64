use std::time::{Duration, Instant};

use crate::profiling::profile_function;

/// Per-target frame timing.
///
/// The timer idles until the first [`FrameTimer::tick`] and is stopped when the
/// device is lost, so the frame that follows a reset does not report the whole
/// outage as its delta.
#[derive(Debug, Clone)]
pub struct FrameTimer {
    running: bool,
    /// Time elapsed since the timer was (re)started
    elapsed: Duration,
    /// Time elapsed since the previous tick
    delta: Duration,
    /// Ticks since the timer was (re)started
    frame_count: u64,
    current_fps: f32,
    highest_fps: f32,
    lowest_fps: f32,
    start_time: Instant,
    last_frame_time: Instant,
}

impl FrameTimer {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            running: false,
            elapsed: Duration::ZERO,
            delta: Duration::ZERO,
            frame_count: 0,
            current_fps: 0.0,
            highest_fps: 0.0,
            lowest_fps: 0.0,
            start_time: now,
            last_frame_time: now,
        }
    }

    /// Starts the timer, discarding any previous statistics.
    pub fn start(&mut self) {
        *self = Self::new();
        self.running = true;
    }

    /// Stops the timer and clears its statistics.
    pub fn stop(&mut self) {
        *self = Self::new();
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Advances one frame and returns the frame delta. Starts the timer if idle.
    pub fn tick(&mut self) -> Duration {
        profile_function!();
        if !self.running {
            self.start();
            return Duration::ZERO;
        }

        let now = Instant::now();
        self.delta = now.duration_since(self.last_frame_time);
        self.elapsed = now.duration_since(self.start_time);
        self.last_frame_time = now;
        self.frame_count += 1;

        let seconds = self.delta.as_secs_f32();
        if seconds > 0.0 {
            self.current_fps = 1.0 / seconds;
            self.highest_fps = self.highest_fps.max(self.current_fps);
            self.lowest_fps = if self.frame_count == 1 {
                self.current_fps
            } else {
                self.lowest_fps.min(self.current_fps)
            };
        }

        self.delta
    }

    #[inline]
    pub fn delta(&self) -> Duration {
        self.delta
    }

    #[inline]
    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    #[inline]
    pub fn current_fps(&self) -> f32 {
        self.current_fps
    }

    /// Mean frames per second since the timer started.
    pub fn average_fps(&self) -> f32 {
        let seconds = self.elapsed.as_secs_f32();
        if seconds > 0.0 {
            self.frame_count as f32 / seconds
        } else {
            0.0
        }
    }

    #[inline]
    pub fn highest_fps(&self) -> f32 {
        self.highest_fps
    }

    #[inline]
    pub fn lowest_fps(&self) -> f32 {
        self.lowest_fps
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}
