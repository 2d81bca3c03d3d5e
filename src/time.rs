//! Frame timing for the tick loop.
//!
//! ```ignore
//! let mut clock = FrameClock::new();
//! loop {
//!     let dt = clock.tick();
//!     context.tick(&mut device, dt)?;
//!     if let Some(fps) = clock.take_fps_report() {
//!         log::info!("{:.1} fps", fps);
//!     }
//! }
//! ```

use std::time::{Duration, Instant};

/// Delta time, frame count and a periodic average framerate.
#[derive(Debug)]
pub struct FrameClock {
    last_frame: Instant,
    delta_secs: f32,
    frame_count: u64,
    /// Frame count at the last FPS report.
    report_frame: u64,
    report_time: Instant,
    report_interval: Duration,
    pending_report: Option<f32>,
    /// Fixed delta time for deterministic runs.
    fixed_delta: Option<f32>,
}

impl FrameClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            last_frame: now,
            delta_secs: 0.0,
            frame_count: 0,
            report_frame: 0,
            report_time: now,
            report_interval: Duration::from_secs(1),
            pending_report: None,
            fixed_delta: None,
        }
    }

    /// Use `delta` for every frame instead of wall-clock time.
    pub fn with_fixed_delta(mut self, delta: Option<f32>) -> Self {
        self.fixed_delta = delta;
        self
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    /// Advance one frame. Returns the delta time in seconds.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let raw = now.duration_since(self.last_frame).as_secs_f32();
        self.delta_secs = self.fixed_delta.unwrap_or(raw);
        self.last_frame = now;
        self.frame_count += 1;

        let since_report = now.duration_since(self.report_time);
        if since_report >= self.report_interval {
            let frames = self.frame_count - self.report_frame;
            self.pending_report = Some(frames as f32 / since_report.as_secs_f32());
            self.report_frame = self.frame_count;
            self.report_time = now;
        }

        self.delta_secs
    }

    #[inline]
    pub fn delta(&self) -> f32 {
        self.delta_secs
    }

    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame_count
    }

    /// Average framerate over the last interval, once per interval.
    pub fn take_fps_report(&mut self) -> Option<f32> {
        self.pending_report.take()
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
