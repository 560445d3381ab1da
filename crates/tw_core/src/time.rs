//! Fixed-cadence frame pacing for the map engine loop.
//!
//! Every frame gets a deadline one interval after the previous one. Running
//! ahead of the deadline sleeps; running behind skips rendering (update still
//! happens) for at most `MAX_FRAME_SKIP` frames in a row so the picture never
//! freezes completely. Falling more than `MAX_LAG` seconds behind resyncs the
//! deadline to the current instant instead of trying to catch up.

use std::time::{Duration, Instant};

const FPS_SAMPLE_COUNT: usize = 60;

/// Upper bound on consecutive frames whose render is skipped.
pub const MAX_FRAME_SKIP: u32 = 5;

/// Spiral-of-death cap, in seconds.
pub const MAX_LAG: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePacing {
    Render,
    Skip,
}

impl FramePacing {
    pub fn should_render(self) -> bool {
        matches!(self, Self::Render)
    }
}

pub struct FramePacer {
    pub frame_count: u64,
    pub skipped_frames: u64,
    pub real_dt: f64,
    consecutive_skips: u32,
    next_deadline: Option<Instant>,
    last_instant: Option<Instant>,

    fps_samples: [f64; FPS_SAMPLE_COUNT],
    fps_sample_index: usize,
    pub smoothed_fps: f64,
    pub smoothed_frame_time_ms: f64,
}

impl FramePacer {
    pub fn new() -> Self {
        Self {
            frame_count: 0,
            skipped_frames: 0,
            real_dt: 0.0,
            consecutive_skips: 0,
            next_deadline: None,
            last_instant: None,
            fps_samples: [1.0 / 60.0; FPS_SAMPLE_COUNT],
            fps_sample_index: 0,
            smoothed_fps: 60.0,
            smoothed_frame_time_ms: 16.667,
        }
    }

    /// Start a frame at `framerate` frames per second, sleeping if the loop
    /// is ahead of schedule. `framerate <= 0` means unthrottled.
    pub fn begin_frame(&mut self, framerate: i32) -> FramePacing {
        let (pacing, wait) = self.plan_frame(Instant::now(), framerate);
        if let Some(wait) = wait {
            std::thread::sleep(wait);
        }
        pacing
    }

    /// Forget the schedule, e.g. after the loop was stopped for a while.
    pub fn reset(&mut self) {
        self.next_deadline = None;
        self.last_instant = None;
        self.consecutive_skips = 0;
    }

    fn plan_frame(&mut self, now: Instant, framerate: i32) -> (FramePacing, Option<Duration>) {
        self.record_sample(now);
        self.frame_count += 1;

        if framerate <= 0 {
            self.next_deadline = None;
            self.consecutive_skips = 0;
            return (FramePacing::Render, None);
        }

        let interval = Duration::from_secs_f64(1.0 / f64::from(framerate));
        let mut deadline = match self.next_deadline {
            Some(previous) => previous + interval,
            None => now,
        };

        let (pacing, wait) = if now < deadline {
            self.consecutive_skips = 0;
            (FramePacing::Render, Some(deadline - now))
        } else {
            let lateness = now - deadline;
            if lateness.as_secs_f64() > MAX_LAG {
                log::warn!(
                    "Map engine fell {:.1}ms behind, resyncing frame clock",
                    lateness.as_secs_f64() * 1000.0
                );
                deadline = now;
                self.consecutive_skips = 0;
                (FramePacing::Render, None)
            } else if lateness > interval && self.consecutive_skips < MAX_FRAME_SKIP {
                self.consecutive_skips += 1;
                self.skipped_frames += 1;
                log::debug!(
                    "Skipping render of frame {} ({} in a row)",
                    self.frame_count,
                    self.consecutive_skips
                );
                (FramePacing::Skip, None)
            } else {
                self.consecutive_skips = 0;
                (FramePacing::Render, None)
            }
        };

        self.next_deadline = Some(deadline);
        (pacing, wait)
    }

    fn record_sample(&mut self, now: Instant) {
        self.real_dt = match self.last_instant {
            Some(last) => now.duration_since(last).as_secs_f64(),
            None => 0.0,
        };
        self.last_instant = Some(now);
        if self.real_dt <= 0.0 {
            return;
        }

        self.fps_samples[self.fps_sample_index] = self.real_dt;
        self.fps_sample_index = (self.fps_sample_index + 1) % FPS_SAMPLE_COUNT;
        let avg_dt: f64 = self.fps_samples.iter().sum::<f64>() / FPS_SAMPLE_COUNT as f64;
        self.smoothed_frame_time_ms = avg_dt * 1000.0;
        self.smoothed_fps = if avg_dt > 0.0 { 1.0 / avg_dt } else { 0.0 };
    }
}

impl Default for FramePacer {
    fn default() -> Self {
        Self::new()
    }
}
