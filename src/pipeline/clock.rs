//! Anchor-based frame pacing
//!
//! Frames carry no timestamps, so presentation time is reconstructed from
//! the frame index: frame `i` is due at
//! `wall_anchor + (i - frame_anchor) / (rate * speed)`.

use std::time::{Duration, Instant};

use crate::PreviewConfig;

/// Slowest accepted playback, one frame every thousand seconds
pub const MIN_FRAMES_PER_SEC: f64 = 1e-3;

/// Cap on any schedule offset; `Instant` arithmetic past it may overflow.
const MAX_OFFSET: Duration = Duration::from_secs(u32::MAX as u64);

/// Source of wall time for pacing
pub trait Timer {
    fn now(&self) -> Instant;

    fn sleep(&mut self, duration: Duration);

    /// Block until `deadline`; returns immediately if it has passed.
    fn sleep_until(&mut self, deadline: Instant) {
        let now = self.now();
        if deadline > now {
            self.sleep(deadline - now);
        }
    }
}

/// Monotonic clock and real thread sleeps
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimer;

impl Timer for SystemTimer {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Fixed pacing parameters for a session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pacing {
    /// Nominal preview frames per second
    pub rate: f64,
    /// Playback multiplier
    pub speed: f64,
    /// Drop frames once this far behind; `None` plays every frame
    pub max_lag: Option<Duration>,
}

impl Pacing {
    pub fn new(rate: f64, speed: f64, max_lag_secs: f64) -> Self {
        // a threshold too large for a Duration can never be reached
        let max_lag = (max_lag_secs > 0.0)
            .then(|| Duration::try_from_secs_f64(max_lag_secs).ok())
            .flatten();
        Self {
            rate,
            speed,
            max_lag,
        }
    }

    pub fn from_config(preview: &PreviewConfig) -> Self {
        Self::new(preview.fps, preview.speed, preview.max_lag_to_drop)
    }

    /// Frames presented per second of wall time
    pub fn frames_per_sec(&self) -> f64 {
        self.rate * self.speed
    }

    /// Preview-relative timestamp of a frame in milliseconds. Independent of speed.
    pub fn frame_ms(&self, frame_idx: u64) -> f64 {
        frame_idx as f64 * 1000.0 / self.rate
    }
}

/// Maps frame indices to wall-clock presentation times
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    wall_anchor: Instant,
    frame_anchor: u64,
    pacing: Pacing,
}

impl PlaybackClock {
    /// Anchor `frame_idx` at `now`
    pub fn start(now: Instant, frame_idx: u64, pacing: Pacing) -> Self {
        Self {
            wall_anchor: now,
            frame_anchor: frame_idx,
            pacing,
        }
    }

    pub fn frame_anchor(&self) -> u64 {
        self.frame_anchor
    }

    fn offset(&self, frames: u64) -> Duration {
        Duration::try_from_secs_f64(frames as f64 / self.pacing.frames_per_sec())
            .map_or(MAX_OFFSET, |offset| offset.min(MAX_OFFSET))
    }

    /// Wall time at which `frame_idx` should be on screen
    pub fn target_time(&self, frame_idx: u64) -> Instant {
        self.wall_anchor + self.offset(frame_idx.saturating_sub(self.frame_anchor))
    }

    /// Re-anchor after a pause so `frame_idx` is due exactly at `now`.
    ///
    /// `frame_anchor` is kept: the schedule continues as if the pause
    /// never happened.
    pub fn resume(&mut self, now: Instant, frame_idx: u64) {
        let elapsed = self.offset(frame_idx.saturating_sub(self.frame_anchor));
        self.wall_anchor = now.checked_sub(elapsed).unwrap_or(now);
    }

    /// How late `frame_idx` is at `now`; zero when on time or early.
    pub fn lag(&self, frame_idx: u64, now: Instant) -> Duration {
        now.saturating_duration_since(self.target_time(frame_idx))
    }

    /// Frames that should have been shown since the anchor at `now`
    pub fn frames_due(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.wall_anchor).as_secs_f64()
            * self.pacing.frames_per_sec()
    }

    /// True while `frame_idx` trails the frame the wall clock implies.
    pub fn is_behind(&self, frame_idx: u64, now: Instant) -> bool {
        let shown = frame_idx.saturating_sub(self.frame_anchor) as f64;
        shown < self.frames_due(now).floor()
    }

    /// Whether the drop policy asks for catch-up at `frame_idx`
    pub fn needs_catch_up(&self, frame_idx: u64, now: Instant) -> bool {
        match self.pacing.max_lag {
            Some(max) => self.lag(frame_idx, now) > max,
            None => false,
        }
    }
}
