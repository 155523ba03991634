use std::time::{Duration, Instant};

const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Presented-frames-per-second over roughly one second windows
#[derive(Debug, Default, Clone)]
pub struct FpsMeter {
    window_start: Option<Instant>,
    count: u32,
    fps: f64,
}

impl FpsMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one frame at `now` and return the latest estimate
    pub fn tick(&mut self, now: Instant) -> f64 {
        let start = *self.window_start.get_or_insert(now);
        self.count += 1;

        let elapsed = now.saturating_duration_since(start);
        if elapsed >= FPS_WINDOW {
            self.fps = self.count as f64 / elapsed.as_secs_f64();
            self.count = 0;
            self.window_start = Some(now);
        }
        self.fps
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }
}
