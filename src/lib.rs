pub mod capture;
pub mod display;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod utils;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::clock::MIN_FRAMES_PER_SEC;

pub use capture::{Frame, FrameStream, PixelFormat, Size};
pub use error::{Result, TrackerError};
pub use pipeline::{Engine, RunState, Sample, Session};

/// Prefix for environment overrides, e.g. `FAST_TRACKER_PREVIEW__FPS=20`
pub const ENV_PREFIX: &str = "FAST_TRACKER";

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub preview: PreviewConfig,
    pub sampling: SamplingConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub ffmpeg: String,
    pub ffprobe: String,
    /// Passed to `ffmpeg -hwaccel`
    pub hwaccel: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Preview width in pixels; height follows the source aspect ratio
    pub width: u32,
    /// Preview frame rate
    pub fps: f64,
    /// 1.0 = realtime, >1 faster, <1 slower
    pub speed: f64,
    /// Seconds behind schedule before frames are dropped. 0 never drops.
    pub max_lag_to_drop: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Samples per second logged while running
    pub rate_hz: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub title: String,
    /// Sleep between redraws while paused
    pub idle_poll_ms: u64,
}

/// Command-line overrides, applied on top of file and environment values
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub preview_width: Option<u32>,
    pub fps: Option<f64>,
    pub speed: Option<f64>,
    pub sample_rate: Option<f64>,
    pub max_lag: Option<f64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig {
                ffmpeg: "ffmpeg".into(),
                ffprobe: "ffprobe".into(),
                hwaccel: "auto".into(),
            },
            preview: PreviewConfig {
                width: 1280,
                fps: 15.0,
                speed: 1.0,
                max_lag_to_drop: 0.0,
            },
            sampling: SamplingConfig { rate_hz: 2.0 },
            display: DisplayConfig {
                title: "Fast Tracker (ffmpeg pipe)".into(),
                idle_poll_ms: 20,
            },
        }
    }
}

impl Config {
    /// Layer defaults, an optional TOML file, the environment and CLI overrides.
    pub fn load(file: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("preview.width", overrides.preview_width.map(i64::from))?
            .set_override_option("preview.fps", overrides.fps)?
            .set_override_option("preview.speed", overrides.speed)?
            .set_override_option("preview.max_lag_to_drop", overrides.max_lag)?
            .set_override_option("sampling.rate_hz", overrides.sample_rate)?
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let preview = &self.preview;
        if preview.width == 0 {
            return Err(TrackerError::InvalidConfig(
                "preview.width must be positive".into(),
            ));
        }
        if !(preview.fps.is_finite() && preview.fps > 0.0) {
            return Err(TrackerError::InvalidConfig(format!(
                "preview.fps must be positive, got {}",
                preview.fps
            )));
        }
        if !(preview.speed.is_finite() && preview.speed > 0.0) {
            return Err(TrackerError::InvalidConfig(format!(
                "preview.speed must be positive, got {}",
                preview.speed
            )));
        }
        if !(preview.max_lag_to_drop.is_finite() && preview.max_lag_to_drop >= 0.0) {
            return Err(TrackerError::InvalidConfig(format!(
                "preview.max_lag_to_drop must be zero or positive, got {}",
                preview.max_lag_to_drop
            )));
        }
        if preview.fps * preview.speed < MIN_FRAMES_PER_SEC {
            return Err(TrackerError::InvalidConfig(format!(
                "preview.fps * preview.speed must be at least {}, got {}",
                MIN_FRAMES_PER_SEC,
                preview.fps * preview.speed
            )));
        }
        if Duration::try_from_secs_f64(preview.max_lag_to_drop).is_err() {
            return Err(TrackerError::InvalidConfig(format!(
                "preview.max_lag_to_drop out of range: {}",
                preview.max_lag_to_drop
            )));
        }
        if !(self.sampling.rate_hz.is_finite() && self.sampling.rate_hz > 0.0) {
            return Err(TrackerError::InvalidConfig(format!(
                "sampling.rate_hz must be positive, got {}",
                self.sampling.rate_hz
            )));
        }
        Ok(())
    }
}
