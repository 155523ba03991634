use clap::Parser;
use std::path::PathBuf;

use fast_tracker::Overrides;

/// Play a video preview and log the pointer position while playing.
///
/// SPACE starts/pauses playback and logging together; Q, ESC or closing
/// the window saves the track and quits.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Video file to track
    pub video: PathBuf,

    /// Track file to write
    #[arg(short, long, default_value = "track.txt")]
    pub output: PathBuf,

    /// TOML configuration file
    #[arg(short, long, env = "FAST_TRACKER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Preview width in pixels
    #[arg(long)]
    pub preview_width: Option<u32>,

    /// Preview frame rate
    #[arg(long)]
    pub fps: Option<f64>,

    /// Playback speed multiplier
    #[arg(long)]
    pub speed: Option<f64>,

    /// Samples per second while running
    #[arg(long)]
    pub sample_rate: Option<f64>,

    /// Seconds behind schedule before frames are dropped (0 never drops)
    #[arg(long)]
    pub max_lag: Option<f64>,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn overrides(&self) -> Overrides {
        Overrides {
            preview_width: self.preview_width,
            fps: self.fps,
            speed: self.speed,
            sample_rate: self.sample_rate,
            max_lag: self.max_lag,
        }
    }
}
