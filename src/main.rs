//! Fast Tracker: manual point tracking over an ffmpeg preview pipe

mod cli;

use color_eyre::{eyre::eyre, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::Args;
use fast_tracker::capture::ffmpeg::{preview_size, probe_size};
use fast_tracker::capture::FfmpegPipe;
use fast_tracker::display::Sdl2Display;
use fast_tracker::output::save_samples;
use fast_tracker::pipeline::{Engine, SystemTimer};
use fast_tracker::Config;

fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fast_tracker=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    let args = Args::parse_args();

    // Load configuration
    let config = Config::load(args.config.as_deref(), &args.overrides())?;

    // Probe the source and start the decoder
    let original = probe_size(&config.source.ffprobe, &args.video)?;
    let preview = preview_size(original, config.preview.width)?;
    let mut pipe = FfmpegPipe::spawn(&config.source, &args.video, preview, config.preview.fps)?;
    let frames = pipe.frames()?;

    info!(
        "Original: {} | Preview: {} @ {}fps",
        original, preview, config.preview.fps
    );
    info!("SPACE=start/stop (both playback & collecting), Q/ESC=quit");

    // Initialize SDL2
    let sdl_context = sdl2::init().map_err(|e| eyre!(e))?;
    let display = Sdl2Display::new(&sdl_context, &config.display.title, preview)?;

    let engine = Engine::new(frames, display, SystemTimer, original, &config)?;
    let session = engine.run();

    // Stop the decoder before writing
    drop(pipe);

    save_samples(&args.output, &session.samples)?;
    Ok(())
}
