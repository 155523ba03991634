//! ffprobe / ffmpeg subprocess plumbing
//!
//! The decoder runs as a child process writing raw BGR24 frames to its
//! stdout. Nothing here interprets frames; [`FrameStream`] does.

use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::capture::frame::{PixelFormat, Size};
use crate::capture::stream::FrameStream;
use crate::error::{Result, TrackerError};
use crate::SourceConfig;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
}

/// Query the dimensions of the first video stream.
#[instrument(skip(ffprobe))]
pub fn probe_size(ffprobe: &str, path: &Path) -> Result<Size> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "json",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| TrackerError::Spawn {
            program: ffprobe.to_string(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = if stderr.trim().is_empty() {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        return Err(TrackerError::Probe(format!(
            "{} exited with {}: {}",
            ffprobe, output.status, detail
        )));
    }

    parse_probe(&String::from_utf8_lossy(&output.stdout))
}

fn parse_probe(json: &str) -> Result<Size> {
    let probe: ProbeOutput = serde_json::from_str(json)?;
    let stream = probe
        .streams
        .first()
        .ok_or_else(|| TrackerError::Probe("no video stream found".into()))?;

    match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Ok(Size::new(w, h)),
        _ => Err(TrackerError::Probe(
            "video stream has unknown dimensions".into(),
        )),
    }
}

/// Preview size for a given width: keeps the aspect ratio, height rounded
/// down to an even number.
pub fn preview_size(original: Size, preview_width: u32) -> Result<Size> {
    if preview_width == 0 || original.width == 0 {
        return Err(TrackerError::InvalidConfig(
            "preview width must be positive".into(),
        ));
    }

    let scaled = original.height as f64 * (preview_width as f64 / original.width as f64);
    let mut height = scaled.round() as u32;
    height -= height % 2;

    if height < 2 {
        return Err(TrackerError::InvalidConfig(format!(
            "preview width {} gives an empty preview for a {} source",
            preview_width, original
        )));
    }
    Ok(Size::new(preview_width, height))
}

/// Arguments for a decoder writing scaled, frame-rate converted raw video to stdout.
pub fn ffmpeg_args(source: &SourceConfig, input: &Path, preview: Size, fps: f64) -> Vec<String> {
    let filter = format!(
        "scale={}:{}:flags=fast_bilinear,fps={}",
        preview.width, preview.height, fps
    );
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "warning".into(),
        "-hwaccel".into(),
        source.hwaccel.clone(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-an".into(),
        "-vf".into(),
        filter,
        "-pix_fmt".into(),
        PixelFormat::Bgr24.ffmpeg_name().into(),
        "-f".into(),
        "rawvideo".into(),
        "pipe:1".into(),
    ]
}

/// Running decoder process. Killed and reaped on drop.
pub struct FfmpegPipe {
    child: Child,
    preview: Size,
}

impl FfmpegPipe {
    #[instrument(skip(source))]
    pub fn spawn(source: &SourceConfig, input: &Path, preview: Size, fps: f64) -> Result<Self> {
        let args = ffmpeg_args(source, input, preview, fps);
        debug!("{} {}", source.ffmpeg, args.join(" "));

        let child = Command::new(&source.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| TrackerError::Spawn {
                program: source.ffmpeg.clone(),
                source: e,
            })?;

        info!(pid = child.id(), "decoder started: {} @ {}fps", preview, fps);
        Ok(Self { child, preview })
    }

    /// Hand out the frame stream over the child's stdout. Only once.
    pub fn frames(&mut self) -> Result<FrameStream<ChildStdout>> {
        let stdout = self.child.stdout.take().ok_or(TrackerError::StreamTaken)?;
        Ok(FrameStream::new(stdout, self.preview, PixelFormat::Bgr24))
    }
}

impl Drop for FfmpegPipe {
    fn drop(&mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => debug!("decoder already exited: {}", status),
            _ => {
                if let Err(e) = self.child.kill() {
                    warn!("failed to kill decoder: {}", e);
                }
                let _ = self.child.wait();
            }
        }
    }
}
