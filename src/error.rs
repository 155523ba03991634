//! Error types for the tracker library.

use std::io;

use thiserror::Error;

/// Failures that abort a session before (or instead of) running it.
///
/// End of stream and quit are not errors; they end the session normally.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("ffprobe failed: {0}")]
    Probe(String),

    #[error("failed to parse ffprobe output: {0}")]
    ProbeOutput(#[from] serde_json::Error),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The decoder exited before producing a single frame
    #[error("couldn't read the first frame from the decoder; is the source a valid video?")]
    EmptyStream,

    #[error("decoder stdout was already taken")]
    StreamTaken,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T, E = TrackerError> = std::result::Result<T, E>;
