//! Track file writer: one `HH:MM:SS.mmm<TAB>x<TAB>y` line per sample

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{info, instrument};

use crate::error::Result;
use crate::pipeline::Sample;

/// Render preview milliseconds as `HH:MM:SS.mmm`, rounded to the nearest millisecond.
pub fn format_timestamp(ms: f64) -> String {
    let total = ms.max(0.0).round() as u64;
    let hours = total / 3_600_000;
    let minutes = (total / 60_000) % 60;
    let seconds = (total / 1000) % 60;
    let millis = total % 1000;
    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
}

pub fn write_samples<W: Write>(mut writer: W, samples: &[Sample]) -> std::io::Result<()> {
    for sample in samples {
        writeln!(
            writer,
            "{}\t{}\t{}",
            format_timestamp(sample.t_ms),
            sample.x,
            sample.y
        )?;
    }
    writer.flush()
}

/// Write the whole track, replacing `path`. Returns the number of lines.
#[instrument(skip(samples), fields(count = samples.len()))]
pub fn save_samples(path: &Path, samples: &[Sample]) -> Result<usize> {
    let file = File::create(path)?;
    write_samples(BufWriter::new(file), samples)?;
    info!("saved {} samples to {}", samples.len(), path.display());
    Ok(samples.len())
}
