use metrics::counter;

use crate::pipeline::mapper::OriginalPoint;

/// One logged position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Preview-relative time in milliseconds
    pub t_ms: f64,
    pub x: i64,
    pub y: i64,
}

/// Greedy forward decimator: keeps an observation only if it is at least
/// one sample period after the last kept one. Kept samples are never
/// revisited.
#[derive(Debug, Clone)]
pub struct SampleDecimator {
    period_ms: f64,
    last_accepted: Option<f64>,
    samples: Vec<Sample>,
}

impl SampleDecimator {
    pub fn new(sample_rate_hz: f64) -> Self {
        Self {
            period_ms: 1000.0 / sample_rate_hz,
            last_accepted: None,
            samples: Vec::new(),
        }
    }

    pub fn period_ms(&self) -> f64 {
        self.period_ms
    }

    /// Returns true if the observation was kept. No position, no-op.
    pub fn offer(&mut self, t_ms: f64, position: Option<OriginalPoint>) -> bool {
        let Some(point) = position else {
            return false;
        };

        let due = match self.last_accepted {
            None => true,
            Some(last) => t_ms - last >= self.period_ms,
        };
        if !due {
            return false;
        }

        self.samples.push(Sample {
            t_ms,
            x: point.x,
            y: point.y,
        });
        self.last_accepted = Some(t_ms);
        counter!("samples_recorded").increment(1);
        true
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }
}
