//! Time series values
//!
//! A run of samples sharing a start time and a sample resolution.

use serde::{Deserialize, Serialize};

use crate::error::MergeError;

/// A single sample, positioned by its offset from the series start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub offset: i32,
    pub value: f64,
}

/// Samples recorded at a fixed resolution from a start timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Wall time of offset zero, in nanoseconds
    pub start_timestamp: i64,
    /// Duration covered by one offset step, in nanoseconds
    pub resolution: i64,
    pub samples: Vec<Sample>,
}

impl TimeSeries {
    pub fn new(start_timestamp: i64, resolution: i64) -> Self {
        Self {
            start_timestamp,
            resolution,
            samples: Vec::new(),
        }
    }

    pub fn with_sample(mut self, offset: i32, value: f64) -> Self {
        self.samples.push(Sample { offset, value });
        self
    }

    /// Append the samples of `other`, which must describe the same series.
    pub(crate) fn append(&mut self, other: TimeSeries) -> Result<(), MergeError> {
        if self.start_timestamp != other.start_timestamp || self.resolution != other.resolution {
            return Err(MergeError::Incompatible(format!(
                "time series mismatch: start {} resolution {} vs start {} resolution {}",
                self.start_timestamp, self.resolution, other.start_timestamp, other.resolution
            )));
        }
        self.samples.extend(other.samples);
        Ok(())
    }

    /// Sort samples by offset, keeping only the last written sample for
    /// each offset.
    pub(crate) fn consolidate(&mut self) {
        // Stable sort keeps write order among equal offsets
        self.samples.sort_by_key(|s| s.offset);

        let mut consolidated: Vec<Sample> = Vec::with_capacity(self.samples.len());
        for sample in self.samples.drain(..) {
            match consolidated.last_mut() {
                Some(last) if last.offset == sample.offset => *last = sample,
                _ => consolidated.push(sample),
            }
        }
        self.samples = consolidated;
    }
}

