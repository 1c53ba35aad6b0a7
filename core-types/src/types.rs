// Copyright (c) James Kassemi, SC, US. All rights reserved.

use serde::{Deserialize, Serialize};

/// One decoded batch of contiguous samples from an acquisition source.
///
/// Samples are uniformly spaced: sample `i` carries timestamp
/// `start_ts + i / sample_rate` (epoch seconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleBatch {
    pub source: String,
    pub start_ts: f64,
    pub samples: Vec<f64>,
    pub sample_rate: f64,
}

impl SampleBatch {
    /// Timestamp of the last sample in the batch, or `start_ts` when empty.
    pub fn end_ts(&self) -> f64 {
        match self.samples.len() {
            0 => self.start_ts,
            n => self.start_ts + (n - 1) as f64 / self.sample_rate,
        }
    }
}

/// Subscriber-facing view of one completed (or superseded) bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinRecord {
    pub source: String,
    pub timestamp: f64,
    pub max: f64,
    pub min: f64,
    pub mean: f64,
    pub sample_count: u32,
}

/// Registration tuple for one binner: which source it follows and how it
/// carves time. Spans are seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinnerSpec {
    pub source: String,
    pub window_span_s: f64,
    pub bin_span_s: f64,
}

impl BinnerSpec {
    pub fn new(source: impl Into<String>, window_span_s: f64, bin_span_s: f64) -> Self {
        Self {
            source: source.into(),
            window_span_s,
            bin_span_s,
        }
    }
}
