// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use time_ring::TimeWindow;

use crate::bins::{AddOutcome, Bin};
use crate::error::BinningError;
use crate::subscription::SubscriberSet;

/// Tolerance when checking that `bin_span * sample_rate` is integral.
const SPAN_EPSILON: f64 = 1e-9;

/// Recoverable-condition counters, shared with the subscriber set and the
/// metrics exporter.
#[derive(Debug, Default)]
pub struct BinnerCounters {
    pub stale_samples: AtomicU64,
    pub bin_overflows: AtomicU64,
    pub bins_emitted: AtomicU64,
    pub publish_drops: AtomicU64,
}

/// Consumes raw samples for one `(source, window span, bin span)`
/// configuration, aggregates them into the bins of its sliding window, and
/// fans completed (or superseded) bins out to subscribers.
pub struct Binner {
    source: String,
    bin_span: f64,
    window: TimeWindow<Bin>,
    /// Slot timestamp of the bin touched by the most recent sample; used to
    /// detect the hop to a later bin that finalizes an under-filled one.
    previous: Option<f64>,
    subscribers: Arc<SubscriberSet>,
    counters: Arc<BinnerCounters>,
}

impl Binner {
    pub fn new(
        source: impl Into<String>,
        window_span: f64,
        bin_span: f64,
    ) -> Result<Self, BinningError> {
        let source = source.into();
        if !(bin_span.is_finite() && bin_span > 0.0)
            || !(window_span.is_finite() && window_span >= bin_span)
        {
            return Err(BinningError::InvalidSpan {
                window_span,
                bin_span,
            });
        }
        let size = (window_span / bin_span).ceil() as usize;
        let window = TimeWindow::new(size, 0.0, bin_span)?;
        let counters = Arc::new(BinnerCounters::default());
        let subscribers = SubscriberSet::new(source.clone(), Arc::clone(&counters));
        Ok(Self {
            source,
            bin_span,
            window,
            previous: None,
            subscribers,
            counters,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn subscribers(&self) -> &Arc<SubscriberSet> {
        &self.subscribers
    }

    pub fn counters(&self) -> &Arc<BinnerCounters> {
        &self.counters
    }

    pub fn window(&self) -> &TimeWindow<Bin> {
        &self.window
    }

    /// Expected samples per bin for a given rate; must come out integral.
    fn bin_sample_count(&self, sample_rate: f64) -> Result<u32, BinningError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(BinningError::InvalidSampleRate { sample_rate });
        }
        let per_bin = self.bin_span * sample_rate;
        let rounded = per_bin.round();
        if rounded < 1.0 || (per_bin - rounded).abs() > SPAN_EPSILON {
            return Err(BinningError::NonIntegralSpan {
                bin_span: self.bin_span,
                sample_rate,
                got: per_bin,
            });
        }
        Ok(rounded as u32)
    }

    /// Folds a batch of `samples.len()` contiguous samples starting at
    /// `root_ts` into the window and returns the bins that became ready to
    /// emit, in the order they became ready. Ready bins are also published to
    /// subscribers. Samples behind the window tail are dropped as stale.
    pub fn update(
        &mut self,
        root_ts: f64,
        samples: &[f64],
        sample_rate: f64,
    ) -> Result<Vec<Bin>, BinningError> {
        if samples.is_empty() {
            return Ok(Vec::new());
        }
        let span_size = self.bin_sample_count(sample_rate)?;
        let mut emitted = Vec::new();

        for (i, &value) in samples.iter().enumerate() {
            let ts = root_ts + i as f64 / sample_rate;
            if ts < self.window.tail_time() {
                // arrived too late to matter; presumed duplicate retransmission
                self.counters.stale_samples.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            let slot_ts = self.window.floor_ts(ts);

            if let Some(prev_ts) = self.previous {
                if prev_ts != slot_ts {
                    self.emit_if_partial(prev_ts, span_size, &mut emitted);
                }
            }

            let outcome = match self.window.get_mut(slot_ts) {
                Ok(Some(existing)) => existing.add(value),
                _ => {
                    // empty slot, or ahead of the head; put handles gap fill
                    let mut bin = Bin::new(slot_ts, span_size);
                    let outcome = bin.add(value);
                    self.window.put(slot_ts, bin)?;
                    outcome
                }
            };
            if outcome == AddOutcome::Overflow {
                self.counters.bin_overflows.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "{}: bin overflow at {}; probable duplicate data",
                    self.source,
                    slot_ts
                );
            }

            if let Ok(Some(bin)) = self.window.get(slot_ts) {
                if bin.sample_count() == span_size {
                    emitted.push(bin.clone());
                }
            }
            self.previous = Some(slot_ts);
        }

        if !emitted.is_empty() {
            self.counters
                .bins_emitted
                .fetch_add(emitted.len() as u64, Ordering::Relaxed);
            let records: Vec<_> = emitted.iter().map(|b| b.record(&self.source)).collect();
            self.subscribers.publish(&records);
        }
        Ok(emitted)
    }

    /// A hop to a different bin finalizes the previous one: under normal
    /// forward progress it will never fill further, so emit it as a partial.
    fn emit_if_partial(&self, prev_ts: f64, span_size: u32, emitted: &mut Vec<Bin>) {
        if let Ok(Some(prev)) = self.window.get(prev_ts) {
            if prev.sample_count() < span_size {
                emitted.push(prev.clone());
            }
        }
    }

    /// Drops all subscriber channels so consumers observe end-of-stream.
    pub fn close(&self) {
        self.subscribers.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuples(bins: &[Bin]) -> Vec<(f64, f64, f64, f64, u32)> {
        bins.iter()
            .map(|b| (b.timestamp(), b.max(), b.min(), b.mean(), b.sample_count()))
            .collect()
    }

    #[test]
    fn one_sample_bins_at_4hz() {
        // bin span of one sample, window of three samples
        let mut binner = Binner::new("STA_BHZ", 0.75, 0.25).unwrap();
        let emitted = binner.update(0.0, &[1.0, 2.0, 3.0], 4.0).unwrap();
        assert_eq!(
            tuples(&emitted),
            vec![
                (0.0, 1.0, 1.0, 1.0, 1),
                (0.25, 2.0, 2.0, 2.0, 1),
                (0.5, 3.0, 3.0, 3.0, 1),
            ]
        );
    }

    #[test]
    fn five_sample_bins_at_1hz() {
        let mut binner = Binner::new("STA_BHZ", 10.0, 5.0).unwrap();
        let first = binner.update(0.0, &[1.0, 2.0, 3.0, 4.0, 5.0], 1.0).unwrap();
        assert_eq!(tuples(&first), vec![(0.0, 5.0, 1.0, 3.0, 5)]);
        let second = binner.update(5.0, &[1.0, 2.0, 3.0, 4.0, 5.0], 1.0).unwrap();
        assert_eq!(tuples(&second), vec![(5.0, 5.0, 1.0, 3.0, 5)]);
    }

    #[test]
    fn partial_bin_emitted_when_processing_moves_on() {
        let mut binner = Binner::new("STA_BHZ", 10.0, 5.0).unwrap();
        // only three of the five expected samples, then the batch jumps to
        // the next bin span
        let emitted = binner.update(2.0, &[7.0, 8.0, 9.0], 1.0).unwrap();
        assert!(emitted.is_empty());
        let emitted = binner.update(5.0, &[1.0], 1.0).unwrap();
        assert_eq!(tuples(&emitted), vec![(0.0, 9.0, 7.0, 24.0 / 5.0, 3)]);
    }

    #[test]
    fn stale_samples_leave_bins_untouched() {
        let mut binner = Binner::new("STA_BHZ", 4.0, 1.0).unwrap();
        binner.update(10.0, &[1.0, 2.0], 1.0).unwrap();
        let before: Vec<_> = binner
            .window()
            .iter()
            .map(|(ts, bin)| (ts, bin.cloned()))
            .collect();

        // tail is at 8.0 after the window advanced to cover 10..12
        let emitted = binner.update(3.0, &[99.0], 1.0).unwrap();
        assert!(emitted.is_empty());
        let after: Vec<_> = binner
            .window()
            .iter()
            .map(|(ts, bin)| (ts, bin.cloned()))
            .collect();
        assert_eq!(before, after);
        assert_eq!(binner.counters().stale_samples.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn out_of_order_within_span_keeps_extrema() {
        let mut fwd = Binner::new("STA_BHZ", 8.0, 4.0).unwrap();
        let mut rev = Binner::new("STA_BHZ", 8.0, 4.0).unwrap();
        let f = fwd.update(0.0, &[1.0, -5.0, 2.0, 4.0], 1.0).unwrap();
        // same samples delivered as two out-of-order batches
        rev.update(2.0, &[2.0, 4.0], 1.0).unwrap();
        let r = rev.update(0.0, &[1.0, -5.0], 1.0).unwrap();
        assert_eq!(f.len(), 1);
        assert_eq!(r.len(), 1);
        assert_eq!(f[0].max(), r[0].max());
        assert_eq!(f[0].min(), r[0].min());
        assert_eq!(f[0].mean(), r[0].mean());
        assert_eq!(f[0].sample_count(), r[0].sample_count());
    }

    #[test]
    fn duplicate_batch_overflows_but_keeps_aggregating() {
        let mut binner = Binner::new("STA_BHZ", 4.0, 2.0).unwrap();
        binner.update(0.0, &[1.0, 2.0], 1.0).unwrap();
        // retransmission of the same span
        let emitted = binner.update(0.0, &[1.0, 2.0], 1.0).unwrap();
        assert_eq!(binner.counters().bin_overflows.load(Ordering::Relaxed), 2);
        // the duplicate pushes the running mean past the true value; that is
        // the documented diagnostic behavior
        assert_eq!(emitted.len(), 0);
        let bin = binner.window().get(0.0).unwrap().unwrap();
        assert_eq!(bin.sample_count(), 4);
        assert_eq!(bin.mean(), 3.0);
    }

    #[test]
    fn premature_partial_on_internally_out_of_order_batch() {
        // documented behavior: a batch hopping to a later bin and back emits
        // the earlier bin while it is still short
        let mut binner = Binner::new("STA_BHZ", 4.0, 2.0).unwrap();
        let e1 = binner.update(2.0, &[5.0], 1.0).unwrap();
        assert!(e1.is_empty());
        let e2 = binner.update(0.0, &[1.0, 2.0], 1.0).unwrap();
        // the hop back to slot 0 emits the under-filled bin at 2.0, then the
        // bin at 0.0 fills exactly
        assert_eq!(tuples(&e2)[0].0, 2.0);
        assert_eq!(tuples(&e2)[0].4, 1);
        assert_eq!(tuples(&e2)[1].0, 0.0);
        assert_eq!(tuples(&e2)[1].4, 2);
    }

    #[test]
    fn non_integral_span_is_a_hard_error() {
        let mut binner = Binner::new("STA_BHZ", 10.0, 5.0).unwrap();
        let err = binner.update(0.0, &[1.0], 0.3).unwrap_err();
        assert!(matches!(err, BinningError::NonIntegralSpan { .. }));
    }

    #[test]
    fn invalid_spans_rejected_at_construction() {
        assert!(matches!(
            Binner::new("STA_BHZ", 1.0, 2.0),
            Err(BinningError::InvalidSpan { .. })
        ));
        assert!(matches!(
            Binner::new("STA_BHZ", 1.0, 0.0),
            Err(BinningError::InvalidSpan { .. })
        ));
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let mut binner = Binner::new("STA_BHZ", 4.0, 1.0).unwrap();
        assert!(binner.update(0.0, &[], 1.0).unwrap().is_empty());
    }
}
