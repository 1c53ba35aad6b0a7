// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use core_types::status::{slugify, MetricSample, ServiceMetricsReporter};
use core_types::types::{BinnerSpec, SampleBatch};
use parking_lot::{Mutex, RwLock};

use crate::binner::{Binner, BinnerCounters};
use crate::error::BinningError;
use crate::subscription::{SubscriberSet, Subscription};

/// Identity of one registered binner.
#[derive(Debug, Clone, PartialEq)]
pub struct BinnerKey {
    pub source: String,
    pub window_span: f64,
    pub bin_span: f64,
}

impl fmt::Display for BinnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} w{}s b{}s",
            self.source, self.window_span, self.bin_span
        )
    }
}

/// Shared handle to one registered binner: subscribe and observe without
/// touching the ingest lock.
#[derive(Clone)]
pub struct BinnerHandle {
    key: BinnerKey,
    binner: Arc<Mutex<Binner>>,
    subscribers: Arc<SubscriberSet>,
    counters: Arc<BinnerCounters>,
}

impl BinnerHandle {
    pub fn key(&self) -> &BinnerKey {
        &self.key
    }

    pub fn subscribe(&self, capacity: usize) -> Subscription {
        self.subscribers.subscribe(capacity)
    }

    pub fn counters(&self) -> &Arc<BinnerCounters> {
        &self.counters
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl ServiceMetricsReporter for BinnerHandle {
    fn service_name(&self) -> &'static str {
        "binning"
    }

    fn collect_metrics(&self) -> Vec<MetricSample> {
        let prefix = slugify(&self.key.to_string());
        vec![
            MetricSample::gauge(
                format!("{}_stale_samples", prefix),
                self.counters.stale_samples.load(Ordering::Relaxed) as f64,
            ),
            MetricSample::gauge(
                format!("{}_bin_overflows", prefix),
                self.counters.bin_overflows.load(Ordering::Relaxed) as f64,
            ),
            MetricSample::gauge(
                format!("{}_bins_emitted", prefix),
                self.counters.bins_emitted.load(Ordering::Relaxed) as f64,
            ),
            MetricSample::gauge(
                format!("{}_publish_drops", prefix),
                self.counters.publish_drops.load(Ordering::Relaxed) as f64,
            ),
        ]
    }
}

/// Owns all binners, keyed by source name, and routes each incoming sample
/// batch to every binner registered for that source.
///
/// An explicit owned structure rather than process-wide state, so multiple
/// independent dispatchers can coexist (and be torn down) in tests. One
/// producer drives a given source at a time; binners for different sources
/// share no mutable state, so ingestion across sources runs in parallel and
/// the per-binner mutex is uncontended by design.
#[derive(Default)]
pub struct BinDispatcher {
    binners: RwLock<HashMap<String, Vec<BinnerHandle>>>,
}

impl BinDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Constructs and registers a binner for `spec`. Multiple binners may
    /// share a source name with different spans.
    pub fn add_binner(&self, spec: &BinnerSpec) -> Result<BinnerHandle, BinningError> {
        let binner = Binner::new(spec.source.clone(), spec.window_span_s, spec.bin_span_s)?;
        let handle = BinnerHandle {
            key: BinnerKey {
                source: spec.source.clone(),
                window_span: spec.window_span_s,
                bin_span: spec.bin_span_s,
            },
            subscribers: Arc::clone(binner.subscribers()),
            counters: Arc::clone(binner.counters()),
            binner: Arc::new(Mutex::new(binner)),
        };
        self.binners
            .write()
            .entry(spec.source.clone())
            .or_default()
            .push(handle.clone());
        Ok(handle)
    }

    /// Routes one batch to every binner registered for its source. A source
    /// with no binners is a no-op, not an error. Each binner filters stale
    /// data for its own window, so one binner's lag never blocks another.
    pub fn ingest(&self, batch: &SampleBatch) -> Result<(), BinningError> {
        let handles = {
            let guard = self.binners.read();
            match guard.get(&batch.source) {
                Some(handles) => handles.clone(),
                None => return Ok(()),
            }
        };
        for handle in &handles {
            handle
                .binner
                .lock()
                .update(batch.start_ts, &batch.samples, batch.sample_rate)?;
        }
        Ok(())
    }

    /// Handle lookup by registration key.
    pub fn handle(&self, source: &str, window_span: f64, bin_span: f64) -> Option<BinnerHandle> {
        let guard = self.binners.read();
        guard.get(source)?.iter().find(|h| {
            h.key.window_span == window_span && h.key.bin_span == bin_span
        }).cloned()
    }

    /// Subscribes to an existing binner by registration key.
    pub fn subscribe(
        &self,
        source: &str,
        window_span: f64,
        bin_span: f64,
        capacity: usize,
    ) -> Option<Subscription> {
        self.handle(source, window_span, bin_span)
            .map(|h| h.subscribe(capacity))
    }

    /// Every registered handle, all sources.
    pub fn handles(&self) -> Vec<BinnerHandle> {
        self.binners.read().values().flatten().cloned().collect()
    }

    /// Closes every binner's subscriber channels so consumers observe
    /// end-of-stream rather than hanging.
    pub fn close(&self) {
        for handle in self.handles() {
            handle.subscribers.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(source: &str, start_ts: f64, samples: &[f64], rate: f64) -> SampleBatch {
        SampleBatch {
            source: source.to_string(),
            start_ts,
            samples: samples.to_vec(),
            sample_rate: rate,
        }
    }

    #[test]
    fn unknown_source_is_a_no_op() {
        let dispatcher = BinDispatcher::new();
        dispatcher
            .ingest(&batch("NOBODY_HHZ", 0.0, &[1.0], 1.0))
            .unwrap();
    }

    #[tokio::test]
    async fn routes_to_every_binner_for_the_source() {
        let dispatcher = BinDispatcher::new();
        let fine = dispatcher
            .add_binner(&BinnerSpec::new("STA_BHZ", 4.0, 1.0))
            .unwrap();
        let coarse = dispatcher
            .add_binner(&BinnerSpec::new("STA_BHZ", 8.0, 2.0))
            .unwrap();
        dispatcher
            .add_binner(&BinnerSpec::new("OTHER_BHZ", 4.0, 1.0))
            .unwrap();

        let mut fine_sub = fine.subscribe(8);
        let mut coarse_sub = coarse.subscribe(8);

        dispatcher
            .ingest(&batch("STA_BHZ", 0.0, &[1.0, 2.0], 1.0))
            .unwrap();

        let fine_bins = fine_sub.recv().await.unwrap();
        assert_eq!(fine_bins.len(), 2);
        assert_eq!(fine_bins[0].timestamp, 0.0);
        assert_eq!(fine_bins[1].timestamp, 1.0);
        assert_eq!(fine_bins[0].sample_count, 1);

        let coarse_bins = coarse_sub.recv().await.unwrap();
        assert_eq!(coarse_bins.len(), 1);
        assert_eq!(coarse_bins[0].sample_count, 2);
    }

    #[test]
    fn independent_dispatchers_coexist() {
        let a = BinDispatcher::new();
        let b = BinDispatcher::new();
        let ha = a.add_binner(&BinnerSpec::new("STA_BHZ", 4.0, 1.0)).unwrap();
        a.ingest(&batch("STA_BHZ", 0.0, &[1.0], 1.0)).unwrap();
        b.ingest(&batch("STA_BHZ", 0.0, &[1.0], 1.0)).unwrap();
        assert_eq!(
            ha.counters()
                .bins_emitted
                .load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }

    #[test]
    fn handle_lookup_by_key() {
        let dispatcher = BinDispatcher::new();
        dispatcher
            .add_binner(&BinnerSpec::new("STA_BHZ", 4.0, 1.0))
            .unwrap();
        assert!(dispatcher.handle("STA_BHZ", 4.0, 1.0).is_some());
        assert!(dispatcher.handle("STA_BHZ", 4.0, 2.0).is_none());
        assert!(dispatcher.subscribe("STA_BHZ", 4.0, 1.0, 4).is_some());
    }

    #[tokio::test]
    async fn close_ends_all_subscriptions() {
        let dispatcher = BinDispatcher::new();
        let handle = dispatcher
            .add_binner(&BinnerSpec::new("STA_BHZ", 4.0, 1.0))
            .unwrap();
        let mut sub = handle.subscribe(4);
        dispatcher.close();
        assert!(sub.recv().await.is_none());
    }
}
