use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Discrete health level exposed by each managed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallStatus {
    Ok,
    Warn,
    Crit,
}

impl Default for OverallStatus {
    fn default() -> Self {
        OverallStatus::Warn
    }
}

/// Lightweight gauge descriptor exported as metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusGauge {
    pub label: String,
    pub value: f64,
    pub max: Option<f64>,
    pub unit: Option<String>,
}

/// Mutable backing structure for a service status snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub overall: OverallStatus,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub gauges: Vec<StatusGauge>,
}

/// Immutable snapshot returned to consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatusSnapshot {
    pub name: String,
    pub overall: OverallStatus,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub gauges: Vec<StatusGauge>,
}

/// Metric sample emitted by a service-specific reporter.
#[derive(Debug, Clone)]
pub struct MetricSample {
    pub metric: String,
    pub value: f64,
}

impl MetricSample {
    pub fn gauge(metric: impl Into<String>, value: f64) -> Self {
        Self {
            metric: metric.into(),
            value,
        }
    }
}

/// Trait wiring service owned counters into the shared Prometheus exporter.
pub trait ServiceMetricsReporter: Send + Sync {
    fn service_name(&self) -> &'static str;
    fn collect_metrics(&self) -> Vec<MetricSample>;
}

/// Shared handle so services can mutate their own status safely.
#[derive(Clone)]
pub struct ServiceStatusHandle {
    name: &'static str,
    inner: Arc<RwLock<ServiceStatus>>,
}

impl ServiceStatusHandle {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(RwLock::new(ServiceStatus::default())),
        }
    }

    pub fn service_name(&self) -> &'static str {
        self.name
    }

    pub fn update<F>(&self, mutator: F)
    where
        F: FnOnce(&mut ServiceStatus),
    {
        let mut guard = self.inner.write().expect("status poisoned");
        mutator(&mut guard);
    }

    pub fn set_overall(&self, status: OverallStatus) {
        self.update(|s| s.overall = status);
    }

    pub fn push_warning(&self, msg: impl Into<String>) {
        self.update(|s| s.warnings.push(msg.into()));
    }

    pub fn clear_warnings_matching(&self, predicate: impl Fn(&str) -> bool) {
        self.update(|s| s.warnings.retain(|w| !predicate(w)));
    }

    pub fn push_error(&self, msg: impl Into<String>) {
        self.update(|s| s.errors.push(msg.into()));
    }

    pub fn set_gauges(&self, gauges: Vec<StatusGauge>) {
        self.update(|s| s.gauges = gauges);
    }

    pub fn overall(&self) -> OverallStatus {
        let guard = self.inner.read().expect("status poisoned");
        guard.overall
    }

    pub fn snapshot(&self) -> ServiceStatusSnapshot {
        let guard = self.inner.read().expect("status poisoned");
        ServiceStatusSnapshot {
            name: self.name.to_string(),
            overall: guard.overall,
            warnings: guard.warnings.clone(),
            errors: guard.errors.clone(),
            gauges: guard.gauges.clone(),
        }
    }
}

impl ServiceMetricsReporter for ServiceStatusHandle {
    fn service_name(&self) -> &'static str {
        self.name
    }

    fn collect_metrics(&self) -> Vec<MetricSample> {
        let guard = self.inner.read().expect("status poisoned");
        guard
            .gauges
            .iter()
            .map(|g| MetricSample::gauge(format!("{}_{}", self.name, slugify(&g.label)), g.value))
            .collect()
    }
}

pub fn slugify(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for ch in label.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push('_');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_updates() {
        let handle = ServiceStatusHandle::new("ingest");
        handle.set_overall(OverallStatus::Ok);
        handle.push_warning("source stream ended");
        let snap = handle.snapshot();
        assert_eq!(snap.overall, OverallStatus::Ok);
        assert_eq!(snap.warnings.len(), 1);

        handle.clear_warnings_matching(|w| w.contains("stream"));
        assert!(handle.snapshot().warnings.is_empty());
    }

    #[test]
    fn gauges_export_as_metric_samples() {
        let handle = ServiceStatusHandle::new("ingest");
        handle.set_gauges(vec![StatusGauge {
            label: "batches/sec".to_string(),
            value: 12.0,
            max: None,
            unit: None,
        }]);
        let samples = handle.collect_metrics();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].metric, "ingest_batches_sec");
        assert_eq!(samples[0].value, 12.0);
    }
}
