// Copyright (c) James Kassemi, SC, US. All rights reserved.
//! Prometheus metrics. hyper v1.+

use core_types::status::{
    MetricSample, ServiceMetricsReporter, ServiceStatusHandle, ServiceStatusSnapshot,
};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use prometheus::{register_gauge_vec, Encoder, GaugeVec, TextEncoder};
use std::error::Error;
use std::sync::{Arc, Mutex, RwLock};
use tokio::net::TcpListener;
use tokio::time::{self, Duration};

/// Shared metrics hub: collects service-supplied gauges into the Prometheus
/// registry and serves the text exposition format.
pub struct Metrics {
    service_statuses: Mutex<Vec<ServiceStatusHandle>>,
    service_metrics: RwLock<Vec<Arc<dyn ServiceMetricsReporter>>>,
    service_gauges: GaugeVec,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        let service_gauges = register_gauge_vec!(
            "wavecast_service_gauge",
            "Service supplied gauges exposed by the wavecast process",
            &["service", "metric"]
        )
        .expect("gauge vec registration");
        Arc::new(Self {
            service_statuses: Mutex::new(Vec::new()),
            service_metrics: RwLock::new(Vec::new()),
            service_gauges,
        })
    }

    pub fn register_service_status(&self, handle: ServiceStatusHandle) {
        self.service_statuses.lock().unwrap().push(handle.clone());
        let reporter: Arc<dyn ServiceMetricsReporter> = Arc::new(handle);
        self.register_service_metrics(reporter);
    }

    pub fn register_service_metrics(&self, reporter: Arc<dyn ServiceMetricsReporter>) {
        self.service_metrics.write().unwrap().push(reporter);
    }

    pub fn service_status_snapshots(&self) -> Vec<ServiceStatusSnapshot> {
        self.service_statuses
            .lock()
            .unwrap()
            .iter()
            .map(|handle| handle.snapshot())
            .collect()
    }

    pub fn spawn_service_metric_task(
        self: &Arc<Self>,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let metrics = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            loop {
                ticker.tick().await;
                metrics.collect_service_metrics();
            }
        })
    }

    pub fn collect_service_metrics(&self) {
        let reporters = {
            let guard = self.service_metrics.read().unwrap();
            guard.clone()
        };
        for reporter in reporters {
            let samples = reporter.collect_metrics();
            let service = reporter.service_name();
            for sample in samples {
                self.record_metric(service, &sample);
            }
        }
    }

    fn record_metric(&self, service: &str, sample: &MetricSample) {
        let gauge = self
            .service_gauges
            .with_label_values(&[service, sample.metric.as_str()]);
        gauge.set(sample.value);
    }

    async fn handle_metrics(
        &self,
        _req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, std::convert::Infallible> {
        self.collect_service_metrics();
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = Vec::new();
        if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
            log::error!("metrics encoding failed: {}", err);
        }
        Ok(Response::new(Full::new(Bytes::from(buffer))))
    }

    pub async fn serve(
        self: &Arc<Self>,
        listener: TcpListener,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        loop {
            let (socket, _) = listener.accept().await?;
            let io = TokioIo::new(socket);
            let metrics = Arc::clone(self);
            let service = service_fn(move |req| {
                let metrics = Arc::clone(&metrics);
                async move { metrics.handle_metrics(req).await }
            });
            tokio::spawn(async move {
                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    log::error!("error serving metrics connection: {:?}", err);
                }
            });
        }
    }
}
