// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Main runtime with Tokio: registers binners from config, starts the
//! metrics exporter and the ingest service, and logs completed bins.

use std::process;
use std::sync::Arc;

use binning_engine::{BinDispatcher, BinnerHandle};
use chrono::{DateTime, Utc};
use core_types::status::ServiceMetricsReporter;
use core_types::types::BinRecord;
use core_types::AppConfig;
use feed_source::ReplaySource;
use ingest_service::IngestService;
use log::info;
use metrics::Metrics;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::time::Duration;

#[derive(Debug, Error)]
enum AppError {
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("binning error: {0}")]
    Binning(#[from] binning_engine::BinningError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() {
    env_logger::init();
    if let Err(err) = run().await {
        eprintln!("wavecast failed: {err}");
        process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let config = AppConfig::load()?;

    let dispatcher = Arc::new(BinDispatcher::new());
    let metrics = Metrics::new();

    for spec in &config.binning.binners {
        let handle = dispatcher.add_binner(spec)?;
        info!(
            "registered binner {} ({} slots)",
            handle.key(),
            (spec.window_span_s / spec.bin_span_s).ceil() as usize
        );
        let reporter: Arc<dyn ServiceMetricsReporter> = Arc::new(handle.clone());
        metrics.register_service_metrics(reporter);
        spawn_bin_logger(handle, config.binning.subscriber_capacity.max(1));
    }

    let listener = TcpListener::bind(&config.metrics.listen_addr).await?;
    info!("metrics listening on {}", config.metrics.listen_addr);
    {
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            if let Err(err) = metrics.serve(listener).await {
                log::error!("metrics server failed: {}", err);
            }
        });
    }
    metrics.spawn_service_metric_task(Duration::from_secs(
        config.metrics.collect_interval_s.max(1),
    ));

    if config.replay.path.is_empty() {
        eprintln!("wavecast: no replay path configured; nothing to ingest");
    } else {
        let source = ReplaySource::new(&config.replay.path, config.replay.channel_capacity);
        let service = IngestService::new(Arc::new(source), Arc::clone(&dispatcher));
        metrics.register_service_status(service.status_handle());
        service.start();
        info!("ingesting from {}", config.replay.path);
    }

    tokio::signal::ctrl_c().await?;
    dispatcher.close();
    Ok(())
}

/// Logs every completed bin a binner emits; also serves as the reference
/// subscriber wiring for downstream front ends.
fn spawn_bin_logger(handle: BinnerHandle, capacity: usize) {
    let key = handle.key().clone();
    let mut subscription = handle.subscribe(capacity);
    tokio::spawn(async move {
        while let Some(bins) = subscription.recv().await {
            for bin in bins {
                info!("{}: {}", key, render_bin(&bin));
            }
        }
        info!("{}: bin stream closed", key);
    });
}

fn render_bin(bin: &BinRecord) -> String {
    format!(
        "[{}] max={:.4} min={:.4} mean={:.4} n={}",
        format_ts(bin.timestamp),
        bin.max,
        bin.min,
        bin.mean,
        bin.sample_count
    )
}

fn format_ts(ts: f64) -> String {
    let secs = ts.floor() as i64;
    let nanos = ((ts - secs as f64) * 1e9) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| format!("{:.3}", ts))
}
