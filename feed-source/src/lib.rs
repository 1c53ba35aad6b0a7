// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Sample acquisition boundary.
//!
//! The real-time distribution backend lives behind [`SampleSource`]: the
//! binning core only ever sees decoded `SampleBatch` values. [`ReplaySource`]
//! streams a JSON-lines recording through that seam for offline runs and
//! tests.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use core_types::types::SampleBatch;
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A decoded stream of sample batches from some acquisition backend.
#[async_trait]
pub trait SampleSource: Send + Sync + 'static {
    async fn stream(&self) -> Result<BoxStream<'static, SampleBatch>, BoxError>;
}

/// Replays a JSON-lines recording of `SampleBatch` values in file order.
#[derive(Clone)]
pub struct ReplaySource {
    path: PathBuf,
    channel_capacity: usize,
}

impl ReplaySource {
    pub fn new(path: impl Into<PathBuf>, channel_capacity: usize) -> Self {
        Self {
            path: path.into(),
            channel_capacity: channel_capacity.max(1),
        }
    }
}

#[async_trait]
impl SampleSource for ReplaySource {
    async fn stream(&self) -> Result<BoxStream<'static, SampleBatch>, BoxError> {
        let path = self.path.clone();
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        tokio::task::spawn_blocking(move || {
            if let Err(err) = replay_blocking(path.as_path(), tx) {
                log::error!("replay source failed: {}", err);
            }
        });
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

fn replay_blocking(path: &Path, tx: mpsc::Sender<SampleBatch>) -> Result<(), BoxError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let batch: SampleBatch = match serde_json::from_str(&line) {
            Ok(batch) => batch,
            Err(err) => {
                log::warn!("skipping malformed replay line {}: {}", lineno + 1, err);
                continue;
            }
        };
        if tx.blocking_send(batch).is_err() {
            // consumer went away; stop replaying
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Write;

    #[tokio::test]
    async fn replays_batches_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.jsonl");
        let mut file = File::create(&path).unwrap();
        for start_ts in [0.0, 5.0] {
            let batch = SampleBatch {
                source: "STA_BHZ".to_string(),
                start_ts,
                samples: vec![1.0, 2.0],
                sample_rate: 1.0,
            };
            writeln!(file, "{}", serde_json::to_string(&batch).unwrap()).unwrap();
        }
        drop(file);

        let source = ReplaySource::new(&path, 4);
        let mut stream = source.stream().await.unwrap();
        assert_eq!(stream.next().await.unwrap().start_ts, 0.0);
        assert_eq!(stream.next().await.unwrap().start_ts, 5.0);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.jsonl");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "not json").unwrap();
        let batch = SampleBatch {
            source: "STA_BHZ".to_string(),
            start_ts: 1.0,
            samples: vec![3.0],
            sample_rate: 1.0,
        };
        writeln!(file, "{}", serde_json::to_string(&batch).unwrap()).unwrap();
        drop(file);

        let source = ReplaySource::new(&path, 4);
        let mut stream = source.stream().await.unwrap();
        assert_eq!(stream.next().await.unwrap().start_ts, 1.0);
        assert!(stream.next().await.is_none());
    }
}
