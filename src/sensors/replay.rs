// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Replays recorded accelerometer traces
//!
//! The file holds one JSON object per line, `{"x": .., "y": .., "z": ..}`.
//! Axes may be null or absent to reproduce incomplete platform readings.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

use super::{MotionSource, Permission, RawMotion};
use crate::error::Result;

pub struct ReplayMotionSource {
    id: String,
    path: PathBuf,
    samples: Arc<Vec<RawMotion>>,
    sample_rate: f64,
}

impl ReplayMotionSource {
    /// Load a trace; lines that fail to parse are skipped
    pub fn open(path: &Path, sample_rate: f64) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let samples = parse_trace(&content);
        info!("Loaded {} motion samples from {:?}", samples.len(), path);

        Ok(Self {
            id: format!("replay:{}", path.display()),
            path: path.to_path_buf(),
            samples: Arc::new(samples),
            sample_rate,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

fn parse_trace(content: &str) -> Vec<RawMotion> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| match serde_json::from_str::<RawMotion>(line) {
            Ok(raw) => Some(raw),
            Err(e) => {
                warn!("Skipping trace line {}: {}", n + 1, e);
                None
            }
        })
        .collect()
}

#[async_trait]
impl MotionSource for ReplayMotionSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn request_permission(&self) -> Result<Permission> {
        Ok(Permission::NotRequired)
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<RawMotion>> {
        let (tx, rx) = mpsc::channel(256);
        let samples = self.samples.clone();
        let period = Duration::from_secs_f64(1.0 / self.sample_rate.max(1.0));
        let id = self.id.clone();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            for raw in samples.iter() {
                ticker.tick().await;
                if tx.send(*raw).await.is_err() {
                    return;
                }
            }
            debug!("Replay {} finished", id);
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_trace_skips_bad_lines() {
        let trace = "{\"x\":0,\"y\":0,\"z\":9.8}\nnot json\n\n{\"x\":1,\"y\":null,\"z\":2}\n";
        let samples = parse_trace(trace);
        assert_eq!(samples.len(), 2);
        assert!(samples[0].complete().is_some());
        assert!(samples[1].complete().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_streams_in_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{\"x\":0,\"y\":0,\"z\":0}}").unwrap();
        writeln!(file, "{{\"x\":0,\"y\":0,\"z\":25}}").unwrap();

        let source = ReplayMotionSource::open(file.path(), 100.0).unwrap();
        assert_eq!(source.len(), 2);

        let mut rx = source.subscribe().await.unwrap();
        assert_eq!(rx.recv().await.unwrap().z, Some(0.0));
        assert_eq!(rx.recv().await.unwrap().z, Some(25.0));
        assert!(rx.recv().await.is_none());
    }
}
