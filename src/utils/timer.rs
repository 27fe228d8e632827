//! Stage timing

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::info;

/// Named duration recorded by a [`Timer`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: String,
    pub secs: f64,
}

/// Timer for measuring pipeline stages
#[derive(Debug)]
pub struct Timer {
    name: String,
    start: Instant,
    checkpoints: Vec<(String, Duration)>,
}

impl Timer {
    /// Create and start a new timer
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: Instant::now(),
            checkpoints: Vec::new(),
        }
    }

    /// Record the time since start under `stage`
    pub fn checkpoint(&mut self, stage: impl Into<String>) {
        self.checkpoints.push((stage.into(), self.start.elapsed()));
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Per-stage durations (time between consecutive checkpoints)
    pub fn stages(&self) -> Vec<StageTiming> {
        let mut prev = Duration::ZERO;
        self.checkpoints
            .iter()
            .map(|(stage, at)| {
                let delta = at.saturating_sub(prev);
                prev = *at;
                StageTiming {
                    stage: stage.clone(),
                    secs: delta.as_secs_f64(),
                }
            })
            .collect()
    }

    /// Stop and log the timer
    pub fn stop(self) -> Duration {
        let elapsed = self.start.elapsed();
        info!("{} completed in {:.3}s", self.name, elapsed.as_secs_f64());
        elapsed
    }

    /// Stop and log every checkpoint
    pub fn stop_with_report(self) -> Duration {
        let elapsed = self.start.elapsed();
        info!("=== {} timing ===", self.name);
        for s in self.stages() {
            info!("  {}: {:.3}s", s.stage, s.secs);
        }
        info!("  total: {:.3}s", elapsed.as_secs_f64());
        elapsed
    }
}
