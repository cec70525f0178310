use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Default, Serialize, Clone)]
pub struct MetricsSnapshot {
    pub stages: BTreeMap<String, StageMetrics>,
    pub total_duration_ms: f64,
    pub gate_passes: u64,
    pub gate_rejections: u64,
    pub runs_completed: u64,
    pub runs_failed: u64,
}

#[derive(Debug, Default, Serialize, Clone)]
pub struct StageMetrics {
    pub calls: u64,
    pub total_duration_ms: f64,
    pub max_duration_ms: f64,
}

#[derive(Debug, Default, Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsSnapshot>>,
}

impl MetricsCollector {
    pub fn global() -> &'static MetricsCollector {
        static INSTANCE: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);
        &INSTANCE
    }

    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsSnapshot::default())),
        }
    }

    pub fn start_stage(&self, stage_name: &str) -> StageTimer {
        StageTimer {
            stage: stage_name.to_string(),
            started_at: Instant::now(),
            collector: self.inner.clone(),
            recorded: false,
        }
    }

    pub fn record_total_duration(&self, duration: Duration) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.total_duration_ms = duration.as_secs_f64() * 1_000.0;
        }
    }

    pub fn record_gate_pass(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.gate_passes += 1;
        }
    }

    pub fn record_gate_rejection(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.gate_rejections += 1;
        }
    }

    pub fn record_run_completed(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.runs_completed += 1;
        }
    }

    pub fn record_run_failed(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.runs_failed += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn reset(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = MetricsSnapshot::default();
        }
    }
}

pub struct StageTimer {
    stage: String,
    started_at: Instant,
    collector: Arc<Mutex<MetricsSnapshot>>,
    recorded: bool,
}

impl StageTimer {
    fn record(&mut self) {
        if self.recorded {
            return;
        }
        let duration = self.started_at.elapsed();
        if let Ok(mut guard) = self.collector.lock() {
            let metrics = guard.stages.entry(self.stage.clone()).or_default();
            metrics.calls += 1;
            let duration_ms = duration.as_secs_f64() * 1_000.0;
            metrics.total_duration_ms += duration_ms;
            if duration_ms > metrics.max_duration_ms {
                metrics.max_duration_ms = duration_ms;
            }
        }
        debug!(
            stage = self.stage.as_str(),
            duration_ms = duration.as_secs_f64() * 1_000.0,
            "Stage duration recorded"
        );
        self.recorded = true;
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        self.record();
    }
}

pub fn log_snapshot(snapshot: &MetricsSnapshot) {
    info!(
        total_duration_ms = snapshot.total_duration_ms,
        gate_passes = snapshot.gate_passes,
        gate_rejections = snapshot.gate_rejections,
        runs_completed = snapshot.runs_completed,
        runs_failed = snapshot.runs_failed,
        "Pipeline metrics"
    );
    for (stage, metrics) in &snapshot.stages {
        info!(
            stage = stage.as_str(),
            calls = metrics.calls,
            total_duration_ms = metrics.total_duration_ms,
            max_duration_ms = metrics.max_duration_ms,
            "Stage metrics"
        );
    }
}
