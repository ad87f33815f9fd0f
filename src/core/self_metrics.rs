//! Self-metrics: running counters, a sliding latency window, and the
//! healthy/degraded/unhealthy derivation described in §4.10. Grounded on the
//! original `self_monitor.py`'s `SystemMetrics`/`ApplicationMetrics` and its
//! `get_health_summary` thresholds.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

const LATENCY_WINDOW: usize = 100;
const DIAGNOSTIC_RETENTION_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticEntry {
    pub timestamp: DateTime<Local>,
    pub component: String,
    pub level: DiagnosticLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelfStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Host/process resource facts, read from `/proc` rather than a systems-metrics
/// crate (see SPEC_FULL.md §F for why no such crate was added).
#[derive(Debug, Clone, Default, Serialize)]
pub struct SystemMetrics {
    pub process_rss_kb: Option<u64>,
    pub load_average_1m: Option<f64>,
}

impl SystemMetrics {
    pub fn sample() -> Self {
        Self {
            process_rss_kb: read_proc_self_rss_kb(),
            load_average_1m: read_loadavg_1m(),
        }
    }
}

fn read_proc_self_rss_kb() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            return rest.trim().split_whitespace().next()?.parse().ok();
        }
    }
    None
}

fn read_loadavg_1m() -> Option<f64> {
    let content = std::fs::read_to_string("/proc/loadavg").ok()?;
    content.split_whitespace().next()?.parse().ok()
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationMetricsSnapshot {
    pub uptime_seconds: f64,
    pub total_probes: u64,
    pub successful_probes: u64,
    pub failed_probes: u64,
    pub retry_attempts: u64,
    pub active_targets: usize,
    pub open_breakers: usize,
    pub average_latency_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsExport {
    pub application: ApplicationMetricsSnapshot,
    pub system: SystemMetrics,
    pub recent_diagnostics: Vec<DiagnosticEntry>,
    pub status: SelfStatus,
}

struct Inner {
    total_probes: u64,
    successful_probes: u64,
    failed_probes: u64,
    retry_attempts: u64,
    active_targets: usize,
    open_breakers: usize,
    latencies: VecDeque<f64>,
    diagnostics: VecDeque<DiagnosticEntry>,
    system: SystemMetrics,
}

pub struct SelfMetrics {
    started_at: Instant,
    inner: Mutex<Inner>,
}

impl SelfMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            inner: Mutex::new(Inner {
                total_probes: 0,
                successful_probes: 0,
                failed_probes: 0,
                retry_attempts: 0,
                active_targets: 0,
                open_breakers: 0,
                latencies: VecDeque::with_capacity(LATENCY_WINDOW),
                diagnostics: VecDeque::new(),
                system: SystemMetrics::default(),
            }),
        }
    }

    pub fn record_probe(&self, success: bool, latency_seconds: f64) {
        let mut inner = self.inner.lock().expect("self-metrics mutex poisoned");
        inner.total_probes += 1;
        if success {
            inner.successful_probes += 1;
        } else {
            inner.failed_probes += 1;
        }
        if inner.latencies.len() == LATENCY_WINDOW {
            inner.latencies.pop_front();
        }
        inner.latencies.push_back(latency_seconds);
    }

    pub fn record_retry_attempt(&self) {
        self.inner
            .lock()
            .expect("self-metrics mutex poisoned")
            .retry_attempts += 1;
    }

    pub fn update_target_count(&self, count: usize) {
        self.inner
            .lock()
            .expect("self-metrics mutex poisoned")
            .active_targets = count;
    }

    pub fn update_open_breakers(&self, count: usize) {
        self.inner
            .lock()
            .expect("self-metrics mutex poisoned")
            .open_breakers = count;
    }

    pub fn add_diagnostic(&self, component: &str, level: DiagnosticLevel, message: impl Into<String>) {
        let mut inner = self.inner.lock().expect("self-metrics mutex poisoned");
        inner.diagnostics.push_back(DiagnosticEntry {
            timestamp: Local::now(),
            component: component.to_string(),
            level,
            message: message.into(),
        });
        prune_diagnostics(&mut inner.diagnostics);
    }

    /// Opportunistically drop diagnostics older than the retention window, even
    /// when nothing new has been added recently. Called by the 30s background
    /// sampler (§5) so a quiet period doesn't leave stale entries sitting in the
    /// ring indefinitely.
    pub fn prune_stale_diagnostics(&self) {
        let mut inner = self.inner.lock().expect("self-metrics mutex poisoned");
        prune_diagnostics(&mut inner.diagnostics);
    }

    /// Sample `/proc` and store the result, so the 30s background sampler (§5)
    /// keeps a recent reading on hand rather than only sampling on export.
    pub fn sample_system_metrics(&self) {
        let sample = SystemMetrics::sample();
        self.inner.lock().expect("self-metrics mutex poisoned").system = sample;
    }

    fn success_rate(inner: &Inner) -> f64 {
        if inner.total_probes == 0 {
            100.0
        } else {
            (inner.successful_probes as f64 / inner.total_probes as f64) * 100.0
        }
    }

    fn average_latency(inner: &Inner) -> f64 {
        if inner.latencies.is_empty() {
            0.0
        } else {
            inner.latencies.iter().sum::<f64>() / inner.latencies.len() as f64
        }
    }

    /// `healthy` / `degraded` / `unhealthy`, per §4.10's thresholds.
    pub fn status(&self) -> SelfStatus {
        let inner = self.inner.lock().expect("self-metrics mutex poisoned");
        let error_count = count_since(&inner.diagnostics, DiagnosticLevel::Error, chrono::Duration::hours(1));
        let warning_count = count_since(&inner.diagnostics, DiagnosticLevel::Warning, chrono::Duration::hours(1));
        let success_rate = Self::success_rate(&inner);

        if inner.open_breakers > 0 || error_count > 0 {
            SelfStatus::Unhealthy
        } else if !(95.0..=100.0).contains(&success_rate) || warning_count > 5 {
            SelfStatus::Degraded
        } else {
            SelfStatus::Healthy
        }
    }

    pub fn snapshot(&self) -> ApplicationMetricsSnapshot {
        let inner = self.inner.lock().expect("self-metrics mutex poisoned");
        ApplicationMetricsSnapshot {
            uptime_seconds: self.started_at.elapsed().as_secs_f64(),
            total_probes: inner.total_probes,
            successful_probes: inner.successful_probes,
            failed_probes: inner.failed_probes,
            retry_attempts: inner.retry_attempts,
            active_targets: inner.active_targets,
            open_breakers: inner.open_breakers,
            average_latency_seconds: Self::average_latency(&inner),
        }
    }

    /// A one-line operator-facing summary, e.g. for the console view or a
    /// status command (supplemented from `get_status_summary`, §F).
    pub fn status_summary(&self) -> String {
        let snap = self.snapshot();
        format!(
            "status={:?} targets={} probes={} success={} failed={} breakers_open={} avg_latency={:.3}s",
            self.status(),
            snap.active_targets,
            snap.total_probes,
            snap.successful_probes,
            snap.failed_probes,
            snap.open_breakers,
            snap.average_latency_seconds,
        )
    }

    pub fn recent_diagnostics(&self) -> Vec<DiagnosticEntry> {
        self.inner
            .lock()
            .expect("self-metrics mutex poisoned")
            .diagnostics
            .iter()
            .cloned()
            .collect()
    }

    /// Export the current snapshot + diagnostics + system metrics as JSON,
    /// matching `export_diagnostics` in the original self-monitor.
    pub fn export_diagnostics(&self, path: &std::path::Path) -> std::io::Result<()> {
        let system = {
            let inner = self.inner.lock().expect("self-metrics mutex poisoned");
            inner.system.clone()
        };
        let export = DiagnosticsExport {
            application: self.snapshot(),
            system,
            recent_diagnostics: self.recent_diagnostics(),
            status: self.status(),
        };
        let json = serde_json::to_string_pretty(&export)?;
        std::fs::write(path, json)
    }
}

impl Default for SelfMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn prune_diagnostics(diagnostics: &mut VecDeque<DiagnosticEntry>) {
    let cutoff = Local::now() - chrono::Duration::hours(DIAGNOSTIC_RETENTION_HOURS);
    while let Some(front) = diagnostics.front() {
        if front.timestamp < cutoff {
            diagnostics.pop_front();
        } else {
            break;
        }
    }
}

fn count_since(
    diagnostics: &VecDeque<DiagnosticEntry>,
    level: DiagnosticLevel,
    within: chrono::Duration,
) -> usize {
    let cutoff = Local::now() - within;
    diagnostics
        .iter()
        .filter(|d| d.level == level && d.timestamp >= cutoff)
        .count()
}
