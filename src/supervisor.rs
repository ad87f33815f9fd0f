//! Lifecycle owner: wires the core components together, drives the tick loop,
//! handles hot reload and signals, and writes the lifecycle journal records.
//! Grounded on `main.py`'s `HealthMonitorApp` (the one piece of the original
//! that owns the run loop rather than a single tick).

use crate::cli::Cli;
use crate::config::loader::ReloadOutcome;
use crate::config::{ConfigSet, ConfigSource};
use crate::core::journal::Journal;
use crate::core::prober::{DatabaseProber, HttpProber, Prober};
use crate::core::scheduler::Scheduler;
use crate::core::self_metrics::{DiagnosticLevel, SelfMetrics};
use crate::core::snapshot::ConsoleView;
use crate::core::state_tracker::StateTracker;
use crate::core::types::TargetType;
use crate::error::MonitorError;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const SELF_METRICS_SAMPLE_INTERVAL: Duration = Duration::from_secs(30);
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct Supervisor {
    config_source: ConfigSource,
    current: ConfigSet,
    scheduler: Scheduler,
    journal: Arc<Journal>,
    self_metrics: Arc<SelfMetrics>,
    interval: Duration,
    log_all_checks: bool,
    once: bool,
}

impl Supervisor {
    pub fn new(cli: &Cli) -> Result<Self, MonitorError> {
        let mut config_source = ConfigSource::new(&cli.config_dir);
        let current = config_source.load_initial();
        if current.is_empty() {
            return Err(MonitorError::Init(
                "no targets configured: websites.json and databases.json are both empty or missing".to_string(),
            ));
        }

        let journal = Arc::new(Journal::new(&cli.log_dir)?);
        let self_metrics = Arc::new(SelfMetrics::new());
        let view: Arc<dyn crate::core::snapshot::View> = Arc::new(ConsoleView);
        let state_tracker = Arc::new(StateTracker::new());

        let http_prober: Arc<dyn Prober> = Arc::new(
            HttpProber::new()
                .map_err(|e| MonitorError::Init(format!("failed to build HTTP client: {e}")))?,
        );
        let db_prober: Arc<dyn Prober> = Arc::new(DatabaseProber::new());

        let scheduler = Scheduler::new(
            http_prober,
            db_prober,
            Arc::clone(&state_tracker),
            Arc::clone(&journal),
            Arc::clone(&self_metrics),
            view,
        );

        Ok(Self {
            config_source,
            current,
            scheduler,
            journal,
            self_metrics,
            interval: Duration::from_secs(cli.interval),
            log_all_checks: cli.log_all_checks,
            once: cli.once,
        })
    }

    /// Run to completion; returns the process exit code (§6: 0 normal
    /// shutdown, 2 unrecoverable runtime error). The tick loop runs on its own
    /// task so a panic anywhere in it (a bug, not a probe fault — probe faults
    /// are already caught inside the scheduler) surfaces as a `JoinError`
    /// here instead of taking down the process.
    pub async fn run(self) -> i32 {
        let journal = Arc::clone(&self.journal);
        let self_metrics = Arc::clone(&self.self_metrics);

        match tokio::spawn(self.run_loop()).await {
            Ok(code) => code,
            Err(join_err) => {
                eprintln!("[ERROR] supervisor run loop panicked: {join_err}");
                self_metrics.add_diagnostic(
                    "supervisor",
                    DiagnosticLevel::Error,
                    format!("run loop panicked: {join_err}"),
                );
                let _ = journal.append_lifecycle(
                    "supervisor",
                    TargetType::Application,
                    "shutdown_error",
                    join_err.to_string(),
                );
                2
            }
        }
    }

    async fn run_loop(mut self) -> i32 {
        if let Err(e) = self.journal.append_lifecycle(
            "supervisor",
            TargetType::Application,
            "initialized",
            format!(
                "websites={} databases={}",
                self.current.website_count, self.current.database_count
            ),
        ) {
            eprintln!("[ERROR] failed to write initialized record: {e}");
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let signal_task = spawn_signal_listener(Arc::clone(&shutdown));

        let metrics_task = spawn_self_metrics_sampler(Arc::clone(&self.self_metrics));

        loop {
            self.scheduler
                .tick(&self.current.targets, self.log_all_checks)
                .await;

            if self.once || shutdown.load(Ordering::Relaxed) {
                break;
            }

            self.reload_if_changed();

            if sleep_interruptible(self.interval, &shutdown).await {
                break;
            }
        }

        signal_task.abort();
        metrics_task.abort();

        self.shutdown_sequence().await;
        0
    }

    fn reload_if_changed(&mut self) {
        match self.config_source.check_and_reload(&self.current) {
            ReloadOutcome::Unchanged => {}
            ReloadOutcome::Reloaded(new_set) => {
                let live: HashSet<String> =
                    new_set.targets.iter().map(|t| t.name().to_string()).collect();
                self.scheduler.retain_breakers_for(&live);

                let detail = format!(
                    "websites {}->{} databases {}->{}",
                    self.current.website_count,
                    new_set.website_count,
                    self.current.database_count,
                    new_set.database_count
                );
                if let Err(e) = self.journal.append_lifecycle(
                    "supervisor",
                    TargetType::Application,
                    "config_reloaded",
                    detail,
                ) {
                    eprintln!("[ERROR] failed to write config_reloaded record: {e}");
                }
                self.current = new_set;
            }
            ReloadOutcome::Error(message) => {
                self.self_metrics.add_diagnostic(
                    "config",
                    DiagnosticLevel::Warning,
                    message.clone(),
                );
                if let Err(e) = self.journal.append_lifecycle(
                    "supervisor",
                    TargetType::Application,
                    "config_reload_error",
                    message,
                ) {
                    eprintln!("[ERROR] failed to write config_reload_error record: {e}");
                }
            }
        }
    }

    async fn shutdown_sequence(&self) {
        for target in &self.current.targets {
            let _ = self.journal.append_lifecycle(
                target.name(),
                target.target_type(),
                "shutdown",
                "",
            );
        }
        if let Err(e) = self.journal.append_lifecycle(
            "supervisor",
            TargetType::Application,
            "shutdown_complete",
            self.self_metrics.status_summary(),
        ) {
            eprintln!("[ERROR] failed to write shutdown_complete record: {e}");
        }
    }
}

/// Sleep up to `duration`, polling `shutdown` every second so a signal can
/// interrupt the wait promptly (§5, "shutdown flag is polled every second").
/// Returns `true` if shutdown was observed.
async fn sleep_interruptible(duration: Duration, shutdown: &AtomicBool) -> bool {
    let mut remaining = duration;
    while remaining > Duration::ZERO {
        let step = remaining.min(SHUTDOWN_POLL_INTERVAL);
        tokio::time::sleep(step).await;
        if shutdown.load(Ordering::Relaxed) {
            return true;
        }
        remaining = remaining.saturating_sub(step);
    }
    false
}

fn spawn_signal_listener(shutdown: Arc<AtomicBool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => return,
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        shutdown.store(true, Ordering::Relaxed);
    })
}

fn spawn_self_metrics_sampler(self_metrics: Arc<SelfMetrics>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(SELF_METRICS_SAMPLE_INTERVAL).await;
            self_metrics.sample_system_metrics();
            self_metrics.prune_stale_diagnostics();
        }
    })
}
