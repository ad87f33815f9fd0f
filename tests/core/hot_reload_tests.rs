use crate::common::ScriptedProber;
use sentryd::config::loader::ReloadOutcome;
use sentryd::config::ConfigSource;
use sentryd::core::journal::Journal;
use sentryd::core::prober::Prober;
use sentryd::core::scheduler::Scheduler;
use sentryd::core::self_metrics::SelfMetrics;
use sentryd::core::snapshot::{ConsoleView, View};
use sentryd::core::state_tracker::StateTracker;
use std::sync::Arc;
use std::{thread, time::Duration};
use tempfile::tempdir;

const WEBSITE_A: &str = r#"{"websites":[{"name":"A","url":"https://a.test"}]}"#;
const WEBSITE_A_AND_B: &str =
    r#"{"websites":[{"name":"A","url":"https://a.test"},{"name":"B","url":"https://b.test"}]}"#;

/// SPEC_FULL.md §8 scenario 5: reloading `websites.json` to add a second
/// target causes the next tick to probe both and journal an initial record
/// for the newly-added one.
#[tokio::test]
async fn reload_adds_target_and_probes_both_next_tick() {
    let config_dir = tempdir().unwrap();
    let log_dir = tempdir().unwrap();
    std::fs::write(config_dir.path().join("websites.json"), WEBSITE_A).unwrap();

    let mut config_source = ConfigSource::new(config_dir.path());
    let initial = config_source.load_initial();
    assert_eq!(initial.targets.len(), 1);

    let journal = Arc::new(Journal::new(log_dir.path()).unwrap());
    let state_tracker = Arc::new(StateTracker::new());
    let http_prober: Arc<dyn Prober> = Arc::new(ScriptedProber::always_ok());
    let view: Arc<dyn View> = Arc::new(ConsoleView);
    let scheduler = Scheduler::new(
        http_prober,
        Arc::new(ScriptedProber::always_ok()),
        Arc::clone(&state_tracker),
        Arc::clone(&journal),
        Arc::new(SelfMetrics::new()),
        view,
    );

    scheduler.tick(&initial.targets, false).await;

    // Ensure the rewritten file's mtime is observably newer.
    thread::sleep(Duration::from_millis(20));
    std::fs::write(config_dir.path().join("websites.json"), WEBSITE_A_AND_B).unwrap();

    let reloaded = match config_source.check_and_reload(&initial) {
        ReloadOutcome::Reloaded(set) => set,
        ReloadOutcome::Unchanged => panic!("expected a reload after rewriting websites.json"),
        ReloadOutcome::Error(e) => panic!("reload failed: {e}"),
    };
    assert_eq!(reloaded.targets.len(), 2);

    scheduler.tick(&reloaded.targets, false).await;

    let mut names: Vec<&str> = reloaded.targets.iter().map(|t| t.name()).collect();
    names.sort();
    assert_eq!(names, vec!["A", "B"]);

    let entries = journal.recent_entries(1);
    let b_initial = entries
        .iter()
        .find(|e| e.target_name == "B")
        .expect("expected an initial record for newly-added target B");
    assert_eq!(b_initial.status_change, "unknown->up");

    // A must not re-emit unknown->... across the reload.
    let a_records: Vec<_> = entries.iter().filter(|e| e.target_name == "A").collect();
    assert_eq!(a_records.len(), 1);
    assert_eq!(a_records[0].status_change, "unknown->up");
}
