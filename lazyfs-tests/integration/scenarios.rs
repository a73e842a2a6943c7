//! Built-in scenarios with their exact event timelines.

use lazyfs_core::{AccessEvent, EventKind, RequestOutcome};
use lazyfs_sim::Scenario;

fn timeline(events: &[AccessEvent], kind: &str) -> Vec<(u32, u64)> {
    events
        .iter()
        .filter(|event| event.kind.as_str() == kind)
        .filter_map(|event| event.request().map(|request| (request.user_id, event.at)))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_readers_serialized_on_single_user_file() {
    let run = Scenario::concurrent_reads().run().await.unwrap();

    assert!(run.passed(), "{:?}", run.mismatches);
    assert_eq!(timeline(&run.events, "Admitted"), vec![(1, 1), (2, 2)]);
    assert_eq!(timeline(&run.events, "Completed"), vec![(1, 2), (2, 3)]);
    assert_eq!(run.report.counts.canceled, 0);
}

#[tokio::test(start_paused = true)]
async fn test_delete_follows_write() {
    let run = Scenario::write_then_delete().run().await.unwrap();

    assert!(run.passed(), "{:?}", run.mismatches);
    assert_eq!(timeline(&run.events, "Admitted"), vec![(1, 1), (2, 2)]);
    assert_eq!(timeline(&run.events, "Completed"), vec![(1, 2), (2, 3)]);
    assert!(!run.report.files[0].present);
}

#[tokio::test(start_paused = true)]
async fn test_blocked_write_canceled_at_deadline() {
    let run = Scenario::deadline_cancel().run().await.unwrap();

    assert!(run.passed(), "{:?}", run.mismatches);
    assert_eq!(timeline(&run.events, "Canceled"), vec![(2, 2)]);
    assert_eq!(timeline(&run.events, "Completed"), vec![(1, 4)]);
    assert_eq!(run.report.outcomes_for(2), vec![RequestOutcome::Canceled]);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_file_declined_without_state_change() {
    let run = Scenario::invalid_file().run().await.unwrap();

    assert!(run.passed(), "{:?}", run.mismatches);
    assert_eq!(timeline(&run.events, "Declined"), vec![(1, 1)]);
    assert_eq!(run.report.files[0], lazyfs_core::FileRecord::new());
    assert!(run.events.iter().all(|event| event.snapshot().is_none()));
}

#[tokio::test(start_paused = true)]
async fn test_delete_under_load_timeline() {
    let run = Scenario::delete_under_load().run().await.unwrap();

    assert!(run.passed(), "{:?}", run.mismatches);
    let deletes: Vec<u64> = run
        .events
        .iter()
        .filter(|event| matches!(&event.kind, EventKind::Admitted { request, .. } if request.user_id == 3))
        .map(|event| event.at)
        .collect();
    assert_eq!(deletes, vec![3]);
    assert_eq!(timeline(&run.events, "Declined"), vec![(5, 5)]);
}

#[tokio::test(start_paused = true)]
async fn test_writer_contention_totals() {
    let run = Scenario::writer_contention().run().await.unwrap();

    assert!(run.passed(), "{:?}", run.mismatches);
    assert_eq!(timeline(&run.events, "Canceled").len(), 1);
    assert_eq!(timeline(&run.events, "Canceled")[0].1, 4);
}

#[tokio::test(start_paused = true)]
async fn test_every_run_ends_idle() {
    for scenario in Scenario::all() {
        let run = scenario.run().await.unwrap();
        let last = run.events.last().unwrap();
        assert_eq!(last.kind, EventKind::Idle, "{}", scenario.name);
        assert_eq!(last.at, run.report.finished_at, "{}", scenario.name);
    }
}
