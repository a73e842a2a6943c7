//! Seeded random workloads checked against the event-history invariants.

use std::sync::Arc;

use lazyfs_core::{EventLog, RequestOutcome, Simulation, SimulationReport};
use lazyfs_sim::{OperationMix, WorkloadGenerator, WorkloadProfile, check_history};
use proptest::prelude::*;

async fn run_checked(seed: u64, profile: WorkloadProfile) -> SimulationReport {
    let script = WorkloadGenerator::new(seed, profile).generate();
    let log = Arc::new(EventLog::new());

    let report = Simulation::new(script.config.clone(), log.clone())
        .unwrap()
        .run(script.requests.clone())
        .await
        .unwrap();

    let violations = check_history(&log.events(), &script.config);
    assert!(violations.is_empty(), "seed {seed}: {violations:?}");
    assert_eq!(
        report.counts.served() + report.counts.dropped,
        script.requests.len(),
        "seed {seed}"
    );
    assert_eq!(log.count("Requested"), report.counts.served());
    report
}

#[tokio::test(start_paused = true)]
async fn test_default_profile_across_seeds() {
    for seed in [1, 7, 42, 1_000, 65_535] {
        run_checked(seed, WorkloadProfile::default()).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_read_only_workload_never_declines_valid_files() {
    let profile = WorkloadProfile {
        mix: OperationMix::read_only(),
        invalid_file_ratio: 0.0,
        ..Default::default()
    };
    let report = run_checked(3, profile).await;

    assert_eq!(report.counts.declined, 0);
    assert!(report.files.iter().all(|file| file.present));
}

#[tokio::test(start_paused = true)]
async fn test_overflowing_queue_drops_the_tail() {
    let profile = WorkloadProfile {
        requests: 120,
        horizon: 30,
        ..Default::default()
    };
    let report = run_checked(11, profile).await;

    assert_eq!(report.counts.dropped, 20);
    assert_eq!(report.counts.not_started, 20);
    assert!(
        report.records[100..]
            .iter()
            .all(|record| record.outcome == RequestOutcome::Dropped)
    );
}

#[tokio::test(start_paused = true)]
async fn test_same_seed_same_report() {
    let first = run_checked(99, WorkloadProfile::default()).await;
    let second = run_checked(99, WorkloadProfile::default()).await;

    assert_eq!(first.records, second.records);
    assert_eq!(first.counts, second.counts);
    assert_eq!(first.finished_at, second.finished_at);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn random_workloads_keep_invariants(
        seed in any::<u64>(),
        max_users in 1usize..4,
        max_wait in 1u64..6,
        requests in 1usize..40,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap();

        let mut profile = WorkloadProfile {
            requests,
            ..Default::default()
        };
        profile.config.max_users = max_users;
        profile.config.max_wait = max_wait;

        runtime.block_on(run_checked(seed, profile));
    }
}
