//! Script text to report, end to end.

use std::sync::Arc;

use lazyfs_core::{EventLog, Operation, RejectionReason, RequestOutcome, Simulation, parse_script};
use tokio_test::assert_ok;

const SCRIPT: &str = "\
2 1 1
2 2 4
1 1 READ 0
2 1 READ 0
3 1 WRITE 0
4 2 DELETE 1
5 3 READ 1
bob 2 READ 2
6 2 READ 3
STOP
";

#[tokio::test(start_paused = true)]
async fn test_script_runs_to_report() {
    let script = assert_ok!(parse_script(SCRIPT));
    assert_eq!(script.requests.len(), 6);
    assert_eq!(script.rejections.len(), 1);
    assert_eq!(script.rejections[0].line, 8);

    let log = Arc::new(EventLog::new());
    let simulation = assert_ok!(Simulation::new(script.config.clone(), log.clone()));
    let report = assert_ok!(simulation.run(script.requests).await);

    // Two readers fill file 1; the writer gets a slot when they finish at 3,
    // one second before its deadline.
    assert_eq!(report.outcomes_for(1), vec![RequestOutcome::Completed]);
    assert_eq!(report.outcomes_for(2), vec![RequestOutcome::Completed]);
    assert_eq!(report.outcomes_for(3), vec![RequestOutcome::Completed]);
    // File 2 is deleted at 3; the late reader finds it gone.
    assert_eq!(report.outcomes_for(4), vec![RequestOutcome::Completed]);
    assert_eq!(report.outcomes_for(6), vec![RequestOutcome::Declined]);
    // File 3 does not exist.
    assert_eq!(report.outcomes_for(5), vec![RequestOutcome::Declined]);

    assert!(report.files[0].present);
    assert!(!report.files[1].present);
    assert_eq!(report.counts.completed, 4);
    assert_eq!(report.counts.declined, 2);
    assert_eq!(log.count("Requested"), 6);
}

#[tokio::test(start_paused = true)]
async fn test_report_json_shape() {
    let script = parse_script("1 1 1\n1 1 5\n7 1 WRITE 0\nSTOP\n").unwrap();
    let simulation = Simulation::new(script.config.clone(), Arc::new(EventLog::new())).unwrap();
    let report = simulation.run(script.requests).await.unwrap();

    let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(value["records"][0]["request"]["user_id"], 7);
    assert_eq!(value["records"][0]["request"]["operation"], "Write");
    assert_eq!(value["records"][0]["outcome"], "Completed");
    assert_eq!(value["files"][0]["present"], true);
    assert_eq!(value["finished_at"], 2);
    assert_eq!(value["config"]["max_wait"], 5);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_header_config_rejected() {
    let script = parse_script("1 1 1\n0 1 5\nSTOP\n").unwrap();
    let result = Simulation::new(script.config, Arc::new(EventLog::new()));
    assert!(result.is_err_and(|error| error.is_user_error()));
}

#[tokio::test(start_paused = true)]
async fn test_rendered_script_reproduces_outcomes() {
    let script = parse_script(SCRIPT).unwrap();
    let reparsed = parse_script(&script.render()).unwrap();
    assert_eq!(reparsed.requests, script.requests);
    assert!(reparsed.rejections.is_empty());

    let first = Simulation::new(script.config.clone(), Arc::new(EventLog::new()))
        .unwrap()
        .run(script.requests)
        .await
        .unwrap();
    let second = Simulation::new(reparsed.config.clone(), Arc::new(EventLog::new()))
        .unwrap()
        .run(reparsed.requests)
        .await
        .unwrap();

    assert_eq!(first.records, second.records);
    assert!(first.records.iter().any(|r| r.request.operation == Operation::Delete));
}

#[tokio::test(start_paused = true)]
async fn test_unschedulable_time_does_not_abort_run() {
    let script = parse_script("1 1 1\n1 1 5\n1 1 READ 18446744073709551615\n2 1 READ 0\nSTOP\n")
        .unwrap();
    assert_eq!(
        script.rejections[0].reason,
        RejectionReason::TimeOutOfRange(u64::MAX)
    );

    let simulation = Simulation::new(script.config.clone(), Arc::new(EventLog::new())).unwrap();
    let report = assert_ok!(simulation.run(script.requests).await);

    assert_eq!(report.outcomes_for(2), vec![RequestOutcome::Completed]);
    assert!(report.outcomes_for(1).is_empty());
}
