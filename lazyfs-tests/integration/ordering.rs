//! Dispatch order as seen in reports and event logs.

use std::sync::Arc;

use lazyfs_core::{EventLog, Operation, Request, Simulation, SimulationConfig, order_requests};
use proptest::prelude::*;

fn operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        Just(Operation::Read),
        Just(Operation::Write),
        Just(Operation::Delete),
    ]
}

fn request() -> impl Strategy<Value = Request> {
    (1u32..50, 0usize..4, operation(), 0u64..20)
        .prop_map(|(user, file, operation, at)| Request::new(user, file, operation, at))
}

proptest! {
    #[test]
    fn ordered_requests_follow_time_then_operation(requests in prop::collection::vec(request(), 0..60)) {
        let ordered = order_requests(requests.clone());

        prop_assert_eq!(ordered.len(), requests.len());
        for pair in ordered.windows(2) {
            prop_assert!(pair[0].sort_key() <= pair[1].sort_key());
        }
    }

    #[test]
    fn equal_keys_keep_input_order(users in prop::collection::vec(1u32..1000, 1..30), at in 0u64..5) {
        let requests: Vec<Request> = users
            .iter()
            .map(|&user| Request::new(user, 0, Operation::Write, at))
            .collect();

        let ordered: Vec<u32> = order_requests(requests).iter().map(|r| r.user_id).collect();
        prop_assert_eq!(ordered, users);
    }
}

#[tokio::test(start_paused = true)]
async fn test_report_lists_requests_in_dispatch_order() {
    let config = SimulationConfig {
        file_count: 3,
        max_users: 3,
        ..Default::default()
    };
    let requests = vec![
        Request::new(1, 0, Operation::Delete, 2),
        Request::new(2, 1, Operation::Write, 0),
        Request::new(3, 2, Operation::Read, 2),
        Request::new(4, 1, Operation::Read, 0),
        Request::new(5, 2, Operation::Write, 2),
    ];

    let log = Arc::new(EventLog::new());
    let report = Simulation::new(config, log.clone())
        .unwrap()
        .run(requests)
        .await
        .unwrap();

    let users: Vec<u32> = report.records.iter().map(|r| r.request.user_id).collect();
    assert_eq!(users, vec![4, 2, 3, 5, 1]);

    let requested_at: Vec<u64> = log
        .events()
        .iter()
        .filter(|event| event.kind.as_str() == "Requested")
        .map(|event| event.at)
        .collect();
    assert_eq!(requested_at.len(), 5);
    assert!(requested_at.windows(2).all(|pair| pair[0] <= pair[1]));
}
