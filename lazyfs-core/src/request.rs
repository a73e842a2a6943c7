//! Request records and the order used to linearize submission.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Latest simulated second a script may schedule a request at (one year).
pub const MAX_SCHEDULED_AT: u64 = 365 * 24 * 60 * 60;

/// Kind of file operation a request performs.
///
/// Declaration order is the tie-break priority for requests scheduled at
/// the same second: reads before writes before deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Operation {
    Read,
    Write,
    Delete,
}

impl Operation {
    /// All operations in priority order.
    pub const ALL: [Operation; 3] = [Operation::Read, Operation::Write, Operation::Delete];

    /// Returns the script keyword for this operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "READ",
            Operation::Write => "WRITE",
            Operation::Delete => "DELETE",
        }
    }

    /// Checks if this operation needs the file to itself apart from readers.
    pub fn is_exclusive(&self) -> bool {
        !matches!(self, Operation::Read)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword that names no known operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation '{token}'")]
pub struct UnknownOperation {
    pub token: String,
}

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "READ" => Ok(Operation::Read),
            "WRITE" => Ok(Operation::Write),
            "DELETE" => Ok(Operation::Delete),
            _ => Err(UnknownOperation {
                token: s.to_string(),
            }),
        }
    }
}

/// A single timed user request against one file.
///
/// Immutable once created. `file_index` is 0-based and may point past the
/// end of the file table; such requests are declined by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Request {
    pub user_id: u32,
    pub file_index: usize,
    pub operation: Operation,
    /// Simulated second at which the request is issued
    pub scheduled_at: u64,
}

impl Request {
    /// Creates a new request.
    pub fn new(user_id: u32, file_index: usize, operation: Operation, scheduled_at: u64) -> Self {
        Self {
            user_id,
            file_index,
            operation,
            scheduled_at,
        }
    }

    /// Returns the 1-based file number users refer to.
    pub fn file_number(&self) -> usize {
        self.file_index + 1
    }

    /// Returns the key requests are ordered by before dispatch.
    pub fn sort_key(&self) -> (u64, Operation) {
        (self.scheduled_at, self.operation)
    }

    /// Compares two requests by dispatch order.
    ///
    /// Requests with equal time and operation compare equal; their relative
    /// order is whatever the input order was.
    pub fn dispatch_cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }

    /// Returns the second at which this request gives up waiting.
    pub fn deadline(&self, max_wait: u64) -> u64 {
        self.scheduled_at.saturating_add(max_wait)
    }
}

/// Sorts requests into dispatch order.
///
/// The sort is stable, so requests with the same time and operation keep
/// their input order.
pub fn order_requests(mut requests: Vec<Request>) -> Vec<Request> {
    requests.sort_by(Request::dispatch_cmp);
    requests
}

/// Terminal result of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RequestOutcome {
    /// Admitted and ran for its full duration
    Completed,
    /// Gave up after waiting `max_wait` seconds
    Canceled,
    /// Targeted an invalid, deleted or deleting file
    Declined,
    /// Worker found the queue closed and empty
    NotStarted,
    /// Rejected by a full dispatch queue
    Dropped,
}

impl RequestOutcome {
    /// Returns lowercase name used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestOutcome::Completed => "completed",
            RequestOutcome::Canceled => "canceled",
            RequestOutcome::Declined => "declined",
            RequestOutcome::NotStarted => "not_started",
            RequestOutcome::Dropped => "dropped",
        }
    }
}

impl fmt::Display for RequestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_operation_keywords() {
        for operation in Operation::ALL {
            assert_eq!(operation.as_str().parse::<Operation>(), Ok(operation));
        }
        assert_eq!(
            "read".parse::<Operation>(),
            Err(UnknownOperation {
                token: "read".to_string()
            })
        );
        assert!("RENAME".parse::<Operation>().is_err());
    }

    #[test]
    fn test_operation_priority() {
        assert!(Operation::Read < Operation::Write);
        assert!(Operation::Write < Operation::Delete);
        assert!(!Operation::Read.is_exclusive());
        assert!(Operation::Delete.is_exclusive());
    }

    #[test]
    fn test_ordering_by_time_then_operation() {
        let requests = vec![
            Request::new(1, 0, Operation::Delete, 3),
            Request::new(2, 0, Operation::Read, 5),
            Request::new(3, 0, Operation::Write, 3),
            Request::new(4, 0, Operation::Read, 3),
            Request::new(5, 0, Operation::Write, 0),
        ];

        let users: Vec<u32> = order_requests(requests)
            .iter()
            .map(|request| request.user_id)
            .collect();

        assert_eq!(users, vec![5, 4, 3, 1, 2]);
    }

    #[test]
    fn test_ordering_is_stable_for_equal_keys() {
        let requests = vec![
            Request::new(9, 0, Operation::Read, 1),
            Request::new(7, 1, Operation::Read, 1),
            Request::new(8, 2, Operation::Read, 1),
        ];

        let users: Vec<u32> = order_requests(requests)
            .iter()
            .map(|request| request.user_id)
            .collect();

        assert_eq!(users, vec![9, 7, 8]);
    }

    #[test]
    fn test_deadline_and_file_number() {
        let request = Request::new(1, 4, Operation::Write, 10);
        assert_eq!(request.file_number(), 5);
        assert_eq!(request.deadline(5), 15);
    }

    fn operation_strategy() -> impl Strategy<Value = Operation> {
        prop_oneof![
            Just(Operation::Read),
            Just(Operation::Write),
            Just(Operation::Delete),
        ]
    }

    proptest! {
        #[test]
        fn prop_ordered_requests_are_sorted(
            raw in prop::collection::vec((1u32..50, 0usize..5, operation_strategy(), 0u64..20), 0..60)
        ) {
            let requests: Vec<Request> = raw
                .into_iter()
                .map(|(user, file, operation, at)| Request::new(user, file, operation, at))
                .collect();
            let ordered = order_requests(requests.clone());

            prop_assert_eq!(ordered.len(), requests.len());
            for pair in ordered.windows(2) {
                prop_assert!(pair[0].sort_key() <= pair[1].sort_key());
            }
            for pair in ordered.windows(2) {
                if pair[0].scheduled_at == pair[1].scheduled_at {
                    prop_assert!(pair[0].operation <= pair[1].operation);
                }
            }
        }
    }
}
