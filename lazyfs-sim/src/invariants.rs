//! Invariant checking framework for coordinator runs.
//!
//! Snapshot invariants validate a single file state as carried by admission
//! and completion events. History checks walk the whole event log and catch
//! properties no single snapshot can show, such as overlapping exclusive
//! admissions or admissions after a delete.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use lazyfs_core::{AccessEvent, EventKind, FileRecord, Operation, Request, SimulationConfig};

/// Violation of a coordinator invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    /// Name of the violated invariant
    pub invariant: String,
    /// Detailed description of the violation
    pub description: String,
    /// Simulated second of the offending event
    pub at: u64,
}

impl InvariantViolation {
    fn new(invariant: &str, at: u64, description: String) -> Self {
        Self {
            invariant: invariant.to_string(),
            description,
            at,
        }
    }
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invariant '{}' violated at {} seconds: {}",
            self.invariant, self.at, self.description
        )
    }
}

/// Trait for checking per-file invariants.
pub trait Invariant: Send + Sync {
    /// Checks if invariant holds for one file snapshot taken at second `at`.
    ///
    /// # Errors
    ///
    /// - `InvariantViolation` - The snapshot breaks the invariant
    fn check(&self, at: u64, snapshot: &FileRecord) -> Result<(), InvariantViolation>;

    /// Returns name of this invariant.
    fn name(&self) -> &str;
}

/// Ensures no file ever exceeds its concurrency cap.
pub struct CapacityInvariant {
    max_users: usize,
}

impl CapacityInvariant {
    /// Creates invariant for the given cap.
    pub fn new(max_users: usize) -> Self {
        Self { max_users }
    }
}

impl Invariant for CapacityInvariant {
    fn check(&self, at: u64, snapshot: &FileRecord) -> Result<(), InvariantViolation> {
        if snapshot.active_users > self.max_users {
            return Err(InvariantViolation::new(
                self.name(),
                at,
                format!(
                    "{} active users, cap is {}",
                    snapshot.active_users, self.max_users
                ),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Capacity"
    }
}

/// Ensures the active user count matches the admitted operations.
pub struct AccountingInvariant;

impl Invariant for AccountingInvariant {
    fn check(&self, at: u64, snapshot: &FileRecord) -> Result<(), InvariantViolation> {
        if snapshot.active_users != snapshot.occupancy() {
            return Err(InvariantViolation::new(
                self.name(),
                at,
                format!(
                    "active users {} but {} readers, write {}, delete {}",
                    snapshot.active_users,
                    snapshot.reader_count,
                    snapshot.write_in_progress,
                    snapshot.delete_in_progress
                ),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Accounting"
    }
}

/// Ensures deletes run alone and deleted files stay idle.
pub struct ExclusionInvariant;

impl Invariant for ExclusionInvariant {
    fn check(&self, at: u64, snapshot: &FileRecord) -> Result<(), InvariantViolation> {
        if snapshot.delete_in_progress
            && (snapshot.write_in_progress || snapshot.reader_count > 0)
        {
            return Err(InvariantViolation::new(
                self.name(),
                at,
                format!(
                    "delete overlaps {} readers and write {}",
                    snapshot.reader_count, snapshot.write_in_progress
                ),
            ));
        }
        if !snapshot.present && snapshot.active_users > 0 {
            return Err(InvariantViolation::new(
                self.name(),
                at,
                format!("deleted file has {} active users", snapshot.active_users),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Exclusion"
    }
}

/// Returns the snapshot invariants every run must satisfy.
pub fn standard_invariants(config: &SimulationConfig) -> Vec<Arc<dyn Invariant>> {
    vec![
        Arc::new(CapacityInvariant::new(config.max_users)),
        Arc::new(AccountingInvariant),
        Arc::new(ExclusionInvariant),
    ]
}

/// Runs `invariants` against every snapshot carried by `events`.
pub fn check_snapshots(
    events: &[AccessEvent],
    invariants: &[Arc<dyn Invariant>],
) -> Vec<InvariantViolation> {
    events
        .iter()
        .filter_map(|event| event.snapshot().map(|snapshot| (event.at, snapshot)))
        .flat_map(|(at, snapshot)| {
            invariants
                .iter()
                .filter_map(move |invariant| invariant.check(at, snapshot).err())
        })
        .collect()
}

/// Checks that nothing is admitted on a file after its delete completed.
pub fn check_permanence(events: &[AccessEvent]) -> Vec<InvariantViolation> {
    let mut deleted = HashSet::new();
    let mut violations = Vec::new();

    for event in events {
        match &event.kind {
            EventKind::Completed { request, .. } if request.operation == Operation::Delete => {
                deleted.insert(request.file_index);
            }
            EventKind::Admitted { request, .. } if deleted.contains(&request.file_index) => {
                violations.push(InvariantViolation::new(
                    "Permanence",
                    event.at,
                    format!(
                        "User {} admitted to {} deleted file {}",
                        request.user_id,
                        request.operation,
                        request.file_number()
                    ),
                ));
            }
            _ => {}
        }
    }

    violations
}

/// Checks that every admission happens after the settle delay and before
/// the request's deadline.
pub fn check_deadlines(events: &[AccessEvent], max_wait: u64) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for event in events {
        let EventKind::Admitted { request, .. } = &event.kind else {
            continue;
        };
        let at = event.at;
        if at < request.scheduled_at.saturating_add(1) {
            violations.push(InvariantViolation::new(
                "Deadline",
                at,
                format!(
                    "User {} admitted before settling (scheduled at {})",
                    request.user_id, request.scheduled_at
                ),
            ));
        } else if at - request.scheduled_at >= max_wait {
            violations.push(InvariantViolation::new(
                "Deadline",
                at,
                format!(
                    "User {} admitted after waiting {} seconds (max wait {})",
                    request.user_id,
                    at - request.scheduled_at,
                    max_wait
                ),
            ));
        }
    }

    violations
}

#[derive(Debug, Default)]
struct Tally {
    requested: usize,
    admitted: usize,
    completed: usize,
    refused: usize,
}

/// Checks that every announced request ends exactly once and every admitted
/// request completes.
pub fn check_terminal_events(events: &[AccessEvent]) -> Vec<InvariantViolation> {
    let mut tallies: HashMap<Request, Tally> = HashMap::new();
    for event in events {
        let Some(request) = event.request() else {
            continue;
        };
        let tally = tallies.entry(*request).or_default();
        match event.kind {
            EventKind::Requested { .. } => tally.requested += 1,
            EventKind::Admitted { .. } => tally.admitted += 1,
            EventKind::Completed { .. } => tally.completed += 1,
            EventKind::Canceled { .. } | EventKind::Declined { .. } => tally.refused += 1,
            EventKind::Idle => {}
        }
    }

    let finished_at = events.last().map_or(0, |event| event.at);
    let mut violations: Vec<InvariantViolation> = tallies
        .into_iter()
        .filter_map(|(request, tally)| {
            let terminal = tally.completed + tally.refused;
            if terminal == tally.requested && tally.admitted == tally.completed {
                return None;
            }
            Some(InvariantViolation::new(
                "TerminalEvents",
                finished_at,
                format!(
                    "User {} request {:?}: requested {}, admitted {}, completed {}, refused {}",
                    request.user_id,
                    request,
                    tally.requested,
                    tally.admitted,
                    tally.completed,
                    tally.refused
                ),
            ))
        })
        .collect();
    violations.sort_by(|a, b| a.description.cmp(&b.description));
    violations
}

/// Checks that writes and deletes on one file never overlap.
pub fn check_write_exclusion(events: &[AccessEvent]) -> Vec<InvariantViolation> {
    let mut exclusive: HashMap<usize, usize> = HashMap::new();
    let mut violations = Vec::new();

    for event in events {
        match &event.kind {
            EventKind::Admitted { request, .. } if request.operation.is_exclusive() => {
                let active = exclusive.entry(request.file_index).or_default();
                *active += 1;
                if *active > 1 {
                    violations.push(InvariantViolation::new(
                        "WriteExclusion",
                        event.at,
                        format!(
                            "User {} {} overlaps another write or delete on file {}",
                            request.user_id,
                            request.operation,
                            request.file_number()
                        ),
                    ));
                }
            }
            EventKind::Completed { request, .. } if request.operation.is_exclusive() => {
                if let Some(active) = exclusive.get_mut(&request.file_index) {
                    *active = active.saturating_sub(1);
                }
            }
            _ => {}
        }
    }

    violations
}

/// Runs every snapshot invariant and history check over one run's events.
pub fn check_history(events: &[AccessEvent], config: &SimulationConfig) -> Vec<InvariantViolation> {
    let mut violations = check_snapshots(events, &standard_invariants(config));
    violations.extend(check_permanence(events));
    violations.extend(check_deadlines(events, config.max_wait));
    violations.extend(check_terminal_events(events));
    violations.extend(check_write_exclusion(events));
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admitted(at: u64, request: Request) -> AccessEvent {
        let mut snapshot = FileRecord::new();
        snapshot.begin(request.operation);
        AccessEvent::new(at, EventKind::Admitted { request, snapshot })
    }

    fn completed(at: u64, request: Request) -> AccessEvent {
        let mut snapshot = FileRecord::new();
        snapshot.begin(request.operation);
        snapshot.finish(request.operation);
        AccessEvent::new(at, EventKind::Completed { request, snapshot })
    }

    fn requested(request: Request) -> AccessEvent {
        AccessEvent::new(request.scheduled_at, EventKind::Requested { request })
    }

    #[test]
    fn test_snapshot_invariants() {
        let mut record = FileRecord::new();
        record.begin(Operation::Read);
        record.begin(Operation::Read);

        assert!(CapacityInvariant::new(2).check(0, &record).is_ok());
        let violation = CapacityInvariant::new(1).check(4, &record).unwrap_err();
        assert_eq!(violation.invariant, "Capacity");
        assert_eq!(violation.at, 4);

        assert!(AccountingInvariant.check(0, &record).is_ok());
        record.active_users = 5;
        assert!(AccountingInvariant.check(0, &record).is_err());

        let mut record = FileRecord::new();
        record.begin(Operation::Read);
        record.delete_in_progress = true;
        assert!(ExclusionInvariant.check(0, &record).is_err());
    }

    #[test]
    fn test_clean_history_passes() {
        let config = SimulationConfig::default();
        let write = Request::new(1, 0, Operation::Write, 0);
        let delete = Request::new(2, 0, Operation::Delete, 0);
        let late = Request::new(3, 0, Operation::Read, 3);

        let events = vec![
            requested(write),
            requested(delete),
            admitted(1, write),
            completed(2, write),
            admitted(2, delete),
            completed(3, delete),
            requested(late),
            AccessEvent::new(4, EventKind::Declined { request: late }),
            AccessEvent::new(4, EventKind::Idle),
        ];

        assert_eq!(check_history(&events, &config), Vec::new());
    }

    #[test]
    fn test_admission_after_delete_flagged() {
        let delete = Request::new(1, 0, Operation::Delete, 0);
        let read = Request::new(2, 0, Operation::Read, 2);
        let events = vec![admitted(1, delete), completed(2, delete), admitted(3, read)];

        let violations = check_permanence(&events);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].invariant, "Permanence");
    }

    #[test]
    fn test_late_and_early_admissions_flagged() {
        let request = Request::new(1, 0, Operation::Read, 2);
        let events = vec![admitted(2, request), admitted(7, request), admitted(6, request)];

        let ats: Vec<u64> = check_deadlines(&events, 5).iter().map(|v| v.at).collect();
        assert_eq!(ats, vec![2, 7]);
    }

    #[test]
    fn test_missing_terminal_event_flagged() {
        let request = Request::new(1, 0, Operation::Write, 0);
        let events = vec![requested(request), admitted(1, request)];

        let violations = check_terminal_events(&events);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].invariant, "TerminalEvents");
    }

    #[test]
    fn test_overlapping_writes_flagged() {
        let first = Request::new(1, 0, Operation::Write, 0);
        let second = Request::new(2, 0, Operation::Delete, 0);
        let other_file = Request::new(3, 1, Operation::Write, 0);
        let events = vec![
            admitted(1, first),
            admitted(1, other_file),
            admitted(1, second),
            completed(2, first),
        ];

        let violations = check_write_exclusion(&events);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].description.contains("User 2"));
    }
}
