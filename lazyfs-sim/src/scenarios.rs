//! Pre-built coordinator scenarios.
//!
//! Each scenario pairs a configuration and request list with the outcomes it
//! must produce. Running one also validates the full event history.

use std::sync::Arc;

use lazyfs_core::{
    AccessEvent, EventLog, EventSink, FanoutSink, Operation, Request, RequestOutcome, Simulation,
    SimulationConfig, SimulationReport,
};
use tracing::{info, warn};

use crate::invariants::{InvariantViolation, check_history};
use crate::{Result, SimulationError};

/// Outcomes a scenario must produce.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expectation {
    /// Exact outcome of each listed user's only request
    pub outcomes: Vec<(u32, RequestOutcome)>,
    /// Total completed requests, if fixed
    pub completed: Option<usize>,
    /// Total canceled requests, if fixed
    pub canceled: Option<usize>,
    /// 0-based indices of files that must end up deleted
    pub deleted_files: Vec<usize>,
}

impl Expectation {
    fn outcome(mut self, user_id: u32, outcome: RequestOutcome) -> Self {
        self.outcomes.push((user_id, outcome));
        self
    }

    fn totals(mut self, completed: usize, canceled: usize) -> Self {
        self.completed = Some(completed);
        self.canceled = Some(canceled);
        self
    }

    fn deleted(mut self, file_index: usize) -> Self {
        self.deleted_files.push(file_index);
        self
    }

    /// Returns a description of every way `report` misses this expectation.
    pub fn mismatches(&self, report: &SimulationReport) -> Vec<String> {
        let mut mismatches = Vec::new();

        for &(user_id, expected) in &self.outcomes {
            let actual = report.outcomes_for(user_id);
            if actual != [expected] {
                mismatches.push(format!(
                    "User {user_id}: expected {expected}, got {actual:?}"
                ));
            }
        }
        if let Some(completed) = self.completed
            && report.counts.completed != completed
        {
            mismatches.push(format!(
                "expected {completed} completed, got {}",
                report.counts.completed
            ));
        }
        if let Some(canceled) = self.canceled
            && report.counts.canceled != canceled
        {
            mismatches.push(format!(
                "expected {canceled} canceled, got {}",
                report.counts.canceled
            ));
        }
        for &file_index in &self.deleted_files {
            if report.files.get(file_index).is_none_or(|file| file.present) {
                mismatches.push(format!("file {} was not deleted", file_index + 1));
            }
        }

        mismatches
    }
}

/// Named configuration, workload and expected result.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// Identifier used on the command line
    pub name: &'static str,
    /// One-line description
    pub description: &'static str,
    /// Coordinator configuration
    pub config: SimulationConfig,
    /// Requests in submission order
    pub requests: Vec<Request>,
    /// Required outcomes
    pub expected: Expectation,
}

/// Result of running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioRun {
    /// Simulation report
    pub report: SimulationReport,
    /// Every event in emission order
    pub events: Vec<AccessEvent>,
    /// Invariant violations found in the event history
    pub violations: Vec<InvariantViolation>,
    /// Unmet expectations
    pub mismatches: Vec<String>,
}

impl ScenarioRun {
    /// Checks if the run met every expectation without violations.
    pub fn passed(&self) -> bool {
        self.violations.is_empty() && self.mismatches.is_empty()
    }
}

impl Scenario {
    /// Runs the scenario, recording events only in memory.
    ///
    /// # Errors
    ///
    /// - `SimulationError::Core` - Scenario configuration is invalid or a worker failed
    pub async fn run(&self) -> Result<ScenarioRun> {
        self.run_with_sink(None).await
    }

    /// Runs the scenario, also forwarding events to `sink`.
    ///
    /// # Errors
    ///
    /// - `SimulationError::Core` - Scenario configuration is invalid or a worker failed
    pub async fn run_with_sink(&self, sink: Option<Arc<dyn EventSink>>) -> Result<ScenarioRun> {
        let log = Arc::new(EventLog::new());
        let mut fanout = FanoutSink::default().with(log.clone());
        if let Some(sink) = sink {
            fanout = fanout.with(sink);
        }

        info!(scenario = self.name, "Running scenario");
        let simulation = Simulation::new(self.config.clone(), Arc::new(fanout))?;
        let report = simulation.run(self.requests.clone()).await?;

        let events = log.events();
        let violations = check_history(&events, &self.config);
        let mismatches = self.expected.mismatches(&report);
        for violation in &violations {
            warn!(scenario = self.name, %violation, "Invariant violated");
        }
        for mismatch in &mismatches {
            warn!(scenario = self.name, %mismatch, "Unexpected outcome");
        }

        Ok(ScenarioRun {
            report,
            events,
            violations,
            mismatches,
        })
    }

    /// Two readers on a single-user file run one after the other.
    pub fn concurrent_reads() -> Self {
        Self {
            name: "concurrent-reads",
            description: "Two reads on a single-user file are serialized, none canceled",
            config: SimulationConfig::from_header(1, 1, 1, 1, 1, 5),
            requests: vec![
                Request::new(1, 0, Operation::Read, 0),
                Request::new(2, 0, Operation::Read, 0),
            ],
            expected: Expectation::default()
                .outcome(1, RequestOutcome::Completed)
                .outcome(2, RequestOutcome::Completed)
                .totals(2, 0),
        }
    }

    /// A delete waits for a write, then removes the file.
    pub fn write_then_delete() -> Self {
        Self {
            name: "write-then-delete",
            description: "Delete waits for the running write, then removes the file",
            config: SimulationConfig::from_header(1, 1, 1, 1, 1, 5),
            requests: vec![
                Request::new(1, 0, Operation::Write, 0),
                Request::new(2, 0, Operation::Delete, 0),
            ],
            expected: Expectation::default()
                .outcome(1, RequestOutcome::Completed)
                .outcome(2, RequestOutcome::Completed)
                .deleted(0),
        }
    }

    /// A write blocked behind a long read gives up at its deadline.
    pub fn deadline_cancel() -> Self {
        Self {
            name: "deadline-cancel",
            description: "Write blocked by a long read is canceled at its deadline",
            config: SimulationConfig::from_header(3, 1, 1, 1, 1, 2),
            requests: vec![
                Request::new(1, 0, Operation::Read, 0),
                Request::new(2, 0, Operation::Write, 0),
            ],
            expected: Expectation::default()
                .outcome(1, RequestOutcome::Completed)
                .outcome(2, RequestOutcome::Canceled),
        }
    }

    /// A request for a file past the end of the table is declined.
    pub fn invalid_file() -> Self {
        Self {
            name: "invalid-file",
            description: "Request for a nonexistent file is declined without touching state",
            config: SimulationConfig::from_header(1, 1, 1, 1, 1, 5),
            requests: vec![Request::new(1, 1, Operation::Write, 0)],
            expected: Expectation::default()
                .outcome(1, RequestOutcome::Declined)
                .totals(0, 0),
        }
    }

    /// More readers than the cap all finish by taking turns.
    pub fn reader_pileup() -> Self {
        Self {
            name: "reader-pileup",
            description: "Four readers on a two-user file complete in two waves",
            config: SimulationConfig::from_header(1, 1, 1, 1, 2, 5),
            requests: (1..=4)
                .map(|user| Request::new(user, 0, Operation::Read, 0))
                .collect(),
            expected: (1..=4)
                .fold(Expectation::default(), |expected, user| {
                    expected.outcome(user, RequestOutcome::Completed)
                })
                .totals(4, 0),
        }
    }

    /// Three writers compete; the last one in line runs out of time.
    pub fn writer_contention() -> Self {
        Self {
            name: "writer-contention",
            description: "Three writers on one file: two complete, one times out",
            config: SimulationConfig::from_header(1, 2, 1, 1, 3, 4),
            requests: (1..=3)
                .map(|user| Request::new(user, 0, Operation::Write, 0))
                .collect(),
            expected: Expectation::default()
                .outcome(1, RequestOutcome::Completed)
                .totals(2, 1),
        }
    }

    /// A delete waits out active readers; later readers are declined.
    pub fn delete_under_load() -> Self {
        Self {
            name: "delete-under-load",
            description: "Delete waits for readers, later reads of the file are declined",
            config: SimulationConfig::from_header(2, 1, 1, 2, 3, 6),
            requests: vec![
                Request::new(1, 0, Operation::Read, 0),
                Request::new(2, 0, Operation::Read, 0),
                Request::new(3, 0, Operation::Delete, 0),
                Request::new(4, 1, Operation::Read, 0),
                Request::new(5, 0, Operation::Read, 4),
            ],
            expected: Expectation::default()
                .outcome(1, RequestOutcome::Completed)
                .outcome(2, RequestOutcome::Completed)
                .outcome(3, RequestOutcome::Completed)
                .outcome(4, RequestOutcome::Completed)
                .outcome(5, RequestOutcome::Declined)
                .deleted(0),
        }
    }

    /// Returns every pre-built scenario.
    pub fn all() -> Vec<Self> {
        vec![
            Self::concurrent_reads(),
            Self::write_then_delete(),
            Self::deadline_cancel(),
            Self::invalid_file(),
            Self::reader_pileup(),
            Self::writer_contention(),
            Self::delete_under_load(),
        ]
    }

    /// Looks up a scenario by name.
    ///
    /// # Errors
    ///
    /// - `SimulationError::UnknownScenario` - No scenario has that name
    pub fn by_name(name: &str) -> Result<Self> {
        Self::all()
            .into_iter()
            .find(|scenario| scenario.name == name)
            .ok_or_else(|| SimulationError::UnknownScenario {
                name: name.to_string(),
            })
    }
}
