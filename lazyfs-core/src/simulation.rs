//! Simulation driver.
//!
//! Wires ordering, the dispatch queue, the worker dispatcher and the file
//! table together for one run and collects the outcome of every request.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::access::{FileRecord, FileTable};
use crate::clock::SimulationClock;
use crate::config::SimulationConfig;
use crate::dispatcher::WorkerDispatcher;
use crate::events::{AccessEvent, EventKind, EventSink};
use crate::queue::DispatchQueue;
use crate::request::{Request, RequestOutcome, order_requests};

/// Terminal outcome of one submitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RequestRecord {
    pub request: Request,
    pub outcome: RequestOutcome,
}

/// Number of requests per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub completed: usize,
    pub canceled: usize,
    pub declined: usize,
    /// Workers that found the queue drained
    pub not_started: usize,
    pub dropped: usize,
}

impl OutcomeCounts {
    fn add(&mut self, outcome: RequestOutcome) {
        match outcome {
            RequestOutcome::Completed => self.completed += 1,
            RequestOutcome::Canceled => self.canceled += 1,
            RequestOutcome::Declined => self.declined += 1,
            RequestOutcome::NotStarted => self.not_started += 1,
            RequestOutcome::Dropped => self.dropped += 1,
        }
    }

    /// Returns number of requests that reached the file table.
    pub fn served(&self) -> usize {
        self.completed + self.canceled + self.declined
    }
}

/// Result of one simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub config: SimulationConfig,
    /// Every submitted request in dispatch order
    pub records: Vec<RequestRecord>,
    pub counts: OutcomeCounts,
    /// Final state of every file
    pub files: Vec<FileRecord>,
    /// Simulated second at which the last worker finished
    pub finished_at: u64,
    pub generated_at: DateTime<Utc>,
}

impl SimulationReport {
    /// Returns the outcome of every request issued by `user_id`.
    pub fn outcomes_for(&self, user_id: u32) -> Vec<RequestOutcome> {
        self.records
            .iter()
            .filter(|record| record.request.user_id == user_id)
            .map(|record| record.outcome)
            .collect()
    }

    /// Generates human-readable summary.
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str(&format!(
            "Simulation Report ({} requests, {} files)\n",
            self.records.len(),
            self.files.len()
        ));
        summary.push_str(&format!("Finished at: {} seconds\n", self.finished_at));
        summary.push_str("\nOutcomes:\n");
        summary.push_str(&format!("  completed: {}\n", self.counts.completed));
        summary.push_str(&format!("  canceled: {}\n", self.counts.canceled));
        summary.push_str(&format!("  declined: {}\n", self.counts.declined));
        if self.counts.dropped > 0 {
            summary.push_str(&format!("  dropped: {}\n", self.counts.dropped));
            summary.push_str(&format!("  not started: {}\n", self.counts.not_started));
        }

        let deleted: Vec<String> = self
            .files
            .iter()
            .enumerate()
            .filter(|(_, file)| !file.present)
            .map(|(index, _)| (index + 1).to_string())
            .collect();
        if !deleted.is_empty() {
            summary.push_str(&format!("\nDeleted files: {}\n", deleted.join(", ")));
        }

        summary
    }

    /// Serializes the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// - `LazyError::Report` - Serialization failed
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// One configured simulation.
pub struct Simulation {
    config: SimulationConfig,
    sink: Arc<dyn EventSink>,
}

impl Simulation {
    /// Creates a simulation reporting every event to `sink`.
    ///
    /// # Errors
    ///
    /// - `LazyError::Config` - Configuration failed validation
    pub fn new(config: SimulationConfig, sink: Arc<dyn EventSink>) -> crate::Result<Self> {
        config.validate()?;
        Ok(Self { config, sink })
    }

    /// Runs every request to a terminal outcome.
    ///
    /// Requests are ordered, queued, and handed to one worker each. Simulated
    /// second zero is the moment workers start launching.
    ///
    /// # Errors
    ///
    /// - `LazyError::Worker` - A worker task panicked
    pub async fn run(&self, requests: Vec<Request>) -> crate::Result<SimulationReport> {
        let ordered = order_requests(requests);
        let queue = Arc::new(DispatchQueue::with_capacity(self.config.queue_capacity));

        let mut outcomes: Vec<Option<RequestOutcome>> = vec![None; ordered.len()];
        let mut positions: HashMap<Request, VecDeque<usize>> = HashMap::new();
        for (position, request) in ordered.iter().enumerate() {
            match queue.push(*request) {
                Ok(()) => positions.entry(*request).or_default().push_back(position),
                Err(_) => outcomes[position] = Some(RequestOutcome::Dropped),
            }
        }
        // Every request is queued before any worker starts.
        queue.close();

        info!(
            requests = ordered.len(),
            queued = queue.len(),
            files = self.config.file_count,
            max_users = self.config.max_users,
            max_wait = self.config.max_wait,
            "Starting simulation"
        );

        let files = Arc::new(FileTable::new(&self.config));
        let clock = SimulationClock::start();
        let dispatcher = WorkerDispatcher::new(
            Arc::clone(&queue),
            Arc::clone(&files),
            clock,
            Arc::clone(&self.sink),
        )
        .with_stagger(self.config.launch_stagger);

        let mut counts = OutcomeCounts::default();
        for handle in dispatcher.launch(ordered.len()).await {
            let report = handle.await?;
            let Some(request) = report.request else {
                counts.add(RequestOutcome::NotStarted);
                continue;
            };
            match positions.get_mut(&request).and_then(VecDeque::pop_front) {
                Some(position) => outcomes[position] = Some(report.outcome),
                None => warn!(user = request.user_id, "Worker returned an unknown request"),
            }
        }

        let finished_at = clock.now();
        self.sink
            .record(AccessEvent::new(finished_at, EventKind::Idle));

        let records: Vec<RequestRecord> = ordered
            .into_iter()
            .zip(outcomes)
            .map(|(request, outcome)| RequestRecord {
                request,
                outcome: outcome.unwrap_or(RequestOutcome::NotStarted),
            })
            .collect();
        for record in &records {
            if record.outcome != RequestOutcome::NotStarted {
                counts.add(record.outcome);
            }
        }

        let report = SimulationReport {
            config: self.config.clone(),
            records,
            counts,
            files: files.snapshots(),
            finished_at,
            generated_at: Utc::now(),
        };
        info!(
            completed = counts.completed,
            canceled = counts.canceled,
            declined = counts.declined,
            dropped = counts.dropped,
            finished_at,
            "Simulation complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::assert_ok;

    use super::*;
    use crate::config::ConfigError;
    use crate::events::EventLog;
    use crate::request::Operation;
    use crate::LazyError;

    fn simulation(config: SimulationConfig) -> (Simulation, Arc<EventLog>) {
        let log = Arc::new(EventLog::new());
        let simulation = Simulation::new(config, log.clone()).unwrap();
        (simulation, log)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SimulationConfig {
            max_users: 0,
            ..Default::default()
        };
        let result = Simulation::new(config, Arc::new(EventLog::new()));
        assert!(matches!(
            result,
            Err(LazyError::Config(ConfigError::NotPositive { field: "max_users" }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_records_follow_dispatch_order() {
        let (simulation, log) = simulation(SimulationConfig {
            file_count: 2,
            max_users: 2,
            ..Default::default()
        });

        let requests = vec![
            Request::new(1, 0, Operation::Delete, 1),
            Request::new(2, 1, Operation::Read, 0),
            Request::new(3, 1, Operation::Write, 1),
            Request::new(4, 1, Operation::Read, 1),
        ];
        let report = assert_ok!(simulation.run(requests).await);

        let users: Vec<u32> = report.records.iter().map(|r| r.request.user_id).collect();
        assert_eq!(users, vec![2, 4, 3, 1]);
        assert_eq!(report.counts.completed, 4);
        assert_eq!(report.counts.served(), 4);
        assert!(!report.files[0].present);
        assert!(report.files[1].present);

        let last = log.events().pop().unwrap();
        assert_eq!(last.kind, EventKind::Idle);
        assert_eq!(last.at, report.finished_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_drops_overflow() {
        let (simulation, _log) = simulation(SimulationConfig {
            max_users: 3,
            queue_capacity: 2,
            launch_stagger: std::time::Duration::ZERO,
            ..Default::default()
        });

        let requests = (1..=4)
            .map(|user| Request::new(user, 0, Operation::Read, 0))
            .collect();
        let report = simulation.run(requests).await.unwrap();

        assert_eq!(report.counts.completed, 2);
        assert_eq!(report.counts.dropped, 2);
        assert_eq!(report.counts.not_started, 2);
        assert_eq!(report.outcomes_for(4), vec![RequestOutcome::Dropped]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_requests_each_get_an_outcome() {
        let (simulation, _log) = simulation(SimulationConfig::default());

        let request = Request::new(1, 0, Operation::Read, 0);
        let report = simulation.run(vec![request; 3]).await.unwrap();

        assert_eq!(report.records.len(), 3);
        assert_eq!(report.counts.served(), 3);
        assert_eq!(report.counts.not_started, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_serializes() {
        let (simulation, _log) = simulation(SimulationConfig::default());

        let report = simulation
            .run(vec![Request::new(1, 0, Operation::Write, 0)])
            .await
            .unwrap();
        let json = report.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["counts"]["completed"], 1);
        assert_eq!(value["records"][0]["outcome"], "Completed");
        assert!(report.summary().contains("completed: 1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_run() {
        let (simulation, log) = simulation(SimulationConfig::default());

        let report = simulation.run(Vec::new()).await.unwrap();

        assert!(report.records.is_empty());
        assert_eq!(report.finished_at, 0);
        assert_eq!(log.len(), 1);
    }
}
