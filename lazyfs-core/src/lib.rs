//! Lazyfs Core - Concurrent file access coordinator
//!
//! Simulates many users issuing timed READ, WRITE and DELETE requests against
//! a fixed set of shared files. Requests are ordered, queued, handed to one
//! worker each, and admitted per file under a bounded-concurrency,
//! bounded-wait policy driven by a simulated clock.

pub mod access;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod events;
pub mod ingest;
pub mod queue;
pub mod request;
pub mod simulation;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use access::{FileRecord, FileTable};
pub use clock::SimulationClock;
pub use config::{ConfigError, SimulationConfig};
pub use dispatcher::{WorkerDispatcher, WorkerReport};
pub use events::{AccessEvent, EventKind, EventLog, EventSink, FanoutSink, TracingSink};
pub use ingest::{ParseError, Rejection, RejectionReason, Script, parse_script};
pub use queue::{DispatchQueue, QueueError};
pub use request::{
    MAX_SCHEDULED_AT, Operation, Request, RequestOutcome, UnknownOperation, order_requests,
};
pub use simulation::{OutcomeCounts, RequestRecord, Simulation, SimulationReport};

/// Errors that can bubble up from any lazyfs subsystem.
///
/// Deadline cancellations and invalid-file declines are not errors; they are
/// reported as [`RequestOutcome`] values.
#[derive(Debug, thiserror::Error)]
pub enum LazyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Report serialization failed: {0}")]
    Report(#[from] serde_json::Error),

    #[error("Worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl LazyError {
    /// Checks if this error was caused by user-supplied input.
    pub fn is_user_error(&self) -> bool {
        matches!(self, LazyError::Config(_) | LazyError::Parse(_))
    }
}

pub type Result<T> = std::result::Result<T, LazyError>;
