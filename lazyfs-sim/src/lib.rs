//! Lazyfs Simulation Support - Workloads, scenarios and invariant checking.
//!
//! Builds reproducible request workloads from a seed, runs them through the
//! coordinator under paused tokio time, and validates the resulting event
//! history against the coordinator's safety properties.
//!
//! # Example
//!
//! ```rust,no_run
//! use lazyfs_sim::{WorkloadGenerator, WorkloadProfile, check_history};
//! use lazyfs_core::{EventLog, Simulation};
//! use std::sync::Arc;
//!
//! # async fn demo() -> lazyfs_sim::Result<()> {
//! let script = WorkloadGenerator::new(42, WorkloadProfile::default()).generate();
//! let log = Arc::new(EventLog::new());
//! let simulation = Simulation::new(script.config.clone(), log.clone())?;
//! simulation.run(script.requests).await?;
//!
//! let violations = check_history(&log.events(), &script.config);
//! assert!(violations.is_empty());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]

pub mod invariants;
pub mod rng;
pub mod scenarios;
pub mod workload;

pub use invariants::{
    AccountingInvariant, CapacityInvariant, ExclusionInvariant, Invariant, InvariantViolation,
    check_deadlines, check_history, check_permanence, check_snapshots, check_terminal_events,
    check_write_exclusion, standard_invariants,
};
pub use rng::DeterministicRng;
pub use scenarios::{Expectation, Scenario, ScenarioRun};
pub use workload::{OperationMix, WorkloadGenerator, WorkloadProfile};

/// Errors raised while preparing or running simulations.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// Coordinator failed to run
    #[error(transparent)]
    Core(#[from] lazyfs_core::LazyError),

    /// No scenario has the requested name
    #[error("Unknown scenario '{name}'")]
    UnknownScenario {
        /// Name that was looked up
        name: String,
    },
}

/// Common simulation error type for convenience.
pub type Result<T> = std::result::Result<T, SimulationError>;
