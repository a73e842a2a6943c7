//! Integration tests for lazyfs
//!
//! These tests drive the whole pipeline (script parsing, ordering, queueing,
//! dispatch and per-file admission) under paused tokio time and check the
//! resulting reports and event histories.

#[path = "integration/ordering.rs"]
mod ordering;
#[path = "integration/pipeline.rs"]
mod pipeline;
#[path = "integration/scenarios.rs"]
mod scenarios;
#[path = "integration/workloads.rs"]
mod workloads;
