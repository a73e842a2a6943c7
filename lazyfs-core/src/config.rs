//! Simulation configuration.
//!
//! All tunable parameters of a run live here: per-operation durations, the
//! file table size, per-file concurrency and the maximum wait before a
//! request gives up.

use std::time::Duration;

use serde::Serialize;

use crate::request::Operation;

/// Largest file table a simulation may allocate.
pub const MAX_FILES: usize = 100;

/// Largest per-file concurrency cap.
pub const MAX_USERS: usize = 100;

/// Default number of slots in the dispatch queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default pause between two worker launches.
pub const DEFAULT_LAUNCH_STAGGER: Duration = Duration::from_millis(1);

/// Errors produced when validating a [`SimulationConfig`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be positive")]
    NotPositive { field: &'static str },

    #[error("{field} = {value} exceeds limit {limit}")]
    LimitExceeded {
        field: &'static str,
        value: usize,
        limit: usize,
    },
}

/// Configuration of one simulation run.
///
/// Durations and the maximum wait are whole simulated seconds. The config is
/// read-only once a simulation starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationConfig {
    /// Seconds a READ occupies a file once admitted
    pub read_duration: u64,
    /// Seconds a WRITE occupies a file once admitted
    pub write_duration: u64,
    /// Seconds a DELETE occupies a file once admitted
    pub delete_duration: u64,
    /// Number of file slots
    pub file_count: usize,
    /// Maximum concurrently admitted operations per file
    pub max_users: usize,
    /// Seconds after its scheduled time a request may stay unserved
    pub max_wait: u64,
    /// Dispatch queue slots
    pub queue_capacity: usize,
    /// Pause between worker launches
    pub launch_stagger: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            read_duration: 1,
            write_duration: 1,
            delete_duration: 1,
            file_count: 1,
            max_users: 1,
            max_wait: 5,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            launch_stagger: DEFAULT_LAUNCH_STAGGER,
        }
    }
}

impl SimulationConfig {
    /// Creates a configuration from the six values of a request script header.
    pub fn from_header(
        read_duration: u64,
        write_duration: u64,
        delete_duration: u64,
        file_count: usize,
        max_users: usize,
        max_wait: u64,
    ) -> Self {
        Self {
            read_duration,
            write_duration,
            delete_duration,
            file_count,
            max_users,
            max_wait,
            ..Default::default()
        }
    }

    /// Returns how long an admitted operation occupies its file.
    pub fn operation_duration(&self, operation: Operation) -> Duration {
        let seconds = match operation {
            Operation::Read => self.read_duration,
            Operation::Write => self.write_duration,
            Operation::Delete => self.delete_duration,
        };
        Duration::from_secs(seconds)
    }

    /// Checks that every value is usable by the coordinator.
    ///
    /// # Errors
    ///
    /// - `ConfigError::NotPositive` - A duration, count or limit is zero
    /// - `ConfigError::LimitExceeded` - File count, user cap or queue size too large
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("read_duration", self.read_duration),
            ("write_duration", self.write_duration),
            ("delete_duration", self.delete_duration),
            ("file_count", self.file_count as u64),
            ("max_users", self.max_users as u64),
            ("max_wait", self.max_wait),
            ("queue_capacity", self.queue_capacity as u64),
        ];
        if let Some(&(field, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::NotPositive { field });
        }

        let bounded = [
            ("file_count", self.file_count, MAX_FILES),
            ("max_users", self.max_users, MAX_USERS),
            ("queue_capacity", self.queue_capacity, DEFAULT_QUEUE_CAPACITY),
        ];
        for (field, value, limit) in bounded {
            if value > limit {
                return Err(ConfigError::LimitExceeded {
                    field,
                    value,
                    limit,
                });
            }
        }

        Ok(())
    }

    /// Applies `LAZYFS_*` environment variable overrides on top of `self`.
    ///
    /// Unparseable values are ignored and the existing setting is kept.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(seconds) = env_value::<u64>("LAZYFS_READ_TIME") {
            self.read_duration = seconds;
        }
        if let Some(seconds) = env_value::<u64>("LAZYFS_WRITE_TIME") {
            self.write_duration = seconds;
        }
        if let Some(seconds) = env_value::<u64>("LAZYFS_DELETE_TIME") {
            self.delete_duration = seconds;
        }
        if let Some(users) = env_value::<usize>("LAZYFS_MAX_USERS") {
            self.max_users = users;
        }
        if let Some(seconds) = env_value::<u64>("LAZYFS_MAX_WAIT") {
            self.max_wait = seconds;
        }
        if let Some(slots) = env_value::<usize>("LAZYFS_QUEUE_CAPACITY") {
            self.queue_capacity = slots;
        }
        if let Some(millis) = env_value::<u64>("LAZYFS_LAUNCH_STAGGER_MS") {
            self.launch_stagger = Duration::from_millis(millis);
        }
        self
    }
}

fn env_value<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}
