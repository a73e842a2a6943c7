//! Random request workloads.

use lazyfs_core::{Operation, Request, Script, SimulationConfig};
use tracing::debug;

use crate::rng::DeterministicRng;

/// Relative weights of the three operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationMix {
    /// Weight of READ
    pub read: u32,
    /// Weight of WRITE
    pub write: u32,
    /// Weight of DELETE
    pub delete: u32,
}

impl Default for OperationMix {
    fn default() -> Self {
        Self {
            read: 70,
            write: 25,
            delete: 5,
        }
    }
}

impl OperationMix {
    /// Mix with reads only.
    pub fn read_only() -> Self {
        Self {
            read: 1,
            write: 0,
            delete: 0,
        }
    }

    fn weights(&self) -> [u32; 3] {
        [self.read, self.write, self.delete]
    }
}

/// Shape of a generated workload.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadProfile {
    /// Configuration written to the script header
    pub config: SimulationConfig,
    /// User IDs are drawn from 1..=users
    pub users: u32,
    /// Number of requests to generate
    pub requests: usize,
    /// Latest scheduled second
    pub horizon: u64,
    /// Operation weights
    pub mix: OperationMix,
    /// Share of requests that target a file past the end of the table
    pub invalid_file_ratio: f64,
}

impl Default for WorkloadProfile {
    fn default() -> Self {
        Self {
            config: SimulationConfig::from_header(1, 2, 3, 5, 3, 5),
            users: 10,
            requests: 30,
            horizon: 10,
            mix: OperationMix::default(),
            invalid_file_ratio: 0.05,
        }
    }
}

/// Generates request scripts from a seed.
#[derive(Debug, Clone)]
pub struct WorkloadGenerator {
    rng: DeterministicRng,
    profile: WorkloadProfile,
}

impl WorkloadGenerator {
    /// Creates a generator for `profile` seeded with `seed`.
    pub fn new(seed: u64, profile: WorkloadProfile) -> Self {
        Self {
            rng: DeterministicRng::from_seed(seed),
            profile,
        }
    }

    /// Returns the profile requests are drawn from.
    pub fn profile(&self) -> &WorkloadProfile {
        &self.profile
    }

    /// Generates one script. Requests come out in random order.
    pub fn generate(&mut self) -> Script {
        let requests = (0..self.profile.requests)
            .map(|_| self.next_request())
            .collect::<Vec<_>>();
        debug!(
            seed = self.rng.seed(),
            requests = requests.len(),
            "Generated workload"
        );
        Script::new(self.profile.config.clone(), requests)
    }

    fn next_request(&mut self) -> Request {
        let user_id = self.rng.random_inclusive(1, u64::from(self.profile.users.max(1))) as u32;

        let file_count = self.profile.config.file_count;
        let file_index = if self.rng.random_bool(self.profile.invalid_file_ratio) {
            file_count + self.rng.random_index(3)
        } else {
            self.rng.random_index(file_count)
        };

        let operation = self
            .rng
            .weighted_index(&self.profile.mix.weights())
            .map_or(Operation::Read, |index| Operation::ALL[index]);

        let scheduled_at = self.rng.random_inclusive(0, self.profile.horizon);

        Request::new(user_id, file_index, operation, scheduled_at)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_same_seed_same_script() {
        let first = WorkloadGenerator::new(5, WorkloadProfile::default()).generate();
        let second = WorkloadGenerator::new(5, WorkloadProfile::default()).generate();
        assert_eq!(first, second);
        assert_eq!(first.requests.len(), 30);
    }

    #[test]
    fn test_read_only_mix() {
        let profile = WorkloadProfile {
            mix: OperationMix::read_only(),
            ..Default::default()
        };
        let script = WorkloadGenerator::new(1, profile).generate();
        assert!(script.requests.iter().all(|r| r.operation == Operation::Read));
    }

    #[test]
    fn test_invalid_ratio_extremes() {
        let profile = WorkloadProfile {
            invalid_file_ratio: 1.0,
            ..Default::default()
        };
        let file_count = profile.config.file_count;
        let script = WorkloadGenerator::new(3, profile).generate();
        assert!(script.requests.iter().all(|r| r.file_index >= file_count));
    }

    proptest! {
        #[test]
        fn generated_requests_stay_in_profile(seed in any::<u64>(), users in 1u32..20, horizon in 0u64..30) {
            let profile = WorkloadProfile {
                users,
                horizon,
                invalid_file_ratio: 0.0,
                ..Default::default()
            };
            let file_count = profile.config.file_count;
            let script = WorkloadGenerator::new(seed, profile).generate();

            for request in &script.requests {
                prop_assert!((1..=users).contains(&request.user_id));
                prop_assert!(request.file_index < file_count);
                prop_assert!(request.scheduled_at <= horizon);
            }
        }

        #[test]
        fn rendered_scripts_parse_back(seed in any::<u64>()) {
            let script = WorkloadGenerator::new(seed, WorkloadProfile::default()).generate();
            let parsed = lazyfs_core::parse_script(&script.render()).unwrap();
            prop_assert_eq!(parsed, script);
        }
    }
}
