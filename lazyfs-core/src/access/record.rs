//! Per-file coordination state.

use serde::Serialize;

use crate::request::Operation;

/// Coordination state of one file slot.
///
/// Mutated only under the owning slot's lock. Copies of it are handed out as
/// snapshots in events and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// False once a delete has completed; never reset
    pub present: bool,
    pub write_in_progress: bool,
    pub delete_in_progress: bool,
    pub reader_count: usize,
    /// Readers plus the active writer and deleter
    pub active_users: usize,
    /// Requests currently blocked waiting for admission
    pub waiting: usize,
}

impl Default for FileRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl FileRecord {
    /// Creates the record of a present, idle file.
    pub fn new() -> Self {
        Self {
            present: true,
            write_in_progress: false,
            delete_in_progress: false,
            reader_count: 0,
            active_users: 0,
            waiting: 0,
        }
    }

    /// Checks the admission predicate for `operation`.
    pub fn admits(&self, operation: Operation, max_users: usize) -> bool {
        let below_cap = self.active_users < max_users;
        match operation {
            Operation::Read => below_cap,
            Operation::Write => below_cap && !self.write_in_progress,
            Operation::Delete => below_cap && !self.write_in_progress && self.reader_count == 0,
        }
    }

    /// Checks if the file can still be targeted at all.
    pub fn accepts_requests(&self) -> bool {
        self.present && !self.delete_in_progress
    }

    /// Marks `operation` as admitted.
    pub fn begin(&mut self, operation: Operation) {
        match operation {
            Operation::Read => self.reader_count += 1,
            Operation::Write => self.write_in_progress = true,
            Operation::Delete => self.delete_in_progress = true,
        }
        self.active_users += 1;
    }

    /// Marks `operation` as finished. A finished delete removes the file.
    pub fn finish(&mut self, operation: Operation) {
        match operation {
            Operation::Read => self.reader_count = self.reader_count.saturating_sub(1),
            Operation::Write => self.write_in_progress = false,
            Operation::Delete => {
                self.delete_in_progress = false;
                self.present = false;
            }
        }
        self.active_users = self.active_users.saturating_sub(1);
    }

    /// Returns the number of admitted operations implied by the flags.
    pub fn occupancy(&self) -> usize {
        self.reader_count
            + usize::from(self.write_in_progress)
            + usize::from(self.delete_in_progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_predicate_only_checks_capacity() {
        let mut record = FileRecord::new();
        record.begin(Operation::Write);

        assert!(record.admits(Operation::Read, 2));
        assert!(!record.admits(Operation::Read, 1));
    }

    #[test]
    fn test_write_excludes_writer() {
        let mut record = FileRecord::new();
        record.begin(Operation::Read);
        assert!(record.admits(Operation::Write, 3));

        record.begin(Operation::Write);
        assert!(!record.admits(Operation::Write, 3));
    }

    #[test]
    fn test_delete_needs_no_readers_or_writer() {
        let mut record = FileRecord::new();
        assert!(record.admits(Operation::Delete, 1));

        record.begin(Operation::Read);
        assert!(!record.admits(Operation::Delete, 5));
        record.finish(Operation::Read);

        record.begin(Operation::Write);
        assert!(!record.admits(Operation::Delete, 5));
        record.finish(Operation::Write);

        assert!(record.admits(Operation::Delete, 5));
    }

    #[test]
    fn test_counts_follow_begin_and_finish() {
        let mut record = FileRecord::new();
        record.begin(Operation::Read);
        record.begin(Operation::Read);
        record.begin(Operation::Write);

        assert_eq!(record.reader_count, 2);
        assert_eq!(record.active_users, 3);
        assert_eq!(record.occupancy(), record.active_users);

        record.finish(Operation::Read);
        record.finish(Operation::Write);
        assert_eq!(record.active_users, 1);
        assert_eq!(record.occupancy(), 1);
    }

    #[test]
    fn test_delete_is_permanent() {
        let mut record = FileRecord::new();
        record.begin(Operation::Delete);
        assert!(record.present);
        assert!(!record.accepts_requests());

        record.finish(Operation::Delete);
        assert!(!record.present);
        assert!(!record.delete_in_progress);
        assert!(!record.accepts_requests());
        assert_eq!(record.active_users, 0);
    }
}
