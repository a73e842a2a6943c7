//! Per-file admission, waiting and deadline cancellation.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::record::FileRecord;
use crate::clock::SimulationClock;
use crate::config::SimulationConfig;
use crate::events::{AccessEvent, EventKind, EventSink};
use crate::request::{Operation, Request, RequestOutcome};

/// Seconds past its scheduled time before a request may be admitted.
pub const SETTLE_DELAY_SECS: u64 = 1;

/// One file's state together with its wake-up channel.
#[derive(Debug)]
struct FileSlot {
    record: Mutex<FileRecord>,
    changed: Notify,
}

impl FileSlot {
    fn new() -> Self {
        Self {
            record: Mutex::new(FileRecord::new()),
            changed: Notify::new(),
        }
    }
}

/// Result of the deadline and validity checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Granted,
    Refused(RequestOutcome),
}

/// Fixed table of independently coordinated files.
///
/// Every operation runs the same protocol against its file: wait out the
/// settle delay, wait for the admission predicate within a bounded window,
/// check the deadline and the file's validity, then occupy the file for the
/// operation's duration without holding the lock. Files never share a lock,
/// so operations on different files never contend.
#[derive(Debug)]
pub struct FileTable {
    slots: Vec<FileSlot>,
    config: SimulationConfig,
}

impl FileTable {
    /// Creates `config.file_count` present, idle files.
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            slots: (0..config.file_count).map(|_| FileSlot::new()).collect(),
            config: config.clone(),
        }
    }

    /// Returns number of file slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Checks if the table has no files.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns a copy of one file's current state.
    pub fn snapshot(&self, file_index: usize) -> Option<FileRecord> {
        self.slots.get(file_index).map(|slot| *slot.record.lock())
    }

    /// Returns a copy of every file's current state.
    pub fn snapshots(&self) -> Vec<FileRecord> {
        self.slots.iter().map(|slot| *slot.record.lock()).collect()
    }

    /// Runs `request` through the protocol of its operation.
    pub async fn access(
        &self,
        request: &Request,
        clock: &SimulationClock,
        sink: &dyn EventSink,
    ) -> RequestOutcome {
        match request.operation {
            Operation::Read => self.read(request, clock, sink).await,
            Operation::Write => self.write(request, clock, sink).await,
            Operation::Delete => self.delete(request, clock, sink).await,
        }
    }

    /// Reads the requested file; readers share it up to the user cap.
    pub async fn read(
        &self,
        request: &Request,
        clock: &SimulationClock,
        sink: &dyn EventSink,
    ) -> RequestOutcome {
        self.coordinate(Operation::Read, request, clock, sink).await
    }

    /// Writes the requested file; at most one writer at a time.
    pub async fn write(
        &self,
        request: &Request,
        clock: &SimulationClock,
        sink: &dyn EventSink,
    ) -> RequestOutcome {
        self.coordinate(Operation::Write, request, clock, sink).await
    }

    /// Deletes the requested file once no reader or writer is active.
    pub async fn delete(
        &self,
        request: &Request,
        clock: &SimulationClock,
        sink: &dyn EventSink,
    ) -> RequestOutcome {
        self.coordinate(Operation::Delete, request, clock, sink).await
    }

    async fn coordinate(
        &self,
        operation: Operation,
        request: &Request,
        clock: &SimulationClock,
        sink: &dyn EventSink,
    ) -> RequestOutcome {
        clock
            .sleep_until_second(request.scheduled_at.saturating_add(SETTLE_DELAY_SECS))
            .await;

        let Some(slot) = self.slots.get(request.file_index) else {
            return self.refuse_unknown_file(request, clock, sink);
        };

        if let Admission::Refused(outcome) = self
            .await_admission(slot, operation, request, clock, sink)
            .await
        {
            return outcome;
        }

        tokio::time::sleep(self.config.operation_duration(operation)).await;

        {
            let mut record = slot.record.lock();
            record.finish(operation);
            let snapshot = *record;
            sink.record(AccessEvent::new(
                clock.now(),
                EventKind::Completed {
                    request: *request,
                    snapshot,
                },
            ));
            debug!(
                user = request.user_id,
                file = request.file_number(),
                %operation,
                active = snapshot.active_users,
                present = snapshot.present,
                "Operation finished"
            );
        }

        // Every waiter re-checks its own predicate; after a delete they all
        // find the file gone and fail validity.
        slot.changed.notify_waiters();
        RequestOutcome::Completed
    }

    /// Blocks until the operation may be admitted or its window closes, then
    /// settles the request under the same lock acquisition.
    async fn await_admission(
        &self,
        slot: &FileSlot,
        operation: Operation,
        request: &Request,
        clock: &SimulationClock,
        sink: &dyn EventSink,
    ) -> Admission {
        let window = Duration::from_secs(self.config.max_wait.saturating_sub(1));
        let window_closes = Instant::now() + window;
        slot.record.lock().waiting += 1;

        loop {
            let changed = slot.changed.notified();
            tokio::pin!(changed);

            {
                let mut record = slot.record.lock();
                let admissible = record.admits(operation, self.config.max_users);
                if admissible || !record.present || Instant::now() >= window_closes {
                    record.waiting -= 1;
                    return self.settle(&mut record, operation, request, admissible, clock, sink);
                }
                changed.as_mut().enable();
                trace!(
                    user = request.user_id,
                    file = request.file_number(),
                    %operation,
                    active = record.active_users,
                    waiting = record.waiting,
                    "Waiting for admission"
                );
            }

            if tokio::time::timeout_at(window_closes, changed).await.is_err() {
                trace!(user = request.user_id, "Admission window closed");
            }
        }
    }

    /// Applies the deadline and validity checks and admits on success.
    fn settle(
        &self,
        record: &mut FileRecord,
        operation: Operation,
        request: &Request,
        admissible: bool,
        clock: &SimulationClock,
        sink: &dyn EventSink,
    ) -> Admission {
        let now = clock.now();

        if now.saturating_sub(request.scheduled_at) >= self.config.max_wait {
            return self.cancel(request, sink);
        }

        if !record.accepts_requests() {
            debug!(
                user = request.user_id,
                file = request.file_number(),
                present = record.present,
                deleting = record.delete_in_progress,
                "Declining request for unavailable file"
            );
            sink.record(AccessEvent::new(
                now,
                EventKind::Declined { request: *request },
            ));
            return Admission::Refused(RequestOutcome::Declined);
        }

        if !admissible {
            // Window closed before the second rolled over; the file is still
            // busy, so the request can only give up.
            return self.cancel(request, sink);
        }

        record.begin(operation);
        let snapshot = *record;
        sink.record(AccessEvent::new(
            now,
            EventKind::Admitted {
                request: *request,
                snapshot,
            },
        ));
        debug!(
            user = request.user_id,
            file = request.file_number(),
            %operation,
            active = snapshot.active_users,
            readers = snapshot.reader_count,
            "Operation admitted"
        );
        Admission::Granted
    }

    fn cancel(&self, request: &Request, sink: &dyn EventSink) -> Admission {
        let deadline = request.deadline(self.config.max_wait);
        debug!(
            user = request.user_id,
            file = request.file_number(),
            deadline,
            "Request timed out"
        );
        sink.record(AccessEvent::new(
            deadline,
            EventKind::Canceled { request: *request },
        ));
        Admission::Refused(RequestOutcome::Canceled)
    }

    fn refuse_unknown_file(
        &self,
        request: &Request,
        clock: &SimulationClock,
        sink: &dyn EventSink,
    ) -> RequestOutcome {
        let now = clock.now();
        if now.saturating_sub(request.scheduled_at) >= self.config.max_wait {
            self.cancel(request, sink);
            return RequestOutcome::Canceled;
        }

        debug!(
            user = request.user_id,
            file = request.file_number(),
            file_count = self.slots.len(),
            "Declining request for unknown file"
        );
        sink.record(AccessEvent::new(
            now,
            EventKind::Declined { request: *request },
        ));
        RequestOutcome::Declined
    }
}
