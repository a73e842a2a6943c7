//! Worker-per-request dispatch.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::access::FileTable;
use crate::clock::SimulationClock;
use crate::config::DEFAULT_LAUNCH_STAGGER;
use crate::events::{AccessEvent, EventKind, EventSink};
use crate::queue::DispatchQueue;
use crate::request::{Request, RequestOutcome};

/// What one worker did before terminating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    /// Launch position of the worker, starting at zero
    pub worker: usize,
    /// Request the worker popped; `None` if the queue was already drained
    pub request: Option<Request>,
    pub outcome: RequestOutcome,
}

/// Starts one worker task per request and hands each a queued request.
///
/// Workers are launched in order with a small stagger so that they pop the
/// queue in dispatch order. Each worker waits for its request's scheduled
/// second, announces it, and drives it through the file table.
pub struct WorkerDispatcher {
    queue: Arc<DispatchQueue>,
    files: Arc<FileTable>,
    clock: SimulationClock,
    sink: Arc<dyn EventSink>,
    stagger: Duration,
}

impl WorkerDispatcher {
    /// Creates a dispatcher over shared queue, files and event sink.
    pub fn new(
        queue: Arc<DispatchQueue>,
        files: Arc<FileTable>,
        clock: SimulationClock,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            queue,
            files,
            clock,
            sink,
            stagger: DEFAULT_LAUNCH_STAGGER,
        }
    }

    /// Sets the pause between two launches. Zero disables the stagger.
    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    /// Launches `count` workers and returns their handles in launch order.
    pub async fn launch(&self, count: usize) -> Vec<JoinHandle<WorkerReport>> {
        let mut handles = Vec::with_capacity(count);
        for worker in 0..count {
            if worker > 0 && !self.stagger.is_zero() {
                tokio::time::sleep(self.stagger).await;
            }

            let queue = Arc::clone(&self.queue);
            let files = Arc::clone(&self.files);
            let sink = Arc::clone(&self.sink);
            let clock = self.clock;
            handles.push(tokio::spawn(async move {
                run_worker(worker, &queue, &files, clock, sink.as_ref()).await
            }));
            trace!(worker, "Worker launched");
        }
        debug!(workers = count, "All workers launched");
        handles
    }
}

async fn run_worker(
    worker: usize,
    queue: &DispatchQueue,
    files: &FileTable,
    clock: SimulationClock,
    sink: &dyn EventSink,
) -> WorkerReport {
    let Some(request) = queue.pop().await else {
        debug!(worker, "Queue drained, worker exiting");
        return WorkerReport {
            worker,
            request: None,
            outcome: RequestOutcome::NotStarted,
        };
    };

    clock.sleep_until_second(request.scheduled_at).await;
    sink.record(AccessEvent::new(
        clock.now(),
        EventKind::Requested { request },
    ));

    let outcome = files.access(&request, &clock, sink).await;
    debug!(worker, user = request.user_id, %outcome, "Worker finished");

    WorkerReport {
        worker,
        request: Some(request),
        outcome,
    }
}
