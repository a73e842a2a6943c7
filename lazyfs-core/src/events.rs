//! Events emitted by the coordinator and the sinks that consume them.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

use crate::access::FileRecord;
use crate::request::{Request, RequestOutcome};

/// What happened to a request, or to the simulation as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EventKind {
    /// Worker picked the request up at its scheduled time
    Requested { request: Request },
    /// Request began occupying its file
    Admitted {
        request: Request,
        snapshot: FileRecord,
    },
    /// Admitted request finished
    Completed {
        request: Request,
        snapshot: FileRecord,
    },
    /// Request gave up waiting
    Canceled { request: Request },
    /// Request targeted an invalid, deleted or deleting file
    Declined { request: Request },
    /// Every worker has finished
    Idle,
}

impl EventKind {
    /// Returns event name for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Requested { .. } => "Requested",
            EventKind::Admitted { .. } => "Admitted",
            EventKind::Completed { .. } => "Completed",
            EventKind::Canceled { .. } => "Canceled",
            EventKind::Declined { .. } => "Declined",
            EventKind::Idle => "Idle",
        }
    }
}

/// Event stamped with the simulated second it refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessEvent {
    pub at: u64,
    pub kind: EventKind,
}

impl AccessEvent {
    /// Creates a new event.
    pub fn new(at: u64, kind: EventKind) -> Self {
        Self { at, kind }
    }

    /// Returns the request this event is about, if any.
    pub fn request(&self) -> Option<&Request> {
        match &self.kind {
            EventKind::Requested { request }
            | EventKind::Admitted { request, .. }
            | EventKind::Completed { request, .. }
            | EventKind::Canceled { request }
            | EventKind::Declined { request } => Some(request),
            EventKind::Idle => None,
        }
    }

    /// Returns the file snapshot carried by admission and completion events.
    pub fn snapshot(&self) -> Option<&FileRecord> {
        match &self.kind {
            EventKind::Admitted { snapshot, .. } | EventKind::Completed { snapshot, .. } => {
                Some(snapshot)
            }
            _ => None,
        }
    }

    /// Returns the outcome if this event ends a request.
    pub fn terminal_outcome(&self) -> Option<RequestOutcome> {
        match self.kind {
            EventKind::Completed { .. } => Some(RequestOutcome::Completed),
            EventKind::Canceled { .. } => Some(RequestOutcome::Canceled),
            EventKind::Declined { .. } => Some(RequestOutcome::Declined),
            _ => None,
        }
    }

    /// Renders the event as a progress sentence.
    pub fn describe(&self) -> String {
        let at = self.at;
        match &self.kind {
            EventKind::Requested { request } => format!(
                "User {} has made request for performing {} on file {} at {} seconds",
                request.user_id,
                request.operation,
                request.file_number(),
                request.scheduled_at
            ),
            EventKind::Admitted { request, .. } => format!(
                "lazyfs has taken up the request of User {} to {} at {} seconds",
                request.user_id, request.operation, at
            ),
            EventKind::Completed { request, .. } => format!(
                "The request for User {} was completed at {} seconds",
                request.user_id, at
            ),
            EventKind::Canceled { request } => format!(
                "User {} canceled the request due to no response at {} seconds",
                request.user_id, at
            ),
            EventKind::Declined { request } => format!(
                "lazyfs has declined the request of User {} at {} seconds because an invalid/deleted file was requested",
                request.user_id, at
            ),
            EventKind::Idle => {
                "lazyfs has no more pending requests and is going back to sleep".to_string()
            }
        }
    }
}

/// Receiver of coordinator events.
///
/// Called while the emitting file's lock is held, so implementations must
/// not block for long and must never call back into the coordinator.
pub trait EventSink: Send + Sync {
    /// Records one event.
    fn record(&self, event: AccessEvent);
}

/// In-memory event history.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<AccessEvent>>,
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every recorded event in emission order.
    pub fn events(&self) -> Vec<AccessEvent> {
        self.events.lock().clone()
    }

    /// Returns number of recorded events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Checks if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Returns the terminal outcomes of every request issued by `user_id`.
    pub fn outcomes_for(&self, user_id: u32) -> Vec<RequestOutcome> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.request().is_some_and(|r| r.user_id == user_id))
            .filter_map(AccessEvent::terminal_outcome)
            .collect()
    }

    /// Counts recorded events with the given name.
    pub fn count(&self, kind: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.kind.as_str() == kind)
            .count()
    }
}

impl EventSink for EventLog {
    fn record(&self, event: AccessEvent) {
        self.events.lock().push(event);
    }
}

/// Writes each event to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: AccessEvent) {
        let message = event.describe();
        match event.request() {
            Some(request) => info!(
                event = event.kind.as_str(),
                user = request.user_id,
                file = request.file_number(),
                operation = %request.operation,
                at = event.at,
                "{message}"
            ),
            None => info!(event = event.kind.as_str(), at = event.at, "{message}"),
        }
    }
}

/// Forwards every event to several sinks in order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    /// Creates a sink forwarding to `sinks`.
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    /// Adds another destination.
    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn record(&self, event: AccessEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.record(event.clone());
            }
            last.record(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Operation;

    #[test]
    fn test_describe_uses_one_based_file_numbers() {
        let request = Request::new(3, 0, Operation::Write, 2);
        let event = AccessEvent::new(2, EventKind::Requested { request });

        assert_eq!(
            event.describe(),
            "User 3 has made request for performing WRITE on file 1 at 2 seconds"
        );
    }

    #[test]
    fn test_terminal_outcomes() {
        let request = Request::new(1, 0, Operation::Read, 0);
        let snapshot = FileRecord::new();

        assert_eq!(
            AccessEvent::new(1, EventKind::Requested { request }).terminal_outcome(),
            None
        );
        assert_eq!(
            AccessEvent::new(1, EventKind::Admitted { request, snapshot }).terminal_outcome(),
            None
        );
        assert_eq!(
            AccessEvent::new(2, EventKind::Completed { request, snapshot }).terminal_outcome(),
            Some(RequestOutcome::Completed)
        );
        assert_eq!(
            AccessEvent::new(5, EventKind::Canceled { request }).terminal_outcome(),
            Some(RequestOutcome::Canceled)
        );
    }

    #[test]
    fn test_event_log_outcomes_per_user() {
        let log = EventLog::new();
        let first = Request::new(1, 0, Operation::Read, 0);
        let second = Request::new(2, 0, Operation::Read, 0);

        log.record(AccessEvent::new(0, EventKind::Requested { request: first }));
        log.record(AccessEvent::new(1, EventKind::Declined { request: first }));
        log.record(AccessEvent::new(5, EventKind::Canceled { request: second }));
        log.record(AccessEvent::new(5, EventKind::Idle));

        assert_eq!(log.len(), 4);
        assert_eq!(log.outcomes_for(1), vec![RequestOutcome::Declined]);
        assert_eq!(log.outcomes_for(2), vec![RequestOutcome::Canceled]);
        assert_eq!(log.count("Idle"), 1);
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let first = Arc::new(EventLog::new());
        let second = Arc::new(EventLog::new());
        let fanout = FanoutSink::new(vec![first.clone() as Arc<dyn EventSink>]).with(second.clone());

        fanout.record(AccessEvent::new(0, EventKind::Idle));

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
    }
}
