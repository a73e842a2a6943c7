//! Bounded dispatch queue between request submission and workers.

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::request::Request;

/// Errors returned when a request cannot be queued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Dispatch queue is full ({capacity} slots)")]
    Full { capacity: usize },

    #[error("Dispatch queue is closed")]
    Closed,
}

/// Fixed-size ring of queued requests.
#[derive(Debug)]
struct RingBuffer {
    slots: Vec<Option<Request>>,
    head: usize,
    len: usize,
    closed: bool,
}

impl RingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            head: 0,
            len: 0,
            closed: false,
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    fn push_back(&mut self, request: Request) {
        let tail = (self.head + self.len) % self.capacity();
        self.slots[tail] = Some(request);
        self.len += 1;
    }

    fn pop_front(&mut self) -> Option<Request> {
        if self.len == 0 {
            return None;
        }
        let request = self.slots[self.head].take();
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        request
    }
}

/// Bounded FIFO of ordered requests, one producer and many consumers.
///
/// Pushing never blocks: a full queue rejects the request. Popping waits
/// until a request is available or the queue has been closed while empty.
/// The queue never touches per-file state.
#[derive(Debug)]
pub struct DispatchQueue {
    ring: Mutex<RingBuffer>,
    available: Notify,
}

impl DispatchQueue {
    /// Creates an empty queue with `capacity` usable slots.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(RingBuffer::new(capacity)),
            available: Notify::new(),
        }
    }

    /// Appends a request and wakes one waiting consumer.
    ///
    /// # Errors
    ///
    /// - `QueueError::Full` - Every slot is taken; the request is dropped
    /// - `QueueError::Closed` - The queue no longer accepts requests
    pub fn push(&self, request: Request) -> Result<(), QueueError> {
        {
            let mut ring = self.ring.lock();
            if ring.closed {
                warn!(user = request.user_id, "Dispatch queue closed, dropping request");
                return Err(QueueError::Closed);
            }
            if ring.is_full() {
                let capacity = ring.capacity();
                warn!(
                    user = request.user_id,
                    file = request.file_number(),
                    operation = %request.operation,
                    capacity,
                    "Dispatch queue full, dropping request"
                );
                return Err(QueueError::Full { capacity });
            }
            ring.push_back(request);
            debug!(user = request.user_id, queued = ring.len, "Request queued");
        }

        self.available.notify_one();
        Ok(())
    }

    /// Removes the oldest request, waiting for one if the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<Request> {
        loop {
            let available = self.available.notified();
            tokio::pin!(available);

            {
                let mut ring = self.ring.lock();
                if let Some(request) = ring.pop_front() {
                    let more = ring.len > 0;
                    drop(ring);
                    // Pass the wake-up on in case a permit was consumed by
                    // a consumer that found nothing.
                    if more {
                        self.available.notify_one();
                    }
                    return Some(request);
                }
                if ring.closed {
                    return None;
                }
                available.as_mut().enable();
            }

            available.await;
        }
    }

    /// Closes the queue.
    ///
    /// Requests already queued are still delivered; consumers waiting on an
    /// empty queue, and every later pop on it, get `None`.
    pub fn close(&self) {
        self.ring.lock().closed = true;
        self.available.notify_waiters();
        debug!("Dispatch queue closed");
    }

    /// Returns number of queued requests.
    pub fn len(&self) -> usize {
        self.ring.lock().len
    }

    /// Checks if no request is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns total slot count.
    pub fn capacity(&self) -> usize {
        self.ring.lock().capacity()
    }

    /// Checks if the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.ring.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::request::Operation;

    fn request(user_id: u32) -> Request {
        Request::new(user_id, 0, Operation::Read, 0)
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = DispatchQueue::with_capacity(4);
        for user in 1..=3 {
            queue.push(request(user)).unwrap();
        }

        assert_eq!(queue.pop().await.unwrap().user_id, 1);
        assert_eq!(queue.pop().await.unwrap().user_id, 2);
        assert_eq!(queue.pop().await.unwrap().user_id, 3);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_rejects() {
        let queue = DispatchQueue::with_capacity(2);
        queue.push(request(1)).unwrap();
        queue.push(request(2)).unwrap();

        assert_eq!(
            queue.push(request(3)),
            Err(QueueError::Full { capacity: 2 })
        );
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_ring_wraps_around() {
        let queue = DispatchQueue::with_capacity(3);
        for round in 0..5u32 {
            queue.push(request(round * 2)).unwrap();
            queue.push(request(round * 2 + 1)).unwrap();
            assert_eq!(queue.pop().await.unwrap().user_id, round * 2);
            assert_eq!(queue.pop().await.unwrap().user_id, round * 2 + 1);
        }
        assert_eq!(queue.capacity(), 3);
    }

    #[tokio::test]
    async fn test_close_drains_then_returns_none() {
        let queue = DispatchQueue::with_capacity(4);
        queue.push(request(1)).unwrap();
        queue.close();

        assert!(queue.is_closed());
        assert_eq!(queue.pop().await.map(|r| r.user_id), Some(1));
        assert_eq!(queue.pop().await, None);
        assert_eq!(queue.push(request(2)), Err(QueueError::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(DispatchQueue::with_capacity(4));

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!consumer.is_finished());

        queue.push(request(42)).unwrap();
        let popped = consumer.await.unwrap();
        assert_eq!(popped.map(|r| r.user_id), Some(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_releases_blocked_consumers() {
        let queue = Arc::new(DispatchQueue::with_capacity(4));

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move { queue.pop().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.close();

        for consumer in consumers {
            assert_eq!(consumer.await.unwrap(), None);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_many_consumers_each_get_one() {
        let queue = Arc::new(DispatchQueue::with_capacity(16));

        let consumers: Vec<_> = (0..10)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move { queue.pop().await })
            })
            .collect();

        for user in 0..10 {
            queue.push(request(user)).unwrap();
        }

        let mut users = Vec::new();
        for consumer in consumers {
            users.push(consumer.await.unwrap().unwrap().user_id);
        }
        users.sort_unstable();
        assert_eq!(users, (0..10).collect::<Vec<_>>());
    }
}
