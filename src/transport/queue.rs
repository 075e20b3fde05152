//! Outgoing queue with a single ready-flush.

use std::collections::VecDeque;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::sync::lock;

use super::{MessageSink, TransportError};

type Deliver = Box<dyn Fn(&str) -> Result<(), TransportError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Medium not ready; sends are queued.
    Waiting,
    /// Ready signalled, queue draining; sends still append to the queue.
    Flushing,
    /// Queue drained; sends go straight to the medium.
    Connected,
    /// Closed or detached; sends are refused.
    Closed,
}

struct QueueState {
    phase: Phase,
    queue: VecDeque<String>,
}

/// Queue-then-flush discipline shared by socket and peer transports.
///
/// The queue is only ever non-empty before the medium reports ready. It is
/// drained exactly once, in submission order, and never used again.
pub struct OutboundQueue {
    state: Mutex<QueueState>,
    deliver: Deliver,
}

impl OutboundQueue {
    /// Create a queue that writes to the medium through `deliver`.
    pub fn new<F>(deliver: F) -> Self
    where
        F: Fn(&str) -> Result<(), TransportError> + Send + Sync + 'static,
    {
        Self {
            state: Mutex::new(QueueState {
                phase: Phase::Waiting,
                queue: VecDeque::new(),
            }),
            deliver: Box::new(deliver),
        }
    }

    /// Medium reported ready: drain the queue, then switch to pass-through.
    ///
    /// Returns false (and does nothing) if the queue was already flushed or
    /// closed.
    pub fn on_ready(&self) -> bool {
        {
            let mut state = lock(&self.state);
            if state.phase != Phase::Waiting {
                return false;
            }
            state.phase = Phase::Flushing;
        }

        let mut flushed = 0usize;
        loop {
            // The lock is released around each delivery; sends made while
            // draining land at the back of the queue and keep their order.
            let next = {
                let mut state = lock(&self.state);
                match state.queue.pop_front() {
                    Some(text) => text,
                    None => {
                        if state.phase == Phase::Flushing {
                            state.phase = Phase::Connected;
                        }
                        break;
                    }
                }
            };
            if let Err(e) = (self.deliver)(&next) {
                warn!(error = %e, "failed to deliver queued message");
            }
            flushed += 1;
        }
        debug!(flushed, "outbound queue flushed");
        true
    }

    /// Returns true once the queue has been drained.
    pub fn is_connected(&self) -> bool {
        lock(&self.state).phase == Phase::Connected
    }

    /// Number of messages waiting for the medium.
    pub fn queued(&self) -> usize {
        lock(&self.state).queue.len()
    }

    /// Refuse all further sends and drop anything still queued.
    pub fn close(&self) {
        let mut state = lock(&self.state);
        state.phase = Phase::Closed;
        state.queue.clear();
    }
}

impl MessageSink for OutboundQueue {
    fn send_text(&self, text: String) -> Result<(), TransportError> {
        {
            let mut state = lock(&self.state);
            match state.phase {
                Phase::Waiting | Phase::Flushing => {
                    state.queue.push_back(text);
                    return Ok(());
                }
                Phase::Closed => return Err(TransportError::Closed),
                Phase::Connected => {}
            }
        }
        (self.deliver)(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recording_queue() -> (Arc<Mutex<Vec<String>>>, OutboundQueue) {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = delivered.clone();
        let queue = OutboundQueue::new(move |text: &str| {
            sink.lock().unwrap().push(text.to_string());
            Ok(())
        });
        (delivered, queue)
    }

    #[test]
    fn test_queue_then_flush_in_order() {
        let (delivered, queue) = recording_queue();
        queue.send_text("one".into()).unwrap();
        queue.send_text("two".into()).unwrap();
        queue.send_text("three".into()).unwrap();
        assert!(delivered.lock().unwrap().is_empty());
        assert_eq!(queue.queued(), 3);

        assert!(queue.on_ready());
        assert_eq!(*delivered.lock().unwrap(), vec!["one", "two", "three"]);
        assert!(queue.is_connected());

        queue.send_text("four".into()).unwrap();
        assert_eq!(queue.queued(), 0);
        assert_eq!(delivered.lock().unwrap().last().unwrap(), "four");
    }

    #[test]
    fn test_flush_happens_once() {
        let (delivered, queue) = recording_queue();
        queue.send_text("a".into()).unwrap();
        assert!(queue.on_ready());
        assert!(!queue.on_ready());
        assert_eq!(delivered.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_closed_queue_refuses_sends() {
        let (delivered, queue) = recording_queue();
        queue.send_text("dropped".into()).unwrap();
        queue.close();
        assert!(!queue.on_ready());
        assert!(matches!(queue.send_text("x".into()), Err(TransportError::Closed)));
        assert!(delivered.lock().unwrap().is_empty());
    }
}
