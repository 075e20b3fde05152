//! In-memory text socket.

use std::sync::{Arc, Mutex};

use crate::sync::lock;
use crate::transport::{TextSocket, TransportError};

type Forward = Arc<dyn Fn(&str) + Send + Sync>;

/// Records everything written to it and, once linked, forwards each write
/// to the far end synchronously.
#[derive(Default)]
pub struct MemorySocket {
    sent: Mutex<Vec<String>>,
    closed: Mutex<bool>,
    forward: Mutex<Option<Forward>>,
}

impl MemorySocket {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver every later write to `far_end` as well.
    pub fn connect_to<F>(&self, far_end: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *lock(&self.forward) = Some(Arc::new(far_end));
    }

    /// Everything written so far.
    pub fn sent(&self) -> Vec<String> {
        lock(&self.sent).clone()
    }

    /// Everything written so far, clearing the record.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut *lock(&self.sent))
    }

    pub fn is_closed(&self) -> bool {
        *lock(&self.closed)
    }
}

impl TextSocket for MemorySocket {
    fn send(&self, text: &str) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        lock(&self.sent).push(text.to_string());
        let forward = lock(&self.forward).clone();
        if let Some(far_end) = forward {
            far_end(text);
        }
        Ok(())
    }

    fn close(&self) {
        *lock(&self.closed) = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_and_forwards() {
        let socket = MemorySocket::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        socket.send("before").unwrap();
        socket.connect_to(move |text| sink.lock().unwrap().push(text.to_string()));
        socket.send("after").unwrap();

        assert_eq!(socket.take_sent(), vec!["before", "after"]);
        assert!(socket.sent().is_empty());
        assert_eq!(*received.lock().unwrap(), vec!["after"]);
    }

    #[test]
    fn test_closed_socket_refuses_writes() {
        let socket = MemorySocket::new();
        socket.close();
        assert!(matches!(socket.send("x"), Err(TransportError::Closed)));
        assert!(socket.sent().is_empty());
    }
}
