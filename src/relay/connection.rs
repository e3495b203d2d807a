use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;
use warp::ws::Message;

use crate::error::{RelayError, Result};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one live transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// An addressable outbound endpoint for one connection.
///
/// Sends are fire-and-forget: an `Err` only means the peer is unreachable,
/// and callers are expected to log it and carry on.
pub trait ConnectionSink: Send + Sync {
    fn id(&self) -> ConnectionId;

    fn send(&self, text: &str) -> Result<()>;

    /// Idempotent. No send is attempted once this has been called.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Sink backed by the writer task of a warp WebSocket.
pub struct WsSink {
    id: ConnectionId,
    sender: mpsc::UnboundedSender<Message>,
    closed: AtomicBool,
}

impl WsSink {
    pub fn new(sender: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: ConnectionId::next(),
            sender,
            closed: AtomicBool::new(false),
        }
    }
}

impl ConnectionSink for WsSink {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, text: &str) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RelayError::SendFailed(self.id));
        }

        if self.sender.send(Message::text(text)).is_err() {
            self.closed.store(true, Ordering::Release);
            return Err(RelayError::SendFailed(self.id));
        }

        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // The writer task stops after forwarding the close frame.
        let _ = self.sender.send(Message::close());
        tracing::debug!(connection = %self.id, "Sink closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// In-memory sink that records everything sent to it.
    pub struct RecordingSink {
        id: ConnectionId,
        sent: Mutex<Vec<String>>,
        closed: AtomicBool,
    }

    impl RecordingSink {
        pub fn new() -> std::sync::Arc<Self> {
            std::sync::Arc::new(Self {
                id: ConnectionId::next(),
                sent: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            })
        }

        pub fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }

        pub fn sent_json(&self) -> Vec<serde_json::Value> {
            self.sent()
                .iter()
                .map(|text| serde_json::from_str(text).unwrap())
                .collect()
        }

        pub fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.sent.lock().unwrap())
        }
    }

    impl ConnectionSink for RecordingSink {
        fn id(&self) -> ConnectionId {
            self.id
        }

        fn send(&self, text: &str) -> Result<()> {
            if self.is_closed() {
                return Err(RelayError::SendFailed(self.id));
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }

        fn close(&self) {
            self.closed.store(true, Ordering::Release);
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::Acquire)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_ids_are_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_ws_sink_forwards_text() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = WsSink::new(tx);

        sink.send(r#"{"type":"offer"}"#).unwrap();

        let message = rx.recv().await.unwrap();
        assert_eq!(message.to_str().unwrap(), r#"{"type":"offer"}"#);
    }

    #[test]
    fn test_ws_sink_send_fails_when_writer_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = WsSink::new(tx);
        drop(rx);

        let result = sink.send("hello");
        assert!(matches!(result, Err(RelayError::SendFailed(_))));
        assert!(sink.is_closed());
    }

    #[tokio::test]
    async fn test_ws_sink_close_is_idempotent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = WsSink::new(tx);

        sink.close();
        sink.close();

        assert!(rx.recv().await.unwrap().is_close());
        assert!(rx.try_recv().is_err());
        assert!(sink.send("late").is_err());
    }
}
