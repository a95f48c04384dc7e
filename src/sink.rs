//! Ordered, back-pressured sink for outbound stream events.
//!
//! The orchestrator is the only producer; the wire (an SSE response body)
//! is the only consumer. The sink's contract:
//!
//! - Events are delivered in emission order.
//! - After a terminal event (`done` or `error`) further emits are no-ops.
//! - Any underlying write failure closes the sink; subsequent events are
//!   silently dropped so the orchestrator never has to unwind on a client
//!   disconnect.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

use crate::types::StreamEvent;

/// Destination for orchestrator events.
///
/// Implementations must preserve emission order and make `emit` a no-op
/// once the sink is closed.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Delivers one event. Never fails from the producer's perspective;
    /// wire errors close the sink instead.
    async fn emit(&self, event: StreamEvent);

    /// Whether the sink has been terminated (terminal event or wire error).
    fn closed(&self) -> bool;
}

/// Channel-backed sink bridging the orchestrator to an SSE response task.
///
/// Back-pressure comes from the bounded channel: `emit` suspends while the
/// consumer is behind. A dropped receiver (client disconnect) closes the
/// sink and the orchestrator's remaining writes become no-ops.
pub struct ChannelSink {
    tx: mpsc::Sender<StreamEvent>,
    closed: AtomicBool,
}

impl ChannelSink {
    /// Creates a sink and the receiver half the wire task drains.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            Self {
                tx,
                closed: AtomicBool::new(false),
            },
            rx,
        )
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn emit(&self, event: StreamEvent) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }

        let terminal = event.is_terminal();

        if self.tx.send(event).await.is_err() {
            // Receiver gone: the client disconnected. Abandon the stream.
            log::debug!("Event sink receiver dropped; closing sink");
            self.closed.store(true, Ordering::SeqCst);
            return;
        }

        if terminal {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Encodes one event in the SSE wire format: a `data: ` line holding the
/// JSON object, terminated by a blank line.
pub fn sse_encode(event: &StreamEvent) -> String {
    // StreamEvent serialization cannot fail: every variant is plain data.
    let json = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    format!("data: {}\n\n", json)
}
