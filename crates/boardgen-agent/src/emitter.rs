//! Push-oriented event emitter feeding the SSE channel.
//!
//! Emission never blocks the orchestrator: once the downstream channel
//! is gone every further emit is a no-op. Order is the call order; there
//! is no buffering across attempt boundaries beyond the channel itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use boardgen_core::AgentEvent;

/// Channel capacity; the SSE writer drains continuously so this only
/// bounds a burst.
const CHANNEL_CAPACITY: usize = 1024;

/// Heartbeat cadence while a connection is open.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Ordered, drop-if-closed event sink.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: mpsc::Sender<AgentEvent>,
    closed: Arc<AtomicBool>,
}

impl EventEmitter {
    /// Create an emitter and the receiving half for the SSE writer.
    pub fn channel() -> (Self, mpsc::Receiver<AgentEvent>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        (
            Self {
                tx,
                closed: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    /// Emit one event. No-op once the downstream channel closed.
    pub fn emit(&self, event: AgentEvent) {
        if self.closed.load(Ordering::Relaxed) {
            return;
        }
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Closed(event)) => {
                self.closed.store(true, Ordering::Relaxed);
                tracing::debug!(kind = event.kind(), "event dropped, channel closed");
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(kind = event.kind(), "event dropped, channel full");
            }
        }
    }

    /// Whether the downstream channel has gone away.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed) || self.tx.is_closed()
    }

    /// Spawn the heartbeat task; aborted by the caller at run end.
    pub fn spawn_heartbeat(&self, interval: Duration) -> JoinHandle<()> {
        let emitter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if emitter.is_closed() {
                    return;
                }
                emitter.emit(AgentEvent::Ping);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_preserves_order() {
        let (emitter, mut rx) = EventEmitter::channel();
        emitter.emit(AgentEvent::RetryStart { attempt: 1, max_attempts: 3 });
        emitter.emit(AgentEvent::Ping);
        emitter.emit(AgentEvent::RetryStart { attempt: 2, max_attempts: 3 });

        assert!(matches!(
            rx.recv().await,
            Some(AgentEvent::RetryStart { attempt: 1, .. })
        ));
        assert!(matches!(rx.recv().await, Some(AgentEvent::Ping)));
        assert!(matches!(
            rx.recv().await,
            Some(AgentEvent::RetryStart { attempt: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_emit_is_noop_after_close() {
        let (emitter, rx) = EventEmitter::channel();
        drop(rx);
        emitter.emit(AgentEvent::Ping);
        emitter.emit(AgentEvent::Ping);
        assert!(emitter.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_emits_pings() {
        let (emitter, mut rx) = EventEmitter::channel();
        let handle = emitter.spawn_heartbeat(Duration::from_secs(15));

        tokio::time::advance(Duration::from_secs(31)).await;
        let first = rx.recv().await;
        assert!(matches!(first, Some(AgentEvent::Ping)));
        handle.abort();
    }
}
