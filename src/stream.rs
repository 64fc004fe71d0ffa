use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::Stream;
use thread_protocol::{ThreadError, ThreadEvent};
use tokio::sync::mpsc;

use crate::lock_unpoisoned;

/// Incremental events of one turn, in production order.
///
/// The stream ends right after the terminal `turn.completed` or `turn.failed`.
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<ThreadEvent>,
}

impl Stream for EventStream {
    type Item = ThreadEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Producer side of an [`EventStream`]. Cloned into the executor, the approval
/// gate, and background-event senders.
///
/// The first terminal event closes the sink; later sends are dropped.
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    sender: Arc<Mutex<Option<mpsc::UnboundedSender<ThreadEvent>>>>,
}

pub(crate) fn event_channel() -> (EventSink, EventStream) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        EventSink {
            sender: Arc::new(Mutex::new(Some(sender))),
        },
        EventStream { receiver },
    )
}

impl EventSink {
    /// Returns false when the sink was already closed.
    pub(crate) fn send(&self, event: ThreadEvent) -> bool {
        let mut sender = lock_unpoisoned(&self.sender);
        let Some(active) = sender.as_ref() else {
            tracing::debug!(?event, "dropping event after terminal");
            return false;
        };

        let terminal = event.is_terminal();
        // A dropped receiver is fine: the turn still runs to completion.
        let _ = active.send(event);
        if terminal {
            *sender = None;
        }
        true
    }

    pub(crate) fn is_closed(&self) -> bool {
        lock_unpoisoned(&self.sender).is_none()
    }
}

/// Emits `turn.failed` if dropped while the sink is still open, which covers
/// executor panics and aborted tasks.
pub(crate) struct TerminalGuard {
    sink: EventSink,
}

impl TerminalGuard {
    pub(crate) fn new(sink: EventSink) -> Self {
        Self { sink }
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if !self.sink.is_closed() {
            tracing::warn!("turn ended without a terminal event");
            self.sink.send(ThreadEvent::TurnFailed {
                error: ThreadError::with_code("Turn ended unexpectedly", "internal"),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use thread_protocol::Usage;

    use super::*;

    #[tokio::test]
    async fn nothing_follows_the_terminal_event() {
        let (sink, stream) = event_channel();
        assert!(sink.send(ThreadEvent::TurnStarted));
        assert!(sink.send(ThreadEvent::TurnCompleted {
            usage: Usage::default()
        }));
        assert!(!sink.send(ThreadEvent::BackgroundEvent {
            message: "late".to_string()
        }));
        drop(sink);

        let events: Vec<ThreadEvent> = stream.collect().await;
        assert_eq!(events.len(), 2);
        assert!(events[1].is_terminal());
    }

    #[tokio::test]
    async fn guard_fails_an_unterminated_turn() {
        let (sink, stream) = event_channel();
        {
            let _guard = TerminalGuard::new(sink.clone());
            sink.send(ThreadEvent::TurnStarted);
        }
        drop(sink);

        let events: Vec<ThreadEvent> = stream.collect().await;
        assert!(matches!(
            events.last(),
            Some(ThreadEvent::TurnFailed { error }) if error.code.as_deref() == Some("internal")
        ));
    }

    #[tokio::test]
    async fn guard_is_silent_after_a_terminal_event() {
        let (sink, stream) = event_channel();
        {
            let _guard = TerminalGuard::new(sink.clone());
            sink.send(ThreadEvent::TurnCompleted {
                usage: Usage::default(),
            });
        }
        drop(sink);

        let events: Vec<ThreadEvent> = stream.collect().await;
        assert_eq!(events.len(), 1);
    }
}
