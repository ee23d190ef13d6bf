//! Envelope pump: drains the queue fed by the HTTP ingress and dispatches each
//! envelope on its own task so a long search never holds up the next command.
//! Slack already got its 200 when the envelope was queued.

use std::sync::Arc;

use thiserror::Error;
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinSet,
};
use tracing::{debug, info, warn};

use crate::events::{EventContext, EventDispatcher, HandlerResult, SlackEnvelope};

/// Receiving half of the bounded envelope queue.
pub struct EnvelopeQueue {
    receiver: Mutex<mpsc::Receiver<SlackEnvelope>>,
}

#[derive(Clone)]
pub struct EnvelopeSender {
    sender: mpsc::Sender<SlackEnvelope>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("envelope queue is full")]
    Full,
    #[error("envelope queue is closed")]
    Closed,
}

impl EnvelopeQueue {
    pub fn new(capacity: usize) -> (Self, EnvelopeSender) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { receiver: Mutex::new(receiver) }, EnvelopeSender { sender })
    }

    /// Next queued envelope; `None` once every sender is gone and the queue is drained.
    pub async fn next(&self) -> Option<SlackEnvelope> {
        self.receiver.lock().await.recv().await
    }
}

impl EnvelopeSender {
    pub fn enqueue(&self, envelope: SlackEnvelope) -> Result<(), EnqueueError> {
        self.sender.try_send(envelope).map_err(|error| match error {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }
}

pub struct EventRunner {
    queue: EnvelopeQueue,
    dispatcher: Arc<EventDispatcher>,
}

impl EventRunner {
    pub fn new(queue: EnvelopeQueue, dispatcher: EventDispatcher) -> Self {
        Self { queue, dispatcher: Arc::new(dispatcher) }
    }

    /// Pumps until the queue closes, then waits for in-flight handlers.
    pub async fn start(&self) {
        let mut in_flight = JoinSet::new();

        while let Some(envelope) = self.queue.next().await {
            while in_flight.try_join_next().is_some() {}

            info!(
                event_name = "ingress.slack.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                "received slack envelope"
            );

            let dispatcher = self.dispatcher.clone();
            in_flight.spawn(async move {
                let context = EventContext { correlation_id: envelope.envelope_id.clone() };
                match dispatcher.dispatch(&envelope, &context).await {
                    Ok(HandlerResult::Processed) => debug!(
                        event_name = "ingress.slack.dispatched",
                        correlation_id = %context.correlation_id,
                        "slack envelope handled"
                    ),
                    Ok(HandlerResult::Ignored) => debug!(
                        event_name = "ingress.slack.ignored",
                        correlation_id = %context.correlation_id,
                        "slack envelope ignored"
                    ),
                    Err(error) => warn!(
                        event_name = "ingress.slack.dispatch_failed",
                        correlation_id = %context.correlation_id,
                        error = %error,
                        "event dispatch failed; continuing event loop"
                    ),
                }
            });
        }

        info!(event_name = "ingress.slack.queue_closed", "envelope queue closed");
        while let Some(joined) = in_flight.join_next().await {
            if let Err(error) = joined {
                warn!(event_name = "ingress.slack.handler_aborted", error = %error, "event handler task aborted");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{EnqueueError, EnvelopeQueue, EventRunner};
    use crate::events::{
        EventContext, EventDispatcher, EventHandler, EventHandlerError, HandlerResult,
        SlackEnvelope, SlackEvent, SlackEventType,
    };

    struct CountingHandler {
        handled: Arc<AtomicUsize>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        fn event_type(&self) -> SlackEventType {
            SlackEventType::Unsupported
        }

        async fn handle(
            &self,
            _envelope: &SlackEnvelope,
            _ctx: &EventContext,
        ) -> Result<HandlerResult, EventHandlerError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(HandlerResult::Processed)
        }
    }

    fn unsupported(id: &str) -> SlackEnvelope {
        SlackEnvelope {
            envelope_id: id.to_owned(),
            event: SlackEvent::Unsupported { event_type: "test".to_owned() },
        }
    }

    fn counting(delay: Option<Duration>) -> (EventDispatcher, Arc<AtomicUsize>) {
        let handled = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(CountingHandler { handled: handled.clone(), delay });
        (dispatcher, handled)
    }

    #[tokio::test]
    async fn queued_envelopes_are_dispatched_before_the_runner_returns() {
        let (dispatcher, handled) = counting(None);
        let (queue, sender) = EnvelopeQueue::new(8);
        sender.enqueue(unsupported("env-1")).expect("queue");
        sender.enqueue(unsupported("env-2")).expect("queue");
        drop(sender);

        EventRunner::new(queue, dispatcher).start().await;

        assert_eq!(handled.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handlers_run_concurrently() {
        let (dispatcher, handled) = counting(Some(Duration::from_secs(30)));
        let (queue, sender) = EnvelopeQueue::new(8);
        for id in ["env-1", "env-2", "env-3"] {
            sender.enqueue(unsupported(id)).expect("queue");
        }
        drop(sender);

        let started = tokio::time::Instant::now();
        EventRunner::new(queue, dispatcher).start().await;

        assert_eq!(handled.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn full_queue_rejects_new_envelopes() {
        let (_queue, sender) = EnvelopeQueue::new(1);

        sender.enqueue(unsupported("env-1")).expect("first fits");
        assert_eq!(sender.enqueue(unsupported("env-2")), Err(EnqueueError::Full));
    }

    #[tokio::test]
    async fn dropped_queue_reports_closed() {
        let (queue, sender) = EnvelopeQueue::new(1);
        drop(queue);

        assert_eq!(sender.enqueue(unsupported("env-1")), Err(EnqueueError::Closed));
    }
}
