//! Live progress message.
//!
//! A reporter owns one chat message that it posts on the first render and
//! edits afterwards. Render requests are accepted synchronously, in call
//! order, onto a single lane drained by one worker task, so edits never
//! overlap and never arrive out of order.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::{
    blocks::{MessageBuilder, MessageTemplate},
    messenger::{DeliveryError, MessageHandle, Messenger},
};

pub const DEFAULT_BAR_WIDTH: usize = 40;
const FILLED: char = '█';
const EMPTY: char = '░';

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProgressError {
    #[error("progress total must be greater than zero")]
    InvalidTotal,
    #[error("progress {done} is beyond total {total}")]
    OutOfRange { done: usize, total: usize },
    #[error("progress reporter was destroyed")]
    Destroyed,
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error("progress render lane closed")]
    LaneClosed,
}

#[derive(Debug)]
struct ProgressState {
    label: String,
    total: usize,
    width: usize,
    last_requested: Option<usize>,
    destroyed: bool,
}

enum RenderKind {
    Paint(MessageTemplate),
    Erase,
}

struct RenderRequest {
    kind: RenderKind,
    ack: oneshot::Sender<Result<(), DeliveryError>>,
}

type Ack = oneshot::Receiver<Result<(), DeliveryError>>;

#[derive(Clone)]
pub struct ProgressReporter {
    state: Arc<Mutex<ProgressState>>,
    lane: mpsc::UnboundedSender<RenderRequest>,
}

impl ProgressReporter {
    /// Must be called inside a tokio runtime; the render worker is spawned here.
    pub fn new(
        messenger: Messenger,
        label: impl Into<String>,
        total: usize,
        width: usize,
    ) -> Result<Self, ProgressError> {
        if total == 0 {
            return Err(ProgressError::InvalidTotal);
        }

        let (lane, requests) = mpsc::unbounded_channel();
        tokio::spawn(render_worker(messenger, requests));

        Ok(Self {
            state: Arc::new(Mutex::new(ProgressState {
                label: label.into(),
                total,
                width: width.max(1),
                last_requested: None,
                destroyed: false,
            })),
            lane,
        })
    }

    /// Requests a render at `done`. The request is queued before this returns;
    /// the future resolves once the transport call finished.
    pub fn update(
        &self,
        done: usize,
    ) -> impl Future<Output = Result<(), ProgressError>> + Send + 'static {
        let queued = self.enqueue_paint(done);
        async move { settle(queued?).await }
    }

    /// Replaces the label. The repaint goes through the same guard as `update`,
    /// so a reporter already rendered at its current value shows the new label
    /// on the next advance.
    pub fn set_label(
        &self,
        label: impl Into<String>,
    ) -> impl Future<Output = Result<(), ProgressError>> + Send + 'static {
        let queued = self.relabel(label.into());
        async move { settle(queued?).await }
    }

    /// Erases the message if one was rendered. Every later call fails.
    pub fn destroy(&self) -> impl Future<Output = Result<(), ProgressError>> + Send + 'static {
        let queued = self.enqueue_erase();
        async move { settle(Some(queued?)).await }
    }

    pub fn total(&self) -> usize {
        self.lock().total
    }

    fn relabel(&self, label: String) -> Result<Option<Ack>, ProgressError> {
        let current = {
            let mut state = self.lock();
            if state.destroyed {
                return Err(ProgressError::Destroyed);
            }
            state.label = label;
            state.last_requested.unwrap_or(0)
        };
        self.enqueue_paint(current)
    }

    fn enqueue_paint(&self, done: usize) -> Result<Option<Ack>, ProgressError> {
        let mut state = self.lock();
        if state.destroyed {
            return Err(ProgressError::Destroyed);
        }
        if done > state.total {
            return Err(ProgressError::OutOfRange { done, total: state.total });
        }
        if state.last_requested.is_some_and(|last| done <= last) {
            return Ok(None);
        }

        state.last_requested = Some(done);
        let message = render(&state.label, done, state.total, state.width);
        self.push(RenderKind::Paint(message)).map(Some)
    }

    fn enqueue_erase(&self) -> Result<Ack, ProgressError> {
        let mut state = self.lock();
        if state.destroyed {
            return Err(ProgressError::Destroyed);
        }
        state.destroyed = true;
        self.push(RenderKind::Erase)
    }

    fn push(&self, kind: RenderKind) -> Result<Ack, ProgressError> {
        let (ack, receiver) = oneshot::channel();
        self.lane.send(RenderRequest { kind, ack }).map_err(|_| ProgressError::LaneClosed)?;
        Ok(receiver)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn settle(queued: Option<Ack>) -> Result<(), ProgressError> {
    let Some(ack) = queued else {
        return Ok(());
    };
    ack.await.map_err(|_| ProgressError::LaneClosed)?.map_err(ProgressError::from)
}

async fn render_worker(messenger: Messenger, mut requests: mpsc::UnboundedReceiver<RenderRequest>) {
    let mut handle: Option<MessageHandle> = None;

    while let Some(request) = requests.recv().await {
        let (outcome, last) = match request.kind {
            RenderKind::Paint(message) => {
                let delivered = match &handle {
                    Some(existing) => messenger.update(existing, message).await,
                    None => messenger.post(message).await,
                };
                match delivered {
                    Ok(rendered) => {
                        handle = Some(rendered);
                        (Ok(()), false)
                    }
                    Err(error) => (Err(error), false),
                }
            }
            RenderKind::Erase => {
                let outcome = match handle.take() {
                    Some(existing) => messenger
                        .update(&existing, MessageTemplate::text(" "))
                        .await
                        .map(|_| ()),
                    None => Ok(()),
                };
                (outcome, true)
            }
        };

        if let Err(error) = &outcome {
            warn!(
                event_name = "slack.progress.render_failed",
                channel = messenger.channel(),
                error = %error,
                "progress render failed"
            );
        }
        if request.ack.send(outcome).is_err() {
            debug!(event_name = "slack.progress.ack_dropped", "progress caller went away");
        }
        if last {
            return;
        }
    }
}

/// Fallback `"{label} {done}/{total}"`; block `*{label}*` above a bar.
pub fn render(label: &str, done: usize, total: usize, width: usize) -> MessageTemplate {
    let counter = format!("{done}/{total}");
    let bar = progress_bar(done, total, width);
    MessageBuilder::new(format!("{label} {counter}"))
        .section(|section| {
            section.mrkdwn(format!("*{label}*\n{bar}  {counter}"));
        })
        .build()
}

pub fn progress_bar(done: usize, total: usize, width: usize) -> String {
    let ratio = if total == 0 { 0.0 } else { done as f64 / total as f64 };
    let filled = ((ratio * width as f64).round() as usize).min(width);

    let mut bar = String::with_capacity(width * FILLED.len_utf8());
    bar.extend(std::iter::repeat(FILLED).take(filled));
    bar.extend(std::iter::repeat(EMPTY).take(width - filled));
    bar
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::{progress_bar, render, ProgressError, ProgressReporter};
    use crate::{
        messenger::{Delivery, Messenger},
        testing::RecordingTransport,
    };

    fn reporter(transport: &Arc<RecordingTransport>, total: usize) -> ProgressReporter {
        ProgressReporter::new(Messenger::new(transport.clone(), "C1"), "Working", total, 10)
            .expect("reporter")
    }

    #[tokio::test]
    async fn stale_and_repeated_updates_make_no_transport_calls() {
        let transport = Arc::new(RecordingTransport::default());
        let progress = reporter(&transport, 3);

        progress.update(0).await.expect("first");
        progress.update(2).await.expect("advance");
        progress.update(1).await.expect("stale");
        progress.update(2).await.expect("repeat");

        let sent = transport.sent().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].delivery, Delivery::Post);
        assert!(matches!(sent[1].delivery, Delivery::Update { .. }));
        assert_eq!(sent[1].text, "Working 2/3");
    }

    #[tokio::test]
    async fn concurrent_updates_render_in_call_order_one_at_a_time() {
        let transport = Arc::new(RecordingTransport::with_send_delay(Duration::from_millis(5)));
        let progress = reporter(&transport, 5);

        let pending: Vec<_> = (1..=5).map(|done| tokio::spawn(progress.update(done))).collect();
        for task in pending {
            task.await.expect("join").expect("update");
        }

        let texts: Vec<String> = transport.sent().await.into_iter().map(|m| m.text).collect();
        assert_eq!(
            texts,
            vec!["Working 1/5", "Working 2/5", "Working 3/5", "Working 4/5", "Working 5/5"]
        );
        assert_eq!(transport.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn destroyed_reporter_rejects_every_call() {
        let transport = Arc::new(RecordingTransport::default());
        let progress = reporter(&transport, 2);

        progress.destroy().await.expect("destroy");

        assert!(transport.sent().await.is_empty(), "nothing rendered, nothing to erase");
        assert_eq!(progress.update(1).await, Err(ProgressError::Destroyed));
        assert_eq!(progress.set_label("again").await, Err(ProgressError::Destroyed));
        assert_eq!(progress.destroy().await, Err(ProgressError::Destroyed));
    }

    #[tokio::test]
    async fn destroy_erases_a_rendered_message() {
        let transport = Arc::new(RecordingTransport::default());
        let progress = reporter(&transport, 2);

        progress.update(1).await.expect("update");
        progress.destroy().await.expect("destroy");

        let sent = transport.sent().await;
        assert_eq!(sent.len(), 2);
        assert!(matches!(sent[1].delivery, Delivery::Update { .. }));
        assert_eq!(sent[1].text, " ");
        assert!(sent[1].blocks.is_empty());
    }

    #[tokio::test]
    async fn invalid_totals_and_out_of_range_updates_are_rejected() {
        let transport = Arc::new(RecordingTransport::default());
        assert!(matches!(
            ProgressReporter::new(Messenger::new(transport.clone(), "C1"), "x", 0, 10),
            Err(ProgressError::InvalidTotal)
        ));

        let progress = reporter(&transport, 2);
        assert_eq!(progress.update(3).await, Err(ProgressError::OutOfRange { done: 3, total: 2 }));
        assert!(transport.sent().await.is_empty());
    }

    #[tokio::test]
    async fn relabel_shows_on_the_next_advance() {
        let transport = Arc::new(RecordingTransport::default());
        let progress = reporter(&transport, 2);

        progress.update(0).await.expect("first");
        progress.set_label("Searching 2 integrations").await.expect("relabel");
        assert_eq!(transport.sent().await.len(), 1);

        progress.update(1).await.expect("advance");
        let sent = transport.sent().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].text, "Searching 2 integrations 1/2");
    }

    #[test]
    fn bar_fills_proportionally() {
        assert_eq!(progress_bar(1, 2, 10), "█████░░░░░");
        assert_eq!(progress_bar(0, 3, 4), "░░░░");
        assert_eq!(progress_bar(3, 3, 4), "████");

        let message = render("Parsing search text", 0, 3, 4);
        assert_eq!(message.fallback_text, "Parsing search text 0/3");
        assert_eq!(
            crate::testing::section_texts(&message.blocks),
            vec!["*Parsing search text*\n░░░░  0/3"]
        );
    }
}
