//! In-memory fakes shared by the unit tests of this crate.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use intelbot_core::{
    domain::{entity::Entity, lookup::LookupResponse, source::Source},
    errors::IntelError,
    intel::IntelClient,
};
use tokio::sync::Mutex;

use crate::{
    blocks::{Block, View},
    messenger::{
        Delivery, DeliveryError, MessageHandle, MessageTransport, OutgoingMessage, ViewHandle,
    },
};

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum TransportCall {
    Send(OutgoingMessage),
    OpenView { trigger_id: String, view: View },
    UpdateView { handle: ViewHandle, view: View },
    PublishHome { user_id: String, view: View },
    Join { channel: String },
}

#[derive(Default)]
pub(crate) struct RecordingTransport {
    calls: Mutex<Vec<TransportCall>>,
    next_ts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    send_delay: Option<Duration>,
    admins: Vec<String>,
}

impl RecordingTransport {
    pub(crate) fn with_send_delay(delay: Duration) -> Self {
        Self { send_delay: Some(delay), ..Self::default() }
    }

    pub(crate) fn with_admins(admins: &[&str]) -> Self {
        Self { admins: admins.iter().map(|admin| (*admin).to_owned()).collect(), ..Self::default() }
    }

    pub(crate) async fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().await.clone()
    }

    pub(crate) async fn sent(&self) -> Vec<OutgoingMessage> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                TransportCall::Send(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Messages that were posted (not edits of an existing message).
    pub(crate) async fn posted(&self) -> Vec<OutgoingMessage> {
        self.sent()
            .await
            .into_iter()
            .filter(|message| !matches!(message.delivery, Delivery::Update { .. }))
            .collect()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageTransport for RecordingTransport {
    async fn send(&self, message: OutgoingMessage) -> Result<MessageHandle, DeliveryError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.send_delay {
            tokio::time::sleep(delay).await;
        }

        let handle = match &message.delivery {
            Delivery::Update { handle } => handle.clone(),
            Delivery::Post | Delivery::Ephemeral { .. } => {
                let ts = self.next_ts.fetch_add(1, Ordering::SeqCst) + 1;
                MessageHandle { channel: message.channel.clone(), ts: format!("1700000000.{ts:06}") }
            }
        };
        self.calls.lock().await.push(TransportCall::Send(message));

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(handle)
    }

    async fn open_view(&self, trigger_id: &str, view: &View) -> Result<ViewHandle, DeliveryError> {
        self.calls
            .lock()
            .await
            .push(TransportCall::OpenView { trigger_id: trigger_id.to_owned(), view: view.clone() });
        Ok(ViewHandle { id: "V1".to_owned(), hash: Some("hash-1".to_owned()) })
    }

    async fn update_view(&self, handle: &ViewHandle, view: &View) -> Result<(), DeliveryError> {
        self.calls
            .lock()
            .await
            .push(TransportCall::UpdateView { handle: handle.clone(), view: view.clone() });
        Ok(())
    }

    async fn publish_home(&self, user_id: &str, view: &View) -> Result<(), DeliveryError> {
        self.calls
            .lock()
            .await
            .push(TransportCall::PublishHome { user_id: user_id.to_owned(), view: view.clone() });
        Ok(())
    }

    async fn is_workspace_admin(&self, user_id: &str) -> Result<bool, DeliveryError> {
        Ok(self.admins.iter().any(|admin| admin == user_id))
    }

    async fn join_channel(&self, channel: &str) -> Result<(), DeliveryError> {
        self.calls.lock().await.push(TransportCall::Join { channel: channel.to_owned() });
        Ok(())
    }
}

/// Scripted intel API: every parse returns the same answer, lookups answer per source id.
#[derive(Default)]
pub(crate) struct ScriptedIntel {
    pub(crate) parsed: Option<Result<Vec<Entity>, IntelError>>,
    pub(crate) lookups: HashMap<String, Result<LookupResponse, IntelError>>,
    pub(crate) delays: HashMap<String, Duration>,
    pub(crate) panics: HashSet<String>,
    pub(crate) sources: Vec<Source>,
    pub(crate) lookup_calls: AtomicUsize,
}

impl ScriptedIntel {
    pub(crate) fn parsing(entities: Vec<Entity>) -> Self {
        Self { parsed: Some(Ok(entities)), ..Self::default() }
    }

    pub(crate) fn failing_parse(error: IntelError) -> Self {
        Self { parsed: Some(Err(error)), ..Self::default() }
    }

    pub(crate) fn answer(mut self, source_id: &str, response: Result<LookupResponse, IntelError>) -> Self {
        self.lookups.insert(source_id.to_owned(), response);
        self
    }

    pub(crate) fn delay(mut self, source_id: &str, delay: Duration) -> Self {
        self.delays.insert(source_id.to_owned(), delay);
        self
    }

    pub(crate) fn panicking(mut self, source_id: &str) -> Self {
        self.panics.insert(source_id.to_owned());
        self
    }

    pub(crate) fn with_sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = sources;
        self
    }

    pub(crate) fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl IntelClient for ScriptedIntel {
    async fn parse_entities(&self, _text: &str) -> Result<Vec<Entity>, IntelError> {
        self.parsed.clone().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn lookup(
        &self,
        entities: &[Entity],
        source_id: &str,
    ) -> Result<LookupResponse, IntelError> {
        if entities.is_empty() {
            return Ok(LookupResponse::default());
        }
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(source_id) {
            tokio::time::sleep(*delay).await;
        }
        if self.panics.contains(source_id) {
            panic!("scripted lookup for {source_id} blew up");
        }
        self.lookups.get(source_id).cloned().unwrap_or_else(|| Ok(LookupResponse::default()))
    }

    async fn running_sources(&self) -> Result<Vec<Source>, IntelError> {
        Ok(self.sources.clone())
    }
}

pub(crate) fn section_texts(blocks: &[Block]) -> Vec<String> {
    blocks
        .iter()
        .filter_map(|block| match block {
            Block::Section { text, .. } => Some(text.text().to_owned()),
            _ => None,
        })
        .collect()
}

pub(crate) fn header_texts(blocks: &[Block]) -> Vec<String> {
    blocks
        .iter()
        .filter_map(|block| match block {
            Block::Header { text } => Some(text.text().to_owned()),
            _ => None,
        })
        .collect()
}
