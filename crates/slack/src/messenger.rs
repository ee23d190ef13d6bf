use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::blocks::{Block, MessageTemplate, View};

/// Channel plus timestamp of a posted message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageHandle {
    pub channel: String,
    pub ts: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewHandle {
    pub id: String,
    pub hash: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    Post,
    Ephemeral { user_id: String },
    Update { handle: MessageHandle },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub channel: String,
    pub delivery: Delivery,
    pub text: String,
    pub blocks: Vec<Block>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("slack api `{method}` returned `{error}`")]
    Api { method: String, error: String },
    #[error("slack transport failed: {0}")]
    Transport(String),
    #[error("slack response could not be decoded: {0}")]
    Decode(String),
}

/// Seam over the Slack Web API.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, message: OutgoingMessage) -> Result<MessageHandle, DeliveryError>;
    async fn open_view(&self, trigger_id: &str, view: &View) -> Result<ViewHandle, DeliveryError>;
    async fn update_view(&self, handle: &ViewHandle, view: &View) -> Result<(), DeliveryError>;
    async fn publish_home(&self, user_id: &str, view: &View) -> Result<(), DeliveryError>;
    async fn is_workspace_admin(&self, user_id: &str) -> Result<bool, DeliveryError>;
    /// Joins a public channel so the bot can post there. Already being a member is not an error.
    async fn join_channel(&self, channel: &str) -> Result<(), DeliveryError>;
}

/// A transport bound to one channel.
#[derive(Clone)]
pub struct Messenger {
    transport: Arc<dyn MessageTransport>,
    channel: String,
}

impl Messenger {
    pub fn new(transport: Arc<dyn MessageTransport>, channel: impl Into<String>) -> Self {
        Self { transport, channel: channel.into() }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn transport(&self) -> &Arc<dyn MessageTransport> {
        &self.transport
    }

    pub async fn post(&self, message: MessageTemplate) -> Result<MessageHandle, DeliveryError> {
        self.deliver(Delivery::Post, message).await
    }

    pub async fn ephemeral(
        &self,
        user_id: &str,
        message: MessageTemplate,
    ) -> Result<MessageHandle, DeliveryError> {
        self.deliver(Delivery::Ephemeral { user_id: user_id.to_owned() }, message).await
    }

    pub async fn update(
        &self,
        handle: &MessageHandle,
        message: MessageTemplate,
    ) -> Result<MessageHandle, DeliveryError> {
        self.deliver(Delivery::Update { handle: handle.clone() }, message).await
    }

    async fn deliver(
        &self,
        delivery: Delivery,
        message: MessageTemplate,
    ) -> Result<MessageHandle, DeliveryError> {
        self.transport
            .send(OutgoingMessage {
                channel: self.channel.clone(),
                delivery,
                text: message.fallback_text,
                blocks: message.blocks,
            })
            .await
    }
}

#[derive(Default)]
pub struct NoopMessageTransport;

#[async_trait]
impl MessageTransport for NoopMessageTransport {
    async fn send(&self, message: OutgoingMessage) -> Result<MessageHandle, DeliveryError> {
        let ts = match message.delivery {
            Delivery::Update { handle } => handle.ts,
            Delivery::Post | Delivery::Ephemeral { .. } => "0000000000.000000".to_owned(),
        };
        Ok(MessageHandle { channel: message.channel, ts })
    }

    async fn open_view(&self, _trigger_id: &str, _view: &View) -> Result<ViewHandle, DeliveryError> {
        Ok(ViewHandle { id: "V0000000000".to_owned(), hash: None })
    }

    async fn update_view(&self, _handle: &ViewHandle, _view: &View) -> Result<(), DeliveryError> {
        Ok(())
    }

    async fn publish_home(&self, _user_id: &str, _view: &View) -> Result<(), DeliveryError> {
        Ok(())
    }

    async fn is_workspace_admin(&self, _user_id: &str) -> Result<bool, DeliveryError> {
        Ok(false)
    }

    async fn join_channel(&self, _channel: &str) -> Result<(), DeliveryError> {
        Ok(())
    }
}
