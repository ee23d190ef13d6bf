use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::{
    actions::ActionService,
    home::{HomePublisher, REFRESH_ACTION},
    messenger::DeliveryError,
    render::{SHOW_DETAILS_ACTION, SHOW_ERROR_DETAILS_ACTION},
    search::{SearchCoordinator, SearchQuery},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    SlashCommand(SlashCommandPayload),
    BlockAction(BlockActionEvent),
    AppHomeOpened(AppHomeOpenedEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::SlashCommand(_) => SlackEventType::SlashCommand,
            Self::BlockAction(_) => SlackEventType::BlockAction,
            Self::AppHomeOpened(_) => SlackEventType::AppHomeOpened,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    SlashCommand,
    BlockAction,
    AppHomeOpened,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub command: String,
    pub text: String,
    pub channel_id: String,
    pub user_id: String,
    pub trigger_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockActionEvent {
    pub user_id: String,
    pub channel_id: Option<String>,
    pub trigger_id: String,
    pub action_id: String,
    pub value: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppHomeOpenedEvent {
    pub user_id: String,
    pub tab: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("block action `{action_id}` carried no value")]
    MissingValue { action_id: String },
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Wires every handler the bot serves.
pub fn bot_dispatcher(
    search: Arc<SearchCoordinator>,
    actions: Arc<ActionService>,
    home: Arc<HomePublisher>,
) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(SlashCommandHandler::new(search));
    dispatcher.register(BlockActionHandler::new(actions));
    dispatcher.register(AppHomeOpenedHandler::new(home));
    dispatcher
}

pub struct SlashCommandHandler {
    search: Arc<SearchCoordinator>,
}

impl SlashCommandHandler {
    pub fn new(search: Arc<SearchCoordinator>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl EventHandler for SlashCommandHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::SlashCommand
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::SlashCommand(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if payload.command != self.search.command() {
            debug!(
                event_name = "slack.command.ignored",
                correlation_id = %ctx.correlation_id,
                command = %payload.command,
                "slash command not served by this bot"
            );
            return Ok(HandlerResult::Ignored);
        }

        let query = SearchQuery {
            text: payload.text.clone(),
            channel_id: payload.channel_id.clone(),
            user_id: payload.user_id.clone(),
        };
        self.search.run(query, &ctx.correlation_id).await;
        Ok(HandlerResult::Processed)
    }
}

pub struct BlockActionHandler {
    actions: Arc<ActionService>,
}

impl BlockActionHandler {
    pub fn new(actions: Arc<ActionService>) -> Self {
        Self { actions }
    }
}

#[async_trait]
impl EventHandler for BlockActionHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::BlockAction
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::BlockAction(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let correlation_id = ctx.correlation_id.as_str();

        match event.action_id.as_str() {
            SHOW_DETAILS_ACTION => {
                let value = required_value(event)?;
                self.actions.show_details(&event.trigger_id, value, correlation_id).await?;
            }
            SHOW_ERROR_DETAILS_ACTION => {
                let value = required_value(event)?;
                self.actions.show_error_details(&event.trigger_id, value, correlation_id).await?;
            }
            REFRESH_ACTION => {
                self.actions.refresh_integrations(&event.user_id, correlation_id).await?;
            }
            _ => return Ok(HandlerResult::Ignored),
        }

        Ok(HandlerResult::Processed)
    }
}

fn required_value(event: &BlockActionEvent) -> Result<&str, EventHandlerError> {
    event
        .value
        .as_deref()
        .ok_or_else(|| EventHandlerError::MissingValue { action_id: event.action_id.clone() })
}

pub struct AppHomeOpenedHandler {
    home: Arc<HomePublisher>,
}

impl AppHomeOpenedHandler {
    pub fn new(home: Arc<HomePublisher>) -> Self {
        Self { home }
    }
}

#[async_trait]
impl EventHandler for AppHomeOpenedHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::AppHomeOpened
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::AppHomeOpened(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if event.tab != "home" {
            return Ok(HandlerResult::Ignored);
        }

        self.home.publish(&event.user_id, &ctx.correlation_id).await?;
        Ok(HandlerResult::Processed)
    }
}
