//! Slack HTTP payloads decoded into envelopes.
//!
//! Slash commands arrive as form fields, interactions as a form field named
//! `payload` holding JSON, and Events API callbacks as a JSON body.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

use crate::events::{
    AppHomeOpenedEvent, BlockActionEvent, SlackEnvelope, SlackEvent, SlashCommandPayload,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("payload is not valid json: {0}")]
    Json(String),
}

/// Outcome of an Events API callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventCallback {
    UrlVerification { challenge: String },
    Envelope(SlackEnvelope),
}

pub fn slash_command(form: &HashMap<String, String>) -> Result<SlackEnvelope, WireError> {
    let field = |name: &'static str| form.get(name).cloned().ok_or(WireError::MissingField(name));

    let trigger_id = field("trigger_id")?;
    Ok(SlackEnvelope {
        envelope_id: trigger_id.clone(),
        event: SlackEvent::SlashCommand(SlashCommandPayload {
            command: field("command")?,
            text: form.get("text").cloned().unwrap_or_default(),
            channel_id: field("channel_id")?,
            user_id: field("user_id")?,
            trigger_id,
        }),
    })
}

#[derive(Deserialize)]
struct InteractionPayload {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    trigger_id: Option<String>,
    user: IdOnly,
    #[serde(default)]
    channel: Option<IdOnly>,
    #[serde(default)]
    actions: Vec<ActionPayload>,
}

#[derive(Deserialize)]
struct IdOnly {
    id: String,
}

#[derive(Deserialize)]
struct ActionPayload {
    action_id: String,
    #[serde(default)]
    value: Option<String>,
}

/// One envelope per action in a `block_actions` payload; other interaction
/// types yield a single unsupported envelope.
pub fn interaction(form: &HashMap<String, String>) -> Result<Vec<SlackEnvelope>, WireError> {
    let raw = form.get("payload").ok_or(WireError::MissingField("payload"))?;
    let payload: InteractionPayload =
        serde_json::from_str(raw).map_err(|error| WireError::Json(error.to_string()))?;

    let trigger_id = payload.trigger_id.unwrap_or_default();
    if payload.kind != "block_actions" {
        return Ok(vec![SlackEnvelope {
            envelope_id: trigger_id,
            event: SlackEvent::Unsupported { event_type: payload.kind },
        }]);
    }

    let channel_id = payload.channel.map(|channel| channel.id);
    Ok(payload
        .actions
        .into_iter()
        .enumerate()
        .map(|(index, action)| SlackEnvelope {
            envelope_id: format!("{trigger_id}#{index}"),
            event: SlackEvent::BlockAction(BlockActionEvent {
                user_id: payload.user.id.clone(),
                channel_id: channel_id.clone(),
                trigger_id: trigger_id.clone(),
                action_id: action.action_id,
                value: action.value,
            }),
        })
        .collect())
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum EventsApiBody {
    UrlVerification { challenge: String },
    EventCallback { event_id: String, event: InnerEvent },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct InnerEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    tab: Option<String>,
}

pub fn event_callback(body: &[u8]) -> Result<Option<EventCallback>, WireError> {
    let body: EventsApiBody =
        serde_json::from_slice(body).map_err(|error| WireError::Json(error.to_string()))?;

    match body {
        EventsApiBody::UrlVerification { challenge } => {
            Ok(Some(EventCallback::UrlVerification { challenge }))
        }
        EventsApiBody::EventCallback { event_id, event } => {
            let event = match event.kind.as_str() {
                "app_home_opened" => SlackEvent::AppHomeOpened(AppHomeOpenedEvent {
                    user_id: event.user.ok_or(WireError::MissingField("event.user"))?,
                    tab: event.tab.unwrap_or_else(|| "home".to_owned()),
                }),
                _ => SlackEvent::Unsupported { event_type: event.kind },
            };
            Ok(Some(EventCallback::Envelope(SlackEnvelope { envelope_id: event_id, event })))
        }
        EventsApiBody::Other => Ok(None),
    }
}
