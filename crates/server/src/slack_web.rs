//! `MessageTransport` over the Slack Web API.

use std::time::Duration;

use async_trait::async_trait;
use intelbot_slack::{
    blocks::View,
    messenger::{
        Delivery, DeliveryError, MessageHandle, MessageTransport, OutgoingMessage, ViewHandle,
    },
};
use reqwest::{header, Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, warn};

pub const SLACK_API_BASE: &str = "https://slack.com/api";
const RATE_LIMIT_RETRIES: u32 = 2;
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;
const JOIN_ERRORS_IGNORED: [&str; 2] = ["already_in_channel", "method_not_supported_for_dm"];

pub struct SlackWebClient {
    client: Client,
    base_url: String,
    bot_token: SecretString,
}

enum Payload<'a> {
    Json(Value),
    Form(&'a [(&'a str, &'a str)]),
}

impl SlackWebClient {
    pub fn new(bot_token: SecretString) -> Result<Self, DeliveryError> {
        Self::with_base_url(bot_token, SLACK_API_BASE)
    }

    pub fn with_base_url(bot_token: SecretString, base_url: &str) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|error| DeliveryError::Transport(error.to_string()))?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_owned(), bot_token })
    }

    fn request(&self, method: &str, payload: &Payload<'_>) -> RequestBuilder {
        let builder = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .bearer_auth(self.bot_token.expose_secret());
        match payload {
            Payload::Json(body) => builder
                .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
                .body(body.to_string()),
            Payload::Form(fields) => builder.form(fields),
        }
    }

    /// Calls one Web API method, waiting out `429` responses a bounded number of times.
    async fn call(&self, method: &str, payload: Payload<'_>) -> Result<Value, DeliveryError> {
        let mut attempt = 0;
        let response = loop {
            let response = self
                .request(method, &payload)
                .send()
                .await
                .map_err(|error| DeliveryError::Transport(error.to_string()))?;

            if response.status() != StatusCode::TOO_MANY_REQUESTS || attempt >= RATE_LIMIT_RETRIES {
                break response;
            }
            let wait = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            warn!(event_name = "slack.web.rate_limited", method, retry_after_secs = wait, "slack rate limited the call");
            tokio::time::sleep(Duration::from_secs(wait)).await;
            attempt += 1;
        };

        let status = response.status();
        let body: Value = response.json().await.map_err(|error| {
            DeliveryError::Decode(format!("`{method}` returned {status} with an unreadable body: {error}"))
        })?;

        if body.get("ok").and_then(Value::as_bool) == Some(true) {
            debug!(event_name = "slack.web.call", method, "slack api call succeeded");
            return Ok(body);
        }
        let error = body.get("error").and_then(Value::as_str).unwrap_or("unknown_error");
        Err(DeliveryError::Api { method: method.to_owned(), error: error.to_owned() })
    }
}

fn string_at(body: &Value, pointer: &str, method: &str) -> Result<String, DeliveryError> {
    body.pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| DeliveryError::Decode(format!("`{method}` response is missing `{pointer}`")))
}

fn view_json(view: &View) -> Result<Value, DeliveryError> {
    serde_json::to_value(view).map_err(|error| DeliveryError::Decode(error.to_string()))
}

#[async_trait]
impl MessageTransport for SlackWebClient {
    async fn send(&self, message: OutgoingMessage) -> Result<MessageHandle, DeliveryError> {
        let blocks = serde_json::to_value(&message.blocks)
            .map_err(|error| DeliveryError::Decode(error.to_string()))?;

        match message.delivery {
            Delivery::Post => {
                let body = json!({ "channel": message.channel, "text": message.text, "blocks": blocks });
                let response = self.call("chat.postMessage", Payload::Json(body)).await?;
                Ok(MessageHandle {
                    channel: string_at(&response, "/channel", "chat.postMessage")?,
                    ts: string_at(&response, "/ts", "chat.postMessage")?,
                })
            }
            Delivery::Ephemeral { user_id } => {
                let body = json!({
                    "channel": message.channel,
                    "user": user_id,
                    "text": message.text,
                    "blocks": blocks,
                });
                let response = self.call("chat.postEphemeral", Payload::Json(body)).await?;
                Ok(MessageHandle {
                    channel: message.channel,
                    ts: string_at(&response, "/message_ts", "chat.postEphemeral")?,
                })
            }
            Delivery::Update { handle } => {
                let body = json!({
                    "channel": handle.channel,
                    "ts": handle.ts,
                    "text": message.text,
                    "blocks": blocks,
                });
                self.call("chat.update", Payload::Json(body)).await?;
                Ok(handle)
            }
        }
    }

    async fn open_view(&self, trigger_id: &str, view: &View) -> Result<ViewHandle, DeliveryError> {
        let body = json!({ "trigger_id": trigger_id, "view": view_json(view)? });
        let response = self.call("views.open", Payload::Json(body)).await?;
        Ok(ViewHandle {
            id: string_at(&response, "/view/id", "views.open")?,
            hash: response.pointer("/view/hash").and_then(Value::as_str).map(str::to_owned),
        })
    }

    async fn update_view(&self, handle: &ViewHandle, view: &View) -> Result<(), DeliveryError> {
        let mut body = json!({ "view_id": handle.id, "view": view_json(view)? });
        if let Some(hash) = &handle.hash {
            body["hash"] = Value::String(hash.clone());
        }
        self.call("views.update", Payload::Json(body)).await.map(|_| ())
    }

    async fn publish_home(&self, user_id: &str, view: &View) -> Result<(), DeliveryError> {
        let body = json!({ "user_id": user_id, "view": view_json(view)? });
        self.call("views.publish", Payload::Json(body)).await.map(|_| ())
    }

    async fn is_workspace_admin(&self, user_id: &str) -> Result<bool, DeliveryError> {
        let response = self.call("users.info", Payload::Form(&[("user", user_id)])).await?;
        let flag = |name: &str| {
            response.pointer(&format!("/user/{name}")).and_then(Value::as_bool).unwrap_or(false)
        };
        Ok(flag("is_admin") || flag("is_owner") || flag("is_primary_owner"))
    }

    async fn join_channel(&self, channel: &str) -> Result<(), DeliveryError> {
        match self.call("conversations.join", Payload::Json(json!({ "channel": channel }))).await {
            Err(DeliveryError::Api { error, .. }) if JOIN_ERRORS_IGNORED.contains(&error.as_str()) => {
                Ok(())
            }
            other => other.map(|_| ()),
        }
    }
}
