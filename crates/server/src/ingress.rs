//! Slack HTTP ingress: signed requests in, envelopes onto the runner queue.

use std::{collections::HashMap, sync::Arc};

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
    Form, Json, Router,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use intelbot_slack::{
    events::SlackEnvelope,
    runner::{EnqueueError, EnvelopeSender},
    wire::{self, EventCallback},
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use sha2::Sha256;
use thiserror::Error;
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "x-slack-signature";
const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
const MAX_CLOCK_SKEW_SECS: i64 = 5 * 60;
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct IngressState {
    signing_secret: Arc<SecretString>,
    envelopes: EnvelopeSender,
}

impl IngressState {
    pub fn new(signing_secret: SecretString, envelopes: EnvelopeSender) -> Self {
        Self { signing_secret: Arc::new(signing_secret), envelopes }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing `{0}` header")]
    MissingHeader(&'static str),
    #[error("request timestamp is not a unix time")]
    BadTimestamp,
    #[error("request timestamp is outside the accepted window")]
    Stale,
    #[error("signature does not match")]
    Mismatch,
}

pub fn router(state: IngressState) -> Router {
    Router::new()
        .route("/slack/commands", post(commands))
        .route("/slack/interactions", post(interactions))
        .route("/slack/events", post(events))
        .layer(middleware::from_fn_with_state(state.clone(), verify_request))
        .with_state(state)
}

/// `v0=` + hex(HMAC-SHA256(secret, "v0:{timestamp}:{body}")), timestamp within five minutes of `now`.
pub fn verify_signature(
    secret: &[u8],
    timestamp: &str,
    body: &[u8],
    signature: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let sent_at: i64 = timestamp.trim().parse().map_err(|_| SignatureError::BadTimestamp)?;
    if (now - sent_at).abs() > MAX_CLOCK_SKEW_SECS {
        return Err(SignatureError::Stale);
    }

    let provided = signature
        .strip_prefix("v0=")
        .and_then(decode_hex)
        .ok_or(SignatureError::Mismatch)?;
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::Mismatch)?;
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    mac.verify_slice(&provided).map_err(|_| SignatureError::Mismatch)
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|index| u8::from_str_radix(text.get(index..index + 2)?, 16).ok())
        .collect()
}

async fn verify_request(
    State(state): State<IngressState>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let header = |name: &'static str| {
        parts
            .headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .ok_or(SignatureError::MissingHeader(name))
    };
    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
    };

    let verified = header(TIMESTAMP_HEADER).and_then(|timestamp| {
        let signature = header(SIGNATURE_HEADER)?;
        verify_signature(
            state.signing_secret.expose_secret().as_bytes(),
            &timestamp,
            &bytes,
            &signature,
            Utc::now().timestamp(),
        )
    });
    if let Err(error) = verified {
        warn!(
            event_name = "ingress.slack.signature_rejected",
            path = %parts.uri.path(),
            error = %error,
            "rejected unsigned slack request"
        );
        return StatusCode::UNAUTHORIZED.into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

fn enqueue_all(state: &IngressState, envelopes: Vec<SlackEnvelope>) -> StatusCode {
    for envelope in envelopes {
        let envelope_id = envelope.envelope_id.clone();
        if let Err(error) = state.envelopes.enqueue(envelope) {
            warn!(
                event_name = "ingress.slack.enqueue_failed",
                correlation_id = %envelope_id,
                error = %error,
                "could not queue slack envelope"
            );
            return match error {
                EnqueueError::Full | EnqueueError::Closed => StatusCode::SERVICE_UNAVAILABLE,
            };
        }
    }
    StatusCode::OK
}

async fn commands(
    State(state): State<IngressState>,
    Form(form): Form<HashMap<String, String>>,
) -> StatusCode {
    match wire::slash_command(&form) {
        Ok(envelope) => enqueue_all(&state, vec![envelope]),
        Err(error) => {
            warn!(event_name = "ingress.slack.malformed", kind = "command", error = %error, "malformed slash command");
            StatusCode::BAD_REQUEST
        }
    }
}

async fn interactions(
    State(state): State<IngressState>,
    Form(form): Form<HashMap<String, String>>,
) -> StatusCode {
    match wire::interaction(&form) {
        Ok(envelopes) => enqueue_all(&state, envelopes),
        Err(error) => {
            warn!(event_name = "ingress.slack.malformed", kind = "interaction", error = %error, "malformed interaction");
            StatusCode::BAD_REQUEST
        }
    }
}

async fn events(State(state): State<IngressState>, body: Bytes) -> Response {
    match wire::event_callback(&body) {
        Ok(Some(EventCallback::UrlVerification { challenge })) => {
            info!(event_name = "ingress.slack.url_verified", "answered events api challenge");
            Json(json!({ "challenge": challenge })).into_response()
        }
        Ok(Some(EventCallback::Envelope(envelope))) => enqueue_all(&state, vec![envelope]).into_response(),
        Ok(None) => StatusCode::OK.into_response(),
        Err(error) => {
            warn!(event_name = "ingress.slack.malformed", kind = "event", error = %error, "malformed events api body");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}
