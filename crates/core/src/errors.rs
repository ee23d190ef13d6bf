use serde_json::{Map, Value};
use thiserror::Error;

/// Failures talking to the threat-intelligence API.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum IntelError {
    /// The API answered with a non-success status. `meta` carries the raw
    /// error object plus a sanitized copy of the request.
    #[error("{message}")]
    Api { message: String, meta: Map<String, Value> },
    #[error("intel api request failed: {0}")]
    Transport(String),
    #[error("intel api response could not be decoded: {0}")]
    Decode(String),
    #[error("lookup timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

impl IntelError {
    pub fn api(message: impl Into<String>, meta: Map<String, Value>) -> Self {
        Self::Api { message: message.into(), meta }
    }

    pub fn meta(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Api { meta, .. } => Some(meta),
            _ => None,
        }
    }

    /// Text shown in chat. Transport level detail stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { message, .. } => message.clone(),
            Self::Transport(_) => "the intelligence API could not be reached".to_owned(),
            Self::Decode(_) => "the intelligence API returned an unexpected response".to_owned(),
            Self::Timeout { seconds } => format!("no response within {seconds}s"),
        }
    }
}
