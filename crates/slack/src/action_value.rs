//! Button values.
//!
//! Slack caps a button value at 2,000 characters. Payloads that fit travel
//! inline; larger ones are parked in the payload store and the button carries
//! the handle instead.

use intelbot_core::{domain::entity::EntityType, payloads::PayloadStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const BUTTON_VALUE_LIMIT: usize = 2_000;
pub const EXPIRED_NOTICE: &str = "_These details have expired, re-run the query to see them again._";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Envelope {
    Inline(Value),
    Cached(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ActionValueError {
    #[error("malformed action value: {0}")]
    Malformed(String),
    #[error("referenced payload expired")]
    Expired,
}

pub fn encode(payload: &Value, store: &PayloadStore) -> String {
    let inline = serde_json::json!({ "inline": payload }).to_string();
    if inline.chars().count() <= BUTTON_VALUE_LIMIT {
        return inline;
    }

    let handle = store.save(payload.to_string());
    serde_json::json!({ "cached": handle.as_str() }).to_string()
}

pub fn decode(raw: &str, store: &PayloadStore) -> Result<Value, ActionValueError> {
    let envelope: Envelope =
        serde_json::from_str(raw).map_err(|error| ActionValueError::Malformed(error.to_string()))?;

    match envelope {
        Envelope::Inline(value) => Ok(value),
        Envelope::Cached(handle) => {
            let stored = store.load(&handle).ok_or(ActionValueError::Expired)?;
            serde_json::from_str(&stored)
                .map_err(|error| ActionValueError::Malformed(error.to_string()))
        }
    }
}

/// Value of a `show_details` button.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailsRequest {
    #[serde(rename = "integrationId")]
    pub integration_id: String,
    pub entity: DetailsEntity,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailsEntity {
    pub value: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
}

impl DetailsRequest {
    pub fn new(integration_id: &str, value: &str, entity_type: &EntityType) -> Self {
        Self {
            integration_id: integration_id.to_owned(),
            entity: DetailsEntity { value: value.to_owned(), entity_type: entity_type.clone() },
        }
    }

    pub fn decode(raw: &str, store: &PayloadStore) -> Result<Self, ActionValueError> {
        serde_json::from_value(decode(raw, store)?)
            .map_err(|error| ActionValueError::Malformed(error.to_string()))
    }
}
