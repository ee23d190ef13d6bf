use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Classification tag the intel API assigns to a parsed entity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityType {
    Ipv4,
    Ipv6,
    Ipv4Cidr,
    Hash,
    String,
    Url,
    Domain,
    Mac,
    Custom,
    Email,
    Other(String),
}

impl EntityType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ipv4 => "IPv4",
            Self::Ipv6 => "IPv6",
            Self::Ipv4Cidr => "IPv4CIDR",
            Self::Hash => "hash",
            Self::String => "string",
            Self::Url => "url",
            Self::Domain => "domain",
            Self::Mac => "MAC",
            Self::Custom => "custom",
            Self::Email => "email",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for EntityType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "IPv4" => Self::Ipv4,
            "IPv6" => Self::Ipv6,
            "IPv4CIDR" => Self::Ipv4Cidr,
            "hash" => Self::Hash,
            "string" => Self::String,
            "url" => Self::Url,
            "domain" => Self::Domain,
            "MAC" => Self::Mac,
            "custom" => Self::Custom,
            "email" => Self::Email,
            _ => Self::Other(raw),
        }
    }
}

impl From<EntityType> for String {
    fn from(value: EntityType) -> Self {
        value.as_str().to_owned()
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed unit of search interest.
///
/// Only `value` and `type` are modelled explicitly. Every other attribute the
/// API returns (IP metadata, hash flags, request context, ...) is kept in
/// `attributes` so the entity can be handed back to a lookup unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub value: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Entity {
    pub fn new(value: impl Into<String>, entity_type: EntityType) -> Self {
        Self { value: value.into(), entity_type, attributes: Map::new() }
    }

    pub fn with_display_value(mut self, display_value: impl Into<String>) -> Self {
        self.attributes.insert("display-value".to_owned(), Value::String(display_value.into()));
        self
    }

    /// The API is inconsistent about the key name, so both spellings are honoured.
    pub fn display_value(&self) -> Option<&str> {
        ["display-value", "displayValue"]
            .iter()
            .filter_map(|key| self.attributes.get(*key))
            .find_map(Value::as_str)
    }

    pub fn display(&self) -> &str {
        self.display_value().unwrap_or(&self.value)
    }

    pub fn key(&self) -> EntityKey {
        EntityKey { display: self.display().to_owned(), entity_type: self.entity_type.clone() }
    }
}

/// Grouping identity: `(displayValue ?? value, type)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub display: String,
    pub entity_type: EntityType,
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.display, self.entity_type)
    }
}
