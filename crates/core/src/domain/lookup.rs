use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::entity::Entity;

/// Outcome of one source evaluating one entity.
///
/// `data == None` means the source searched the entity and found nothing.
/// Otherwise the payload is source specific and stays untyped until the
/// normalizer pulls out the fields the renderer needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LookupResult {
    pub entity: Entity,
    #[serde(default)]
    pub data: Option<Value>,
}

impl LookupResult {
    pub fn new(entity: Entity, data: Option<Value>) -> Self {
        Self { entity, data }
    }

    pub fn details(&self) -> Option<&Value> {
        self.data.as_ref().and_then(|data| data.get("details"))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LookupResponse {
    /// Entities the source actually evaluated (the API filters unsupported types).
    pub searched_entities: Vec<Entity>,
    pub results: Vec<LookupResult>,
}
