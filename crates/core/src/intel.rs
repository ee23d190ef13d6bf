use async_trait::async_trait;

use crate::{
    domain::{entity::Entity, lookup::LookupResponse, source::Source},
    errors::IntelError,
};

/// Seam over the remote threat-intelligence API.
#[async_trait]
pub trait IntelClient: Send + Sync {
    async fn parse_entities(&self, text: &str) -> Result<Vec<Entity>, IntelError>;

    /// Implementations must return an empty response without a network call
    /// when `entities` is empty.
    async fn lookup(
        &self,
        entities: &[Entity],
        source_id: &str,
    ) -> Result<LookupResponse, IntelError>;

    async fn running_sources(&self) -> Result<Vec<Source>, IntelError>;

    async fn lookup_text(&self, text: &str, source_id: &str) -> Result<LookupResponse, IntelError> {
        let entities = self.parse_entities(text).await?;
        self.lookup(&entities, source_id).await
    }
}
