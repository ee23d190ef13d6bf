use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use crate::{domain::source::Source, errors::IntelError, intel::IntelClient};

/// Immutable view of the running sources at one point in time.
#[derive(Debug, Default)]
pub struct SourceSnapshot {
    sources: Vec<Source>,
    index: HashMap<String, usize>,
}

impl SourceSnapshot {
    /// Duplicate ids keep their first occurrence.
    pub fn new(sources: Vec<Source>) -> Self {
        let mut unique = Vec::with_capacity(sources.len());
        let mut index = HashMap::with_capacity(sources.len());
        for source in sources {
            if index.contains_key(&source.id) {
                continue;
            }
            index.insert(source.id.clone(), unique.len());
            unique.push(source);
        }

        Self { sources: unique, index }
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn get(&self, id: &str) -> Option<&Source> {
        self.position(id).map(|position| &self.sources[position])
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Process-wide registry of sources.
///
/// Refreshes build a whole new snapshot and swap it in; a query holding an
/// older snapshot keeps a consistent view until it finishes.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    current: RwLock<Arc<SourceSnapshot>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sources(sources: Vec<Source>) -> Self {
        Self { current: RwLock::new(Arc::new(SourceSnapshot::new(sources))) }
    }

    pub fn snapshot(&self) -> Arc<SourceSnapshot> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn replace(&self, sources: Vec<Source>) -> Arc<SourceSnapshot> {
        let next = Arc::new(SourceSnapshot::new(sources));
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next.clone();
        next
    }

    pub fn list(&self) -> Vec<Source> {
        self.snapshot().sources().to_vec()
    }

    pub fn get(&self, id: &str) -> Option<Source> {
        self.snapshot().get(id).cloned()
    }

    /// Reloads the running sources. On failure the previous snapshot stays in place.
    pub async fn refresh(&self, client: &dyn IntelClient) -> Result<usize, IntelError> {
        let sources = client.running_sources().await?;
        let snapshot = self.replace(sources);
        info!(
            event_name = "registry.sources.refreshed",
            source_count = snapshot.len(),
            "source registry refreshed"
        );
        Ok(snapshot.len())
    }
}
