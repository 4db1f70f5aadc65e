use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::document::Document;
use crate::error::LookupError;
use crate::lookup::ResourceLookup;
use crate::types::{DocumentId, ResourceName};

/// In-memory document lookup for tests and demos.
///
/// Clones share the same documents.
#[derive(Debug, Default, Clone)]
pub struct MemoryLookup {
    documents: Arc<RwLock<HashMap<(ResourceName, DocumentId), Document>>>,
}

impl MemoryLookup {
    /// Creates an empty lookup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a document under `resource_type`, replacing any previous one
    /// with the same id.
    pub fn insert(&self, resource_type: ResourceName, document: Document) {
        let mut guard = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard.insert((resource_type, document.id().clone()), document);
    }

    /// Removes a document, returning it if present.
    pub fn remove(&self, resource_type: &ResourceName, id: &DocumentId) -> Option<Document> {
        let mut guard = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard.remove(&(resource_type.clone(), id.clone()))
    }

    /// Returns the number of stored documents.
    pub fn len(&self) -> usize {
        self.documents
            .read()
            .map(|guard| guard.len())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResourceLookup for MemoryLookup {
    async fn fetch(
        &self,
        resource_type: &ResourceName,
        id: &DocumentId,
    ) -> std::result::Result<Option<Document>, LookupError> {
        let guard = self
            .documents
            .read()
            .map_err(|_| LookupError::from("memory lookup lock poisoned"))?;
        Ok(guard.get(&(resource_type.clone(), id.clone())).cloned())
    }
}
