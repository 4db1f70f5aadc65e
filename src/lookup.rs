use crate::document::Document;
use crate::error::LookupError;
use crate::types::{DocumentId, ResourceName};
use async_trait::async_trait;
use std::sync::Arc;

/// Read-only accessor to the document store.
///
/// Used only to resolve relations that cross documents. Implementations are
/// trusted internal readers and must not mutate state.
#[async_trait]
pub trait ResourceLookup: Send + Sync {
    /// Fetches a document. `Ok(None)` means the document does not exist.
    async fn fetch(
        &self,
        resource_type: &ResourceName,
        id: &DocumentId,
    ) -> std::result::Result<Option<Document>, LookupError>;
}

#[async_trait]
impl<T> ResourceLookup for Arc<T>
where
    T: ResourceLookup + ?Sized,
{
    async fn fetch(
        &self,
        resource_type: &ResourceName,
        id: &DocumentId,
    ) -> std::result::Result<Option<Document>, LookupError> {
        (**self).fetch(resource_type, id).await
    }
}

/// Lookup with no documents, for deployments whose policies never cross
/// documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLookup;

#[async_trait]
impl ResourceLookup for NoLookup {
    async fn fetch(
        &self,
        _resource_type: &ResourceName,
        _id: &DocumentId,
    ) -> std::result::Result<Option<Document>, LookupError> {
        Ok(None)
    }
}
