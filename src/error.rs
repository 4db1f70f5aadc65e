use crate::types::{DocumentId, ResourceName};
use std::time::Duration;
use thiserror::Error;

/// Error type produced by a [`ResourceLookup`](crate::ResourceLookup) implementation.
pub type LookupError = Box<dyn std::error::Error + Send + Sync>;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by this crate.
///
/// [`Engine::evaluate`](crate::Engine::evaluate) never returns these; they are
/// converted into a deny decision at the evaluation boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// Resource lookup failure.
    #[error("resource lookup failed: {0}")]
    Lookup(#[source] LookupError),
    /// Resource lookup did not complete within the configured bound.
    #[error("lookup of {resource_type}/{id} timed out after {timeout:?}")]
    LookupTimeout {
        resource_type: ResourceName,
        id: DocumentId,
        timeout: Duration,
    },
    /// Invalid identifier input.
    #[error("invalid id: {0}")]
    InvalidId(String),
    /// Document payload that is not a JSON object.
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    /// Invalid policy definition.
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),
}

impl From<LookupError> for Error {
    fn from(error: LookupError) -> Self {
        Self::Lookup(error)
    }
}
