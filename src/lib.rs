//! Default-deny resource access policy engine for a multi-tenant e-learning
//! document store.
//!
//! Every read, create, update and delete of a stored document is decided by
//! the [`Engine`] from the requesting [`Actor`], the resource type, the stored
//! document and the proposed after-state. Resource types without a registered
//! [`Policy`] are denied, and so is any evaluation that fails or panics.
//! Cross-document relations ("is this actor the course's instructor?") are
//! answered through the injected [`ResourceLookup`]. Each such lookup is
//! bounded by [`DEFAULT_LOOKUP_TIMEOUT`] unless the builder sets another
//! bound, under tokio or any other executor.
//!
//! # Examples
//!
//! Evaluating an enrollment update with the in-memory lookup (enable
//! `memory-store`):
//! ```no_run
//! use course_guard::{Actor, ActorId, Document, DocumentId, EngineBuilder, ResourceName, Role};
//! # #[cfg(feature = "memory-store")]
//! # {
//! use course_guard::MemoryLookup;
//! let lookup = MemoryLookup::new();
//! let enrollment = Document::new(DocumentId::try_from("s1_c1").unwrap())
//!     .with("userId", "s1")
//!     .with("courseId", "c1")
//!     .with("progress", 0);
//! lookup.insert(ResourceName::try_from("enrollments").unwrap(), enrollment.clone());
//!
//! let engine = EngineBuilder::new(lookup).build();
//! let student = Actor::authenticated(ActorId::try_from("s1").unwrap(), Role::Student);
//! let proposed = enrollment.clone().with("progress", 50);
//! let _ = engine.update(&student, "enrollments", &enrollment, &proposed);
//! # }
//! ```
//!
//! Loading policies from a JSON definition:
//! ```no_run
//! use course_guard::{EngineBuilder, NoLookup, PolicyRegistry};
//! use std::time::Duration;
//! let registry = PolicyRegistry::from_json(r#"{}"#).unwrap();
//! let engine = EngineBuilder::new(NoLookup)
//!     .registry(registry)
//!     .lookup_timeout(Duration::from_millis(250))
//!     .build();
//! # let _ = engine;
//! ```
#![forbid(unsafe_code)]

mod actor;
mod diff;
mod document;
mod engine;
mod error;
mod lookup;
mod ownership;
mod policy;
mod registry;
mod timer;
mod types;

#[cfg(feature = "memory-store")]
mod memory_lookup;

#[cfg(feature = "jwt")]
mod jwt;

#[cfg(feature = "axum")]
pub mod axum;

pub use crate::actor::{Actor, ActorResolver, Claims, GroupKind, Role};
pub use crate::diff::{FieldDiffValidator, FieldViolation, changed_fields};
pub use crate::document::Document;
pub use crate::engine::{
    DEFAULT_LOOKUP_TIMEOUT, Decision, DenyReason, Engine, EngineBuilder, Operation,
};
pub use crate::error::{Error, LookupError, Result};
pub use crate::lookup::{NoLookup, ResourceLookup};
pub use crate::ownership::OwnershipResolver;
pub use crate::policy::{
    AccessRule, CreateGrant, CreateRule, FieldDefault, FieldSet, OwnerKey, Policy, Relation,
    UpdateGrant, UpdateRule,
};
pub use crate::registry::{PolicyEntry, PolicyRegistry};
pub use crate::types::{ActorId, DocumentId, ResourceName};

#[cfg(feature = "memory-store")]
pub use crate::memory_lookup::MemoryLookup;

#[cfg(feature = "jwt")]
pub use crate::jwt::JwtActorResolver;
