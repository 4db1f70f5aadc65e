use crate::actor::Actor;
use crate::diff::FieldDiffValidator;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::lookup::ResourceLookup;
use crate::ownership::OwnershipResolver;
use crate::policy::{AccessRule, CreateGrant, CreateRule, OwnerKey, Policy, Relation, UpdateRule};
use crate::registry::{PolicyEntry, PolicyRegistry};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

/// Operation requested on a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Read,
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// Why a request was denied.
///
/// Reasons are meant for logs and tests. Callers should answer every deny
/// the same way so an unauthorized actor learns nothing about the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// The operation requires an authenticated actor.
    NotAuthenticated,
    /// No ownership or membership relation grants the operation.
    NotOwner,
    /// The actor's role may not create this resource type.
    RoleNotPermitted,
    /// The update touches a field the actor may not change.
    FieldNotMutable,
    /// Only the trusted write pipeline may perform the operation.
    PrivilegedPathRequired,
    /// The resource type has no registered policy.
    UnknownResourceType,
    /// The resource can no longer change once created.
    ImmutableAfterCreate,
    /// A related document needed to prove a relation could not be fetched.
    RelatedResourceUnavailable,
    /// The current or proposed document required by the operation was absent.
    MissingDocument,
    /// Evaluation failed unexpectedly.
    EvaluationFailed,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotAuthenticated => "not_authenticated",
            Self::NotOwner => "not_owner",
            Self::RoleNotPermitted => "role_not_permitted",
            Self::FieldNotMutable => "field_not_mutable",
            Self::PrivilegedPathRequired => "privileged_path_required",
            Self::UnknownResourceType => "unknown_resource_type",
            Self::ImmutableAfterCreate => "immutable_after_create",
            Self::RelatedResourceUnavailable => "related_resource_unavailable",
            Self::MissingDocument => "missing_document",
            Self::EvaluationFailed => "evaluation_failed",
        })
    }
}

/// Authorization decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// The operation is allowed.
    Allow,
    /// The operation is denied.
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Returns the deny reason, if denied.
    pub fn reason(&self) -> Option<DenyReason> {
        match self {
            Self::Allow => None,
            Self::Deny(reason) => Some(*reason),
        }
    }
}

/// Bound on a single related-document fetch unless the builder overrides it.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Policy engine over an injected resource lookup.
///
/// The engine holds no per-request state; one instance can serve any number
/// of concurrent evaluations.
#[derive(Debug)]
pub struct Engine<L> {
    lookup: L,
    registry: PolicyRegistry,
    lookup_timeout: Duration,
}

/// Builder for [`Engine`].
pub struct EngineBuilder<L> {
    lookup: L,
    registry: PolicyRegistry,
    lookup_timeout: Duration,
}

impl<L> EngineBuilder<L> {
    /// Creates a builder with the e-learning registry and
    /// [`DEFAULT_LOOKUP_TIMEOUT`].
    pub fn new(lookup: L) -> Self {
        Self {
            lookup,
            registry: PolicyRegistry::elearning(),
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    /// Replaces the policy registry.
    pub fn registry(mut self, registry: PolicyRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Overrides the bound on each related-document fetch. Works under tokio
    /// and under any other executor.
    pub fn lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Builds the engine.
    pub fn build(self) -> Engine<L> {
        Engine {
            lookup: self.lookup,
            registry: self.registry,
            lookup_timeout: self.lookup_timeout,
        }
    }
}

impl<L> Engine<L>
where
    L: ResourceLookup,
{
    /// Returns the policy registry.
    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    /// Evaluates one request.
    ///
    /// Always produces a decision: lookup failures, timeouts and panics raised
    /// during evaluation all become [`Decision::Deny`].
    pub async fn evaluate(
        &self,
        operation: Operation,
        actor: &Actor,
        resource_type: &str,
        current: Option<&Document>,
        proposed: Option<&Document>,
    ) -> Decision {
        let outcome = AssertUnwindSafe(self.decide(operation, actor, resource_type, current, proposed))
            .catch_unwind()
            .await;

        let decision = match outcome {
            Ok(Ok(decision)) => decision,
            Ok(Err(err)) => {
                tracing::warn!(
                    %operation,
                    resource_type,
                    %actor,
                    error = %err,
                    "policy evaluation failed"
                );
                Decision::Deny(deny_reason_for(&err))
            }
            Err(_) => {
                tracing::error!(
                    %operation,
                    resource_type,
                    %actor,
                    "policy evaluation panicked"
                );
                Decision::Deny(DenyReason::EvaluationFailed)
            }
        };

        tracing::debug!(
            %operation,
            resource_type,
            %actor,
            role = %actor.role(),
            allowed = decision.is_allowed(),
            reason = decision.reason().map(tracing::field::display),
            "policy decision"
        );
        decision
    }

    /// Evaluates a read of `current`.
    pub async fn read(&self, actor: &Actor, resource_type: &str, current: &Document) -> Decision {
        self.evaluate(Operation::Read, actor, resource_type, Some(current), None)
            .await
    }

    /// Evaluates a create of `proposed`.
    pub async fn create(&self, actor: &Actor, resource_type: &str, proposed: &Document) -> Decision {
        self.evaluate(Operation::Create, actor, resource_type, None, Some(proposed))
            .await
    }

    /// Evaluates an update of `current` into the full after-state `proposed`.
    pub async fn update(
        &self,
        actor: &Actor,
        resource_type: &str,
        current: &Document,
        proposed: &Document,
    ) -> Decision {
        self.evaluate(
            Operation::Update,
            actor,
            resource_type,
            Some(current),
            Some(proposed),
        )
        .await
    }

    /// Evaluates a delete of `current`.
    pub async fn delete(&self, actor: &Actor, resource_type: &str, current: &Document) -> Decision {
        self.evaluate(Operation::Delete, actor, resource_type, Some(current), None)
            .await
    }

    async fn decide(
        &self,
        operation: Operation,
        actor: &Actor,
        resource_type: &str,
        current: Option<&Document>,
        proposed: Option<&Document>,
    ) -> Result<Decision> {
        let policy = match self.registry.policy_for(resource_type) {
            PolicyEntry::Defined(policy) => policy,
            PolicyEntry::DenyAll => return Ok(Decision::Deny(DenyReason::UnknownResourceType)),
        };
        let present = match operation {
            Operation::Read | Operation::Delete => current.is_some(),
            Operation::Create => proposed.is_some(),
            Operation::Update => current.is_some() && proposed.is_some(),
        };
        if !present {
            return Ok(Decision::Deny(DenyReason::MissingDocument));
        }
        // The System actor still needs well-formed input.
        if actor.is_system() {
            return Ok(Decision::Allow);
        }

        match (operation, current, proposed) {
            (Operation::Read, Some(current), _) => {
                self.decide_access(&policy.read, actor, current).await
            }
            (Operation::Create, _, Some(proposed)) => {
                self.decide_create(policy, actor, proposed).await
            }
            (Operation::Update, Some(current), Some(proposed)) => {
                self.decide_update(policy, actor, current, proposed).await
            }
            (Operation::Delete, Some(current), _) => {
                self.decide_access(&policy.delete, actor, current).await
            }
            _ => Ok(Decision::Deny(DenyReason::MissingDocument)),
        }
    }

    async fn decide_access(
        &self,
        rule: &AccessRule,
        actor: &Actor,
        current: &Document,
    ) -> Result<Decision> {
        let relations = match rule {
            AccessRule::Privileged => return Ok(Decision::Deny(DenyReason::PrivilegedPathRequired)),
            AccessRule::Grants(relations) => relations,
        };
        if actor.is_admin() {
            return Ok(Decision::Allow);
        }
        if self.any_holds(relations, actor, current).await? {
            return Ok(Decision::Allow);
        }
        Ok(Decision::Deny(if actor.is_anonymous() {
            DenyReason::NotAuthenticated
        } else {
            DenyReason::NotOwner
        }))
    }

    async fn decide_create(
        &self,
        policy: &Policy,
        actor: &Actor,
        proposed: &Document,
    ) -> Result<Decision> {
        let grant = match &policy.create {
            CreateRule::Privileged => return Ok(Decision::Deny(DenyReason::PrivilegedPathRequired)),
            CreateRule::Allowed(grant) => grant,
        };
        if actor.is_anonymous() {
            return Ok(Decision::Deny(DenyReason::NotAuthenticated));
        }
        if let Some(roles) = &grant.roles
            && !roles.contains(&actor.role())
        {
            return Ok(Decision::Deny(DenyReason::RoleNotPermitted));
        }
        if let Some(default) = grant
            .defaults
            .iter()
            .find(|default| !default.accepts(proposed.get(&default.field)))
        {
            tracing::debug!(field = %default.field, "create sets a privilege field");
            return Ok(Decision::Deny(DenyReason::FieldNotMutable));
        }
        if actor.is_admin() {
            return Ok(Decision::Allow);
        }
        if !owns_proposed(grant, actor, proposed) {
            return Ok(Decision::Deny(DenyReason::NotOwner));
        }
        let resolver = self.resolver();
        for relation in &grant.requires {
            if !resolver.holds(relation, actor, proposed).await? {
                return Ok(Decision::Deny(DenyReason::NotOwner));
            }
        }
        Ok(Decision::Allow)
    }

    async fn decide_update(
        &self,
        policy: &Policy,
        actor: &Actor,
        current: &Document,
        proposed: &Document,
    ) -> Result<Decision> {
        let grants = match &policy.update {
            UpdateRule::Privileged => return Ok(Decision::Deny(DenyReason::PrivilegedPathRequired)),
            _ if actor.is_anonymous() => return Ok(Decision::Deny(DenyReason::NotAuthenticated)),
            UpdateRule::Immutable => return Ok(Decision::Deny(DenyReason::ImmutableAfterCreate)),
            UpdateRule::Grants(grants) => grants,
        };
        if proposed.id() != current.id() {
            tracing::debug!(current = %current.id(), proposed = %proposed.id(), "update rewrites document id");
            return Ok(Decision::Deny(DenyReason::FieldNotMutable));
        }

        let (permitted, validator, failure) = if actor.is_admin() {
            (
                UpdateRule::admin_fields(grants),
                FieldDiffValidator::unguarded(),
                None,
            )
        } else {
            let resolver = self.resolver();
            let mut permitted = None;
            let mut failure = None;
            for grant in grants {
                match resolver.holds(&grant.relation, actor, current).await {
                    Ok(true) => {
                        permitted = Some(match permitted {
                            Some(fields) => grant.fields.clone().union(&fields),
                            None => grant.fields.clone(),
                        });
                    }
                    Ok(false) => {}
                    Err(err) => {
                        failure.get_or_insert(err);
                    }
                }
            }
            match (permitted, failure) {
                (Some(permitted), failure) => (permitted, FieldDiffValidator::guarded(), failure),
                (None, Some(err)) => return Err(err),
                (None, None) => return Ok(Decision::Deny(DenyReason::NotOwner)),
            }
        };

        match (validator.validate(current, proposed, &permitted), failure) {
            (Ok(()), _) => Ok(Decision::Allow),
            // An unresolved grant might have permitted the field.
            (Err(_), Some(err)) => Err(err),
            (Err(violation), None) => {
                tracing::debug!(field = %violation.field, "update touches a field outside the permitted set");
                Ok(Decision::Deny(DenyReason::FieldNotMutable))
            }
        }
    }

    /// Returns whether any relation holds. A lookup failure only surfaces
    /// when no relation could be proven.
    async fn any_holds(
        &self,
        relations: &[Relation],
        actor: &Actor,
        document: &Document,
    ) -> Result<bool> {
        let resolver = self.resolver();
        let mut failure = None;
        for relation in relations {
            if actor.is_anonymous() && !relation.admits_anonymous() {
                continue;
            }
            match resolver.holds(relation, actor, document).await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(err) => {
                    failure.get_or_insert(err);
                }
            }
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(false),
        }
    }

    fn resolver(&self) -> OwnershipResolver<'_, L> {
        OwnershipResolver::new(&self.lookup, Some(self.lookup_timeout))
    }
}

fn owns_proposed(grant: &CreateGrant, actor: &Actor, proposed: &Document) -> bool {
    let Some(id) = actor.id() else {
        return false;
    };
    match &grant.owner {
        None => true,
        Some(OwnerKey::DocumentId) => proposed.id() == id,
        Some(OwnerKey::Field { field }) => proposed.field_is(field, id),
    }
}

fn deny_reason_for(err: &Error) -> DenyReason {
    match err {
        Error::Lookup(_) | Error::LookupTimeout { .. } => DenyReason::RelatedResourceUnavailable,
        Error::InvalidId(_) | Error::InvalidPolicy(_) | Error::InvalidDocument(_) => {
            DenyReason::EvaluationFailed
        }
    }
}
