//! Policy data model.
//!
//! A [`Policy`] is plain data describing who may read, create, update and
//! delete documents of one resource type. Policies are interpreted by the
//! engine; adding a resource type never requires new evaluation code.

use crate::actor::{GroupKind, Role};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Relation between an actor and a document.
///
/// Relations are evaluated against the stored document, never against values
/// the client proposes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Relation {
    /// Holds for every actor, anonymous included.
    Anyone,
    /// Holds for every authenticated actor.
    Authenticated,
    /// Actor has the given role.
    HasRole { role: Role },
    /// Document id equals the actor id.
    SelfDocument,
    /// Document field holds the actor id.
    FieldIsActor { field: String },
    /// Document field equals a literal value.
    FieldEquals { field: String, value: Value },
    /// Actor is the instructor of the course referenced by `field`.
    InstructorOfCourse { field: String },
    /// Actor holds an enrollment in the course referenced by `field`, or in
    /// the document itself when `field` is absent.
    EnrolledInCourse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },
    /// Actor administers the group referenced by `field`, or the document
    /// itself when `field` is absent.
    AdminOf {
        group: GroupKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },
    /// Membership map `map` on the document flags the actor as `true`.
    ListedIn { map: String },
}

impl Relation {
    pub fn has_role(role: Role) -> Self {
        Self::HasRole { role }
    }

    pub fn field_is_actor(field: impl Into<String>) -> Self {
        Self::FieldIsActor {
            field: field.into(),
        }
    }

    pub fn field_equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::FieldEquals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn instructor_of_course(field: impl Into<String>) -> Self {
        Self::InstructorOfCourse {
            field: field.into(),
        }
    }

    pub fn enrolled_in_course(field: Option<&str>) -> Self {
        Self::EnrolledInCourse {
            field: field.map(str::to_string),
        }
    }

    pub fn admin_of(group: GroupKind, field: Option<&str>) -> Self {
        Self::AdminOf {
            group,
            field: field.map(str::to_string),
        }
    }

    pub fn listed_in(map: impl Into<String>) -> Self {
        Self::ListedIn { map: map.into() }
    }

    /// Returns whether this relation is satisfiable by an anonymous actor.
    pub fn admits_anonymous(&self) -> bool {
        matches!(self, Self::Anyone | Self::FieldEquals { .. })
    }
}

/// Rule for read and delete operations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "any_of", rename_all = "snake_case")]
pub enum AccessRule {
    /// Only the trusted pipeline may perform the operation.
    Privileged,
    /// Allowed when any relation holds.
    Grants(Vec<Relation>),
}

impl AccessRule {
    /// Allows a single relation.
    pub fn grant(relation: Relation) -> Self {
        Self::Grants(vec![relation])
    }

    pub fn admin_only() -> Self {
        Self::grant(Relation::has_role(Role::Admin))
    }
}

/// Key identifying the owner of a proposed document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OwnerKey {
    /// The document id is the owner id.
    DocumentId,
    /// A field holds the owner id.
    Field { field: String },
}

/// Privilege field that a creator may only leave absent or at its default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDefault {
    pub field: String,
    /// Accepted value; `None` means the field must be absent.
    #[serde(default)]
    pub default: Option<Value>,
}

impl FieldDefault {
    pub fn new(field: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            default: Some(default.into()),
        }
    }

    pub fn absent(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            default: None,
        }
    }

    /// Returns whether the proposed value (if any) respects the default.
    pub fn accepts(&self, value: Option<&Value>) -> bool {
        match (value, &self.default) {
            (None, _) => true,
            (Some(value), Some(default)) => value == default,
            (Some(_), None) => false,
        }
    }
}

/// Conditions for a direct create.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateGrant {
    /// Roles allowed to create; `None` admits every authenticated role.
    #[serde(default)]
    pub roles: Option<Vec<Role>>,
    /// Owner key that must name the actor.
    #[serde(default)]
    pub owner: Option<OwnerKey>,
    /// Privilege fields pinned to their defaults.
    #[serde(default)]
    pub defaults: Vec<FieldDefault>,
    /// Relations that must all hold against the proposed document.
    #[serde(default)]
    pub requires: Vec<Relation>,
}

impl CreateGrant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.roles = Some(roles.into_iter().collect());
        self
    }

    pub fn owned_by_document_id(mut self) -> Self {
        self.owner = Some(OwnerKey::DocumentId);
        self
    }

    pub fn owned_by_field(mut self, field: impl Into<String>) -> Self {
        self.owner = Some(OwnerKey::Field {
            field: field.into(),
        });
        self
    }

    pub fn default_field(mut self, default: FieldDefault) -> Self {
        self.defaults.push(default);
        self
    }

    pub fn requires(mut self, relation: Relation) -> Self {
        self.requires.push(relation);
        self
    }
}

/// Rule for create operations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CreateRule {
    /// Only the trusted pipeline may create.
    Privileged,
    /// Direct creation under the grant's conditions.
    Allowed(CreateGrant),
}

/// Set of fields an update may change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSet {
    /// Every field.
    Any,
    /// Only the listed fields.
    Only(BTreeSet<String>),
}

impl FieldSet {
    pub fn only<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(fields.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, field: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Only(fields) => fields.contains(field),
        }
    }

    /// Union of two sets.
    pub fn union(self, other: &FieldSet) -> FieldSet {
        match (self, other) {
            (Self::Any, _) | (_, Self::Any) => Self::Any,
            (Self::Only(mut left), Self::Only(right)) => {
                left.extend(right.iter().cloned());
                Self::Only(left)
            }
        }
    }
}

/// Fields mutable under one relation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateGrant {
    pub relation: Relation,
    pub fields: FieldSet,
}

impl UpdateGrant {
    pub fn new(relation: Relation, fields: FieldSet) -> Self {
        Self { relation, fields }
    }
}

/// Rule for update operations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "grants", rename_all = "snake_case")]
pub enum UpdateRule {
    /// Only the trusted pipeline may update.
    Privileged,
    /// No direct update is ever allowed once the document exists.
    Immutable,
    /// Update allowed under any satisfied grant, limited to its fields.
    Grants(Vec<UpdateGrant>),
}

impl UpdateRule {
    /// Fields an admin may change: the explicit admin grant when present,
    /// otherwise every grant's fields combined.
    pub(crate) fn admin_fields(grants: &[UpdateGrant]) -> FieldSet {
        let admin = Relation::has_role(Role::Admin);
        if let Some(grant) = grants.iter().find(|grant| grant.relation == admin) {
            return grant.fields.clone();
        }
        grants
            .iter()
            .fold(FieldSet::Only(BTreeSet::new()), |acc, grant| {
                acc.union(&grant.fields)
            })
    }
}

/// Per-operation rules for one resource type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub read: AccessRule,
    pub create: CreateRule,
    pub update: UpdateRule,
    pub delete: AccessRule,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_default_accepts_absent_or_default_only() {
        let role = FieldDefault::new("role", "student");
        assert!(role.accepts(None));
        assert!(role.accepts(Some(&json!("student"))));
        assert!(!role.accepts(Some(&json!("admin"))));

        let permissions = FieldDefault::absent("permissions");
        assert!(permissions.accepts(None));
        assert!(!permissions.accepts(Some(&json!([]))));
    }

    #[test]
    fn field_set_union_absorbs_any() {
        let left = FieldSet::only(["progress"]);
        assert_eq!(left.clone().union(&FieldSet::Any), FieldSet::Any);

        let merged = left.union(&FieldSet::only(["status"]));
        assert!(merged.contains("progress"));
        assert!(merged.contains("status"));
        assert!(!merged.contains("userId"));
    }

    #[test]
    fn admin_fields_prefer_explicit_admin_grant() {
        let grants = vec![
            UpdateGrant::new(Relation::field_is_actor("userId"), FieldSet::only(["progress"])),
            UpdateGrant::new(Relation::has_role(Role::Admin), FieldSet::only(["status"])),
        ];
        assert_eq!(UpdateRule::admin_fields(&grants), FieldSet::only(["status"]));
    }

    #[test]
    fn admin_fields_fall_back_to_union() {
        let grants = vec![
            UpdateGrant::new(Relation::field_is_actor("userId"), FieldSet::only(["progress"])),
            UpdateGrant::new(
                Relation::instructor_of_course("courseId"),
                FieldSet::only(["status"]),
            ),
        ];
        assert_eq!(
            UpdateRule::admin_fields(&grants),
            FieldSet::only(["progress", "status"])
        );
        assert_eq!(UpdateRule::admin_fields(&[]), FieldSet::Only(BTreeSet::new()));
    }

    #[test]
    fn only_anyone_and_literal_checks_admit_anonymous() {
        assert!(Relation::Anyone.admits_anonymous());
        assert!(Relation::field_equals("status", "published").admits_anonymous());
        assert!(!Relation::Authenticated.admits_anonymous());
        assert!(!Relation::SelfDocument.admits_anonymous());
    }
}
