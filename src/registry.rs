use crate::actor::{GroupKind, Role};
use crate::error::{Error, Result};
use crate::policy::{
    AccessRule, CreateGrant, CreateRule, FieldDefault, FieldSet, Policy, Relation, UpdateGrant,
    UpdateRule,
};
use crate::types::ResourceName;
use std::collections::HashMap;

/// Policy found for a resource type.
#[derive(Debug, Clone, Copy)]
pub enum PolicyEntry<'a> {
    /// The registered policy.
    Defined(&'a Policy),
    /// Sentinel for unregistered types: every operation is denied.
    DenyAll,
}

/// Read-only table from resource type to [`Policy`].
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    policies: HashMap<ResourceName, Policy>,
}

impl PolicyRegistry {
    /// Creates an empty registry. Every lookup yields [`PolicyEntry::DenyAll`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the policy for a resource type.
    pub fn register(mut self, resource_type: ResourceName, policy: Policy) -> Self {
        self.policies.insert(resource_type, policy);
        self
    }

    /// Looks up the policy for a resource type.
    pub fn policy_for(&self, resource_type: &str) -> PolicyEntry<'_> {
        match self.policies.get(resource_type) {
            Some(policy) => PolicyEntry::Defined(policy),
            None => PolicyEntry::DenyAll,
        }
    }

    /// Returns whether a resource type is registered.
    pub fn contains(&self, resource_type: &str) -> bool {
        self.policies.contains_key(resource_type)
    }

    /// Returns the registered resource types.
    pub fn resource_types(&self) -> impl Iterator<Item = &ResourceName> {
        self.policies.keys()
    }

    /// Loads a registry from a JSON object keyed by resource type.
    pub fn from_json(definition: &str) -> Result<Self> {
        let raw: HashMap<String, Policy> = serde_json::from_str(definition)
            .map_err(|err| Error::InvalidPolicy(err.to_string()))?;
        let mut registry = Self::new();
        for (name, policy) in raw {
            registry = registry.register(ResourceName::new(&name)?, policy);
        }
        Ok(registry)
    }

    /// Serializes the registry to the JSON form read by [`Self::from_json`].
    pub fn to_json(&self) -> Result<String> {
        let table: HashMap<&str, &Policy> = self
            .policies
            .iter()
            .map(|(name, policy)| (name.as_str(), policy))
            .collect();
        serde_json::to_string_pretty(&table).map_err(|err| Error::InvalidPolicy(err.to_string()))
    }

    /// The e-learning platform's collection policies.
    pub fn elearning() -> Self {
        Self::new()
            .register(name("users"), users())
            .register(name("courses"), courses())
            .register(name("enrollments"), enrollments())
            .register(name("lessonProgress"), lesson_progress())
            .register(name("quizResults"), quiz_results())
            .register(name("categories"), categories())
            .register(name("payments"), payments())
            .register(name("universities"), universities())
            .register(name("companies"), companies())
    }
}

fn name(value: &str) -> ResourceName {
    ResourceName::from_string(value.to_string())
}

fn admin() -> Relation {
    Relation::has_role(Role::Admin)
}

fn users() -> Policy {
    Policy {
        read: AccessRule::Grants(vec![Relation::SelfDocument, admin()]),
        create: CreateRule::Allowed(
            CreateGrant::new()
                .owned_by_document_id()
                .default_field(FieldDefault::new("role", "student"))
                .default_field(FieldDefault::new("isVerified", false))
                .default_field(FieldDefault::absent("permissions")),
        ),
        update: UpdateRule::Grants(vec![
            UpdateGrant::new(
                Relation::SelfDocument,
                FieldSet::only([
                    "displayName",
                    "firstName",
                    "lastName",
                    "bio",
                    "photoURL",
                    "phoneNumber",
                    "preferences",
                    "notificationSettings",
                    "lastLoginAt",
                    "updatedAt",
                ]),
            ),
            UpdateGrant::new(admin(), FieldSet::Any),
        ]),
        delete: AccessRule::admin_only(),
    }
}

fn courses() -> Policy {
    Policy {
        read: AccessRule::Grants(vec![
            Relation::field_equals("status", "published"),
            Relation::field_is_actor("instructorId"),
            Relation::enrolled_in_course(None),
            Relation::admin_of(GroupKind::University, Some("universityId")),
        ]),
        create: CreateRule::Allowed(
            CreateGrant::new()
                .roles([Role::Instructor, Role::Admin])
                .owned_by_field("instructorId"),
        ),
        update: UpdateRule::Grants(vec![
            UpdateGrant::new(
                Relation::field_is_actor("instructorId"),
                FieldSet::only([
                    "title",
                    "description",
                    "shortDescription",
                    "thumbnailUrl",
                    "price",
                    "status",
                    "categoryId",
                    "level",
                    "language",
                    "tags",
                    "modules",
                    "objectives",
                    "requirements",
                    "publishedAt",
                    "updatedAt",
                ]),
            ),
            UpdateGrant::new(
                Relation::admin_of(GroupKind::University, Some("universityId")),
                FieldSet::only(["status", "approvedAt", "approvedBy", "updatedAt"]),
            ),
            UpdateGrant::new(admin(), FieldSet::Any),
        ]),
        delete: AccessRule::admin_only(),
    }
}

fn enrollments() -> Policy {
    Policy {
        read: AccessRule::Grants(vec![
            Relation::field_is_actor("userId"),
            Relation::instructor_of_course("courseId"),
        ]),
        create: CreateRule::Privileged,
        update: UpdateRule::Grants(vec![
            UpdateGrant::new(
                Relation::field_is_actor("userId"),
                FieldSet::only([
                    "progress",
                    "lastAccessedAt",
                    "currentLessonId",
                    "completedLessons",
                    "updatedAt",
                ]),
            ),
            UpdateGrant::new(
                Relation::instructor_of_course("courseId"),
                FieldSet::only([
                    "progress",
                    "status",
                    "completedAt",
                    "certificateIssued",
                    "updatedAt",
                ]),
            ),
        ]),
        delete: AccessRule::Privileged,
    }
}

fn lesson_progress() -> Policy {
    Policy {
        read: AccessRule::Grants(vec![
            Relation::field_is_actor("userId"),
            Relation::instructor_of_course("courseId"),
        ]),
        create: CreateRule::Allowed(
            CreateGrant::new()
                .owned_by_field("userId")
                .requires(Relation::enrolled_in_course(Some("courseId"))),
        ),
        update: UpdateRule::Grants(vec![UpdateGrant::new(
            Relation::field_is_actor("userId"),
            FieldSet::only([
                "completed",
                "timeSpent",
                "lastPosition",
                "watchPercentage",
                "completedAt",
                "updatedAt",
            ]),
        )]),
        delete: AccessRule::admin_only(),
    }
}

fn quiz_results() -> Policy {
    Policy {
        read: AccessRule::Grants(vec![
            Relation::field_is_actor("userId"),
            Relation::instructor_of_course("courseId"),
        ]),
        create: CreateRule::Allowed(CreateGrant::new().owned_by_field("userId")),
        update: UpdateRule::Immutable,
        delete: AccessRule::admin_only(),
    }
}

fn categories() -> Policy {
    Policy {
        read: AccessRule::grant(Relation::Anyone),
        create: CreateRule::Allowed(CreateGrant::new().roles([Role::Admin])),
        update: UpdateRule::Grants(vec![UpdateGrant::new(admin(), FieldSet::Any)]),
        delete: AccessRule::admin_only(),
    }
}

fn payments() -> Policy {
    Policy {
        read: AccessRule::grant(Relation::field_is_actor("userId")),
        create: CreateRule::Privileged,
        update: UpdateRule::Privileged,
        delete: AccessRule::Privileged,
    }
}

fn universities() -> Policy {
    Policy {
        read: AccessRule::Grants(vec![
            Relation::listed_in("admins"),
            Relation::listed_in("members"),
        ]),
        create: CreateRule::Allowed(CreateGrant::new().roles([Role::Admin])),
        update: UpdateRule::Grants(vec![
            UpdateGrant::new(
                Relation::admin_of(GroupKind::University, None),
                FieldSet::only([
                    "name",
                    "description",
                    "logoUrl",
                    "website",
                    "settings",
                    "updatedAt",
                ]),
            ),
            UpdateGrant::new(admin(), FieldSet::Any),
        ]),
        delete: AccessRule::admin_only(),
    }
}

fn companies() -> Policy {
    Policy {
        read: AccessRule::Grants(vec![
            Relation::listed_in("admins"),
            Relation::listed_in("employees"),
        ]),
        create: CreateRule::Privileged,
        update: UpdateRule::Grants(vec![
            UpdateGrant::new(
                Relation::admin_of(GroupKind::Company, None),
                FieldSet::only(["name", "billingEmail", "settings", "updatedAt"]),
            ),
            UpdateGrant::new(admin(), FieldSet::Any),
        ]),
        delete: AccessRule::admin_only(),
    }
}
