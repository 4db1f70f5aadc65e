use crate::types::ActorId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Platform role of an actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// No verified identity.
    Anonymous,
    /// Learner.
    Student,
    /// Course author.
    Instructor,
    /// Platform administrator.
    Admin,
    /// Administrator of one or more universities.
    UniversityAdmin,
    /// Administrator of one or more companies.
    CompanyAdmin,
    /// Trusted write pipeline. Only [`Actor::system`] carries this role.
    System,
}

impl Role {
    /// Maps a role claim to a role.
    ///
    /// Claims can never produce [`Role::System`] or [`Role::Anonymous`]:
    /// anything unrecognized resolves to [`Role::Student`].
    pub fn from_claim(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "instructor" => Self::Instructor,
            "admin" => Self::Admin,
            "university_admin" => Self::UniversityAdmin,
            "company_admin" => Self::CompanyAdmin,
            _ => Self::Student,
        }
    }

    /// Returns the claim spelling of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Student => "student",
            Self::Instructor => "instructor",
            Self::Admin => "admin",
            Self::UniversityAdmin => "university_admin",
            Self::CompanyAdmin => "company_admin",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of organization an actor can belong to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    University,
    Company,
}

impl GroupKind {
    /// Collection holding documents of this group kind.
    pub fn collection(self) -> &'static str {
        match self {
            Self::University => "universities",
            Self::Company => "companies",
        }
    }
}

/// Normalized identity making a request.
///
/// Built once per request and never mutated during evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    id: Option<ActorId>,
    role: Role,
    memberships: BTreeMap<(GroupKind, String), bool>,
}

impl Actor {
    /// Actor without credentials.
    pub fn anonymous() -> Self {
        Self {
            id: None,
            role: Role::Anonymous,
            memberships: BTreeMap::new(),
        }
    }

    /// The distinguished trusted-pipeline actor.
    pub fn system() -> Self {
        Self {
            id: None,
            role: Role::System,
            memberships: BTreeMap::new(),
        }
    }

    /// Authenticated actor with the given role.
    ///
    /// [`Role::System`] and [`Role::Anonymous`] are not assignable here and
    /// degrade to [`Role::Student`].
    pub fn authenticated(id: ActorId, role: Role) -> Self {
        let role = match role {
            Role::System | Role::Anonymous => Role::Student,
            other => other,
        };
        Self {
            id: Some(id),
            role,
            memberships: BTreeMap::new(),
        }
    }

    /// Adds a group membership claim. Claims are carried for callers and
    /// logs; they grant nothing.
    pub fn with_membership(mut self, kind: GroupKind, group: impl Into<String>, admin: bool) -> Self {
        self.memberships.insert((kind, group.into()), admin);
        self
    }

    /// Returns the actor id, absent for anonymous and system actors.
    pub fn id(&self) -> Option<&ActorId> {
        self.id.as_ref()
    }

    /// Returns the actor role.
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_anonymous(&self) -> bool {
        self.role == Role::Anonymous
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    /// Returns whether the actor's claims list it as admin of `group`.
    ///
    /// Informational only. Group administration is decided by the `admins`
    /// map of the stored group document.
    pub fn claims_admin_of(&self, kind: GroupKind, group: &str) -> bool {
        self.memberships
            .get(&(kind, group.to_string()))
            .copied()
            .unwrap_or(false)
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{id}"),
            None => f.write_str(self.role.as_str()),
        }
    }
}

/// Verified token claims.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Token subject, the user id.
    #[serde(default)]
    pub sub: String,
    /// Role claim.
    #[serde(default)]
    pub role: Option<String>,
    /// University id -> admin flag.
    #[serde(default)]
    pub universities: BTreeMap<String, bool>,
    /// Company id -> admin flag.
    #[serde(default)]
    pub companies: BTreeMap<String, bool>,
    /// Standard JWT expiration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

/// Maps authentication context to an [`Actor`].
///
/// Resolution is total: missing or unusable credentials yield
/// [`Actor::anonymous`] instead of an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct ActorResolver;

impl ActorResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolves verified claims, if any, into an actor.
    pub fn resolve(&self, claims: Option<&Claims>) -> Actor {
        let Some(claims) = claims else {
            return Actor::anonymous();
        };
        let Ok(id) = ActorId::new(&claims.sub) else {
            return Actor::anonymous();
        };
        let role = claims
            .role
            .as_deref()
            .map(Role::from_claim)
            .unwrap_or(Role::Student);

        let mut actor = Actor::authenticated(id, role);
        for (group, admin) in &claims.universities {
            actor = actor.with_membership(GroupKind::University, group.clone(), *admin);
        }
        for (group, admin) in &claims.companies {
            actor = actor.with_membership(GroupKind::Company, group.clone(), *admin);
        }
        actor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(sub: &str, role: Option<&str>) -> Claims {
        Claims {
            sub: sub.to_string(),
            role: role.map(str::to_string),
            ..Claims::default()
        }
    }

    #[test]
    fn missing_claims_resolve_to_anonymous() {
        let actor = ActorResolver::new().resolve(None);
        assert!(actor.is_anonymous());
        assert!(actor.id().is_none());
    }

    #[test]
    fn invalid_subject_resolves_to_anonymous() {
        let actor = ActorResolver::new().resolve(Some(&claims("  ", Some("admin"))));
        assert_eq!(actor, Actor::anonymous());

        let actor = ActorResolver::new().resolve(Some(&claims("bad uid!", Some("admin"))));
        assert_eq!(actor, Actor::anonymous());
    }

    #[test]
    fn missing_role_defaults_to_student() {
        let actor = ActorResolver::new().resolve(Some(&claims("s1", None)));
        assert_eq!(actor.role(), Role::Student);
        assert_eq!(actor.id().map(ActorId::as_str), Some("s1"));
    }

    #[test]
    fn role_claims_cannot_forge_system_actor() {
        let actor = ActorResolver::new().resolve(Some(&claims("s1", Some("system"))));
        assert_eq!(actor.role(), Role::Student);
        assert!(!actor.is_system());

        let actor = ActorResolver::new().resolve(Some(&claims("s1", Some("anonymous"))));
        assert_eq!(actor.role(), Role::Student);
    }

    #[test]
    fn role_claims_are_case_insensitive() {
        let actor = ActorResolver::new().resolve(Some(&claims("u1", Some(" University_Admin "))));
        assert_eq!(actor.role(), Role::UniversityAdmin);
    }

    #[test]
    fn group_claims_become_memberships() {
        let mut input = claims("ua1", Some("university_admin"));
        input.universities.insert("uni-1".to_string(), true);
        input.universities.insert("uni-2".to_string(), false);
        input.companies.insert("acme".to_string(), true);

        let actor = ActorResolver::new().resolve(Some(&input));
        assert!(actor.claims_admin_of(GroupKind::University, "uni-1"));
        assert!(!actor.claims_admin_of(GroupKind::University, "uni-2"));
        assert!(actor.claims_admin_of(GroupKind::Company, "acme"));
        assert!(!actor.claims_admin_of(GroupKind::Company, "uni-1"));
    }

    #[test]
    fn authenticated_constructor_never_assigns_system() {
        let actor = Actor::authenticated(ActorId::try_from("x").unwrap(), Role::System);
        assert_eq!(actor.role(), Role::Student);
    }
}
