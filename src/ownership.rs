use crate::actor::{Actor, GroupKind};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::lookup::ResourceLookup;
use crate::policy::Relation;
use crate::timer::with_timeout;
use crate::types::{DocumentId, ResourceName};
use std::time::Duration;

const COURSES: &str = "courses";
const ENROLLMENTS: &str = "enrollments";
const GROUP_ADMINS_FIELD: &str = "admins";

/// Answers relation predicates between an actor and a document.
///
/// Related documents are fetched fresh on every call. A related document that
/// does not exist, or a reference that is not a valid id, resolves to `false`.
/// Lookup failures are returned as errors so the caller can deny with the
/// right reason; they never resolve to `true`.
#[derive(Debug)]
pub struct OwnershipResolver<'a, L: ?Sized> {
    lookup: &'a L,
    timeout: Option<Duration>,
}

impl<'a, L> OwnershipResolver<'a, L>
where
    L: ResourceLookup + ?Sized,
{
    /// Creates a resolver. `timeout` bounds each related-document fetch.
    pub fn new(lookup: &'a L, timeout: Option<Duration>) -> Self {
        Self { lookup, timeout }
    }

    /// Evaluates `relation` for `actor` against the stored `document`.
    pub async fn holds(
        &self,
        relation: &Relation,
        actor: &Actor,
        document: &Document,
    ) -> Result<bool> {
        match relation {
            Relation::Anyone => Ok(true),
            Relation::Authenticated => Ok(!actor.is_anonymous()),
            Relation::HasRole { role } => Ok(actor.role() == *role),
            Relation::SelfDocument => Ok(actor.id().is_some_and(|id| document.id() == id)),
            Relation::FieldIsActor { field } => {
                Ok(actor.id().is_some_and(|id| document.field_is(field, id)))
            }
            Relation::FieldEquals { field, value } => Ok(document.get(field) == Some(value)),
            Relation::InstructorOfCourse { field } => match document.get_str(field) {
                Some(course) => self.is_instructor_of(actor, course).await,
                None => Ok(false),
            },
            Relation::EnrolledInCourse { field } => {
                let course = match field {
                    Some(field) => document.get_str(field),
                    None => Some(document.id().as_str()),
                };
                match course {
                    Some(course) => self.is_enrolled_in(actor, course).await,
                    None => Ok(false),
                }
            }
            Relation::AdminOf { field: None, .. } => Ok(is_listed_admin(actor, document)),
            Relation::AdminOf {
                group,
                field: Some(field),
            } => match document.get_str(field) {
                Some(group_id) => self.is_admin_of(actor, *group, group_id).await,
                None => Ok(false),
            },
            Relation::ListedIn { map } => {
                Ok(actor.id().is_some_and(|id| document.map_flag(map, id.as_str())))
            }
        }
    }

    /// Returns whether the actor is the instructor of `course_id`.
    pub async fn is_instructor_of(&self, actor: &Actor, course_id: &str) -> Result<bool> {
        let Some(id) = actor.id() else {
            return Ok(false);
        };
        let Some(course) = self.fetch(COURSES, course_id).await? else {
            return Ok(false);
        };
        Ok(course.field_is("instructorId", id))
    }

    /// Returns whether the actor holds an enrollment in `course_id`.
    pub async fn is_enrolled_in(&self, actor: &Actor, course_id: &str) -> Result<bool> {
        let Some(id) = actor.id() else {
            return Ok(false);
        };
        let Ok(enrollment_id) = DocumentId::enrollment(id.as_str(), course_id) else {
            return Ok(false);
        };
        let Some(enrollment) = self.fetch(ENROLLMENTS, enrollment_id.as_str()).await? else {
            return Ok(false);
        };
        Ok(enrollment.field_is("userId", id) && enrollment.get_str("courseId") == Some(course_id))
    }

    /// Returns whether the actor administers group `group_id`.
    ///
    /// The stored group document is the authority: token membership claims
    /// are neither required nor sufficient.
    pub async fn is_admin_of(&self, actor: &Actor, group: GroupKind, group_id: &str) -> Result<bool> {
        if actor.id().is_none() {
            return Ok(false);
        }
        let Some(document) = self.fetch(group.collection(), group_id).await? else {
            return Ok(false);
        };
        Ok(is_listed_admin(actor, &document))
    }

    async fn fetch(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let Ok(id) = DocumentId::new(id) else {
            return Ok(None);
        };
        let resource_type = ResourceName::from_string(collection.to_string());
        let fetch = self.lookup.fetch(&resource_type, &id);
        match self.timeout {
            Some(timeout) => match with_timeout(timeout, fetch).await {
                Some(result) => result.map_err(Error::from),
                None => Err(Error::LookupTimeout {
                    resource_type,
                    id,
                    timeout,
                }),
            },
            None => fetch.await.map_err(Error::from),
        }
    }
}

fn is_listed_admin(actor: &Actor, document: &Document) -> bool {
    actor
        .id()
        .is_some_and(|id| document.map_flag(GROUP_ADMINS_FIELD, id.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Role;
    use crate::lookup::testing::{Mode, StaticLookup};
    use crate::types::ActorId;
    use futures::executor::block_on;
    use serde_json::json;

    fn doc(id: &str) -> Document {
        Document::new(DocumentId::try_from(id).unwrap())
    }

    fn actor(id: &str, role: Role) -> Actor {
        Actor::authenticated(ActorId::try_from(id).unwrap(), role)
    }

    fn catalog() -> StaticLookup {
        StaticLookup::new()
            .with("courses", doc("c1").with("instructorId", "i1"))
            .with(
                "enrollments",
                doc("s1_c1").with("userId", "s1").with("courseId", "c1"),
            )
            .with(
                "enrollments",
                doc("s2_c1").with("userId", "s9").with("courseId", "c1"),
            )
            .with(
                "universities",
                doc("uni-1").with("admins", json!({ "ua1": true })),
            )
    }

    #[test]
    fn instructor_relation_follows_course_document() {
        let lookup = catalog();
        let resolver = OwnershipResolver::new(&lookup, None);
        let enrollment = doc("s1_c1").with("userId", "s1").with("courseId", "c1");
        let relation = Relation::instructor_of_course("courseId");

        let owner = block_on(resolver.holds(&relation, &actor("i1", Role::Instructor), &enrollment));
        let other = block_on(resolver.holds(&relation, &actor("i2", Role::Instructor), &enrollment));

        assert!(owner.unwrap());
        assert!(!other.unwrap());
    }

    #[test]
    fn missing_related_document_is_not_ownership() {
        let lookup = catalog();
        let resolver = OwnershipResolver::new(&lookup, None);
        let orphan = doc("p1").with("userId", "s1").with("courseId", "gone");

        let result = block_on(resolver.holds(
            &Relation::instructor_of_course("courseId"),
            &actor("i1", Role::Instructor),
            &orphan,
        ));

        assert!(!result.unwrap());
    }

    #[test]
    fn enrollment_must_name_the_actor() {
        let lookup = catalog();
        let resolver = OwnershipResolver::new(&lookup, None);

        assert!(block_on(resolver.is_enrolled_in(&actor("s1", Role::Student), "c1")).unwrap());
        // s2_c1 exists but belongs to someone else.
        assert!(!block_on(resolver.is_enrolled_in(&actor("s2", Role::Student), "c1")).unwrap());
        assert!(!block_on(resolver.is_enrolled_in(&actor("s1", Role::Student), "c2")).unwrap());
    }

    #[test]
    fn group_document_decides_university_admin() {
        let lookup = catalog();
        let resolver = OwnershipResolver::new(&lookup, None);
        let listed = actor("ua1", Role::UniversityAdmin);
        // Role and claims do not matter once the document lists the uid.
        let listed_other_role = actor("ua1", Role::Instructor);
        let forged =
            actor("ua2", Role::UniversityAdmin).with_membership(GroupKind::University, "uni-1", true);

        let check = |who: &Actor| block_on(resolver.is_admin_of(who, GroupKind::University, "uni-1"));
        assert!(check(&listed).unwrap());
        assert!(check(&listed_other_role).unwrap());
        assert!(!check(&forged).unwrap());
        assert!(!check(&Actor::anonymous()).unwrap());
    }

    #[test]
    fn stale_claim_does_not_outlive_removal_from_admins() {
        let lookup = StaticLookup::new().with(
            "universities",
            doc("uni-1").with("admins", json!({ "ua1": false })),
        );
        let resolver = OwnershipResolver::new(&lookup, None);
        let stale =
            actor("ua1", Role::UniversityAdmin).with_membership(GroupKind::University, "uni-1", true);

        let result = block_on(resolver.is_admin_of(&stale, GroupKind::University, "uni-1"));

        assert!(!result.unwrap());
        assert_eq!(lookup.fetches(), 1);
    }

    #[test]
    fn group_document_itself_checks_admins_map() {
        let lookup = catalog();
        let resolver = OwnershipResolver::new(&lookup, None);
        let university = doc("uni-1").with("admins", json!({ "ua1": true }));
        let relation = Relation::admin_of(GroupKind::University, None);

        let listed = block_on(resolver.holds(&relation, &actor("ua1", Role::Student), &university));
        let other = block_on(resolver.holds(&relation, &actor("ua2", Role::Admin), &university));

        assert!(listed.unwrap());
        assert!(!other.unwrap());
        assert_eq!(lookup.fetches(), 0);
    }

    #[test]
    fn anonymous_actor_never_triggers_lookups() {
        let lookup = catalog();
        let resolver = OwnershipResolver::new(&lookup, None);
        let enrollment = doc("s1_c1").with("userId", "s1").with("courseId", "c1");

        let result = block_on(resolver.holds(
            &Relation::instructor_of_course("courseId"),
            &Actor::anonymous(),
            &enrollment,
        ));

        assert!(!result.unwrap());
        assert_eq!(lookup.fetches(), 0);
    }

    #[test]
    fn lookup_failure_is_an_error_not_a_grant() {
        let lookup = catalog().mode(Mode::Fail);
        let resolver = OwnershipResolver::new(&lookup, None);

        let result = block_on(resolver.is_instructor_of(&actor("i1", Role::Instructor), "c1"));

        assert!(matches!(result, Err(Error::Lookup(_))));
    }

    #[test]
    fn invalid_reference_resolves_to_false_without_fetching() {
        let lookup = catalog();
        let resolver = OwnershipResolver::new(&lookup, None);

        let result = block_on(resolver.is_instructor_of(&actor("i1", Role::Instructor), "../c1"));

        assert!(!result.unwrap());
        assert_eq!(lookup.fetches(), 0);
    }

    #[test]
    fn hanging_lookup_times_out_without_a_runtime() {
        let lookup = catalog().mode(Mode::Hang);
        let resolver = OwnershipResolver::new(&lookup, Some(Duration::from_millis(20)));

        let result = block_on(resolver.is_instructor_of(&actor("i1", Role::Instructor), "c1"));

        assert!(matches!(result, Err(Error::LookupTimeout { .. })));
    }

    #[tokio::test]
    async fn stalled_lookup_times_out() {
        let lookup = catalog().mode(Mode::Stall(Duration::from_millis(200)));
        let resolver = OwnershipResolver::new(&lookup, Some(Duration::from_millis(10)));

        let result = resolver
            .is_instructor_of(&actor("i1", Role::Instructor), "c1")
            .await;

        assert!(matches!(result, Err(Error::LookupTimeout { .. })));
    }
}
