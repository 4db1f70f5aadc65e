use crate::document::Document;
use crate::policy::FieldSet;
use std::collections::BTreeSet;

/// Fields a non-admin actor may never change, whatever the policy grants.
const ESCALATION_FIELDS: &[&str] = &["role"];

/// First field of an update that the actor is not allowed to change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
}

/// Computes the set of top-level fields that differ between `before` and
/// `after`.
///
/// Fields added, removed, or changed in value all count. With no `before`
/// (a create) every field of `after` is changed.
pub fn changed_fields(before: Option<&Document>, after: &Document) -> BTreeSet<String> {
    let Some(before) = before else {
        return after.fields().keys().cloned().collect();
    };
    let mut changed: BTreeSet<String> = after
        .fields()
        .iter()
        .filter(|(field, value)| before.get(field) != Some(*value))
        .map(|(field, _)| field.clone())
        .collect();
    changed.extend(
        before
            .fields()
            .keys()
            .filter(|field| after.get(field).is_none())
            .cloned(),
    );
    changed
}

/// Checks an update against the fields the actor may change.
#[derive(Debug, Clone, Copy)]
pub struct FieldDiffValidator {
    guard_escalation: bool,
}

impl FieldDiffValidator {
    /// Validator for a non-admin actor; escalation fields are always
    /// rejected.
    pub fn guarded() -> Self {
        Self {
            guard_escalation: true,
        }
    }

    /// Validator for an admin actor; only the permitted set applies.
    pub fn unguarded() -> Self {
        Self {
            guard_escalation: false,
        }
    }

    /// Validates the diff between `before` and `after` against `permitted`.
    pub fn validate(
        &self,
        before: &Document,
        after: &Document,
        permitted: &FieldSet,
    ) -> Result<(), FieldViolation> {
        let changed = changed_fields(Some(before), after);
        self.validate_changed(&changed, permitted)
    }

    /// Validates an already computed changed-field set.
    pub fn validate_changed(
        &self,
        changed: &BTreeSet<String>,
        permitted: &FieldSet,
    ) -> Result<(), FieldViolation> {
        if self.guard_escalation
            && let Some(field) = ESCALATION_FIELDS
                .iter()
                .find(|field| changed.contains(**field))
        {
            return Err(FieldViolation {
                field: (*field).to_string(),
            });
        }
        match changed.iter().find(|field| !permitted.contains(field)) {
            Some(field) => Err(FieldViolation {
                field: field.clone(),
            }),
            None => Ok(()),
        }
    }
}
