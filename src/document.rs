use crate::error::{Error, Result};
use crate::types::{ActorId, DocumentId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Snapshot of a stored document: its id plus top-level field values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    id: DocumentId,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl Document {
    /// Creates an empty document.
    pub fn new(id: DocumentId) -> Self {
        Self {
            id,
            fields: Map::new(),
        }
    }

    /// Creates a document from a JSON object.
    pub fn from_value(id: DocumentId, value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { id, fields }),
            other => Err(Error::InvalidDocument(format!(
                "document {id} must be a JSON object, got {other}"
            ))),
        }
    }

    /// Sets a field, returning the updated document.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Removes a field, returning the updated document.
    pub fn without(mut self, field: &str) -> Self {
        self.fields.remove(field);
        self
    }

    /// Returns the document id.
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Returns all fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Returns a field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Returns a field value when it is a string.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Returns whether `field` holds the actor's id.
    pub fn field_is(&self, field: &str, actor: &ActorId) -> bool {
        self.get_str(field) == Some(actor.as_str())
    }

    /// Returns whether the map stored at `field` flags `key` as `true`.
    ///
    /// Used for membership maps such as `admins: { "<uid>": true }`.
    pub fn map_flag(&self, field: &str, key: &str) -> bool {
        self.fields
            .get(field)
            .and_then(Value::as_object)
            .and_then(|map| map.get(key))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Builds the after-state of a partial update by overlaying `patch`.
    ///
    /// Fields absent from the patch keep their current value.
    pub fn merged(&self, patch: &Map<String, Value>) -> Self {
        let mut next = self.clone();
        for (field, value) in patch {
            next.fields.insert(field.clone(), value.clone());
        }
        next
    }
}
