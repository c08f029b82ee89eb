//! Core types for the task result bridge.

use crate::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Built-in CRM entity kinds with fixed schema codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixedKind {
    Lead,
    Deal,
    Contact,
    Company,
}

impl FixedKind {
    /// Schema lookup key for `crm.item.fields`.
    pub fn type_id(&self) -> i64 {
        match self {
            FixedKind::Lead => 1,
            FixedKind::Deal => 2,
            FixedKind::Contact => 3,
            FixedKind::Company => 4,
        }
    }

    /// REST method namespace, e.g. `crm.deal`.
    pub fn method_prefix(&self) -> &'static str {
        match self {
            FixedKind::Lead => "crm.lead",
            FixedKind::Deal => "crm.deal",
            FixedKind::Contact => "crm.contact",
            FixedKind::Company => "crm.company",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FixedKind::Lead => "lead",
            FixedKind::Deal => "deal",
            FixedKind::Contact => "contact",
            FixedKind::Company => "company",
        }
    }
}

/// Entity kind targeted by a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Fixed(FixedKind),
    /// Configurable entity, identified at runtime by a sub-type id.
    SmartProcess,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Fixed(kind) => kind.as_str(),
            EntityKind::SmartProcess => "smart_process",
        }
    }
}

impl FromStr for EntityKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lead" => Ok(EntityKind::Fixed(FixedKind::Lead)),
            "deal" => Ok(EntityKind::Fixed(FixedKind::Deal)),
            "contact" => Ok(EntityKind::Fixed(FixedKind::Contact)),
            "company" => Ok(EntityKind::Fixed(FixedKind::Company)),
            "smart_process" => Ok(EntityKind::SmartProcess),
            other => Err(BridgeError::unsupported_entity(other)),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to one CRM entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: i64,
    /// Required only when `kind` is [`EntityKind::SmartProcess`].
    pub sub_type_id: Option<i64>,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: i64, sub_type_id: Option<i64>) -> Self {
        Self {
            kind,
            id,
            sub_type_id,
        }
    }

    /// Key used to fetch the field schema for this entity's kind.
    pub fn schema_key(&self) -> BridgeResult<i64> {
        match self.kind {
            EntityKind::Fixed(kind) => Ok(kind.type_id()),
            EntityKind::SmartProcess => self.generic_type_id(),
        }
    }

    /// Sub-type id of a generic entity; a hard failure when absent.
    pub fn generic_type_id(&self) -> BridgeResult<i64> {
        self.sub_type_id
            .filter(|id| *id > 0)
            .ok_or_else(BridgeError::missing_sub_type)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// Opaque pointer from a task result to an attached object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct AttachmentReference(pub String);

impl AttachmentReference {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Disk file id when the reference is written as `n<digits>`.
    pub fn direct_file_id(&self) -> Option<FileReference> {
        let digits = self.0.strip_prefix('n')?;
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            Some(FileReference::new(digits))
        } else {
            None
        }
    }
}

impl<'de> Deserialize<'de> for AttachmentReference {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        scalar_to_string(&value)
            .map(AttachmentReference)
            .ok_or_else(|| serde::de::Error::custom("attachment reference must be a string or number"))
    }
}

impl fmt::Display for AttachmentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical file id within the file-storage subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct FileReference(pub String);

impl FileReference {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A file with its downloaded content, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub file: FileReference,
    pub name: String,
    pub content: Vec<u8>,
}

/// One snapshot of work submitted against a task.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TaskResult {
    #[serde(alias = "ID", default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(rename = "createdAt", default, deserialize_with = "lenient_string")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient_references")]
    pub files: Vec<AttachmentReference>,
    #[serde(rename = "commentId", default, deserialize_with = "lenient_string")]
    pub comment_id: Option<String>,
}

impl TaskResult {
    /// Text result, if present and non-empty.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }

    /// Originating comment id, ignoring empty and zero values.
    pub fn comment_id(&self) -> Option<&str> {
        self.comment_id
            .as_deref()
            .filter(|c| !c.is_empty() && *c != "0")
    }
}

/// Declared value cardinality of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    Single,
    Multiple,
}

/// Field metadata resolved against the live schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDescriptor {
    /// Identifier the schema stores the field under.
    pub stored_name: String,
    pub cardinality: Cardinality,
    /// Declared value kind (`file`, `string`, ...), when reported.
    pub kind: Option<String>,
}

impl FieldDescriptor {
    pub fn accepts_multiple(&self) -> bool {
        self.cardinality == Cardinality::Multiple
    }
}

/// Render a JSON scalar as a string; `None` for null, arrays and objects.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parse a JSON value as an integer the way a lenient form handler would.
/// Accepts numbers and numeric strings; anything else is `None`.
pub fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(scalar_to_string))
}

fn lenient_references<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<AttachmentReference>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    let items: Vec<Value> = match value {
        Some(Value::Array(items)) => items,
        // Some endpoints return a keyed object instead of a list.
        Some(Value::Object(map)) => map.into_iter().map(|(_, v)| v).collect(),
        _ => Vec::new(),
    };
    Ok(items
        .iter()
        .filter_map(scalar_to_string)
        .map(AttachmentReference)
        .collect())
}
