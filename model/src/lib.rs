//! Shared entity model for the configuration editor.
//!
//! This crate owns the vocabulary used by both the `cep` server and the
//! `cep-cli` desktop shell: the four entity kinds and their field catalog,
//! the change-set wire types, draft reconciliation, timestamp helpers and
//! the localization tables.

pub mod changes;
pub mod draft;
pub mod i18n;
pub mod timestamp;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub use changes::{ChangeEntry, ChangeOp, ChangeSet, SystemEvent, UpdatedEntity};

/// Error raised when a request names something outside the catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// The entity-type string does not name one of the four kinds.
    #[error("unknown entity type: {0}")]
    UnknownKind(String),
    #[error("unknown field `{field}` for {kind}")]
    UnknownField { kind: EntityKind, field: String },
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: String, reason: String },
}

// =============================================================================
// ENTITY KINDS
// =============================================================================

/// One level of the Line → Station → Tool → Operation chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Line,
    Station,
    Tool,
    Operation,
}

impl EntityKind {
    pub const ALL: [Self; 4] = [Self::Line, Self::Station, Self::Tool, Self::Operation];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Station => "station",
            Self::Tool => "tool",
            Self::Operation => "operation",
        }
    }

    /// Backing table name.
    #[must_use]
    pub fn table(self) -> &'static str {
        match self {
            Self::Line => "lines",
            Self::Station => "stations",
            Self::Tool => "tools",
            Self::Operation => "operations",
        }
    }

    #[must_use]
    pub fn parent(self) -> Option<Self> {
        match self {
            Self::Line => None,
            Self::Station => Some(Self::Line),
            Self::Tool => Some(Self::Station),
            Self::Operation => Some(Self::Tool),
        }
    }

    #[must_use]
    pub fn child(self) -> Option<Self> {
        match self {
            Self::Line => Some(Self::Station),
            Self::Station => Some(Self::Tool),
            Self::Tool => Some(Self::Operation),
            Self::Operation => None,
        }
    }

    /// Field catalog for this kind, common fields first.
    #[must_use]
    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            Self::Line => LINE_FIELDS,
            Self::Station => STATION_FIELDS,
            Self::Tool => TOOL_FIELDS,
            Self::Operation => OPERATION_FIELDS,
        }
    }

    /// Look up a field by column name.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownField`] when the kind has no such field.
    pub fn field(self, name: &str) -> Result<&'static FieldSpec, ModelError> {
        self.fields()
            .iter()
            .find(|spec| spec.name == name)
            .ok_or_else(|| ModelError::UnknownField { kind: self, field: name.to_owned() })
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ModelError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "line" | "lines" => Ok(Self::Line),
            "station" | "stations" => Ok(Self::Station),
            "tool" | "tools" => Ok(Self::Tool),
            "operation" | "operations" => Ok(Self::Operation),
            _ => Err(ModelError::UnknownKind(raw.to_owned())),
        }
    }
}

// =============================================================================
// FIELD CATALOG
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldType,
    /// Maximum length in characters for text fields.
    pub max_len: Option<usize>,
}

impl FieldSpec {
    const fn text(name: &'static str) -> Self {
        Self { name, kind: FieldType::Text, max_len: None }
    }

    /// Normalize an incoming JSON value into the stored representation.
    ///
    /// Empty strings become `null`. Integer fields accept numbers or
    /// numeric strings.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidValue`] for values the column cannot hold.
    pub fn normalize(&self, value: &Value) -> Result<Value, ModelError> {
        let invalid = |reason: &str| ModelError::InvalidValue { field: self.name.to_owned(), reason: reason.to_owned() };

        match (self.kind, value) {
            (_, Value::Null) => Ok(Value::Null),
            (_, Value::String(s)) if s.is_empty() => Ok(Value::Null),
            (FieldType::Integer, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| invalid("expected an integer")),
            (FieldType::Integer, Value::Number(n)) => n.as_i64().map(Value::from).ok_or_else(|| invalid("expected an integer")),
            (FieldType::Text, Value::String(s)) => {
                if let Some(max) = self.max_len {
                    if s.chars().count() > max {
                        return Err(invalid(&format!("at most {max} characters")));
                    }
                }
                Ok(Value::String(s.clone()))
            }
            (FieldType::Text, Value::Number(n)) => Ok(Value::String(n.to_string())),
            (FieldType::Text, Value::Bool(b)) => Ok(Value::String(b.to_string())),
            _ => Err(invalid("unsupported value type")),
        }
    }
}

const LINE_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("name"),
    FieldSpec::text("comment"),
    FieldSpec::text("status_color"),
    FieldSpec { name: "assembly_area", kind: FieldType::Text, max_len: Some(3) },
];

const STATION_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("name"),
    FieldSpec::text("comment"),
    FieldSpec::text("status_color"),
    FieldSpec::text("description"),
    FieldSpec::text("station_type"),
    FieldSpec::text("serial_or_parallel"),
];

const TOOL_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("name"),
    FieldSpec::text("comment"),
    FieldSpec::text("status_color"),
    FieldSpec::text("description"),
    FieldSpec::text("tool_class"),
    FieldSpec::text("tool_type"),
    FieldSpec::text("ip_address_device"),
    FieldSpec::text("sps_plc_name_spa_service"),
    FieldSpec::text("sps_db_no_send"),
    FieldSpec::text("sps_db_no_receive"),
    FieldSpec::text("sps_pre_check"),
    FieldSpec::text("sps_address_in_send_db"),
    FieldSpec::text("sps_address_in_receive_db"),
];

const OPERATION_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("name"),
    FieldSpec::text("comment"),
    FieldSpec::text("status_color"),
    FieldSpec::text("description"),
    FieldSpec::text("decision_criteria"),
    FieldSpec::text("sequence_group"),
    FieldSpec { name: "sequence", kind: FieldType::Integer, max_len: None },
    FieldSpec::text("always_perform"),
    FieldSpec::text("q_gate_relevant"),
    FieldSpec::text("template"),
    FieldSpec::text("decision_class"),
    FieldSpec::text("saving_class"),
    FieldSpec::text("verification_class"),
    FieldSpec::text("generation_class"),
    FieldSpec::text("operation_decisions"),
];

/// Validate and normalize a single field assignment.
///
/// # Errors
///
/// Returns [`ModelError::UnknownField`] or [`ModelError::InvalidValue`].
pub fn validate_field(kind: EntityKind, field: &str, value: &Value) -> Result<Value, ModelError> {
    kind.field(field)?.normalize(value)
}

// =============================================================================
// ENTITY
// =============================================================================

/// One row of any of the four tables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: Uuid,
    pub kind: EntityKind,
    pub parent_id: Option<Uuid>,
    pub created_at: i64,
    pub updated_at: i64,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl Entity {
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.fields.get("name").and_then(Value::as_str)
    }

    /// Render a field as text, `None` when absent or null.
    #[must_use]
    pub fn field_text(&self, field: &str) -> Option<String> {
        value_text(self.fields.get(field)?)
    }
}

/// Text form of a scalar field value.
#[must_use]
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
