//! # Row Cache - Domain Model
//!
//! Record schemas, field values, cache keys and the row codec shared by the
//! persistence layer and the CLI. Nothing in this crate performs I/O.
//!
//! A [`Record`] is a row from the system of record, described by a
//! [`RecordSchema`]. The cached form of a record is a flat [`FieldMap`]
//! stored under a [`CacheKey`] of the form `"<namespace>:<id>"`.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

pub mod codec;

pub use codec::RowCodec;

/// Canonical text layout for [`FieldType::Date`] values
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Canonical text layout for [`FieldType::Timestamp`] values
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Cached projection of a record: field name to canonical string
pub type FieldMap = HashMap<String, String>;

// =============================================================================
// FIELD TYPES & VALUES
// =============================================================================

/// Primitive column types a schema can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    Integer,
    Text,
    Decimal,
    Date,
    Timestamp,
}

impl FieldType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Text => "TEXT",
            Self::Decimal => "DECIMAL",
            Self::Date => "DATE",
            Self::Timestamp => "TIMESTAMP",
        }
    }

    /// Whether a value has the shape this type declares.
    ///
    /// NaN and infinite decimals have no fixed-point form and are refused.
    #[must_use]
    pub const fn accepts(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (Self::Decimal, FieldValue::Decimal(v)) => v.is_finite(),
            (Self::Integer, FieldValue::Integer(_))
            | (Self::Text, FieldValue::Text(_))
            | (Self::Date, FieldValue::Date(_))
            | (Self::Timestamp, FieldValue::Timestamp(_)) => true,
            _ => false,
        }
    }

    /// Parse a canonical string back into a value of this type
    #[must_use]
    pub fn parse(&self, raw: &str) -> Option<FieldValue> {
        match self {
            Self::Integer => raw.parse().ok().map(FieldValue::Integer),
            Self::Text => Some(FieldValue::Text(raw.to_string())),
            Self::Decimal => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(FieldValue::Decimal),
            Self::Date => NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .ok()
                .map(FieldValue::Date),
            Self::Timestamp => NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
                .ok()
                .map(FieldValue::Timestamp),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single typed column value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldValue {
    Integer(i64),
    Text(String),
    Decimal(f64),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl FieldValue {
    /// Canonical cache representation.
    ///
    /// Decimals use the shortest fixed-point text that parses back to the
    /// same `f64`; `Display` for floats never emits exponent notation. A
    /// non-finite decimal renders as `NaN`/`inf`, which is why
    /// [`FieldType::accepts`] keeps such values out of encoded rows.
    #[must_use]
    pub fn to_canonical(&self) -> String {
        match self {
            Self::Integer(v) => v.to_string(),
            Self::Text(v) => v.clone(),
            Self::Decimal(v) => v.to_string(),
            Self::Date(v) => v.format(DATE_FORMAT).to_string(),
            Self::Timestamp(v) => v.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical())
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Decimal(v)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveDateTime> for FieldValue {
    fn from(v: NaiveDateTime) -> Self {
        Self::Timestamp(v)
    }
}

// =============================================================================
// SCHEMA
// =============================================================================

/// A declared column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub ty: FieldType,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Ordered field layout of one record type.
///
/// The namespace doubles as the source table name and the cache key prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    namespace: String,
    primary_key: String,
    fields: Vec<FieldDef>,
}

impl RecordSchema {
    /// Build a schema, checking that field names are unique and that the
    /// primary key is a declared integer column.
    pub fn new(
        namespace: impl Into<String>,
        primary_key: impl Into<String>,
        fields: Vec<FieldDef>,
    ) -> Result<Self, DomainError> {
        let namespace = namespace.into();
        let primary_key = primary_key.into();

        if namespace.trim().is_empty() {
            return Err(DomainError::Schema("namespace must not be empty".into()));
        }
        if fields.is_empty() {
            return Err(DomainError::Schema(format!(
                "schema '{namespace}' declares no fields"
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for def in &fields {
            if !seen.insert(def.name.as_str()) {
                return Err(DomainError::Schema(format!(
                    "duplicate field '{}' in schema '{namespace}'",
                    def.name
                )));
            }
        }

        match fields.iter().find(|f| f.name == primary_key) {
            Some(def) if def.ty == FieldType::Integer => {}
            Some(def) => {
                return Err(DomainError::Schema(format!(
                    "primary key '{primary_key}' must be INTEGER, found {}",
                    def.ty
                )));
            }
            None => {
                return Err(DomainError::Schema(format!(
                    "primary key '{primary_key}' is not a declared field"
                )));
            }
        }

        Ok(Self {
            namespace,
            primary_key,
            fields,
        })
    }

    /// The `emp` table layout used by the demonstration data set
    #[must_use]
    pub fn employee() -> Self {
        let fields = vec![
            FieldDef::new("empno", FieldType::Integer),
            FieldDef::new("fname", FieldType::Text),
            FieldDef::new("lname", FieldType::Text),
            FieldDef::new("job", FieldType::Text),
            FieldDef::new("mgr", FieldType::Integer),
            FieldDef::new("hiredate", FieldType::Date),
            FieldDef::new("sal", FieldType::Decimal),
            FieldDef::new("comm", FieldType::Decimal),
            FieldDef::new("dept", FieldType::Integer),
        ];

        Self {
            namespace: "emp".to_string(),
            primary_key: "empno".to_string(),
            fields,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Cache key for a record id in this schema's namespace
    pub fn cache_key(&self, id: i64) -> Result<CacheKey, DomainError> {
        CacheKey::new(&self.namespace, id)
    }
}

// =============================================================================
// RECORD
// =============================================================================

/// One row read from the system of record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    values: BTreeMap<String, FieldValue>,
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    /// Primary key value according to `schema`
    pub fn id(&self, schema: &RecordSchema) -> Option<i64> {
        self.get(schema.primary_key()).and_then(FieldValue::as_integer)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

// =============================================================================
// CACHE KEY
// =============================================================================

/// Cache address of one record: `"<namespace>:<id>"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    namespace: String,
    id: i64,
}

impl CacheKey {
    /// Derive the key for `id` within `namespace`.
    ///
    /// Rejects negative ids and blank namespaces before any I/O happens.
    pub fn new(namespace: &str, id: i64) -> Result<Self, DomainError> {
        if namespace.trim().is_empty() {
            return Err(DomainError::InvalidId {
                namespace: namespace.to_string(),
                id,
                reason: "namespace is empty",
            });
        }
        if id < 0 {
            return Err(DomainError::InvalidId {
                namespace: namespace.to_string(),
                id,
                reason: "id is negative",
            });
        }

        Ok(Self {
            namespace: namespace.to_string(),
            id,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub const fn id(&self) -> i64 {
        self.id
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.id)
    }
}

impl FromStr for CacheKey {
    type Err = DomainError;

    // Split on the last ':' so namespaces may themselves contain ':'.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, id) = s
            .rsplit_once(':')
            .ok_or_else(|| DomainError::InvalidKey(s.to_string()))?;
        let id: i64 = id
            .parse()
            .map_err(|_| DomainError::InvalidKey(s.to_string()))?;

        // Only the canonical rendering of an id is accepted ("+1" or "01" would
        // alias "emp:1").
        if id.to_string() != s[namespace.len() + 1..] {
            return Err(DomainError::InvalidKey(s.to_string()));
        }

        Self::new(namespace, id)
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Domain-level errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("Invalid id {id} for namespace '{namespace}': {reason}")]
    InvalidId {
        namespace: String,
        id: i64,
        reason: &'static str,
    },

    #[error("Record is missing declared field '{field}'")]
    MissingField { field: String },

    #[error("Cache entry {key} is corrupt at field '{field}'")]
    CorruptEntry { key: String, field: String },

    #[error("Malformed cache key: {0}")]
    InvalidKey(String),

    #[error("Invalid schema: {0}")]
    Schema(String),
}
