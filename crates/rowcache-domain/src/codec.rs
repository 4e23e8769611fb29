//! Row codec: record to flat string map and back.

use crate::{CacheKey, DomainError, FieldMap, Record, RecordSchema};

/// Converts records to their cached field-map form, driven by a schema.
///
/// Only declared fields take part in either direction. Extra columns on a
/// record and extra keys in a cached map are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowCodec;

impl RowCodec {
    /// Render every declared field of `row` to its canonical string.
    ///
    /// # Errors
    ///
    /// `MissingField` if a declared field is absent from the row or holds a
    /// value of a different type than the schema declares.
    pub fn encode(schema: &RecordSchema, row: &Record) -> Result<FieldMap, DomainError> {
        let mut fields = FieldMap::with_capacity(schema.fields().len());

        for def in schema.fields() {
            let value = row
                .get(&def.name)
                .filter(|v| def.ty.accepts(v))
                .ok_or_else(|| DomainError::MissingField {
                    field: def.name.clone(),
                })?;
            fields.insert(def.name.clone(), value.to_canonical());
        }

        Ok(fields)
    }

    /// Parse a cached map back into a typed record.
    ///
    /// # Errors
    ///
    /// `CorruptEntry` if a declared key is absent or its value does not parse
    /// as the declared type.
    pub fn decode(
        schema: &RecordSchema,
        key: &CacheKey,
        entry: &FieldMap,
    ) -> Result<Record, DomainError> {
        let mut record = Record::new();

        for def in schema.fields() {
            let value = entry
                .get(&def.name)
                .and_then(|raw| def.ty.parse(raw))
                .ok_or_else(|| DomainError::CorruptEntry {
                    key: key.to_string(),
                    field: def.name.clone(),
                })?;
            record.insert(def.name.clone(), value);
        }

        Ok(record)
    }
}
