//! ScyllaDB record source implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeDelta};
use scylla::frame::response::result::{CqlValue, Row};
use scylla::{Session, SessionBuilder};

use super::traits::RecordSource;
use crate::error::{PersistenceError, Result};
use rowcache_domain::{FieldType, FieldValue, Record, RecordSchema};

// =============================================================================
// SCYLLA CONFIGURATION
// =============================================================================

/// ScyllaDB connection configuration.
#[derive(Debug, Clone)]
pub struct ScyllaConfig {
    pub hosts: Vec<String>,
    pub keyspace: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connection_timeout: Duration,
}

impl Default for ScyllaConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["localhost:9042".to_string()],
            keyspace: "hr".to_string(),
            username: None,
            password: None,
            connection_timeout: Duration::from_secs(5),
        }
    }
}

// =============================================================================
// SCYLLA CLIENT
// =============================================================================

/// ScyllaDB client wrapper.
pub struct ScyllaClient {
    session: Arc<Session>,
    pub config: ScyllaConfig,
}

impl ScyllaClient {
    /// Create a new ScyllaDB client.
    pub async fn new(config: ScyllaConfig) -> Result<Self> {
        let mut builder = SessionBuilder::new()
            .known_nodes(&config.hosts)
            .connection_timeout(config.connection_timeout);

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.user(user, pass);
        }

        let session = builder.build().await?;

        // Use keyspace
        session.use_keyspace(&config.keyspace, false).await?;

        Ok(Self {
            session: Arc::new(session),
            config,
        })
    }
}

// =============================================================================
// RECORD SOURCE
// =============================================================================

/// Reads rows of any declared schema from the table named by its namespace.
pub struct ScyllaRecordSource {
    client: Arc<ScyllaClient>,
}

impl ScyllaRecordSource {
    pub fn new(client: Arc<ScyllaClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ScyllaClient {
        &self.client
    }
}

#[async_trait]
impl RecordSource for ScyllaRecordSource {
    async fn query_row(&self, schema: &RecordSchema, id: i64) -> Result<Option<Record>> {
        let query = select_statement(schema, id)?;

        let result = self.client.session.query_unpaged(query, ()).await?;
        let rows = result
            .into_rows_result()
            .map_err(|e| PersistenceError::source_unavailable(e.to_string()))?;
        let row: Option<Row> = rows
            .maybe_first_row::<Row>()
            .map_err(|e| PersistenceError::source_unavailable(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut record = Record::new();
        for (def, column) in schema.fields().iter().zip(row.columns) {
            let Some(value) = column else {
                continue;
            };
            match to_field_value(def.ty, value) {
                Some(v) => record.insert(def.name.clone(), v),
                None => tracing::warn!(
                    table = schema.namespace(),
                    column = %def.name,
                    expected = %def.ty,
                    "Column type does not match declared field type"
                ),
            }
        }

        Ok(Some(record))
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .session
            .query_unpaged("SELECT release_version FROM system.local", ())
            .await?;
        Ok(())
    }
}

/// Build `SELECT <fields> FROM <namespace> WHERE <pk> = <id>`.
///
/// The id is inlined as a literal so the statement works whichever integer
/// width (`int`, `bigint`, `varint`) the key column uses; it is an `i64`,
/// so nothing but digits can reach the statement. Names are checked to be
/// plain identifiers.
fn select_statement(schema: &RecordSchema, id: i64) -> Result<String> {
    for name in std::iter::once(schema.namespace()).chain(schema.field_names()) {
        if !is_identifier(name) {
            return Err(PersistenceError::InvalidQuery(format!(
                "'{name}' is not a valid CQL identifier"
            )));
        }
    }

    let columns = schema.field_names().collect::<Vec<_>>().join(", ");
    Ok(format!(
        "SELECT {columns} FROM {} WHERE {} = {id}",
        schema.namespace(),
        schema.primary_key()
    ))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Convert a CQL cell into the declared field type, widening where lossless.
fn to_field_value(ty: FieldType, value: CqlValue) -> Option<FieldValue> {
    match (ty, value) {
        (FieldType::Integer, CqlValue::TinyInt(v)) => Some(FieldValue::Integer(v.into())),
        (FieldType::Integer, CqlValue::SmallInt(v)) => Some(FieldValue::Integer(v.into())),
        (FieldType::Integer, CqlValue::Int(v)) => Some(FieldValue::Integer(v.into())),
        (FieldType::Integer, CqlValue::BigInt(v)) => Some(FieldValue::Integer(v)),
        (FieldType::Integer, CqlValue::Counter(c)) => Some(FieldValue::Integer(c.0)),

        (FieldType::Text, CqlValue::Text(v) | CqlValue::Ascii(v)) => Some(FieldValue::Text(v)),

        // NaN and infinities have no fixed-point text; the codec reports them
        // as missing.
        (FieldType::Decimal, CqlValue::Double(v)) => finite(v),
        (FieldType::Decimal, CqlValue::Float(v)) => finite(v.into()),
        (FieldType::Decimal, CqlValue::Int(v)) => Some(FieldValue::Decimal(v.into())),
        (FieldType::Decimal, CqlValue::Decimal(d)) => {
            let (bytes, scale) = d.as_signed_be_bytes_slice_and_exponent();
            decimal_to_f64(bytes, scale).and_then(finite)
        }

        (FieldType::Date, CqlValue::Date(d)) => date_from_cql(d.0).map(FieldValue::Date),
        (FieldType::Date, CqlValue::Timestamp(ts)) => DateTime::from_timestamp_millis(ts.0)
            .map(|t| FieldValue::Date(t.date_naive())),

        (FieldType::Timestamp, CqlValue::Timestamp(ts)) => DateTime::from_timestamp_millis(ts.0)
            .map(|t| FieldValue::Timestamp(t.naive_utc())),

        _ => None,
    }
}

fn finite(v: f64) -> Option<FieldValue> {
    v.is_finite().then_some(FieldValue::Decimal(v))
}

/// CQL `date` counts days with the Unix epoch at 2^31.
fn date_from_cql(days: u32) -> Option<NaiveDate> {
    let offset = i64::from(days) - (1_i64 << 31);
    NaiveDate::from_ymd_opt(1970, 1, 1)?.checked_add_signed(TimeDelta::try_days(offset)?)
}

/// Big-endian two's complement unscaled value and scale to `f64`.
fn decimal_to_f64(bytes: &[u8], scale: i32) -> Option<f64> {
    if bytes.is_empty() || bytes.len() > 16 {
        return None;
    }
    let fill = if bytes[0] & 0x80 == 0 { 0x00 } else { 0xff };
    let mut buf = [fill; 16];
    buf[16 - bytes.len()..].copy_from_slice(bytes);
    let unscaled = i128::from_be_bytes(buf);

    // Parsing the scientific form rounds once, correctly.
    format!("{unscaled}e{}", -i64::from(scale)).parse().ok()
}
