//! Schema → backend shape builder.
//!
//! At registration every schema field is resolved into a SQL column, a
//! search-index mapping, and a wire ⇄ storage codec. A field that resolves
//! to none of these fails registration.

use serde_json::{json, Map, Value};

use crate::error::{DriverError, DriverResult, RegistryError};
use crate::schema::{snake_case, FieldDef, FieldKind, SchemaDescriptor, SchemaInfo};

/// Internal search-index field used by the search tier's retention job.
/// Never returned to clients.
pub const RETENTION_FIELD: &str = "_expireAt";

/// How a field's wire value is rendered into a SQL literal and read back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnCodec {
    /// Bare literal (numbers, booleans).
    Identity,
    /// Single-quoted text literal (strings, UUIDs, datetimes).
    Quote,
    /// JSON-encode then quote (objects and lists); parsed back on load.
    Json,
}

impl ColumnCodec {
    /// Render a wire value as a SQL literal.
    pub fn dump(&self, value: &Value) -> DriverResult<String> {
        if value.is_null() {
            return Ok("NULL".to_string());
        }
        match self {
            ColumnCodec::Identity => match value {
                Value::Number(n) => Ok(n.to_string()),
                Value::Bool(b) => Ok(b.to_string()),
                other => Err(DriverError::Lookup(format!(
                    "expected a bare scalar, got {other}"
                ))),
            },
            ColumnCodec::Quote => match value {
                Value::String(s) => Ok(quote(s)),
                Value::Number(n) => Ok(quote(&n.to_string())),
                Value::Bool(b) => Ok(quote(&b.to_string())),
                other => Err(DriverError::Lookup(format!(
                    "expected a scalar, got {other}"
                ))),
            },
            ColumnCodec::Json => {
                let encoded = serde_json::to_string(value)?;
                Ok(quote(&encoded))
            }
        }
    }

    /// Convert a stored value back into its wire form.
    pub fn load(&self, raw: &Value) -> DriverResult<Value> {
        match self {
            ColumnCodec::Identity | ColumnCodec::Quote => Ok(raw.clone()),
            ColumnCodec::Json => match raw {
                Value::String(s) => Ok(serde_json::from_str(s)?),
                other => Ok(other.clone()),
            },
        }
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// One derived SQL column.
#[derive(Clone, Debug)]
pub struct ColumnDef {
    /// snake_cased column name.
    pub name: String,
    /// Original wire field name.
    pub field: String,
    pub sql_type: &'static str,
    pub primary_key: bool,
    pub codec: ColumnCodec,
    /// Whether the column holds free text and filters through `tsquery`.
    pub text_search: bool,
}

fn column_for(field: &FieldDef, sref: &str) -> Result<ColumnDef, RegistryError> {
    let (sql_type, codec, text_search) = match &field.kind {
        FieldKind::Text => ("TEXT", ColumnCodec::Quote, true),
        FieldKind::Keyword => ("TEXT", ColumnCodec::Quote, false),
        FieldKind::Integer => ("INTEGER", ColumnCodec::Identity, false),
        FieldKind::Float => ("DOUBLE PRECISION", ColumnCodec::Identity, false),
        FieldKind::Boolean => ("BOOL", ColumnCodec::Identity, false),
        FieldKind::Uuid => ("TEXT", ColumnCodec::Quote, false),
        FieldKind::DateTime => ("TEXT", ColumnCodec::Quote, false),
        FieldKind::Object(_) | FieldKind::ObjectList(_) => ("TEXT", ColumnCodec::Json, false),
        FieldKind::ScalarList(inner) => {
            if !inner.is_scalar() {
                return Err(RegistryError::Unmappable {
                    sref: sref.to_string(),
                    field: field.name.clone(),
                });
            }
            ("TEXT", ColumnCodec::Json, false)
        }
    };
    Ok(ColumnDef {
        name: snake_case(&field.name),
        field: field.name.clone(),
        sql_type,
        primary_key: field.name == "id",
        codec,
        text_search,
    })
}

/// Derive the SQL column list for a schema. Fails on any unmappable field.
pub fn build_columns(
    descriptor: &SchemaDescriptor,
    sref: &str,
) -> Result<Vec<ColumnDef>, RegistryError> {
    descriptor
        .fields()
        .iter()
        .map(|field| column_for(field, sref))
        .collect()
}

fn mapping_for(kind: &FieldKind, name: &str, sref: &str) -> Result<Value, RegistryError> {
    let mapping = match kind {
        FieldKind::Text => json!({ "type": "text" }),
        FieldKind::Keyword | FieldKind::Uuid => json!({ "type": "keyword" }),
        FieldKind::Integer => json!({ "type": "long" }),
        FieldKind::Float => json!({ "type": "double" }),
        FieldKind::Boolean => json!({ "type": "boolean" }),
        FieldKind::DateTime => json!({ "type": "date" }),
        FieldKind::Object(fields) => json!({ "properties": properties(fields, sref)? }),
        FieldKind::ScalarList(inner) => {
            if !inner.is_scalar() {
                return Err(RegistryError::Unmappable {
                    sref: sref.to_string(),
                    field: name.to_string(),
                });
            }
            json!({ "type": "keyword" })
        }
        FieldKind::ObjectList(fields) => {
            json!({ "type": "nested", "properties": properties(fields, sref)? })
        }
    };
    Ok(mapping)
}

fn properties(fields: &[FieldDef], sref: &str) -> Result<Map<String, Value>, RegistryError> {
    let mut props = Map::new();
    for field in fields {
        props.insert(field.name.clone(), mapping_for(&field.kind, &field.name, sref)?);
    }
    Ok(props)
}

/// Derive the search-index mapping for a schema. The mapping always carries
/// the internal retention field.
pub fn build_mapping(descriptor: &SchemaDescriptor, sref: &str) -> Result<Value, RegistryError> {
    let mut props = properties(descriptor.fields(), sref)?;
    props.insert(RETENTION_FIELD.to_string(), json!({ "type": "long" }));
    Ok(json!({ "properties": Value::Object(props) }))
}

/// Remove the internal retention field from an entity before it leaves the
/// search tier.
pub fn strip_retention(value: &mut Value) {
    if let Value::Object(map) = value {
        map.remove(RETENTION_FIELD);
    }
}

/// Render the CREATE TABLE statement for a schema's table.
pub fn create_table_sql(schema: &SchemaInfo) -> String {
    let columns: Vec<String> = schema
        .database
        .columns
        .iter()
        .map(|col| {
            if col.primary_key {
                format!("{} {} PRIMARY KEY", col.name, col.sql_type)
            } else {
                format!("{} {}", col.name, col.sql_type)
            }
        })
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        schema.dref,
        columns.join(", ")
    )
}

/// Render one entity as a SQL literal row, ordered by the column list.
pub fn dump_row(columns: &[ColumnDef], model: &Value) -> DriverResult<Vec<String>> {
    let object = model
        .as_object()
        .ok_or_else(|| DriverError::Lookup("entity is not a JSON object".into()))?;
    columns
        .iter()
        .map(|col| {
            let value = object.get(&col.field).unwrap_or(&Value::Null);
            col.codec.dump(value)
        })
        .collect()
}
