use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::debug;

use crate::libs::error::{OrmError, Result};
use crate::libs::orm::Row;
use crate::libs::schema::{ColumnType, TableMetadata};

/// One row of a registered table, held as attribute name → value.
///
/// Values are not checked against the declared column types. A stored
/// `Null` counts as unset when defaults are resolved.
#[derive(Clone)]
pub struct Record<'m> {
    meta: &'m TableMetadata,
    values: Row,
}

impl<'m> Record<'m> {
    pub fn new(meta: &'m TableMetadata) -> Self {
        Self {
            meta,
            values: Row::new(),
        }
    }

    /// Build a record straight from a result row; keys are copied as is.
    ///
    /// Integers stored under a declared boolean field become `true`/`false`,
    /// since MySQL reports computed or widened `BOOLEAN` columns as plain
    /// `TINYINT`.
    pub fn from_row(meta: &'m TableMetadata, mut row: Row) -> Self {
        for (key, value) in row.iter_mut() {
            let declared_bool = meta
                .field(key)
                .is_some_and(|f| f.column_type() == ColumnType::Boolean);
            if !declared_bool {
                continue;
            }
            if let Some(n) = value.as_i64() {
                *value = Value::Bool(n != 0);
            }
        }
        Self { meta, values: row }
    }

    pub fn meta(&self) -> &'m TableMetadata {
        self.meta
    }

    /// Stored value, or [`OrmError::AttributeMissing`].
    pub fn get(&self, key: &str) -> Result<&Value> {
        self.values
            .get(key)
            .ok_or_else(|| OrmError::attribute_missing(key))
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Stored value, `Null` when absent. Defaults are not consulted.
    pub fn get_value(&self, key: &str) -> Value {
        self.values.get(key).cloned().unwrap_or(Value::Null)
    }

    /// Stored value, or the field's default which is then stored so a
    /// factory runs at most once per record.
    pub fn get_value_or_default(&mut self, key: &str) -> Value {
        if let Some(value) = self.values.get(key).filter(|v| !v.is_null()) {
            return value.clone();
        }
        let Some(value) = self
            .meta
            .field(key)
            .and_then(|f| f.default_value().resolve())
        else {
            return Value::Null;
        };
        debug!(key, value = %value, "using default value");
        self.values.insert(key.to_string(), value.clone());
        value
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove_value(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_row(&self) -> &Row {
        &self.values
    }

    pub fn into_row(self) -> Row {
        self.values
    }

    /// Convert into a typed struct through serde.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.values.clone()))?)
    }
}

impl fmt::Debug for Record<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("table", &self.meta.table_name())
            .field("values", &self.values)
            .finish()
    }
}

impl PartialEq for Record<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.meta.table_name() == other.meta.table_name() && self.values == other.values
    }
}

impl Serialize for Record<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.values.serialize(serializer)
    }
}
