// schema.rs
//
// Field descriptors and the registrar that turns them into table metadata
// with precompiled SQL templates.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::libs::error::{OrmError, Result};

/// SQL column type of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Varchar,
    Boolean,
    Int,
    Real,
    Text,
}

impl ColumnType {
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Varchar => "varchar",
            ColumnType::Boolean => "boolean",
            ColumnType::Int => "int",
            ColumnType::Real => "real",
            ColumnType::Text => "text",
        }
    }

    /// Boolean and text columns are never keys.
    pub fn can_be_primary_key(self) -> bool {
        !matches!(self, ColumnType::Boolean | ColumnType::Text)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_type())
    }
}

/// Default applied when a record is saved without a value for the field.
#[derive(Clone, Default)]
pub enum FieldDefault {
    #[default]
    None,
    Value(Value),
    Factory(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl FieldDefault {
    /// Produce the default value, invoking the factory if there is one.
    pub fn resolve(&self) -> Option<Value> {
        match self {
            FieldDefault::None => None,
            FieldDefault::Value(v) => Some(v.clone()),
            FieldDefault::Factory(f) => Some(f()),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, FieldDefault::None)
    }
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDefault::None => f.write_str("None"),
            FieldDefault::Value(v) => f.debug_tuple("Value").field(v).finish(),
            FieldDefault::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// Declaration of a single column.
///
/// ```
/// use minorm::Field;
///
/// let id = Field::integer().primary_key();
/// let name = Field::string().name("user_name");
/// ```
#[derive(Debug, Clone)]
pub struct Field {
    name: Option<String>,
    column_type: ColumnType,
    primary_key: bool,
    default: FieldDefault,
}

impl Field {
    pub fn new(column_type: ColumnType) -> Self {
        Self {
            name: None,
            column_type,
            primary_key: false,
            default: FieldDefault::None,
        }
    }

    /// `varchar` column, no default.
    pub fn string() -> Self {
        Self::new(ColumnType::Varchar)
    }

    /// `boolean` column, defaults to `false`.
    pub fn boolean() -> Self {
        Self::new(ColumnType::Boolean).default(false)
    }

    /// `int` column, defaults to `0`.
    pub fn integer() -> Self {
        Self::new(ColumnType::Int).default(0)
    }

    /// `real` column, defaults to `0.0`.
    pub fn float() -> Self {
        Self::new(ColumnType::Real).default(0.0)
    }

    /// `text` column, no default.
    pub fn text() -> Self {
        Self::new(ColumnType::Text)
    }

    /// `varchar` column filled with a fresh v4 UUID when saved without a value.
    pub fn uuid() -> Self {
        Self::string().default_with(|| Value::String(Uuid::new_v4().to_string()))
    }

    /// Explicit column name; otherwise the attribute name is used.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = FieldDefault::Value(value.into());
        self
    }

    /// Default computed by `factory` each time a record needs one.
    pub fn default_with<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = FieldDefault::Factory(Arc::new(factory));
        self
    }

    pub fn no_default(mut self) -> Self {
        self.default = FieldDefault::None;
        self
    }

    pub fn column_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn default_value(&self) -> &FieldDefault {
        &self.default
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.column_type,
            self.name.as_deref().unwrap_or("<attribute>")
        )
    }
}

/// Declared schema of one record type, consumed by [`Schema::register`].
///
/// ```
/// use minorm::{Field, Schema};
///
/// let users = Schema::new("User")
///     .table("users")
///     .field("id", Field::integer().primary_key())
///     .field("name", Field::string())
///     .register()
///     .unwrap();
///
/// assert_eq!(users.insert_template(), "insert into `users` (`name`, `id`) values (?, ?)");
/// ```
#[derive(Debug, Clone)]
pub struct Schema {
    type_name: String,
    table: Option<String>,
    fields: Vec<(String, Field)>,
}

impl Schema {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            table: None,
            fields: Vec::new(),
        }
    }

    /// Override the table name, which otherwise is the type name.
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table = Some(name.into());
        self
    }

    /// Declare an attribute. Declaration order is column order.
    pub fn field(mut self, attribute: impl Into<String>, field: Field) -> Self {
        self.fields.push((attribute.into(), field));
        self
    }

    /// Validate the declarations and build the table metadata.
    ///
    /// Fails when there is not exactly one primary key, when an attribute is
    /// declared twice, or when a boolean/text column is marked as key.
    pub fn register(self) -> Result<TableMetadata> {
        let table_name = self.table.unwrap_or_else(|| self.type_name.clone());
        info!(model = %self.type_name, table = %table_name, "found model");

        let mut fields_by_name = HashMap::with_capacity(self.fields.len());
        let mut non_key_fields = Vec::new();
        let mut primary_key: Option<String> = None;

        for (attribute, field) in self.fields {
            debug!(attribute = %attribute, field = %field, "found mapping");
            if fields_by_name.contains_key(&attribute) {
                return Err(OrmError::registration(
                    &table_name,
                    format!("duplicate attribute `{attribute}`"),
                ));
            }
            if field.primary_key {
                if !field.column_type.can_be_primary_key() {
                    return Err(OrmError::registration(
                        &table_name,
                        format!(
                            "{} column `{attribute}` cannot be a primary key",
                            field.column_type
                        ),
                    ));
                }
                if let Some(existing) = &primary_key {
                    return Err(OrmError::registration(
                        &table_name,
                        format!("duplicate primary key for field `{attribute}` (already `{existing}`)"),
                    ));
                }
                primary_key = Some(attribute.clone());
            } else {
                non_key_fields.push(attribute.clone());
            }
            fields_by_name.insert(attribute, field);
        }

        let primary_key =
            primary_key.ok_or_else(|| OrmError::registration(&table_name, "primary key not found"))?;

        Ok(TableMetadata::build(
            table_name,
            primary_key,
            non_key_fields,
            fields_by_name,
        ))
    }
}

/// Registered schema plus the four statement templates built from it.
#[derive(Debug, Clone)]
pub struct TableMetadata {
    table_name: String,
    primary_key: String,
    non_key_fields: Vec<String>,
    fields_by_name: HashMap<String, Field>,
    select_template: String,
    insert_template: String,
    update_template: Option<String>,
    delete_template: String,
}

impl TableMetadata {
    fn build(
        table_name: String,
        primary_key: String,
        non_key_fields: Vec<String>,
        fields_by_name: HashMap<String, Field>,
    ) -> Self {
        let column = |attr: &str| -> String {
            fields_by_name
                .get(attr)
                .and_then(|f| f.column_name())
                .unwrap_or(attr)
                .to_string()
        };
        let table = quote_ident(&table_name);
        let pk_column = quote_ident(&column(&primary_key));

        let selected: Vec<String> = std::iter::once(&primary_key)
            .chain(non_key_fields.iter())
            .map(|attr| {
                let col = column(attr);
                if col == *attr {
                    quote_ident(attr)
                } else {
                    format!("{} as {}", quote_ident(&col), quote_ident(attr))
                }
            })
            .collect();
        let select_template = format!("select {} from {}", selected.join(", "), table);

        let inserted: Vec<String> = non_key_fields
            .iter()
            .map(|attr| quote_ident(&column(attr)))
            .chain(std::iter::once(pk_column.clone()))
            .collect();
        let insert_template = format!(
            "insert into {} ({}) values ({})",
            table,
            inserted.join(", "),
            placeholders(inserted.len())
        );

        let update_template = if non_key_fields.is_empty() {
            None
        } else {
            let sets: Vec<String> = non_key_fields
                .iter()
                .map(|attr| format!("{}=?", quote_ident(&column(attr))))
                .collect();
            Some(format!(
                "update {} set {} where {}=?",
                table,
                sets.join(", "),
                pk_column
            ))
        };

        let delete_template = format!("delete from {} where {}=?", table, pk_column);

        Self {
            table_name,
            primary_key,
            non_key_fields,
            fields_by_name,
            select_template,
            insert_template,
            update_template,
            delete_template,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Attribute name of the primary key.
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Non-key attribute names in declaration order.
    pub fn non_key_fields(&self) -> &[String] {
        &self.non_key_fields
    }

    pub fn field(&self, attribute: &str) -> Option<&Field> {
        self.fields_by_name.get(attribute)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields_by_name.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Column backing `attribute`, falling back to the attribute name.
    pub fn column_name<'a>(&'a self, attribute: &'a str) -> &'a str {
        self.field(attribute)
            .and_then(|f| f.column_name())
            .unwrap_or(attribute)
    }

    pub fn select_template(&self) -> &str {
        &self.select_template
    }

    pub fn insert_template(&self) -> &str {
        &self.insert_template
    }

    /// `None` when the table has no columns besides its primary key.
    pub fn update_template(&self) -> Option<&str> {
        self.update_template.as_deref()
    }

    pub fn delete_template(&self) -> &str {
        &self.delete_template
    }
}

/// Backtick-quote a MySQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// `n` comma separated `?` markers.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
