//! Conversion of MySQL result columns into JSON values.
//!
//! The reader is picked from the type name the server reports for each
//! column, so `TINYINT(1)` comes back as a boolean and `DECIMAL` aggregates
//! as numbers instead of falling through to `NULL`.

use base64::{Engine as _, engine::general_purpose};
use serde_json::{Number, Value};
use sqlx::mysql::MySqlRow;
use sqlx::mysql::types::MySqlTime;
use sqlx::{Column, Row as _, TypeInfo};

use crate::libs::error::{OrmError, Result};

/// Digits an `f64` carries without rounding.
const F64_DIGITS: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColumnKind {
    Null,
    Bool,
    Signed,
    Unsigned,
    Float,
    Decimal,
    Bit,
    Date,
    DateTime,
    Time,
    Text,
    Json,
    Bytes,
}

impl ColumnKind {
    /// Kind for a sqlx type name; `None` for types rows cannot carry.
    pub(crate) fn from_type_name(name: &str) -> Option<Self> {
        let kind = match name {
            "NULL" => Self::Null,
            "BOOLEAN" => Self::Bool,
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => Self::Signed,
            "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
            | "BIGINT UNSIGNED" | "YEAR" => Self::Unsigned,
            "FLOAT" | "DOUBLE" => Self::Float,
            "DECIMAL" => Self::Decimal,
            "BIT" => Self::Bit,
            "DATE" => Self::Date,
            "DATETIME" | "TIMESTAMP" => Self::DateTime,
            "TIME" => Self::Time,
            "CHAR" | "VARCHAR" | "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM"
            | "SET" => Self::Text,
            "JSON" => Self::Json,
            "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
                Self::Bytes
            }
            _ => return None,
        };
        Some(kind)
    }
}

/// Read column `index` of `row`.
///
/// Fails with [`OrmError::UnsupportedColumn`] for types such as `GEOMETRY`.
pub(crate) fn decode_column(row: &MySqlRow, index: usize) -> Result<Value> {
    let column = &row.columns()[index];
    let type_name = column.type_info().name();
    let kind = ColumnKind::from_type_name(type_name)
        .ok_or_else(|| OrmError::unsupported_column(column.name(), type_name))?;

    // type name already matched; sqlx's own compatibility rules reject YEAR
    // and BIT as integers, hence the unchecked getters
    let value = match kind {
        ColumnKind::Null => Value::Null,
        ColumnKind::Bool => row
            .try_get_unchecked::<Option<bool>, _>(index)?
            .map_or(Value::Null, Value::Bool),
        ColumnKind::Signed => row
            .try_get_unchecked::<Option<i64>, _>(index)?
            .map_or(Value::Null, Value::from),
        ColumnKind::Unsigned => row
            .try_get_unchecked::<Option<u64>, _>(index)?
            .map_or(Value::Null, Value::from),
        ColumnKind::Float => row
            .try_get_unchecked::<Option<f64>, _>(index)?
            .map_or(Value::Null, Value::from),
        ColumnKind::Time => row
            .try_get::<Option<MySqlTime>, _>(index)?
            .map_or(Value::Null, |t| Value::String(t.to_string())),
        _ => match row.try_get_unchecked::<Option<&[u8]>, _>(index)? {
            Some(raw) => raw_to_json(kind, raw)?,
            None => Value::Null,
        },
    };
    Ok(value)
}

/// Convert the bytes of a column sent as a length-encoded string.
///
/// These kinds arrive in the same shape from text and prepared statements,
/// except dates which the binary protocol packs into a length-prefixed
/// struct.
pub(crate) fn raw_to_json(kind: ColumnKind, raw: &[u8]) -> Result<Value> {
    match kind {
        ColumnKind::Decimal => Ok(decimal_to_json(&String::from_utf8_lossy(raw))),
        ColumnKind::Bit => Ok(Value::from(
            raw.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)),
        )),
        ColumnKind::Date => temporal_to_json(raw, false),
        ColumnKind::DateTime => temporal_to_json(raw, true),
        ColumnKind::Text => Ok(Value::String(String::from_utf8_lossy(raw).into_owned())),
        ColumnKind::Json => Ok(serde_json::from_slice(raw)?),
        ColumnKind::Bytes => Ok(Value::String(general_purpose::STANDARD.encode(raw))),
        other => Err(malformed(format!("{other:?} columns are not sent as strings"))),
    }
}

/// Integers stay exact; fractions become floats while an `f64` holds every
/// digit, otherwise the text is kept.
pub(crate) fn decimal_to_json(text: &str) -> Value {
    let text = text.trim();
    if !text.contains(['.', 'e', 'E']) {
        if let Ok(n) = text.parse::<i64>() {
            return Value::from(n);
        }
        if let Ok(n) = text.parse::<u64>() {
            return Value::from(n);
        }
    }

    let significant = text
        .trim_end_matches('0')
        .trim_end_matches('.')
        .bytes()
        .skip_while(|b| matches!(*b, b'-' | b'+' | b'0' | b'.'))
        .filter(u8::is_ascii_digit)
        .count();
    if significant <= F64_DIGITS {
        if let Some(n) = text.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(text.to_string())
}

/// `DATE`, `DATETIME` and `TIMESTAMP` as `YYYY-MM-DD[ HH:MM:SS[.ffffff]]`.
pub(crate) fn temporal_to_json(raw: &[u8], with_time: bool) -> Result<Value> {
    let Some((&len, body)) = raw.split_first() else {
        return Err(malformed("empty date value"));
    };
    if len.is_ascii_digit() {
        return Ok(Value::String(String::from_utf8_lossy(raw).into_owned()));
    }
    if !matches!(len, 0 | 4 | 7 | 11) || body.len() != usize::from(len) {
        return Err(malformed(format!("date value of {} byte(s)", raw.len())));
    }

    let (date, time) = body.split_at(body.len().min(4));
    let (year, month, day) = match date {
        [y0, y1, month, day] => (u16::from_le_bytes([*y0, *y1]), *month, *day),
        _ => (0, 0, 0),
    };
    let mut text = format!("{year:04}-{month:02}-{day:02}");
    if with_time {
        let (hour, minute, second, micros) = match time {
            [h, m, s] => (*h, *m, *s, 0),
            [h, m, s, u0, u1, u2, u3] => (*h, *m, *s, u32::from_le_bytes([*u0, *u1, *u2, *u3])),
            _ => (0, 0, 0, 0),
        };
        text.push_str(&format!(" {hour:02}:{minute:02}:{second:02}"));
        if micros > 0 {
            text.push_str(&format!(".{micros:06}"));
        }
    }
    Ok(Value::String(text))
}

fn malformed(reason: impl Into<String>) -> OrmError {
    let reason: String = reason.into();
    OrmError::Engine(sqlx::Error::Decode(reason.into()))
}
