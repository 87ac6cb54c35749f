//! Dynamically typed column values produced by [Postgres::query](crate::postgres::Postgres::query).

use crate::error::Error;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use postgres::types::{FromSql, Type};
use postgres::{Row, SimpleQueryMessage};
use serde::Serialize;
use std::collections::HashMap;

/// One result row: column name to value.
pub type RowMap = HashMap<String, Value>;

/// A single column value as surfaced by the driver.
///
/// Text-like columns (`text`, `varchar`, `name`, `json`, ...) arrive as [Value::Bytes] holding
/// the raw column bytes; use [Value::as_str] to view them as a string. Column types without a
/// dedicated variant (`numeric`, `uuid`, arrays, ...) also arrive as [Value::Bytes], in the
/// driver's binary encoding.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// The bytes of a [Value::Bytes] as UTF-8, if they are valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(v) => Some(*v),
            _ => None,
        }
    }
}

/// Column bytes exactly as the server sent them.
struct RawBytes(Vec<u8>);

impl<'a> FromSql<'a> for RawBytes {
    fn from_sql(
        _ty: &Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(RawBytes(raw.to_vec()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn get<'a, T>(row: &'a Row, idx: usize) -> Result<Option<T>, postgres::Error>
where
    T: FromSql<'a>,
{
    row.try_get::<_, Option<T>>(idx)
}

/// Decode column `idx` of `row` into a [Value] following the driver's native type mapping.
pub(crate) fn decode_column(row: &Row, idx: usize) -> Result<Value, Error> {
    let column = &row.columns()[idx];
    let ty = column.type_();

    let decoded = match ty {
        t if *t == Type::BOOL => get::<bool>(row, idx).map(|v| v.map(Value::Bool)),
        t if *t == Type::CHAR => get::<i8>(row, idx).map(|v| v.map(|v| Value::Int(v.into()))),
        t if *t == Type::INT2 => get::<i16>(row, idx).map(|v| v.map(|v| Value::Int(v.into()))),
        t if *t == Type::INT4 => get::<i32>(row, idx).map(|v| v.map(|v| Value::Int(v.into()))),
        t if *t == Type::INT8 => get::<i64>(row, idx).map(|v| v.map(Value::Int)),
        t if *t == Type::OID => get::<u32>(row, idx).map(|v| v.map(|v| Value::Int(v.into()))),
        t if *t == Type::FLOAT4 => {
            get::<f32>(row, idx).map(|v| v.map(|v| Value::Float(v.into())))
        }
        t if *t == Type::FLOAT8 => get::<f64>(row, idx).map(|v| v.map(Value::Float)),
        t if *t == Type::TEXT
            || *t == Type::VARCHAR
            || *t == Type::BPCHAR
            || *t == Type::NAME
            || *t == Type::UNKNOWN
            || *t == Type::BYTEA
            || *t == Type::JSON
            || *t == Type::XML =>
        {
            get::<RawBytes>(row, idx).map(|v| v.map(|b| Value::Bytes(b.0)))
        }
        // binary jsonb is prefixed with a format version byte
        t if *t == Type::JSONB => get::<RawBytes>(row, idx).map(|v| {
            v.map(|RawBytes(mut bytes)| {
                if bytes.first() == Some(&1) {
                    bytes.remove(0);
                }
                Value::Bytes(bytes)
            })
        }),
        t if *t == Type::TIMESTAMPTZ => {
            get::<DateTime<Utc>>(row, idx).map(|v| v.map(Value::Timestamp))
        }
        t if *t == Type::TIMESTAMP => {
            get::<NaiveDateTime>(row, idx).map(|v| v.map(|v| Value::Timestamp(v.and_utc())))
        }
        t if *t == Type::DATE => get::<NaiveDate>(row, idx)
            .map(|v| v.map(|v| Value::Timestamp(v.and_time(NaiveTime::MIN).and_utc()))),
        // numeric, uuid, interval, arrays, ...: raw driver bytes
        _ => get::<RawBytes>(row, idx).map(|v| v.map(|b| Value::Bytes(b.0))),
    };

    decoded
        .map(|v| v.unwrap_or(Value::Null))
        .map_err(|e| Error::Decode {
            column: column.name().to_string(),
            message: format!("{} (type '{}')", e, ty.name()),
        })
}

/// Decode every column of `row` into a [RowMap].
pub(crate) fn decode_row(row: &Row) -> Result<RowMap, Error> {
    let mut result = RowMap::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, idx)?;

        #[cfg(feature = "tracing")]
        tracing::trace!(key = column.name(), value = ?value, "added result");

        result.insert(column.name().to_string(), value);
    }
    Ok(result)
}

/// Decode the rows of a simple-protocol query. Every cell is text on this protocol, so each
/// value is either [Value::Bytes] or [Value::Null]. Rows of all statements are concatenated.
pub(crate) fn decode_simple_rows(messages: &[SimpleQueryMessage]) -> Vec<RowMap> {
    messages
        .iter()
        .filter_map(|message| match message {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .map(|row| {
            row.columns()
                .iter()
                .enumerate()
                .map(|(idx, column)| {
                    let value = row
                        .get(idx)
                        .map_or(Value::Null, |text| Value::Bytes(text.as_bytes().to_vec()));
                    (column.name().to_string(), value)
                })
                .collect()
        })
        .collect()
}
