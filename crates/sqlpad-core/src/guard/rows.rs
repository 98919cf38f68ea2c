//! Conversion of simple-query (text format) rows into JSON rows.

use serde_json::{Number, Value};
use sqlx::postgres::PgRow;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

use super::outcome::Row;

/// Convert a text-format row into an ordered column -> value map.
pub(crate) fn row_to_json(row: &PgRow) -> Result<Row, sqlx::Error> {
    let mut out = Row::with_capacity(row.columns().len());
    for (idx, column) in row.columns().iter().enumerate() {
        let is_null = row.try_get_raw(idx)?.is_null();
        let value = if is_null {
            Value::Null
        } else {
            let text: String = row.try_get_unchecked(idx)?;
            decode_text(column.type_info().name(), text)
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

/// Map a text-encoded value to JSON based on its Postgres type name.
///
/// Numerics with arbitrary precision stay strings so no digits are lost.
pub(crate) fn decode_text(type_name: &str, text: String) -> Value {
    match type_name {
        "BOOL" => Value::Bool(text == "t"),
        "INT2" | "INT4" | "INT8" | "OID" => text
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or(Value::String(text)),
        "FLOAT4" | "FLOAT8" => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::String(text)),
        "JSON" | "JSONB" => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        _ => Value::String(text),
    }
}
