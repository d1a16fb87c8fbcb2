//! Row materialization
//!
//! Result rows are first decoded column by column into [`Value`]s using the
//! driver's column type metadata, collected into a [`Record`] per row, and
//! then reshaped into the caller's type through a `serde_json` document.
//! The document hop lets any `Deserialize` type be a destination without
//! per-type scanning code.
//!
//! Two entry points pick the destination shape at compile time:
//! [`Rows::one`] for a single record and [`Rows::all`] for a collection.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::de::DeserializeOwned;
use sqlx::postgres::types::{Oid, PgInterval};
use sqlx::postgres::{PgRow, PgTypeKind};
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use uuid::Uuid;

use crate::error::{OrmError, Result};
use crate::value::Value;

/// Generic document form of one row
pub type Document = serde_json::Map<String, serde_json::Value>;

/// One decoded result row, columns kept in select order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column value
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.push((column.into(), value.into()));
        self
    }

    /// Decode every column of a driver row
    pub fn from_row(row: &PgRow) -> Result<Self> {
        let columns = row
            .columns()
            .iter()
            .map(|column| Ok((column.name().to_string(), decode_column(row, column.ordinal())?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns })
    }

    /// Value of the named column; the last one wins for duplicated names
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .rev()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn to_document(&self) -> Document {
        self.columns
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect()
    }

    /// Reshape this record into `T`
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(serde_json::Value::Object(self.to_document()))
            .map_err(OrmError::ShapeMismatch)
    }
}

/// Materialize the first record, failing with `NotFound` when there is none
pub fn materialize_one<T: DeserializeOwned>(records: &[Record]) -> Result<T> {
    records
        .first()
        .ok_or_else(|| OrmError::not_found("query returned no rows"))?
        .decode()
}

/// Materialize every record as one collection document
pub fn materialize_all<T: DeserializeOwned>(records: &[Record]) -> Result<Vec<T>> {
    let documents = records
        .iter()
        .map(|record| serde_json::Value::Object(record.to_document()))
        .collect();
    serde_json::from_value(serde_json::Value::Array(documents)).map_err(OrmError::ShapeMismatch)
}

/// Result rows returned by a query, ready to be materialized
#[derive(Default)]
pub struct Rows {
    rows: Vec<PgRow>,
}

impl std::fmt::Debug for Rows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rows").field("len", &self.rows.len()).finish()
    }
}

impl Rows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Decode all rows into records
    pub fn records(&self) -> Result<Vec<Record>> {
        self.rows.iter().map(Record::from_row).collect()
    }

    /// Materialize the first row into `T`
    ///
    /// Fails with [`OrmError::NotFound`] when there are no rows and with
    /// [`OrmError::ShapeMismatch`] when the row does not fit `T`.
    pub fn one<T: DeserializeOwned>(&self) -> Result<T> {
        let first = self
            .rows
            .first()
            .ok_or_else(|| OrmError::not_found("query returned no rows"))?;
        Record::from_row(first)?.decode()
    }

    /// Materialize every row into a `Vec<T>`
    ///
    /// Any decoding failure discards the whole result.
    pub fn all<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        materialize_all(&self.records()?)
    }

    pub fn into_inner(self) -> Vec<PgRow> {
        self.rows
    }
}

impl From<Vec<PgRow>> for Rows {
    fn from(rows: Vec<PgRow>) -> Self {
        Self { rows }
    }
}

/// Decode a single column using its Postgres type name
///
/// Enum columns are sent as their label and go through
/// [`Value::coerce_raw`]. Any other type without a dedicated arm is a
/// decode error rather than a guess at its binary wire form.
pub fn decode_column(row: &PgRow, index: usize) -> Result<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let type_info = row.column(index).type_info();
    let value = match type_info.name() {
        "BOOL" => Value::Bool(row.try_get(index)?),
        "INT2" => Value::Integer(row.try_get::<i16, _>(index)?.into()),
        "INT4" => Value::Integer(row.try_get::<i32, _>(index)?.into()),
        "INT8" => Value::Integer(row.try_get(index)?),
        "OID" => Value::Integer(row.try_get::<Oid, _>(index)?.0.into()),
        "FLOAT4" => Value::Float(row.try_get::<f32, _>(index)?.into()),
        "FLOAT8" => Value::Float(row.try_get(index)?),
        "NUMERIC" => match row.try_get::<Decimal, _>(index) {
            Ok(decimal) => decimal_value(decimal),
            // NaN, infinities and values beyond Decimal's range
            Err(_) => {
                let bytes = raw.as_bytes().map_err(sqlx::Error::Decode)?;
                Value::Text(numeric_text(bytes).ok_or_else(|| unsupported(row, index))?)
            }
        },
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" => Value::Text(row.try_get(index)?),
        "UUID" => Value::Uuid(row.try_get(index)?),
        "JSON" | "JSONB" => Value::Json(row.try_get(index)?),
        "TIMESTAMPTZ" => Value::Timestamp(row.try_get(index)?),
        "TIMESTAMP" => Value::NaiveTimestamp(row.try_get(index)?),
        "DATE" => Value::Text(row.try_get::<NaiveDate, _>(index)?.to_string()),
        "TIME" => Value::Text(row.try_get::<NaiveTime, _>(index)?.to_string()),
        "INTERVAL" => Value::Text(interval_text(&row.try_get::<PgInterval, _>(index)?)),
        "INET" | "CIDR" => {
            let network: IpNetwork = row.try_get(index)?;
            Value::Text(network_text(&network, type_info.name() == "CIDR"))
        }
        "BYTEA" => Value::Bytes(row.try_get(index)?),
        "VOID" => Value::Null,
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => Value::TextArray(row.try_get(index)?),
        "INT2[]" => json_array(row.try_get::<Vec<i16>, _>(index)?),
        "INT4[]" => json_array(row.try_get::<Vec<i32>, _>(index)?),
        "INT8[]" => json_array(row.try_get::<Vec<i64>, _>(index)?),
        "FLOAT4[]" => json_array(row.try_get::<Vec<f32>, _>(index)?),
        "FLOAT8[]" => json_array(row.try_get::<Vec<f64>, _>(index)?),
        "BOOL[]" => json_array(row.try_get::<Vec<bool>, _>(index)?),
        "NUMERIC[]" => json_values(row.try_get::<Vec<Decimal>, _>(index)?, decimal_value),
        "UUID[]" => json_values(row.try_get::<Vec<Uuid>, _>(index)?, Value::Uuid),
        "JSON[]" | "JSONB[]" => json_array(row.try_get::<Vec<serde_json::Value>, _>(index)?),
        "TIMESTAMPTZ[]" => json_values(row.try_get::<Vec<DateTime<Utc>>, _>(index)?, Value::Timestamp),
        "TIMESTAMP[]" => {
            json_values(row.try_get::<Vec<NaiveDateTime>, _>(index)?, Value::NaiveTimestamp)
        }
        "DATE[]" => json_values(row.try_get::<Vec<NaiveDate>, _>(index)?, |d| {
            Value::Text(d.to_string())
        }),
        _ => match type_info.kind() {
            PgTypeKind::Enum(_) => {
                let bytes = raw.as_bytes().map_err(sqlx::Error::Decode)?;
                Value::coerce_raw(bytes)
            }
            _ => return Err(unsupported(row, index)),
        },
    };

    Ok(value)
}

fn unsupported(row: &PgRow, index: usize) -> OrmError {
    let column = row.column(index);
    OrmError::Query(sqlx::Error::ColumnDecode {
        index: format!("{:?}", column.name()),
        source: format!(
            "no decoder for column type {}",
            column.type_info().name()
        )
        .into(),
    })
}

/// `Float` when the f64 reads back as the same decimal, exact text otherwise
fn decimal_value(decimal: Decimal) -> Value {
    let exact = decimal
        .to_f64()
        .filter(|f| f.to_string().parse::<Decimal>().ok() == Some(decimal));
    match exact {
        Some(f) => Value::Float(f),
        None => Value::Text(decimal.to_string()),
    }
}

/// Render the binary NUMERIC wire form as Postgres prints it
///
/// Layout: digit count, weight, sign and display scale as 16-bit words,
/// then base-10000 digits with the first one at `10000^weight`.
fn numeric_text(raw: &[u8]) -> Option<String> {
    let word = |i: usize| raw.get(i * 2..i * 2 + 2).map(|b| u16::from_be_bytes([b[0], b[1]]));

    let ndigits = usize::from(word(0)?);
    let weight = i32::from(word(1)? as i16);
    let sign = word(2)?;
    let dscale = usize::from(word(3)?);
    match sign {
        0x0000 | 0x4000 => {}
        0xC000 => return Some("NaN".to_string()),
        0xD000 => return Some("Infinity".to_string()),
        0xF000 => return Some("-Infinity".to_string()),
        _ => return None,
    }
    let digits = (0..ndigits)
        .map(|i| word(4 + i))
        .collect::<Option<Vec<u16>>>()?;
    let digit = |i: i32| {
        usize::try_from(i)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut text = String::new();
    if sign == 0x4000 {
        text.push('-');
    }
    if weight < 0 {
        text.push('0');
    } else {
        text.push_str(&digit(0).to_string());
        for i in 1..=weight {
            text.push_str(&format!("{:04}", digit(i)));
        }
    }
    if dscale > 0 {
        let mut fraction = String::new();
        let mut i = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit(i)));
            i += 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }
    Some(text)
}

/// ISO 8601 duration, as Postgres prints it with `intervalstyle = iso_8601`
fn interval_text(interval: &PgInterval) -> String {
    let mut text = String::from("P");
    let years = interval.months / 12;
    let months = interval.months % 12;
    let dated = [
        (years, 'Y'),
        (months, 'M'),
        (interval.days, 'D'),
    ];
    for (amount, unit) in dated {
        if amount != 0 {
            text.push_str(&format!("{}{}", amount, unit));
        }
    }

    let micros = interval.microseconds;
    let hours = micros / 3_600_000_000;
    let minutes = micros % 3_600_000_000 / 60_000_000;
    let micros = micros % 60_000_000;
    if hours != 0 || minutes != 0 || micros != 0 {
        text.push('T');
        if hours != 0 {
            text.push_str(&format!("{}H", hours));
        }
        if minutes != 0 {
            text.push_str(&format!("{}M", minutes));
        }
        if micros != 0 {
            let sign = if micros < 0 { "-" } else { "" };
            let (secs, frac) = (micros.abs() / 1_000_000, micros.abs() % 1_000_000);
            if frac == 0 {
                text.push_str(&format!("{}{}S", sign, secs));
            } else {
                let frac = format!("{:06}", frac);
                text.push_str(&format!("{}{}.{}S", sign, secs, frac.trim_end_matches('0')));
            }
        }
    }

    if text == "P" {
        text.push_str("T0S");
    }
    text
}

/// `INET` hosts print without a prefix length; `CIDR` always carries one
fn network_text(network: &IpNetwork, always_prefix: bool) -> String {
    let full = match network {
        IpNetwork::V4(_) => 32,
        IpNetwork::V6(_) => 128,
    };
    if always_prefix || network.prefix() != full {
        format!("{}/{}", network.ip(), network.prefix())
    } else {
        network.ip().to_string()
    }
}

fn json_array<T: Into<serde_json::Value>>(items: Vec<T>) -> Value {
    Value::Json(serde_json::Value::Array(
        items.into_iter().map(Into::into).collect(),
    ))
}

fn json_values<T>(items: Vec<T>, to_value: impl Fn(T) -> Value) -> Value {
    Value::Json(serde_json::Value::Array(
        items.into_iter().map(|item| to_value(item).to_json()).collect(),
    ))
}
