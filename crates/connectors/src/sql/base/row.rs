use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use core::fmt;
use model::{core::value::Value, records::row::Record};
use mysql_async::{
    Row as MySqlRow,
    consts::{ColumnFlags, ColumnType},
    prelude::FromValue,
};
use std::{error::Error, fmt::Formatter, net::IpAddr};
use tokio_postgres::{
    Row as PgRow,
    types::{FromSql, Kind, Type},
};
use tracing::warn;
use uuid::Uuid;

/// MySQL character set id for binary strings.
const MYSQL_BINARY_CHARSET: u16 = 63;

pub enum DbRow<'a> {
    MySqlRow(&'a MySqlRow),
    PostgresRow(&'a PgRow),
}

impl DbRow<'_> {
    /// Decodes the row into a record keyed by `columns`.
    pub fn to_record(&self, columns: &[String]) -> Record {
        let values = (0..columns.len()).map(|idx| self.value_at(idx));
        Record::from_columns(columns, values)
    }

    pub fn value_at(&self, idx: usize) -> Value {
        match self {
            DbRow::MySqlRow(row) => mysql_value(row, idx),
            DbRow::PostgresRow(row) => pg_value(row, idx),
        }
    }
}

fn pg_value(row: &PgRow, idx: usize) -> Value {
    let Some(column) = row.columns().get(idx) else {
        return Value::Null;
    };

    match column.type_().name() {
        "bool" => pg_decode(row, idx, Value::Boolean),
        "int2" => pg_decode(row, idx, |v: i16| Value::Int(v.into())),
        "int4" => pg_decode(row, idx, |v: i32| Value::Int(v.into())),
        "int8" => pg_decode(row, idx, Value::Int),
        "oid" => pg_decode(row, idx, |v: u32| Value::Uint(v.into())),
        "float4" => pg_decode(row, idx, |v: f32| Value::Float(v.into())),
        "float8" => pg_decode(row, idx, Value::Float),
        "numeric" => pg_decode(row, idx, |v: PgNumeric| v.0),
        "json" | "jsonb" => pg_decode(row, idx, Value::Json),
        "uuid" => pg_decode(row, idx, |v: Uuid| Value::Uuid(v)),
        "bytea" => pg_decode(row, idx, Value::Bytes),
        "date" => pg_decode(row, idx, |v: NaiveDate| Value::Date(v)),
        "timestamp" => pg_decode(row, idx, |v: NaiveDateTime| Value::Timestamp(v.and_utc())),
        "timestamptz" => pg_decode(row, idx, |v: DateTime<Utc>| Value::Timestamp(v)),
        "time" => pg_decode(row, idx, |v: NaiveTime| Value::String(v.to_string())),
        "inet" => pg_decode(row, idx, |v: IpAddr| Value::String(v.to_string())),
        "_int2" => pg_array::<i16>(row, idx),
        "_int4" => pg_array::<i32>(row, idx),
        "_int8" => pg_array::<i64>(row, idx),
        "_float4" => pg_array::<f32>(row, idx),
        "_float8" => pg_array::<f64>(row, idx),
        "_bool" => pg_array::<bool>(row, idx),
        "_text" | "_varchar" | "_bpchar" => pg_array::<String>(row, idx),
        _ => pg_decode(row, idx, |v: Untyped| v.0),
    }
}

/// Arrays become JSON arrays, NULL elements included.
fn pg_array<T>(row: &PgRow, idx: usize) -> Value
where
    T: for<'a> FromSql<'a> + serde::Serialize,
{
    pg_decode(row, idx, |items: Vec<Option<T>>| {
        serde_json::to_value(items)
            .map(Value::Json)
            .unwrap_or(Value::Null)
    })
}

/// `numeric` including the special values that `Decimal` cannot hold.
struct PgNumeric(Value);

/// Sign word of the binary `numeric` format.
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        let sign = raw.get(4..6).map(|b| u16::from_be_bytes([b[0], b[1]]));
        let value = match sign {
            Some(NUMERIC_NAN) => Value::Float(f64::NAN),
            Some(NUMERIC_PINF) => Value::Float(f64::INFINITY),
            Some(NUMERIC_NINF) => Value::Float(f64::NEG_INFINITY),
            _ => Value::Decimal(rust_decimal::Decimal::from_sql(ty, raw)?.to_string()),
        };
        Ok(PgNumeric(value))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Last resort for types without a dedicated arm. Text-like and enum
/// values arrive as UTF-8; anything else is kept as its raw wire bytes.
struct Untyped(Value);

impl<'a> FromSql<'a> for Untyped {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        let textual = <String as FromSql>::accepts(ty) || matches!(ty.kind(), Kind::Enum(_));
        let value = match std::str::from_utf8(raw) {
            Ok(text) if textual => Value::String(text.to_owned()),
            _ => Value::Bytes(raw.to_vec()),
        };
        Ok(Untyped(value))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

fn pg_decode<'a, T, F>(row: &'a PgRow, idx: usize, wrap: F) -> Value
where
    T: FromSql<'a>,
    F: FnOnce(T) -> Value,
{
    match row.try_get::<_, Option<T>>(idx) {
        Ok(Some(value)) => wrap(value),
        Ok(None) => Value::Null,
        Err(err) => {
            warn!(column = idx, %err, "Unsupported Postgres column value, using NULL");
            Value::Null
        }
    }
}

fn mysql_value(row: &MySqlRow, idx: usize) -> Value {
    match row.as_ref(idx) {
        None | Some(mysql_async::Value::NULL) => return Value::Null,
        Some(_) => {}
    }
    let Some(column) = row.columns_ref().get(idx) else {
        return Value::Null;
    };
    let unsigned = column.flags().contains(ColumnFlags::UNSIGNED_FLAG);
    let binary = column.character_set() == MYSQL_BINARY_CHARSET;

    match column.column_type() {
        ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_INT24
        | ColumnType::MYSQL_TYPE_LONGLONG
        | ColumnType::MYSQL_TYPE_YEAR => {
            if unsigned {
                mysql_decode(row, idx, Value::Uint)
            } else {
                mysql_decode(row, idx, Value::Int)
            }
        }
        ColumnType::MYSQL_TYPE_FLOAT | ColumnType::MYSQL_TYPE_DOUBLE => {
            mysql_decode(row, idx, Value::Float)
        }
        ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
            mysql_decode(row, idx, |v: BigDecimal| Value::Decimal(v.to_string()))
        }
        ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE => {
            mysql_decode(row, idx, |v: NaiveDate| Value::Date(v))
        }
        ColumnType::MYSQL_TYPE_DATETIME
        | ColumnType::MYSQL_TYPE_DATETIME2
        | ColumnType::MYSQL_TYPE_TIMESTAMP
        | ColumnType::MYSQL_TYPE_TIMESTAMP2 => {
            mysql_decode(row, idx, |v: NaiveDateTime| Value::Timestamp(v.and_utc()))
        }
        ColumnType::MYSQL_TYPE_JSON => mysql_decode(row, idx, |v: String| {
            serde_json::from_str(&v)
                .map(Value::Json)
                .unwrap_or(Value::String(v))
        }),
        ColumnType::MYSQL_TYPE_BIT | ColumnType::MYSQL_TYPE_GEOMETRY => {
            mysql_decode(row, idx, Value::Bytes)
        }
        _ if binary => mysql_decode(row, idx, Value::Bytes),
        _ => mysql_decode(row, idx, Value::String),
    }
}

fn mysql_decode<T, F>(row: &MySqlRow, idx: usize, wrap: F) -> Value
where
    T: FromValue,
    F: FnOnce(T) -> Value,
{
    match row.get_opt::<T, usize>(idx) {
        Some(Ok(value)) => wrap(value),
        Some(Err(err)) => {
            warn!(column = idx, %err, "Unsupported MySQL column value, using NULL");
            Value::Null
        }
        None => Value::Null,
    }
}

impl fmt::Debug for DbRow<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DbRow::MySqlRow(row) => write!(f, "{row:?}"),
            DbRow::PostgresRow(row) => write!(f, "{row:?}"),
        }
    }
}
