// SPDX-License-Identifier: Apache-2.0

//! Shared data types for the pushdown core
//!
//! These types describe values crossing the boundary between the host
//! engine and the remote driver, and the metadata both sides exchange.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use compact_str::CompactString;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Host catalog object identifier (type, operator, procedure, aggregate).
pub type ObjectId = u32;

/// Identifier of an extension known to the host catalog.
pub type ExtensionId = u32;

/// Identifier of a registered foreign server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerId(pub u32);

/// Identifier of a registered foreign table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId(pub u32);

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "server#{}", self.0)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table#{}", self.0)
    }
}

/// A column value in the host engine's representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Numeric(Decimal),
    Text(String),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Uuid(Uuid),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// A single row produced by a scan, indexed by attribute number - 1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn null(natts: usize) -> Self {
        Self {
            values: vec![Value::Null; natts],
        }
    }

    /// Value of a 1-based attribute number.
    pub fn get(&self, attno: usize) -> Option<&Value> {
        attno.checked_sub(1).and_then(|i| self.values.get(i))
    }
}

/// The closed set of local column types the core can convert and bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalType {
    Bool,
    Bytea,
    Char,
    Int8,
    Int2,
    Int4,
    Text,
    Float4,
    Float8,
    Bpchar,
    Varchar,
    Date,
    Time,
    Timestamp,
    Numeric,
    Uuid,
}

impl LocalType {
    pub const ALL: [LocalType; 16] = [
        LocalType::Bool,
        LocalType::Bytea,
        LocalType::Char,
        LocalType::Int8,
        LocalType::Int2,
        LocalType::Int4,
        LocalType::Text,
        LocalType::Float4,
        LocalType::Float8,
        LocalType::Bpchar,
        LocalType::Varchar,
        LocalType::Date,
        LocalType::Time,
        LocalType::Timestamp,
        LocalType::Numeric,
        LocalType::Uuid,
    ];

    /// Host catalog type identifier.
    pub const fn type_id(self) -> ObjectId {
        match self {
            LocalType::Bool => 16,
            LocalType::Bytea => 17,
            LocalType::Char => 18,
            LocalType::Int8 => 20,
            LocalType::Int2 => 21,
            LocalType::Int4 => 23,
            LocalType::Text => 25,
            LocalType::Float4 => 700,
            LocalType::Float8 => 701,
            LocalType::Bpchar => 1042,
            LocalType::Varchar => 1043,
            LocalType::Date => 1082,
            LocalType::Time => 1083,
            LocalType::Timestamp => 1114,
            LocalType::Numeric => 1700,
            LocalType::Uuid => 2950,
        }
    }

    pub fn from_type_id(type_id: ObjectId) -> Option<LocalType> {
        Self::ALL.into_iter().find(|t| t.type_id() == type_id)
    }

    pub const fn name(self) -> &'static str {
        match self {
            LocalType::Bool => "boolean",
            LocalType::Bytea => "bytea",
            LocalType::Char => "\"char\"",
            LocalType::Int8 => "bigint",
            LocalType::Int2 => "smallint",
            LocalType::Int4 => "integer",
            LocalType::Text => "text",
            LocalType::Float4 => "real",
            LocalType::Float8 => "double precision",
            LocalType::Bpchar => "character",
            LocalType::Varchar => "character varying",
            LocalType::Date => "date",
            LocalType::Time => "time without time zone",
            LocalType::Timestamp => "timestamp without time zone",
            LocalType::Numeric => "numeric",
            LocalType::Uuid => "uuid",
        }
    }
}

impl fmt::Display for LocalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Remote SQL data type as reported by the driver's column description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    Char,
    WChar,
    Varchar,
    WVarchar,
    LongVarchar,
    WLongVarchar,
    Decimal,
    Numeric,
    Integer,
    Real,
    Float,
    Double,
    Bit,
    SmallInt,
    TinyInt,
    BigInt,
    Binary,
    VarBinary,
    LongVarBinary,
    Date,
    Time,
    Timestamp,
    Guid,
    /// Any driver-specific type code the core does not know.
    Other(i16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Nullability {
    NoNulls,
    Nullable,
    Unknown,
}

/// Description of one remote result column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: CompactString,
    pub sql_type: SqlType,
    /// Declared column size (characters, digits or bytes, by type).
    pub column_size: usize,
    pub decimal_digits: i16,
    pub nullability: Nullability,
}

/// Outcome of one text read of a column into a caller-supplied buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextRead {
    /// SQL NULL; nothing was written.
    Null,
    /// The whole (remaining) value fit.
    Complete { written: usize },
    /// The buffer filled before the value ended. `remaining` is the number
    /// of bytes still to read, or `None` when the driver cannot tell.
    Truncated {
        written: usize,
        remaining: Option<usize>,
    },
    /// A numeric value lost fractional digits to fit the buffer.
    FractionalTruncation { written: usize },
}

/// Target SQL type of a bound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamSqlType {
    SmallInt,
    LongVarBinary,
    Char,
    WChar,
    Varchar,
    LongVarchar,
    Decimal,
    Integer,
    Float,
    Double,
    BigInt,
    Date,
    Time,
    Timestamp,
    Guid,
}

/// Host-side buffer handed to the driver for one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Null,
    SmallInt(i16),
    Binary(#[serde(with = "base64_bytes")] Vec<u8>),
    Text(String),
}

/// One parameter binding: value, target SQL type and declared width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundParam {
    pub value: ParamValue,
    pub sql_type: ParamSqlType,
    pub column_size: usize,
}
