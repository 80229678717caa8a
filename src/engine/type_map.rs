// SPDX-License-Identifier: Apache-2.0

//! Type & conversion tables
//!
//! Maps remote column descriptions to the local type a host would declare
//! for them, the text conversion applied when reading values, and the size
//! of the transfer buffer used for each read.

use qore_core::{ColumnDescriptor, SqlType};
use serde::Serialize;

/// Upper bound of a single column transfer buffer
pub const MAXIMUM_BUFFER_SIZE: usize = 8192;

/// Widest `varchar(n)` before a column is mapped to `text`
const MAX_VARCHAR_LENGTH: usize = 255;

/// Text transformation applied to a column value before local input conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnConversion {
    /// Value is used as-is
    Text,
    /// Value is hex digits; prefixed with `\x` to form bytea input
    Hex,
    /// A raw 0/1 byte is rewritten as F/T
    Bool,
    /// Bit strings are not supported and are rejected at read time
    Bin,
}

/// Local type declaration suggested for a remote column, e.g. `varchar(40)`.
pub fn local_type_name(column: &ColumnDescriptor) -> Option<String> {
    let size = column.column_size;
    let name = match column.sql_type {
        SqlType::Char | SqlType::WChar => format!("char({})", size),
        SqlType::Varchar | SqlType::WVarchar => {
            if size <= MAX_VARCHAR_LENGTH {
                format!("varchar({})", size)
            } else {
                "text".to_string()
            }
        }
        SqlType::LongVarchar | SqlType::WLongVarchar => "text".to_string(),
        SqlType::Decimal => format!("decimal({},{})", size, column.decimal_digits),
        SqlType::Numeric => format!("numeric({},{})", size, column.decimal_digits),
        SqlType::Integer => "integer".to_string(),
        SqlType::Real | SqlType::Float => "real".to_string(),
        SqlType::Double => "float8".to_string(),
        SqlType::Bit => "boolean".to_string(),
        SqlType::SmallInt | SqlType::TinyInt => "smallint".to_string(),
        SqlType::BigInt => "bigint".to_string(),
        SqlType::Binary => format!("bit({})", size),
        SqlType::VarBinary => format!("varbit({})", size),
        SqlType::LongVarBinary => "bytea".to_string(),
        SqlType::Date => "date".to_string(),
        SqlType::Time => "time".to_string(),
        SqlType::Timestamp => "timestamp".to_string(),
        SqlType::Guid => "uuid".to_string(),
        SqlType::Other(_) => return None,
    };
    Some(name)
}

pub fn conversion(sql_type: SqlType) -> ColumnConversion {
    match sql_type {
        SqlType::LongVarBinary => ColumnConversion::Hex,
        SqlType::Bit => ColumnConversion::Bool,
        SqlType::Binary | SqlType::VarBinary => ColumnConversion::Bin,
        _ => ColumnConversion::Text,
    }
}

/// Smallest buffer able to hold the text form of a value of this type.
pub fn minimum_buffer_size(sql_type: SqlType) -> usize {
    match sql_type {
        SqlType::Decimal | SqlType::Numeric => 32,
        SqlType::Integer => 12,
        SqlType::Real | SqlType::Float => 18,
        SqlType::Double => 26,
        SqlType::SmallInt | SqlType::TinyInt => 6,
        SqlType::BigInt => 21,
        SqlType::Date => 10,
        SqlType::Time => 8,
        SqlType::Timestamp => 20,
        _ => 0,
    }
}

/// Transfer buffer size for reading a column.
///
/// Mapped types use `max(declared size, type minimum)`. Unmapped types use
/// the declared size, or the global maximum when the driver declares 0.
/// Both are clamped to `MAXIMUM_BUFFER_SIZE`.
pub fn buffer_size(column: &ColumnDescriptor) -> usize {
    let size = match column.sql_type {
        SqlType::Other(_) if column.column_size == 0 => MAXIMUM_BUFFER_SIZE,
        SqlType::Other(_) => column.column_size,
        ty => column.column_size.max(minimum_buffer_size(ty)),
    };
    size.clamp(1, MAXIMUM_BUFFER_SIZE)
}

/// Everything a scan needs to read one remote column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnReadPlan {
    pub conversion: ColumnConversion,
    pub buffer_size: usize,
}

impl ColumnReadPlan {
    pub fn for_column(column: &ColumnDescriptor) -> Self {
        Self {
            conversion: conversion(column.sql_type),
            buffer_size: buffer_size(column),
        }
    }
}
