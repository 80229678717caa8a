// SPDX-License-Identifier: Apache-2.0

//! Parameter binding and literal formatting
//!
//! Values destined for the remote side are first rendered with their local
//! type's text output. They are then either bound as statement parameters,
//! following the dispatch table below, or spliced into statement text as
//! literals for the direct insert strategy.

use qore_core::{
    BoundParam, FdwError, FdwResult, LocalType, ParamSqlType, ParamValue, Value,
};

/// Remote SQL type a local type is bound as.
pub fn param_sql_type(ty: LocalType) -> ParamSqlType {
    match ty {
        LocalType::Bool => ParamSqlType::SmallInt,
        LocalType::Bytea => ParamSqlType::LongVarBinary,
        LocalType::Char => ParamSqlType::Char,
        LocalType::Bpchar => ParamSqlType::WChar,
        LocalType::Varchar => ParamSqlType::Varchar,
        LocalType::Text => ParamSqlType::LongVarchar,
        LocalType::Numeric => ParamSqlType::Decimal,
        LocalType::Int4 => ParamSqlType::Integer,
        LocalType::Float4 => ParamSqlType::Float,
        LocalType::Float8 => ParamSqlType::Double,
        LocalType::Int2 => ParamSqlType::SmallInt,
        LocalType::Int8 => ParamSqlType::BigInt,
        LocalType::Date => ParamSqlType::Date,
        LocalType::Time => ParamSqlType::Time,
        LocalType::Timestamp => ParamSqlType::Timestamp,
        LocalType::Uuid => ParamSqlType::Guid,
    }
}

fn is_character_type(sql_type: ParamSqlType) -> bool {
    matches!(
        sql_type,
        ParamSqlType::Char | ParamSqlType::WChar | ParamSqlType::Varchar | ParamSqlType::LongVarchar
    )
}

/// Builds the binding for one parameter from its text form.
///
/// Booleans and byte strings are parsed back through their local input
/// conversion; everything else is bound as character data.
pub fn bind_text(ty: LocalType, text: Option<&str>) -> FdwResult<BoundParam> {
    let sql_type = param_sql_type(ty);
    let Some(text) = text else {
        return Ok(BoundParam {
            value: ParamValue::Null,
            sql_type,
            column_size: 0,
        });
    };

    let (value, column_size) = match ty {
        LocalType::Bool => match ty.input(text)? {
            Value::Bool(b) => (ParamValue::SmallInt(i16::from(b)), 0),
            other => return Err(unexpected(ty, &other)),
        },
        LocalType::Bytea => match ty.input(text)? {
            Value::Bytes(bytes) => (ParamValue::Binary(bytes), 0),
            other => return Err(unexpected(ty, &other)),
        },
        LocalType::Char => {
            let c: String = text.chars().take(1).collect();
            (ParamValue::Text(c), 1)
        }
        _ => {
            let width = if is_character_type(sql_type) { text.len() } else { 0 };
            (ParamValue::Text(text.to_string()), width)
        }
    };

    Ok(BoundParam {
        value,
        sql_type,
        column_size,
    })
}

/// Binds a typed value, rendering it with the local output conversion first.
pub fn bind_value(ty: LocalType, value: &Value) -> FdwResult<BoundParam> {
    let text = ty.output(value)?;
    bind_text(ty, text.as_deref())
}

/// Renders a value's text form as an SQL literal.
pub fn format_literal(ty: LocalType, text: Option<&str>) -> FdwResult<String> {
    let Some(text) = text else {
        return Ok("NULL".to_string());
    };

    let literal = match ty {
        LocalType::Bool => match ty.input(text)? {
            Value::Bool(true) => "1".to_string(),
            Value::Bool(false) => "0".to_string(),
            other => return Err(unexpected(ty, &other)),
        },
        LocalType::Char => quote(&text.chars().take(1).collect::<String>()),
        LocalType::Bytea
        | LocalType::Bpchar
        | LocalType::Varchar
        | LocalType::Text
        | LocalType::Date
        | LocalType::Time
        | LocalType::Timestamp
        | LocalType::Uuid => quote(text),
        // NaN and the infinities are only numbers as quoted strings.
        LocalType::Float4 | LocalType::Float8 => {
            if text.parse::<f64>().is_ok_and(f64::is_finite) {
                text.to_string()
            } else {
                quote(text)
            }
        }
        LocalType::Numeric | LocalType::Int4 | LocalType::Int2 | LocalType::Int8 => text.to_string(),
    };
    Ok(literal)
}

/// Places a parenthesized literal row between an insert statement's prefix
/// and suffix.
pub fn build_insert_sql(
    prefix: &str,
    suffix: &str,
    types: &[LocalType],
    texts: &[Option<String>],
) -> FdwResult<String> {
    if types.len() != texts.len() {
        return Err(FdwError::internal(format!(
            "{} values supplied for {} insert columns",
            texts.len(),
            types.len()
        )));
    }
    let literals = types
        .iter()
        .zip(texts)
        .map(|(ty, text)| format_literal(*ty, text.as_deref()))
        .collect::<FdwResult<Vec<_>>>()?;
    Ok(format!("{}({}){}", prefix, literals.join(","), suffix))
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn unexpected(ty: LocalType, value: &Value) -> FdwError {
    FdwError::internal(format!("{} input produced {:?}", ty.name(), value))
}
