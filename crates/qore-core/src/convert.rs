// SPDX-License-Identifier: Apache-2.0

//! Text input/output conversions for local column types
//!
//! Every value crossing the driver boundary travels as text. `input`
//! parses driver text into a `Value`, `output` renders a `Value` back to
//! the text the remote side expects.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{FdwError, FdwResult};
use crate::types::{LocalType, Value};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

impl LocalType {
    /// Parses the text form of a value of this type.
    pub fn input(self, text: &str) -> FdwResult<Value> {
        let invalid = |reason: &dyn std::fmt::Display| {
            FdwError::invalid_data(self.name(), format!("\"{}\": {}", text, reason))
        };

        match self {
            LocalType::Bool => parse_bool(text)
                .map(Value::Bool)
                .ok_or_else(|| invalid(&"not a boolean")),
            LocalType::Int2 => text
                .trim()
                .parse::<i16>()
                .map(|v| Value::Int(v.into()))
                .map_err(|e| invalid(&e)),
            LocalType::Int4 => text
                .trim()
                .parse::<i32>()
                .map(|v| Value::Int(v.into()))
                .map_err(|e| invalid(&e)),
            LocalType::Int8 => text
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| invalid(&e)),
            LocalType::Float4 => parse_float(text)
                .map(|v| Value::Float(f64::from(v as f32)))
                .ok_or_else(|| invalid(&"not a number")),
            LocalType::Float8 => parse_float(text)
                .map(Value::Float)
                .ok_or_else(|| invalid(&"not a number")),
            LocalType::Numeric => {
                let trimmed = text.trim();
                Decimal::from_str(trimmed)
                    .or_else(|_| Decimal::from_scientific(trimmed))
                    .map(Value::Numeric)
                    .map_err(|e| invalid(&e))
            }
            LocalType::Char => Ok(Value::Text(text.chars().take(1).collect())),
            LocalType::Text | LocalType::Bpchar | LocalType::Varchar => {
                Ok(Value::Text(text.to_string()))
            }
            LocalType::Bytea => decode_bytea(text)
                .map(Value::Bytes)
                .ok_or_else(|| invalid(&"invalid hexadecimal data")),
            LocalType::Date => NaiveDate::parse_from_str(text.trim(), DATE_FORMAT)
                .map(Value::Date)
                .map_err(|e| invalid(&e)),
            LocalType::Time => NaiveTime::parse_from_str(text.trim(), TIME_FORMAT)
                .map(Value::Time)
                .map_err(|e| invalid(&e)),
            LocalType::Timestamp => NaiveDateTime::parse_from_str(text.trim(), TIMESTAMP_FORMAT)
                .map(Value::Timestamp)
                .map_err(|e| invalid(&e)),
            LocalType::Uuid => Uuid::parse_str(text.trim())
                .map(Value::Uuid)
                .map_err(|e| invalid(&e)),
        }
    }

    /// Renders a non-null value in this type's text form.
    ///
    /// Returns `None` for `Value::Null`.
    pub fn output(self, value: &Value) -> FdwResult<Option<String>> {
        let text = match (self, value) {
            (_, Value::Null) => return Ok(None),
            (LocalType::Bool, Value::Bool(b)) => if *b { "t" } else { "f" }.to_string(),
            (LocalType::Int2 | LocalType::Int4 | LocalType::Int8, Value::Int(v)) => v.to_string(),
            (LocalType::Float4, Value::Float(v)) => format_float(f64::from(*v as f32), true),
            (LocalType::Float8, Value::Float(v)) => format_float(*v, false),
            (LocalType::Numeric, Value::Numeric(d)) => d.to_string(),
            (LocalType::Numeric, Value::Int(v)) => v.to_string(),
            (
                LocalType::Char | LocalType::Text | LocalType::Bpchar | LocalType::Varchar,
                Value::Text(s),
            ) => s.clone(),
            (LocalType::Bytea, Value::Bytes(bytes)) => encode_bytea(bytes),
            (LocalType::Date, Value::Date(d)) => d.format(DATE_FORMAT).to_string(),
            (LocalType::Time, Value::Time(t)) => t.format(TIME_FORMAT).to_string(),
            (LocalType::Timestamp, Value::Timestamp(ts)) => ts.format(TIMESTAMP_FORMAT).to_string(),
            (LocalType::Uuid, Value::Uuid(u)) => u.hyphenated().to_string(),
            (ty, other) => {
                return Err(FdwError::invalid_data(
                    ty.name(),
                    format!("value {:?} does not belong to this type", other),
                ))
            }
        };
        Ok(Some(text))
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "y" | "yes" | "on" | "1" => Some(true),
        "f" | "false" | "n" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn parse_float(text: &str) -> Option<f64> {
    match text.trim().to_ascii_lowercase().as_str() {
        "nan" => Some(f64::NAN),
        "infinity" | "inf" => Some(f64::INFINITY),
        "-infinity" | "-inf" => Some(f64::NEG_INFINITY),
        other => other.parse::<f64>().ok(),
    }
}

fn format_float(v: f64, single: bool) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if single {
        (v as f32).to_string()
    } else {
        v.to_string()
    }
}

/// Hex form of a byte string: `\x` followed by lowercase digits.
pub fn encode_bytea(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        out.push(hex_digit(b >> 4));
        out.push(hex_digit(b & 0x0f));
    }
    out
}

/// Parses hex bytea text. Text without the `\x` prefix is taken literally.
pub fn decode_bytea(text: &str) -> Option<Vec<u8>> {
    let Some(hex) = text.strip_prefix("\\x") else {
        return Some(text.as_bytes().to_vec());
    };
    let digits: Vec<u8> = hex.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return None;
    }
    digits
        .chunks(2)
        .map(|pair| Some(hex_value(pair[0])? << 4 | hex_value(pair[1])?))
        .collect()
}

fn hex_digit(nibble: u8) -> char {
    char::from(b"0123456789abcdef"[usize::from(nibble & 0x0f)])
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}
