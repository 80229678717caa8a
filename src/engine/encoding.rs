// SPDX-License-Identifier: Apache-2.0

//! Remote character encodings

use qore_core::{FdwError, FdwResult};

/// Encoding of text columns returned by a remote source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteEncoding {
    Utf8,
    Latin1,
    Ascii,
}

impl RemoteEncoding {
    /// Resolves an encoding name as written in server options.
    pub fn from_name(name: &str) -> FdwResult<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "UTF8" | "UNICODE" => Ok(Self::Utf8),
            "LATIN1" | "ISO88591" => Ok(Self::Latin1),
            "SQLASCII" | "ASCII" => Ok(Self::Ascii),
            _ => Err(FdwError::configuration(format!(
                "Invalid encoding name \"{}\"",
                name
            ))),
        }
    }

    /// Converts remote bytes to local text.
    pub fn decode(self, bytes: &[u8]) -> FdwResult<String> {
        match self {
            Self::Utf8 => decode_utf8(bytes),
            Self::Latin1 => Ok(bytes.iter().map(|b| char::from(*b)).collect()),
            Self::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
                Some(at) => Err(FdwError::invalid_data(
                    "text",
                    format!("invalid byte 0x{:02x} for encoding SQL_ASCII at offset {}", bytes[at], at),
                )),
                None => decode_utf8(bytes),
            },
        }
    }
}

/// Decodes bytes already in the local encoding.
pub fn decode_utf8(bytes: &[u8]) -> FdwResult<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| FdwError::invalid_data("text", format!("invalid byte sequence for encoding UTF8: {}", e)))
}
