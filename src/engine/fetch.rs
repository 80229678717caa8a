// SPDX-License-Identifier: Apache-2.0

//! Chunked column reads
//!
//! A column value may be larger than its transfer buffer. The driver then
//! reports a truncated read, with or without the number of bytes left, and
//! further reads on the same column continue where the last one stopped.

use qore_core::{FdwError, FdwResult, RemoteStatement, TextRead};
use tracing::trace;

use crate::metrics;

/// A fully read column value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnValue {
    Null,
    Bytes(Vec<u8>),
    /// Numeric text whose fractional digits were cut by the driver
    FractionallyTruncated(Vec<u8>),
}

/// Reads the whole value of a 0-based column of the current row.
pub fn read_column(
    stmt: &mut dyn RemoteStatement,
    column: usize,
    buffer_size: usize,
) -> FdwResult<ColumnValue> {
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let first = get_text(stmt, column, &mut buffer)?;

    match first {
        TextRead::Null => Ok(ColumnValue::Null),
        TextRead::Complete { written } => Ok(ColumnValue::Bytes(filled(&buffer, written).to_vec())),
        TextRead::FractionalTruncation { written } => {
            metrics::record_fractional_truncation();
            Ok(ColumnValue::FractionallyTruncated(filled(&buffer, written).to_vec()))
        }
        TextRead::Truncated {
            written,
            remaining: Some(remaining),
        } => {
            metrics::record_chunked_read();
            read_known_remainder(stmt, column, &buffer[..written.min(buffer.len())], remaining)
        }
        TextRead::Truncated {
            written,
            remaining: None,
        } => {
            metrics::record_chunked_read();
            let mut accumulated = Vec::with_capacity(buffer.len() * 2);
            append_doubling(&mut accumulated, filled(&buffer, written));
            read_unknown_remainder(stmt, column, &mut buffer, accumulated)
        }
    }
}

/// One follow-up read sized to exactly the reported remainder.
fn read_known_remainder(
    stmt: &mut dyn RemoteStatement,
    column: usize,
    head: &[u8],
    remaining: usize,
) -> FdwResult<ColumnValue> {
    let mut accumulated = Vec::with_capacity(head.len() + remaining);
    accumulated.extend_from_slice(head);

    let mut rest = vec![0u8; remaining.max(1)];
    match get_text(stmt, column, &mut rest)? {
        TextRead::Null => {}
        TextRead::Complete { written } | TextRead::FractionalTruncation { written } => {
            accumulated.extend_from_slice(filled(&rest, written));
        }
        TextRead::Truncated { written, .. } => {
            // The driver under-reported; keep going without a size hint.
            append_doubling(&mut accumulated, filled(&rest, written));
            return read_unknown_remainder(stmt, column, &mut rest, accumulated);
        }
    }
    Ok(ColumnValue::Bytes(accumulated))
}

/// Repeats buffer-sized reads until the driver stops reporting truncation.
fn read_unknown_remainder(
    stmt: &mut dyn RemoteStatement,
    column: usize,
    buffer: &mut [u8],
    mut accumulated: Vec<u8>,
) -> FdwResult<ColumnValue> {
    loop {
        match get_text(stmt, column, buffer)? {
            TextRead::Null => break,
            TextRead::Complete { written } | TextRead::FractionalTruncation { written } => {
                append_doubling(&mut accumulated, filled(buffer, written));
                break;
            }
            TextRead::Truncated { written, .. } => {
                append_doubling(&mut accumulated, filled(buffer, written));
            }
        }
    }
    Ok(ColumnValue::Bytes(accumulated))
}

/// Appends a chunk, doubling the accumulator's capacity when it is full.
fn append_doubling(accumulated: &mut Vec<u8>, chunk: &[u8]) {
    let needed = accumulated.len() + chunk.len();
    if needed > accumulated.capacity() {
        let mut target = accumulated.capacity().max(chunk.len()).max(1);
        while target < needed {
            target *= 2;
        }
        accumulated.reserve_exact(target - accumulated.len());
    }
    accumulated.extend_from_slice(chunk);
}

fn filled(buffer: &[u8], written: usize) -> &[u8] {
    &buffer[..written.min(buffer.len())]
}

fn get_text(stmt: &mut dyn RemoteStatement, column: usize, buffer: &mut [u8]) -> FdwResult<TextRead> {
    let read = stmt
        .get_text(column, buffer)
        .map_err(|e| FdwError::remote_call("Reading column data", e))?;
    trace!(column, ?read, "Column read");
    Ok(read)
}
