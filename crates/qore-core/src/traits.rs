// SPDX-License-Identifier: Apache-2.0

//! Remote driver trait definitions
//!
//! These are the call-level primitives every remote driver must provide.
//! The core never speaks to a data source any other way: it connects,
//! executes or prepares statement text, walks a forward-only cursor and
//! reads column values as text into buffers it owns.

use crate::error::DriverResult;
use crate::types::{BoundParam, ColumnDescriptor, TextRead};

/// Entry point of a driver implementation
pub trait RemoteDriver: Send + Sync {
    /// Returns the unique identifier for this driver
    fn driver_id(&self) -> &str;

    /// Opens a connection described by an opaque connection string
    fn connect(&self, descriptor: &str) -> DriverResult<Box<dyn RemoteConnection>>;
}

/// An open remote connection
pub trait RemoteConnection: Send {
    /// Executes statement text directly and returns its statement handle
    fn execute(&mut self, sql: &str) -> DriverResult<Box<dyn RemoteStatement>>;

    /// Prepares statement text for repeated execution with bound parameters
    fn prepare(&mut self, sql: &str) -> DriverResult<Box<dyn RemoteStatement>>;

    /// Closes the connection
    fn disconnect(&mut self) -> DriverResult<()>;
}

/// A statement handle with a forward-only cursor
pub trait RemoteStatement: Send {
    /// Number of columns in the result set (0 for statements without one)
    fn num_result_cols(&mut self) -> DriverResult<usize>;

    /// Advances the cursor. Returns `false` once the result is exhausted.
    fn fetch_next(&mut self) -> DriverResult<bool>;

    /// Describes a 0-based result column
    fn describe_column(&mut self, column: usize) -> DriverResult<ColumnDescriptor>;

    /// Reads (the next part of) a column of the current row as text.
    ///
    /// Repeated calls on the same column continue where the previous
    /// truncated read stopped.
    fn get_text(&mut self, column: usize, buffer: &mut [u8]) -> DriverResult<TextRead>;

    /// Binds a 0-based parameter of a prepared statement
    fn bind_param(&mut self, index: usize, param: BoundParam) -> DriverResult<()>;

    /// Executes a prepared statement with its current bindings
    fn execute_prepared(&mut self) -> DriverResult<()>;

    /// Rows affected by the last execution
    fn row_count(&mut self) -> DriverResult<i64>;
}
