// SPDX-License-Identifier: Apache-2.0

//! Connection and statement handles owned by an execution state

use qore_core::{FdwError, FdwResult, RemoteConnection, RemoteStatement};
use tracing::{debug, warn};

use crate::metrics;

/// A live connection plus the statement currently in use on it
pub(crate) struct RemoteHandles {
    connection: Box<dyn RemoteConnection>,
    statement: Option<Box<dyn RemoteStatement>>,
}

impl RemoteHandles {
    pub fn new(connection: Box<dyn RemoteConnection>) -> Self {
        Self {
            connection,
            statement: None,
        }
    }

    /// Executes statement text directly, replacing the current statement.
    pub fn execute(&mut self, sql: &str) -> FdwResult<&mut dyn RemoteStatement> {
        debug!(sql = %sql, "Executing remote statement");
        self.statement = None;
        let result = self.connection.execute(sql);
        metrics::record_statement(result.is_ok());
        let statement = result.map_err(|e| FdwError::remote_call("Executing remote query", e))?;
        Ok(&mut **self.statement.insert(statement))
    }

    /// Prepares statement text, replacing the current statement.
    pub fn prepare(&mut self, sql: &str) -> FdwResult<&mut dyn RemoteStatement> {
        debug!(sql = %sql, "Preparing remote statement");
        self.statement = None;
        let statement = self
            .connection
            .prepare(sql)
            .map_err(|e| FdwError::remote_call("Preparing remote statement", e))?;
        Ok(&mut **self.statement.insert(statement))
    }

    pub fn statement(&mut self) -> FdwResult<&mut dyn RemoteStatement> {
        match self.statement.as_mut() {
            Some(statement) => Ok(&mut **statement),
            None => Err(FdwError::internal("no remote statement is active")),
        }
    }

    /// Frees the statement, then closes the connection.
    pub fn release(mut self) -> FdwResult<()> {
        self.statement = None;
        self.connection
            .disconnect()
            .map_err(|e| FdwError::remote_call("Disconnecting from remote source", e))
    }
}

/// Releases handles on an abnormal exit path, logging instead of failing.
pub(crate) fn release_quietly(handles: Option<RemoteHandles>, context: &str) {
    if let Some(handles) = handles {
        if let Err(e) = handles.release() {
            warn!(context, error = %e, "Failed to release remote handles");
        }
    }
}
