// SPDX-License-Identifier: Apache-2.0

//! Direct modify execution
//!
//! An UPDATE or DELETE whose every condition runs remotely is sent as a
//! single statement. The statement executes on the first pull; the pull
//! never yields rows.

use std::sync::Arc;

use qore_core::{FdwError, FdwResult, Row, TableId};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::engine::handles::{release_quietly, RemoteHandles};
use crate::engine::modify::ModifyOperation;
use crate::engine::registry::{ForeignCatalog, ForeignTable};
use crate::metrics;

/// Planned single-statement modification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectModifyPlan {
    pub table: TableId,
    pub operation: ModifyOperation,
    pub sql: String,
    pub has_returning: bool,
    pub retrieved_attrs: Vec<usize>,
    /// Add the affected-row count to the caller's processed total
    pub set_processed: bool,
    /// Columns assigned by an UPDATE
    pub target_attrs: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectStatus {
    Open,
    Ended,
    Aborted,
}

pub struct DirectModifyState {
    table: Arc<ForeignTable>,
    sql: String,
    has_returning: bool,
    set_processed: bool,
    rows_affected: Option<u64>,
    handles: Option<RemoteHandles>,
    status: DirectStatus,
}

impl DirectModifyState {
    #[instrument(skip_all, fields(table = %plan.table, operation = ?plan.operation))]
    pub fn begin(catalog: &ForeignCatalog, plan: &DirectModifyPlan) -> FdwResult<Self> {
        if plan.operation == ModifyOperation::Insert {
            return Err(FdwError::internal("inserts are never executed directly"));
        }
        let table = catalog.table(plan.table)?;
        let handles = RemoteHandles::new(catalog.connect(&table)?);
        debug!(sql = %plan.sql, "Direct modify opened");
        Ok(Self {
            table,
            sql: plan.sql.clone(),
            has_returning: plan.has_returning,
            set_processed: plan.set_processed,
            rows_affected: None,
            handles: Some(handles),
            status: DirectStatus::Open,
        })
    }

    /// Runs the statement on the first call; every call reports exhaustion.
    ///
    /// `processed` receives the affected-row count once, when the plan asks
    /// for it.
    pub fn iterate(&mut self, returning_requested: bool, processed: &mut u64) -> FdwResult<Option<Row>> {
        match self.status {
            DirectStatus::Open => {}
            DirectStatus::Aborted => return Err(FdwError::Cancelled),
            DirectStatus::Ended => return Err(FdwError::internal("direct modify has already ended")),
        }
        if returning_requested || self.has_returning {
            return Err(FdwError::unimplemented(format!(
                "RETURNING from a directly executed modification of \"{}\"",
                self.table.name
            )));
        }
        if self.rows_affected.is_some() {
            return Ok(None);
        }

        let handles = self
            .handles
            .as_mut()
            .ok_or_else(|| FdwError::internal("direct modify has no connection"))?;
        let count = handles
            .execute(&self.sql)?
            .row_count()
            .map_err(|e| FdwError::remote_call("Counting affected rows", e))?;
        let affected = u64::try_from(count).unwrap_or(0);
        self.rows_affected = Some(affected);
        metrics::record_rows_modified(affected);
        if self.set_processed {
            *processed += affected;
        }
        Ok(None)
    }

    /// Rows affected by the statement, once it has run
    pub fn rows_affected(&self) -> Option<u64> {
        self.rows_affected
    }

    /// Frees the statement and connection. Safe to call more than once.
    pub fn end(&mut self) -> FdwResult<()> {
        if self.status == DirectStatus::Open {
            self.status = DirectStatus::Ended;
        }
        match self.handles.take() {
            Some(handles) => handles.release(),
            None => Ok(()),
        }
    }

    pub fn abort(&mut self) {
        self.status = DirectStatus::Aborted;
        release_quietly(self.handles.take(), "direct modify abort");
    }
}

impl Drop for DirectModifyState {
    fn drop(&mut self) {
        release_quietly(self.handles.take(), "direct modify drop");
    }
}
