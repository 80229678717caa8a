// SPDX-License-Identifier: Apache-2.0

//! Modify execution
//!
//! Inserts go through one of two strategies chosen when the plan is built:
//! a statement prepared once and re-bound for every row, or statement text
//! with the row's values spliced in as literals. Ordinary (non-direct)
//! updates and deletes are not supported.

use std::sync::Arc;

use qore_core::{FdwError, FdwResult, LocalType, Row, TableId};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::engine::handles::{release_quietly, RemoteHandles};
use crate::engine::params::{bind_text, build_insert_sql};
use crate::engine::registry::{ForeignCatalog, ForeignTable};
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModifyOperation {
    Insert,
    Update,
    Delete,
}

impl ModifyOperation {
    /// Updates and deletes must tell the remote side which row they target.
    pub fn needs_row_identifier(self) -> bool {
        !matches!(self, ModifyOperation::Insert)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertMode {
    Prepared,
    Direct,
}

/// Planned modification of a foreign table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifyPlan {
    pub table: TableId,
    pub operation: ModifyOperation,
    /// Full statement text (prepared mode) or the text rows are appended to
    pub sql: String,
    /// Text after each literal row in direct mode
    #[serde(default)]
    pub sql_suffix: String,
    pub target_attrs: Vec<usize>,
    pub has_returning: bool,
    pub retrieved_attrs: Vec<usize>,
    pub insert_mode: InsertMode,
}

/// One transmitted parameter; `attno` is `None` for the row identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamColumn {
    pub attno: Option<usize>,
    pub ty: LocalType,
}

/// How one insert row reaches the remote side
pub(crate) trait InsertStrategy: Send {
    fn mode(&self) -> InsertMode;

    fn is_prepared(&self) -> bool;

    /// Sends one row and returns the driver's affected-row count.
    fn insert(
        &mut self,
        handles: &mut RemoteHandles,
        sql: &str,
        suffix: &str,
        params: &[ParamColumn],
        texts: &[Option<String>],
    ) -> FdwResult<i64>;
}

/// Prepares on the first row, then binds and re-executes
#[derive(Debug, Default)]
struct PreparedInsert {
    prepared: bool,
}

impl InsertStrategy for PreparedInsert {
    fn mode(&self) -> InsertMode {
        InsertMode::Prepared
    }

    fn is_prepared(&self) -> bool {
        self.prepared
    }

    fn insert(
        &mut self,
        handles: &mut RemoteHandles,
        sql: &str,
        _suffix: &str,
        params: &[ParamColumn],
        texts: &[Option<String>],
    ) -> FdwResult<i64> {
        let stmt = if self.prepared {
            handles.statement()?
        } else {
            let stmt = handles.prepare(sql)?;
            self.prepared = true;
            stmt
        };
        for (index, (param, text)) in params.iter().zip(texts).enumerate() {
            stmt.bind_param(index, bind_text(param.ty, text.as_deref())?)
                .map_err(|e| FdwError::remote_call("Binding remote parameter", e))?;
        }
        let result = stmt.execute_prepared();
        metrics::record_statement(result.is_ok());
        result.map_err(|e| FdwError::remote_call("Executing prepared insert", e))?;
        stmt.row_count()
            .map_err(|e| FdwError::remote_call("Counting affected rows", e))
    }
}

/// Builds literal statement text for every row
#[derive(Debug, Default)]
struct DirectInsert;

impl InsertStrategy for DirectInsert {
    fn mode(&self) -> InsertMode {
        InsertMode::Direct
    }

    fn is_prepared(&self) -> bool {
        false
    }

    fn insert(
        &mut self,
        handles: &mut RemoteHandles,
        sql: &str,
        suffix: &str,
        params: &[ParamColumn],
        texts: &[Option<String>],
    ) -> FdwResult<i64> {
        let types: Vec<LocalType> = params.iter().map(|p| p.ty).collect();
        let statement = build_insert_sql(sql, suffix, &types, texts)?;
        handles
            .execute(&statement)?
            .row_count()
            .map_err(|e| FdwError::remote_call("Counting affected rows", e))
    }
}

fn strategy_for(mode: InsertMode) -> Box<dyn InsertStrategy> {
    match mode {
        InsertMode::Prepared => Box::new(PreparedInsert::default()),
        InsertMode::Direct => Box::new(DirectInsert),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModifyStatus {
    Open,
    Ended,
    Aborted,
}

/// Execution state of one foreign table modification
pub struct ForeignModifyState {
    table: Arc<ForeignTable>,
    operation: ModifyOperation,
    sql: String,
    sql_suffix: String,
    target_attrs: Vec<usize>,
    has_returning: bool,
    retrieved_attrs: Vec<usize>,
    params: Vec<ParamColumn>,
    strategy: Box<dyn InsertStrategy>,
    handles: Option<RemoteHandles>,
    status: ModifyStatus,
}

impl ForeignModifyState {
    #[instrument(skip_all, fields(table = %plan.table, operation = ?plan.operation))]
    pub fn begin(catalog: &ForeignCatalog, plan: &ModifyPlan) -> FdwResult<Self> {
        let table = catalog.table(plan.table)?;

        let mut params = Vec::with_capacity(plan.target_attrs.len() + 1);
        if plan.operation.needs_row_identifier() {
            params.push(ParamColumn {
                attno: None,
                ty: LocalType::Text,
            });
        }
        for &attno in &plan.target_attrs {
            let column = table.column(attno).ok_or_else(|| {
                FdwError::not_found("Column", format!("{} #{}", table.name, attno))
            })?;
            if column.dropped {
                return Err(FdwError::internal(format!(
                    "target column {} of \"{}\" is dropped",
                    attno, table.name
                )));
            }
            let ty = LocalType::from_type_id(column.type_id).ok_or_else(|| {
                FdwError::configuration(format!("Does not support data type {}", column.type_id))
            })?;
            params.push(ParamColumn {
                attno: Some(attno),
                ty,
            });
        }

        let handles = RemoteHandles::new(catalog.connect(&table)?);
        debug!(sql = %plan.sql, params = params.len(), "Foreign modify opened");

        Ok(Self {
            table,
            operation: plan.operation,
            sql: plan.sql.clone(),
            sql_suffix: plan.sql_suffix.clone(),
            target_attrs: plan.target_attrs.clone(),
            has_returning: plan.has_returning,
            retrieved_attrs: plan.retrieved_attrs.clone(),
            params,
            strategy: strategy_for(plan.insert_mode),
            handles: Some(handles),
            status: ModifyStatus::Open,
        })
    }

    pub fn operation(&self) -> ModifyOperation {
        self.operation
    }

    pub fn insert_mode(&self) -> InsertMode {
        self.strategy.mode()
    }

    pub fn is_prepared(&self) -> bool {
        self.strategy.is_prepared()
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn target_attrs(&self) -> &[usize] {
        &self.target_attrs
    }

    pub fn has_returning(&self) -> bool {
        self.has_returning
    }

    pub fn retrieved_attrs(&self) -> &[usize] {
        &self.retrieved_attrs
    }

    /// Renders the row identifier and target column values as text.
    pub fn convert_params(&self, row_id: Option<&str>, row: &Row) -> FdwResult<Vec<Option<String>>> {
        let mut texts = Vec::with_capacity(self.params.len());
        for param in &self.params {
            match param.attno {
                None => {
                    let id = row_id.ok_or_else(|| FdwError::internal("row identifier is missing"))?;
                    texts.push(Some(id.to_string()));
                }
                Some(attno) => {
                    let value = row.get(attno).ok_or_else(|| {
                        FdwError::internal(format!("row has no attribute {}", attno))
                    })?;
                    texts.push(param.ty.output(value)?);
                }
            }
        }
        Ok(texts)
    }

    /// Inserts one row. Returns the number of rows the remote side reports.
    pub fn exec_insert(&mut self, row: &Row) -> FdwResult<u64> {
        self.ensure_open()?;
        if self.operation != ModifyOperation::Insert {
            return Err(FdwError::internal(format!(
                "insert requested on a {:?} state",
                self.operation
            )));
        }
        let texts = self.convert_params(None, row)?;
        let handles = self
            .handles
            .as_mut()
            .ok_or_else(|| FdwError::internal("foreign modify has no connection"))?;
        let count = self
            .strategy
            .insert(handles, &self.sql, &self.sql_suffix, &self.params, &texts)?;
        let affected = u64::try_from(count).unwrap_or(0);
        metrics::record_rows_modified(affected);
        Ok(affected)
    }

    pub fn exec_update(&mut self, _row_id: &str, _row: &Row) -> FdwResult<u64> {
        self.ensure_open()?;
        Err(FdwError::unimplemented(format!(
            "UPDATE of foreign table \"{}\"",
            self.table.name
        )))
    }

    pub fn exec_delete(&mut self, _row_id: &str) -> FdwResult<u64> {
        self.ensure_open()?;
        Err(FdwError::unimplemented(format!(
            "DELETE from foreign table \"{}\"",
            self.table.name
        )))
    }

    /// Frees the statement and connection. Safe to call more than once.
    pub fn end(&mut self) -> FdwResult<()> {
        if self.status == ModifyStatus::Open {
            self.status = ModifyStatus::Ended;
        }
        match self.handles.take() {
            Some(handles) => handles.release(),
            None => Ok(()),
        }
    }

    pub fn abort(&mut self) {
        self.status = ModifyStatus::Aborted;
        release_quietly(self.handles.take(), "modify abort");
    }

    fn ensure_open(&self) -> FdwResult<()> {
        match self.status {
            ModifyStatus::Open => Ok(()),
            ModifyStatus::Aborted => Err(FdwError::Cancelled),
            ModifyStatus::Ended => Err(FdwError::internal("foreign modify has already ended")),
        }
    }
}

impl Drop for ForeignModifyState {
    fn drop(&mut self) {
        release_quietly(self.handles.take(), "modify drop");
    }
}
