// SPDX-License-Identifier: Apache-2.0

//! Scan execution
//!
//! A scan runs its statement when it opens, then walks the remote cursor
//! one row per pull. Remote columns are described on the first pull and
//! the resulting read plan is reused for every later row.

use std::sync::Arc;

use qore_core::{FdwError, FdwResult, LocalType, Row, Value};
use tracing::{debug, info, instrument};

use crate::engine::encoding::{decode_utf8, RemoteEncoding};
use crate::engine::fetch::{read_column, ColumnValue};
use crate::engine::handles::{release_quietly, RemoteHandles};
use crate::engine::params::bind_value;
use crate::engine::registry::{ForeignCatalog, ForeignTable};
use crate::engine::type_map::{ColumnConversion, ColumnReadPlan};
use crate::federation::types::ForeignScanPlan;
use crate::metrics;

enum ColumnPlans {
    NotStarted,
    Planned(Vec<ColumnReadPlan>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanStatus {
    Open,
    Closed,
    Aborted,
}

/// Execution state of one foreign scan
pub struct ForeignScanState {
    table: Arc<ForeignTable>,
    query: String,
    retrieved_attrs: Vec<usize>,
    /// Local type of every output attribute; `None` where no conversion exists
    attr_types: Vec<Option<LocalType>>,
    encoding: Option<RemoteEncoding>,
    num_result_cols: usize,
    columns: ColumnPlans,
    handles: Option<RemoteHandles>,
    notices: Vec<String>,
    status: ScanStatus,
}

impl ForeignScanState {
    /// Connects, runs the plan's statement and records the result width.
    #[instrument(skip_all, fields(table = %plan.table))]
    pub fn begin(catalog: &ForeignCatalog, plan: &ForeignScanPlan, params: &[Value]) -> FdwResult<Self> {
        let table = catalog.table(plan.table)?;
        let server = catalog.server(table.server)?;
        let encoding = server
            .options
            .encoding
            .as_deref()
            .map(RemoteEncoding::from_name)
            .transpose()?;

        let attr_types: Vec<Option<LocalType>> = match plan.scan_relid {
            Some(_) => table
                .columns
                .iter()
                .map(|c| LocalType::from_type_id(c.type_id))
                .collect(),
            None => plan
                .scan_tlist
                .iter()
                .map(|e| LocalType::from_type_id(e.type_id()))
                .collect(),
        };
        for attno in &plan.retrieved_attrs {
            match attno.checked_sub(1).and_then(|i| attr_types.get(i)) {
                Some(Some(_)) => {}
                Some(None) => {
                    return Err(FdwError::configuration(format!(
                        "Attribute {} of \"{}\" has a type that cannot be read",
                        attno, table.name
                    )))
                }
                None => {
                    return Err(FdwError::internal(format!(
                        "retrieved attribute {} is outside the scan row",
                        attno
                    )))
                }
            }
        }
        if params.len() != plan.params.len() {
            return Err(FdwError::configuration(format!(
                "Remote query expects {} parameters, {} supplied",
                plan.params.len(),
                params.len()
            )));
        }

        let mut handles = RemoteHandles::new(catalog.connect(&table)?);
        let num_result_cols = match open_cursor(&mut handles, plan, params) {
            Ok(n) => n,
            Err(e) => {
                release_quietly(Some(handles), "scan open");
                return Err(e);
            }
        };
        debug!(sql = %plan.sql, num_result_cols, "Foreign scan opened");

        Ok(Self {
            table,
            query: plan.sql.clone(),
            retrieved_attrs: plan.retrieved_attrs.clone(),
            attr_types,
            encoding,
            num_result_cols,
            columns: ColumnPlans::NotStarted,
            handles: Some(handles),
            notices: Vec::new(),
            status: ScanStatus::Open,
        })
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn num_result_cols(&self) -> usize {
        self.num_result_cols
    }

    /// Pulls the next row, or `None` once the remote result is exhausted.
    pub fn iterate(&mut self) -> FdwResult<Option<Row>> {
        match self.status {
            ScanStatus::Open => {}
            ScanStatus::Aborted => return Err(FdwError::Cancelled),
            ScanStatus::Closed => return Err(FdwError::internal("foreign scan is already closed")),
        }
        let Some(handles) = self.handles.as_mut() else {
            return Err(FdwError::internal("foreign scan has no open statement"));
        };
        let stmt = handles.statement()?;

        let has_row = stmt
            .fetch_next()
            .map_err(|e| FdwError::remote_call("Fetching remote row", e))?;
        if !has_row {
            return Ok(None);
        }

        if let ColumnPlans::NotStarted = self.columns {
            if self.retrieved_attrs.len() > self.num_result_cols {
                return Err(FdwError::configuration(format!(
                    "Remote query returned {} columns, {} expected",
                    self.num_result_cols,
                    self.retrieved_attrs.len()
                )));
            }
            let mut plans = Vec::with_capacity(self.retrieved_attrs.len());
            for column in 0..self.retrieved_attrs.len() {
                let desc = stmt
                    .describe_column(column)
                    .map_err(|e| FdwError::remote_call("Describing remote column", e))?;
                plans.push(ColumnReadPlan::for_column(&desc));
            }
            self.columns = ColumnPlans::Planned(plans);
        }
        let ColumnPlans::Planned(plans) = &self.columns else {
            return Err(FdwError::internal("column plans missing"));
        };

        let mut row = Row::null(self.attr_types.len());
        for (column, (&attno, plan)) in self.retrieved_attrs.iter().zip(plans).enumerate() {
            let (bytes, fractional) = match read_column(stmt, column, plan.buffer_size)? {
                ColumnValue::Null => continue,
                ColumnValue::Bytes(bytes) => (bytes, false),
                ColumnValue::FractionallyTruncated(bytes) => (bytes, true),
            };
            let text = apply_conversion(plan.conversion, self.encoding, &bytes)?;
            if fractional {
                info!(value = %text, "Truncating number");
                self.notices.push(format!("Truncating number: {}", text));
            }
            let ty = self.attr_types[attno - 1]
                .ok_or_else(|| FdwError::internal(format!("no input conversion for attribute {}", attno)))?;
            row.values[attno - 1] = ty.input(&text)?;
        }

        metrics::record_row_fetched();
        Ok(Some(row))
    }

    /// Restarting a scan is not supported.
    pub fn rescan(&mut self) -> FdwResult<()> {
        Err(FdwError::unimplemented(format!(
            "rescan of foreign table \"{}\"",
            self.table.name
        )))
    }

    /// Frees the statement and connection. Safe to call more than once.
    pub fn close(&mut self) -> FdwResult<()> {
        if self.status == ScanStatus::Open {
            self.status = ScanStatus::Closed;
        }
        match self.handles.take() {
            Some(handles) => handles.release(),
            None => Ok(()),
        }
    }

    /// Abandons the scan after a host abort; later pulls fail with `Cancelled`.
    pub fn abort(&mut self) {
        self.status = ScanStatus::Aborted;
        release_quietly(self.handles.take(), "scan abort");
    }

    /// Drains the notices raised since the last call.
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }
}

impl Drop for ForeignScanState {
    fn drop(&mut self) {
        release_quietly(self.handles.take(), "scan drop");
    }
}

fn open_cursor(handles: &mut RemoteHandles, plan: &ForeignScanPlan, params: &[Value]) -> FdwResult<usize> {
    let stmt = if plan.params.is_empty() {
        handles.execute(&plan.sql)?
    } else {
        let stmt = handles.prepare(&plan.sql)?;
        for (index, (expr, value)) in plan.params.iter().zip(params).enumerate() {
            let ty = LocalType::from_type_id(expr.type_id()).ok_or_else(|| {
                FdwError::configuration(format!("Unsupported parameter type {}", expr.type_id()))
            })?;
            stmt.bind_param(index, bind_value(ty, value)?)
                .map_err(|e| FdwError::remote_call("Binding remote parameter", e))?;
        }
        let result = stmt.execute_prepared();
        metrics::record_statement(result.is_ok());
        result.map_err(|e| FdwError::remote_call("Executing remote query", e))?;
        stmt
    };
    stmt.num_result_cols()
        .map_err(|e| FdwError::remote_call("Counting remote result columns", e))
}

/// Turns raw column bytes into the text handed to the local input conversion.
fn apply_conversion(
    conversion: ColumnConversion,
    encoding: Option<RemoteEncoding>,
    bytes: &[u8],
) -> FdwResult<String> {
    let decode = |b: &[u8]| match encoding {
        Some(enc) => enc.decode(b),
        None => decode_utf8(b),
    };
    match conversion {
        ColumnConversion::Text => decode(bytes),
        ColumnConversion::Hex => Ok(format!("\\x{}", decode(bytes)?)),
        ColumnConversion::Bool => match bytes.first() {
            Some(0) => Ok("F".to_string()),
            Some(1) => Ok("T".to_string()),
            _ => decode(bytes),
        },
        ColumnConversion::Bin => Err(FdwError::configuration("Bit string columns are not supported")),
    }
}
