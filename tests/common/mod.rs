// Shared fixtures: a scripted in-memory remote driver and a plain SQL generator.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use qore_core::{
    BoundParam, ColumnDescriptor, DriverError, DriverResult, FdwError, FdwResult, LocalType, Nullability,
    RemoteConnection, RemoteDriver, RemoteStatement, ServerId, SqlType, TableId, TextRead, Value,
};
use qorefdw::engine::modify::InsertMode;
use qorefdw::engine::registry::{ForeignCatalog, ForeignColumn, ForeignServer, ForeignTable};
use qorefdw::engine::{ServerOptions, TableOptions};
use qorefdw::federation::descriptor::{quote_identifier, RelationKind, RelationPushdownDescriptor};
use qorefdw::federation::types::{BoolOp, Expr};
use qorefdw::federation::{DeparsedModify, DeparsedSelect, Deparser, SelectRequest};
use qorefdw::observability::Sensitive;

pub const DRIVER_ID: &str = "scripted";
pub const SERVER: ServerId = ServerId(1);

/// How truncated reads report what is left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Chunking {
    #[default]
    ReportRemaining,
    UnknownRemaining,
}

/// Result set a scripted statement serves
#[derive(Debug, Clone, Default)]
pub struct RemoteResult {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Vec<Option<Vec<u8>>>>,
    pub chunking: Chunking,
    /// Columns whose reads report fractional truncation
    pub fractional_columns: Vec<usize>,
}

impl RemoteResult {
    pub fn text_rows(columns: Vec<ColumnDescriptor>, rows: &[&[Option<&str>]]) -> Self {
        Self {
            columns,
            rows: rows
                .iter()
                .map(|row| row.iter().map(|v| v.map(|s| s.as_bytes().to_vec())).collect())
                .collect(),
            ..Default::default()
        }
    }
}

/// Everything the scripted remote side observed
#[derive(Debug, Default)]
pub struct DriverLog {
    pub connects: usize,
    pub disconnects: usize,
    pub executed: Vec<String>,
    pub prepared: Vec<String>,
    pub bindings: Vec<Vec<(usize, BoundParam)>>,
    pub prepared_executions: usize,
    pub text_reads: usize,
    pub live_statements: isize,
}

#[derive(Default)]
struct Script {
    result: RemoteResult,
    row_count: i64,
    failures: HashMap<String, DriverError>,
}

/// In-memory driver replaying a scripted result for every statement
#[derive(Clone, Default)]
pub struct ScriptedDriver {
    script: Arc<Mutex<Script>>,
    log: Arc<Mutex<DriverLog>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, result: RemoteResult) {
        self.script.lock().result = result;
    }

    pub fn set_row_count(&self, rows: i64) {
        self.script.lock().row_count = rows;
    }

    /// Makes executing exactly `sql` fail with `error`.
    pub fn fail_on(&self, sql: &str, error: DriverError) {
        self.script.lock().failures.insert(sql.to_string(), error);
    }

    pub fn log(&self) -> parking_lot::MutexGuard<'_, DriverLog> {
        self.log.lock()
    }
}

impl RemoteDriver for ScriptedDriver {
    fn driver_id(&self) -> &str {
        DRIVER_ID
    }

    fn connect(&self, _descriptor: &str) -> DriverResult<Box<dyn RemoteConnection>> {
        self.log.lock().connects += 1;
        Ok(Box::new(ScriptedConnection {
            script: Arc::clone(&self.script),
            log: Arc::clone(&self.log),
        }))
    }
}

struct ScriptedConnection {
    script: Arc<Mutex<Script>>,
    log: Arc<Mutex<DriverLog>>,
}

impl ScriptedConnection {
    fn statement(&self, prepared: bool) -> ScriptedStatement {
        let script = self.script.lock();
        self.log.lock().live_statements += 1;
        ScriptedStatement {
            result: script.result.clone(),
            row_count: script.row_count,
            log: Arc::clone(&self.log),
            cursor: None,
            offsets: Vec::new(),
            prepared,
            bindings: Vec::new(),
        }
    }
}

impl RemoteConnection for ScriptedConnection {
    fn execute(&mut self, sql: &str) -> DriverResult<Box<dyn RemoteStatement>> {
        self.log.lock().executed.push(sql.to_string());
        if let Some(err) = self.script.lock().failures.get(sql) {
            return Err(err.clone());
        }
        Ok(Box::new(self.statement(false)))
    }

    fn prepare(&mut self, sql: &str) -> DriverResult<Box<dyn RemoteStatement>> {
        self.log.lock().prepared.push(sql.to_string());
        Ok(Box::new(self.statement(true)))
    }

    fn disconnect(&mut self) -> DriverResult<()> {
        self.log.lock().disconnects += 1;
        Ok(())
    }
}

struct ScriptedStatement {
    result: RemoteResult,
    row_count: i64,
    log: Arc<Mutex<DriverLog>>,
    cursor: Option<usize>,
    offsets: Vec<usize>,
    prepared: bool,
    bindings: Vec<(usize, BoundParam)>,
}

impl RemoteStatement for ScriptedStatement {
    fn num_result_cols(&mut self) -> DriverResult<usize> {
        Ok(self.result.columns.len())
    }

    fn fetch_next(&mut self) -> DriverResult<bool> {
        let next = self.cursor.map_or(0, |c| c + 1);
        self.cursor = Some(next);
        self.offsets = vec![0; self.result.columns.len()];
        Ok(next < self.result.rows.len())
    }

    fn describe_column(&mut self, column: usize) -> DriverResult<ColumnDescriptor> {
        self.result
            .columns
            .get(column)
            .cloned()
            .ok_or_else(|| DriverError::with_state("07009", "Invalid descriptor index"))
    }

    fn get_text(&mut self, column: usize, buffer: &mut [u8]) -> DriverResult<TextRead> {
        self.log.lock().text_reads += 1;
        let row = self
            .cursor
            .and_then(|c| self.result.rows.get(c))
            .ok_or_else(|| DriverError::with_state("24000", "Invalid cursor state"))?;
        let Some(value) = row.get(column).cloned().flatten() else {
            return Ok(TextRead::Null);
        };
        let offset = self.offsets[column];
        let rest = &value[offset..];
        if rest.len() <= buffer.len() {
            buffer[..rest.len()].copy_from_slice(rest);
            self.offsets[column] = value.len();
            if self.result.fractional_columns.contains(&column) {
                return Ok(TextRead::FractionalTruncation { written: rest.len() });
            }
            return Ok(TextRead::Complete { written: rest.len() });
        }
        let written = buffer.len();
        buffer.copy_from_slice(&rest[..written]);
        self.offsets[column] += written;
        let remaining = match self.result.chunking {
            Chunking::ReportRemaining => Some(rest.len() - written),
            Chunking::UnknownRemaining => None,
        };
        Ok(TextRead::Truncated { written, remaining })
    }

    fn bind_param(&mut self, index: usize, param: BoundParam) -> DriverResult<()> {
        if !self.prepared {
            return Err(DriverError::with_state("HY010", "Function sequence error"));
        }
        self.bindings.push((index, param));
        Ok(())
    }

    fn execute_prepared(&mut self) -> DriverResult<()> {
        let mut log = self.log.lock();
        log.prepared_executions += 1;
        log.bindings.push(std::mem::take(&mut self.bindings));
        self.cursor = None;
        Ok(())
    }

    fn row_count(&mut self) -> DriverResult<i64> {
        Ok(self.row_count)
    }
}

impl Drop for ScriptedStatement {
    fn drop(&mut self) {
        self.log.lock().live_statements -= 1;
    }
}

pub fn column(name: &str, sql_type: SqlType, column_size: usize) -> ColumnDescriptor {
    ColumnDescriptor {
        name: name.into(),
        sql_type,
        column_size,
        decimal_digits: 0,
        nullability: Nullability::Nullable,
    }
}

pub fn table(id: u32, name: &str, columns: &[(&str, LocalType)]) -> ForeignTable {
    ForeignTable {
        id: TableId(id),
        server: SERVER,
        namespace: "public".into(),
        name: name.into(),
        columns: columns.iter().map(|(n, ty)| ForeignColumn::new(n, *ty)).collect(),
        options: TableOptions::default(),
    }
}

/// Catalog with one scripted server holding `tables`.
pub fn catalog(driver: &ScriptedDriver, options: ServerOptions, tables: &[ForeignTable]) -> ForeignCatalog {
    let mut catalog = ForeignCatalog::new();
    catalog.register_driver(Arc::new(driver.clone()));
    catalog.register_server(ForeignServer {
        id: SERVER,
        name: "warehouse".into(),
        driver_id: DRIVER_ID.into(),
        connection: Sensitive::new("DSN=warehouse;UID=etl;PWD=secret".into()),
        options,
    });
    for t in tables {
        catalog.register_table(t.clone());
    }
    catalog
}

/// Plain ANSI-style statement generator with `?` parameter markers
pub struct SqlDeparser {
    tables: HashMap<TableId, ForeignTable>,
}

impl SqlDeparser {
    pub fn new(tables: &[ForeignTable]) -> Self {
        Self {
            tables: tables.iter().map(|t| (t.id, t.clone())).collect(),
        }
    }

    fn table(&self, id: TableId) -> FdwResult<&ForeignTable> {
        self.tables
            .get(&id)
            .ok_or_else(|| FdwError::not_found("Table", id.to_string()))
    }

    fn qualified(table: &ForeignTable) -> String {
        format!("{}.{}", quote_identifier(&table.namespace), quote_identifier(&table.name))
    }

    fn column_name(&self, rel_tables: &HashMap<usize, TableId>, rel: usize, attno: usize, qualify: bool) -> FdwResult<String> {
        let table = self.table(
            *rel_tables
                .get(&rel)
                .ok_or_else(|| FdwError::internal(format!("no table for relation {rel}")))?,
        )?;
        let column = table
            .column(attno)
            .ok_or_else(|| FdwError::internal(format!("no column {attno}")))?;
        let name = quote_identifier(&column.name);
        Ok(if qualify { format!("r{rel}.{name}") } else { name })
    }

    fn expr(
        &self,
        expr: &Expr,
        rel_tables: &HashMap<usize, TableId>,
        qualify: bool,
        params: &mut Vec<Expr>,
    ) -> FdwResult<String> {
        let args = |args: &[Expr], params: &mut Vec<Expr>| {
            args.iter()
                .map(|a| self.expr(a, rel_tables, qualify, params))
                .collect::<FdwResult<Vec<_>>>()
        };
        Ok(match expr {
            Expr::Column { rel, attno, .. } if rel_tables.contains_key(rel) => {
                self.column_name(rel_tables, *rel, *attno, qualify)?
            }
            Expr::Const { value, .. } => literal(value),
            Expr::Column { .. } | Expr::Param { .. } => {
                params.push(expr.clone());
                "?".to_string()
            }
            Expr::Operator { name, args: a, .. } => {
                let parts = args(a, params)?;
                match parts.as_slice() {
                    [l, r] => format!("({l} {name} {r})"),
                    [x] => format!("({name} {x})"),
                    _ => return Err(FdwError::internal("operator arity")),
                }
            }
            Expr::Function { name, args: a, .. } | Expr::Aggregate { name, args: a, .. } => {
                format!("{}({})", name, args(a, params)?.join(", "))
            }
            Expr::Bool { op, args: a } => {
                let parts = args(a, params)?;
                match op {
                    BoolOp::And => format!("({})", parts.join(" AND ")),
                    BoolOp::Or => format!("({})", parts.join(" OR ")),
                    BoolOp::Not => format!("(NOT {})", parts.join("")),
                }
            }
        })
    }

    fn rel_tables(descriptors: &[&RelationPushdownDescriptor]) -> HashMap<usize, TableId> {
        descriptors
            .iter()
            .filter_map(|d| match d.kind {
                RelationKind::Base { relid, table } => Some((relid, table)),
                _ => None,
            })
            .collect()
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".into(),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.into(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Numeric(d) => d.to_string(),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        other => format!("'{other:?}'"),
    }
}

impl Deparser for SqlDeparser {
    fn deparse_select(&self, request: &SelectRequest<'_>) -> FdwResult<DeparsedSelect> {
        let d = request.descriptor;
        let mut params = Vec::new();
        let mut sql = String::from("SELECT ");

        let retrieved_attrs: Vec<usize>;
        match &d.kind {
            RelationKind::Base { relid, table } => {
                let rel_tables = HashMap::from([(*relid, *table)]);
                let attrs: Vec<usize> = d.attrs_used.iter().copied().collect();
                let cols = attrs
                    .iter()
                    .map(|a| self.column_name(&rel_tables, *relid, *a, false))
                    .collect::<FdwResult<Vec<_>>>()?;
                sql.push_str(&if cols.is_empty() { "NULL".to_string() } else { cols.join(", ") });
                sql.push_str(" FROM ");
                sql.push_str(&Self::qualified(self.table(*table)?));
                self.push_where(&mut sql, request, &rel_tables, false, &mut params)?;
                self.push_order(&mut sql, request, &rel_tables, false, &mut params)?;
                retrieved_attrs = attrs;
            }
            RelationKind::Join { join_type, join_clauses, .. } => {
                let rel_tables = Self::rel_tables(&request.inputs);
                let cols = request
                    .tlist
                    .iter()
                    .map(|e| self.expr(e, &rel_tables, true, &mut params))
                    .collect::<FdwResult<Vec<_>>>()?;
                sql.push_str(&cols.join(", "));
                let mut from = Vec::new();
                for (relid, table) in request.inputs.iter().filter_map(|i| match i.kind {
                    RelationKind::Base { relid, table } => Some((relid, table)),
                    _ => None,
                }) {
                    from.push(format!("{} r{}", Self::qualified(self.table(table)?), relid));
                }
                let on = join_clauses
                    .iter()
                    .map(|c| self.expr(&c.clause, &rel_tables, true, &mut params))
                    .collect::<FdwResult<Vec<_>>>()?;
                sql.push_str(&format!(
                    " FROM {} {} {} ON ({})",
                    from.first().cloned().unwrap_or_default(),
                    join_type.label(),
                    from.get(1).cloned().unwrap_or_default(),
                    if on.is_empty() { "TRUE".to_string() } else { on.join(" AND ") }
                ));
                self.push_where(&mut sql, request, &rel_tables, true, &mut params)?;
                self.push_order(&mut sql, request, &rel_tables, true, &mut params)?;
                retrieved_attrs = (1..=request.tlist.len()).collect();
            }
            RelationKind::Upper { .. } => {
                let input = request
                    .inputs
                    .first()
                    .ok_or_else(|| FdwError::internal("grouping without input"))?;
                let rel_tables = Self::rel_tables(&request.inputs);
                let cols = request
                    .tlist
                    .iter()
                    .map(|e| self.expr(e, &rel_tables, false, &mut params))
                    .collect::<FdwResult<Vec<_>>>()?;
                sql.push_str(&cols.join(", "));
                sql.push_str(" FROM ");
                sql.push_str(&Self::qualified(self.table(input.table)?));
                let input_conds = input
                    .remote_conds
                    .iter()
                    .map(|c| self.expr(&c.clause, &rel_tables, false, &mut params))
                    .collect::<FdwResult<Vec<_>>>()?;
                if !input_conds.is_empty() {
                    sql.push_str(&format!(" WHERE {}", input_conds.join(" AND ")));
                }
                let keys = request
                    .tlist
                    .iter()
                    .filter(|e| !e.contains_aggregate())
                    .map(|e| self.expr(e, &rel_tables, false, &mut params))
                    .collect::<FdwResult<Vec<_>>>()?;
                if !keys.is_empty() {
                    sql.push_str(&format!(" GROUP BY {}", keys.join(", ")));
                }
                let having = request
                    .remote_conds
                    .iter()
                    .map(|c| self.expr(&c.clause, &rel_tables, false, &mut params))
                    .collect::<FdwResult<Vec<_>>>()?;
                if !having.is_empty() {
                    sql.push_str(&format!(" HAVING {}", having.join(" AND ")));
                }
                retrieved_attrs = (1..=request.tlist.len()).collect();
            }
        }

        Ok(DeparsedSelect {
            sql,
            retrieved_attrs,
            params,
        })
    }

    fn deparse_insert(
        &self,
        table: &ForeignTable,
        target_attrs: &[usize],
        do_nothing: bool,
        _returning: &[Expr],
        mode: InsertMode,
    ) -> FdwResult<DeparsedModify> {
        let names = target_attrs
            .iter()
            .map(|a| {
                table
                    .column(*a)
                    .map(|c| quote_identifier(&c.name))
                    .ok_or_else(|| FdwError::internal(format!("no column {a}")))
            })
            .collect::<FdwResult<Vec<_>>>()?;
        let head = format!("INSERT INTO {} ({}) VALUES ", Self::qualified(table), names.join(", "));
        let conflict = if do_nothing { " ON CONFLICT DO NOTHING" } else { "" };
        let (sql, suffix) = match mode {
            InsertMode::Direct => (head, conflict.to_string()),
            InsertMode::Prepared => {
                let markers = vec!["?"; names.len()].join(", ");
                (format!("{head}({markers}){conflict}"), String::new())
            }
        };
        Ok(DeparsedModify {
            sql,
            suffix,
            retrieved_attrs: Vec::new(),
        })
    }

    fn deparse_direct_update(
        &self,
        table: &ForeignTable,
        assignments: &[(usize, Expr)],
        remote_conds: &[Expr],
        _returning: &[Expr],
    ) -> FdwResult<DeparsedModify> {
        let rel_tables = self.single_rel(table, remote_conds, assignments.iter().map(|(_, e)| e));
        let mut params = Vec::new();
        let sets = assignments
            .iter()
            .map(|(attno, expr)| {
                let name = table
                    .column(*attno)
                    .map(|c| quote_identifier(&c.name))
                    .ok_or_else(|| FdwError::internal(format!("no column {attno}")))?;
                Ok(format!("{} = {}", name, self.expr(expr, &rel_tables, false, &mut params)?))
            })
            .collect::<FdwResult<Vec<_>>>()?;
        let mut sql = format!("UPDATE {} SET {}", Self::qualified(table), sets.join(", "));
        self.push_conds(&mut sql, remote_conds, &rel_tables)?;
        Ok(DeparsedModify {
            sql,
            suffix: String::new(),
            retrieved_attrs: Vec::new(),
        })
    }

    fn deparse_direct_delete(
        &self,
        table: &ForeignTable,
        remote_conds: &[Expr],
        _returning: &[Expr],
    ) -> FdwResult<DeparsedModify> {
        let rel_tables = self.single_rel(table, remote_conds, std::iter::empty());
        let mut sql = format!("DELETE FROM {}", Self::qualified(table));
        self.push_conds(&mut sql, remote_conds, &rel_tables)?;
        Ok(DeparsedModify {
            sql,
            suffix: String::new(),
            retrieved_attrs: Vec::new(),
        })
    }
}

impl SqlDeparser {
    fn push_where(
        &self,
        sql: &mut String,
        request: &SelectRequest<'_>,
        rel_tables: &HashMap<usize, TableId>,
        qualify: bool,
        params: &mut Vec<Expr>,
    ) -> FdwResult<()> {
        let conds = request
            .remote_conds
            .iter()
            .map(|c| self.expr(&c.clause, rel_tables, qualify, params))
            .collect::<FdwResult<Vec<_>>>()?;
        if !conds.is_empty() {
            sql.push_str(&format!(" WHERE {}", conds.join(" AND ")));
        }
        Ok(())
    }

    fn push_order(
        &self,
        sql: &mut String,
        request: &SelectRequest<'_>,
        rel_tables: &HashMap<usize, TableId>,
        qualify: bool,
        params: &mut Vec<Expr>,
    ) -> FdwResult<()> {
        let keys = request
            .sort_keys
            .iter()
            .map(|k| {
                Ok(format!(
                    "{} {} NULLS {}",
                    self.expr(&k.expr, rel_tables, qualify, params)?,
                    if k.descending { "DESC" } else { "ASC" },
                    if k.nulls_first { "FIRST" } else { "LAST" }
                ))
            })
            .collect::<FdwResult<Vec<_>>>()?;
        if !keys.is_empty() {
            sql.push_str(&format!(" ORDER BY {}", keys.join(", ")));
        }
        Ok(())
    }

    fn push_conds(&self, sql: &mut String, conds: &[Expr], rel_tables: &HashMap<usize, TableId>) -> FdwResult<()> {
        let mut params = Vec::new();
        let parts = conds
            .iter()
            .map(|c| self.expr(c, rel_tables, false, &mut params))
            .collect::<FdwResult<Vec<_>>>()?;
        if !parts.is_empty() {
            sql.push_str(&format!(" WHERE {}", parts.join(" AND ")));
        }
        Ok(())
    }

    /// Maps every relation referenced in `exprs` to `table`.
    fn single_rel<'e>(
        &self,
        table: &ForeignTable,
        conds: &'e [Expr],
        more: impl Iterator<Item = &'e Expr>,
    ) -> HashMap<usize, TableId> {
        conds
            .iter()
            .chain(more)
            .flat_map(|e| e.relids().iter().collect::<Vec<_>>())
            .map(|rel| (rel, table.id))
            .collect()
    }
}
