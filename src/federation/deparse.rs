// SPDX-License-Identifier: BUSL-1.1

//! Remote statement generation
//!
//! Turning expressions into remote SQL text is the job of a dialect-aware
//! generator supplied by the host. The planner hands it everything it has
//! decided and stores the text and column mapping it returns.

use qore_core::FdwResult;

use crate::engine::modify::InsertMode;
use crate::engine::registry::ForeignTable;
use crate::federation::descriptor::RelationPushdownDescriptor;
use crate::federation::types::{Expr, RestrictInfo, SortKey};

/// Everything needed to generate a remote SELECT
pub struct SelectRequest<'a> {
    pub descriptor: &'a RelationPushdownDescriptor,
    /// Descriptors of a join's or grouping's inputs, outer first
    pub inputs: Vec<&'a RelationPushdownDescriptor>,
    /// Output expressions of a join or grouped relation; empty for base scans
    pub tlist: &'a [Expr],
    pub remote_conds: &'a [RestrictInfo],
    pub sort_keys: &'a [SortKey],
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeparsedSelect {
    pub sql: String,
    /// 1-based output positions filled by each remote column, in order
    pub retrieved_attrs: Vec<usize>,
    /// Expressions whose values bind the statement's parameter markers
    pub params: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeparsedModify {
    pub sql: String,
    /// Text following the literal row of a direct insert, such as a conflict
    /// clause; empty otherwise
    pub suffix: String,
    pub retrieved_attrs: Vec<usize>,
}

/// Dialect-aware remote SQL generator
pub trait Deparser: Send + Sync {
    fn deparse_select(&self, request: &SelectRequest<'_>) -> FdwResult<DeparsedSelect>;

    /// INSERT text. In prepared mode the full statement with parameter
    /// markers. In direct mode `sql` is the prefix a literal row is appended
    /// to and `suffix` carries whatever must follow that row.
    fn deparse_insert(
        &self,
        table: &ForeignTable,
        target_attrs: &[usize],
        do_nothing: bool,
        returning: &[Expr],
        mode: InsertMode,
    ) -> FdwResult<DeparsedModify>;

    fn deparse_direct_update(
        &self,
        table: &ForeignTable,
        assignments: &[(usize, Expr)],
        remote_conds: &[Expr],
        returning: &[Expr],
    ) -> FdwResult<DeparsedModify>;

    fn deparse_direct_delete(
        &self,
        table: &ForeignTable,
        remote_conds: &[Expr],
        returning: &[Expr],
    ) -> FdwResult<DeparsedModify>;
}
