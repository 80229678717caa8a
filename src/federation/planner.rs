// SPDX-License-Identifier: BUSL-1.1

//! Planning session.
//!
//! Holds every pushdown descriptor created while the host plans one query,
//! sizes base relations, finalizes chosen paths into scan plans, and plans
//! modifications. Path generation, costing, joins and grouping live in
//! sibling modules as further `impl PlannerSession` blocks.

use std::collections::BTreeSet;

use qore_core::{FdwError, FdwResult, TableId};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::engine::direct_modify::DirectModifyPlan;
use crate::engine::modify::{InsertMode, ModifyOperation, ModifyPlan};
use crate::engine::registry::ForeignCatalog;
use crate::federation::cost::{clamp_row_est, DEFAULT_TABLE_SIZE};
use crate::federation::deparse::{Deparser, SelectRequest};
use crate::federation::descriptor::{base_relation_name, RelationKind, RelationPushdownDescriptor};
use crate::federation::safety::{RemoteSafety, SafetyContext};
use crate::federation::shippable::ShippabilityCache;
use crate::federation::types::{
    BaseRelation, DescriptorId, Expr, ForeignPath, ForeignScanPlan, QualCost, QueryInfo, RelationStats,
    Relids, RestrictInfo, SortKey,
};

const BLOCK_SIZE: f64 = 8192.0;
const TUPLE_HEADER_SIZE: f64 = 24.0;

/// Conflict action of an INSERT
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnConflict {
    #[default]
    None,
    DoNothing,
    DoUpdate,
}

/// Host request to plan an ordinary modification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifyRequest {
    pub operation: ModifyOperation,
    pub table: TableId,
    /// Columns the statement explicitly assigns
    pub target_attrs: Vec<usize>,
    #[serde(default)]
    pub on_conflict: OnConflict,
    #[serde(default)]
    pub returning: Vec<Expr>,
}

/// Host request to run an UPDATE/DELETE as one remote statement
#[derive(Debug, Clone)]
pub struct DirectModifyRequest<'r> {
    pub operation: ModifyOperation,
    pub table: TableId,
    /// Scan subplan producing the rows to modify
    pub scan: &'r ForeignScanPlan,
    /// Descriptor the scan subplan was built from
    pub descriptor: DescriptorId,
    /// `(attno, new value)` of every assigned column of an UPDATE
    pub assignments: Vec<(usize, Expr)>,
    pub returning: Vec<Expr>,
    /// Whether the statement's row count is reported to the client
    pub can_set_tag: bool,
}

/// State of planning one query
pub struct PlannerSession<'a> {
    pub(crate) catalog: &'a ForeignCatalog,
    pub(crate) shippability: &'a ShippabilityCache,
    pub(crate) safety: &'a dyn RemoteSafety,
    pub(crate) deparser: &'a dyn Deparser,
    pub(crate) query: QueryInfo,
    pub(crate) relations: Vec<RelationPushdownDescriptor>,
}

impl<'a> PlannerSession<'a> {
    pub fn new(
        catalog: &'a ForeignCatalog,
        shippability: &'a ShippabilityCache,
        safety: &'a dyn RemoteSafety,
        deparser: &'a dyn Deparser,
        query: QueryInfo,
    ) -> Self {
        Self {
            catalog,
            shippability,
            safety,
            deparser,
            query,
            relations: Vec::new(),
        }
    }

    pub fn query(&self) -> &QueryInfo {
        &self.query
    }

    pub fn descriptor(&self, id: DescriptorId) -> FdwResult<&RelationPushdownDescriptor> {
        self.relations
            .get(id.0)
            .ok_or_else(|| FdwError::internal(format!("unknown pushdown descriptor {}", id.0)))
    }

    pub(crate) fn descriptor_mut(&mut self, id: DescriptorId) -> FdwResult<&mut RelationPushdownDescriptor> {
        self.relations
            .get_mut(id.0)
            .ok_or_else(|| FdwError::internal(format!("unknown pushdown descriptor {}", id.0)))
    }

    pub(crate) fn push_descriptor(&mut self, descriptor: RelationPushdownDescriptor) -> DescriptorId {
        self.relations.push(descriptor);
        DescriptorId(self.relations.len() - 1)
    }

    pub(crate) fn is_safe_for(&self, descriptor: &RelationPushdownDescriptor, expr: &Expr) -> bool {
        let ctx = SafetyContext {
            descriptor,
            shippability: self.shippability,
        };
        self.safety.is_remote_safe(&ctx, expr)
    }

    /// Splits clauses into remote-safe and local-only lists, keeping order.
    pub(crate) fn classify_conditions(
        &self,
        descriptor: &RelationPushdownDescriptor,
        clauses: &[RestrictInfo],
    ) -> (Vec<RestrictInfo>, Vec<RestrictInfo>) {
        clauses
            .iter()
            .cloned()
            .partition(|c| self.is_safe_for(descriptor, &c.clause))
    }

    /// Creates the descriptor of a base foreign relation and its default estimate.
    #[instrument(skip_all, fields(relid = rel.relid, table = %rel.table))]
    pub fn get_rel_size(&mut self, rel: &BaseRelation) -> FdwResult<DescriptorId> {
        let table = self.catalog.table(rel.table)?;
        let options = self.catalog.effective_options(&table)?;

        let mut d = RelationPushdownDescriptor::new(
            RelationKind::Base {
                relid: rel.relid,
                table: rel.table,
            },
            Relids::single(rel.relid),
            table.server,
            rel.table,
            options,
        );
        d.pushdown_safe = true;

        let (remote, local) = self.classify_conditions(&d, &rel.restrictions);
        d.remote_conds = remote;
        d.local_conds = local;
        d.refresh_local_conds();

        let mut attrs_used: BTreeSet<usize> = rel.target_attrs.iter().copied().collect();
        for cond in &d.local_conds {
            attrs_used.extend(cond.clause.attnos_of(rel.relid));
        }
        d.attrs_used = attrs_used;

        d.stats = base_stats(rel);
        d.restrict_cost = QualCost::sum(&rel.restrictions);
        d.relation_name = base_relation_name(&table.namespace, &table.name, rel.alias.as_deref());

        debug!(
            relation = %d.relation_name,
            remote_conds = d.remote_conds.len(),
            local_conds = d.local_conds.len(),
            rows = d.stats.rows,
            "Sized foreign relation"
        );

        let id = self.push_descriptor(d);
        let estimate = self.estimate_path_cost(id, &[], &[])?;
        self.descriptor_mut(id)?.estimate = estimate;
        Ok(id)
    }

    /// Builds the executable scan for a chosen path.
    ///
    /// `scan_clauses` are the clauses the host wants enforced by the scan;
    /// for base relations they are split into remote and local ones here.
    #[instrument(skip_all, fields(descriptor = path.descriptor.0))]
    pub fn get_plan(&mut self, path: &ForeignPath, scan_clauses: &[RestrictInfo]) -> FdwResult<ForeignScanPlan> {
        let id = path.descriptor;
        let d = self.descriptor(id)?;

        let (remote_conds, local_exprs): (Vec<RestrictInfo>, Vec<Expr>) = match &d.kind {
            RelationKind::Base { .. } => {
                let mut remote = Vec::new();
                let mut local = Vec::new();
                for rinfo in scan_clauses.iter().filter(|c| !c.pseudoconstant) {
                    if d.remote_conds.contains(rinfo) {
                        remote.push(rinfo.clone());
                    } else if d.local_conds.contains(rinfo) {
                        local.push(rinfo.clause.clone());
                    } else if self.is_safe_for(d, &rinfo.clause) {
                        remote.push(rinfo.clone());
                    } else {
                        local.push(rinfo.clause.clone());
                    }
                }
                (remote, local)
            }
            RelationKind::Join { .. } | RelationKind::Upper { .. } => (
                d.remote_conds.clone(),
                d.local_conds.iter().map(|c| c.clause.clone()).collect(),
            ),
        };

        let (tlist, inputs) = match &d.kind {
            RelationKind::Base { .. } => (Vec::new(), Vec::new()),
            RelationKind::Join {
                outer,
                inner,
                target,
                ..
            } => (
                join_tlist(target, &local_exprs),
                vec![self.descriptor(*outer)?, self.descriptor(*inner)?],
            ),
            RelationKind::Upper {
                input,
                grouped_tlist,
                ..
            } => (grouped_tlist.clone(), vec![self.descriptor(*input)?]),
        };

        let sort_keys = path
            .pathkeys
            .iter()
            .map(|pk| {
                let ec = self.query.eclass(pk.eclass).ok_or_else(|| {
                    FdwError::internal(format!("unknown equivalence class {}", pk.eclass))
                })?;
                let expr = ec.member_for(&d.relids).ok_or_else(|| {
                    FdwError::internal("could not find pathkey item to sort")
                })?;
                Ok(SortKey {
                    expr: expr.clone(),
                    descending: pk.descending,
                    nulls_first: pk.nulls_first,
                })
            })
            .collect::<FdwResult<Vec<_>>>()?;

        let deparsed = self.deparser.deparse_select(&SelectRequest {
            descriptor: d,
            inputs,
            tlist: &tlist,
            remote_conds: &remote_conds,
            sort_keys: &sort_keys,
        })?;

        let remote_exprs: Vec<Expr> = remote_conds.iter().map(|c| c.clause.clone()).collect();
        let is_base = d.base_relid().is_some();
        let plan = ForeignScanPlan {
            table: d.table,
            scan_relid: d.base_relid(),
            sql: deparsed.sql,
            retrieved_attrs: deparsed.retrieved_attrs,
            params: deparsed.params,
            fetch_size: d.options.fetch_size,
            relation_name: (!is_base).then(|| d.relation_name.clone()),
            scan_tlist: tlist,
            local_exprs,
            remote_exprs: remote_exprs.clone(),
            recheck_quals: if is_base { remote_exprs.clone() } else { Vec::new() },
        };
        debug!(sql = %plan.sql, "Finalized foreign scan");

        self.descriptor_mut(id)?.final_remote_exprs = remote_exprs;
        Ok(plan)
    }

    /// Plans an INSERT through the ordinary modify path.
    #[instrument(skip_all, fields(table = %request.table, operation = ?request.operation))]
    pub fn plan_modify(&self, request: &ModifyRequest) -> FdwResult<ModifyPlan> {
        if request.operation != ModifyOperation::Insert {
            return Err(FdwError::unimplemented(format!(
                "{:?} through the row-by-row modify path",
                request.operation
            )));
        }
        let table = self.catalog.table(request.table)?;
        let options = self.catalog.effective_options(&table)?;

        let do_nothing = match request.on_conflict {
            OnConflict::None => false,
            OnConflict::DoNothing => true,
            OnConflict::DoUpdate => {
                return Err(FdwError::configuration("unexpected ON CONFLICT specification: DO UPDATE"))
            }
        };

        let insert_mode = if options.direct_insert {
            InsertMode::Direct
        } else {
            InsertMode::Prepared
        };
        let target_attrs = match insert_mode {
            InsertMode::Prepared => table.live_attnos(),
            InsertMode::Direct => request.target_attrs.clone(),
        };

        let deparsed = self.deparser.deparse_insert(
            &table,
            &target_attrs,
            do_nothing,
            &request.returning,
            insert_mode,
        )?;

        Ok(ModifyPlan {
            table: request.table,
            operation: request.operation,
            sql: deparsed.sql,
            sql_suffix: deparsed.suffix,
            target_attrs,
            has_returning: !request.returning.is_empty(),
            retrieved_attrs: deparsed.retrieved_attrs,
            insert_mode,
        })
    }

    /// Plans an UPDATE/DELETE as one remote statement when every part of it
    /// can run remotely. Returns `None` when the host must fall back.
    #[instrument(skip_all, fields(table = %request.table, operation = ?request.operation))]
    pub fn plan_direct_modify(&self, request: &DirectModifyRequest<'_>) -> FdwResult<Option<DirectModifyPlan>> {
        if request.operation == ModifyOperation::Insert {
            return Ok(None);
        }
        let scan = request.scan;
        // The statement runs once without parameters.
        if scan.scan_relid.is_none() || !scan.local_exprs.is_empty() || !scan.params.is_empty() {
            return Ok(None);
        }
        let d = self.descriptor(request.descriptor)?;
        if d.base_relid() != scan.scan_relid {
            return Ok(None);
        }
        let self_contained = |expr: &Expr| expr.relids().is_subset(&d.relids) && self.is_safe_for(d, expr);
        if request.operation == ModifyOperation::Update
            && !request.assignments.iter().all(|(_, expr)| self_contained(expr))
        {
            debug!("Assigned expression is not remote-safe; direct modify rejected");
            return Ok(None);
        }
        if !request.returning.iter().all(|expr| self_contained(expr)) {
            return Ok(None);
        }

        let table = self.catalog.table(request.table)?;
        let (deparsed, target_attrs) = match request.operation {
            ModifyOperation::Update => (
                self.deparser.deparse_direct_update(
                    &table,
                    &request.assignments,
                    &d.final_remote_exprs,
                    &request.returning,
                )?,
                request.assignments.iter().map(|(attno, _)| *attno).collect(),
            ),
            _ => (
                self.deparser
                    .deparse_direct_delete(&table, &d.final_remote_exprs, &request.returning)?,
                Vec::new(),
            ),
        };

        Ok(Some(DirectModifyPlan {
            table: request.table,
            operation: request.operation,
            sql: deparsed.sql,
            has_returning: !request.returning.is_empty(),
            retrieved_attrs: deparsed.retrieved_attrs,
            set_processed: request.can_set_tag,
            target_attrs,
        }))
    }
}

/// Statistics of a base relation, filling in defaults when it was never analyzed.
fn base_stats(rel: &BaseRelation) -> RelationStats {
    let mut stats = rel.stats;
    if stats.pages <= 0.0 && stats.tuples <= 0.0 {
        stats.tuples = DEFAULT_TABLE_SIZE;
        stats.pages = (stats.tuples * (f64::from(stats.width) + TUPLE_HEADER_SIZE) / BLOCK_SIZE).ceil();
    }
    stats.rows = clamp_row_est(stats.tuples * RestrictInfo::selectivity_of(&rel.restrictions));
    stats
}

/// Output of a join scan: the host's target plus columns local conditions need.
fn join_tlist(target: &[Expr], local_exprs: &[Expr]) -> Vec<Expr> {
    let mut tlist: Vec<Expr> = Vec::with_capacity(target.len());
    for expr in target {
        if !tlist.contains(expr) {
            tlist.push(expr.clone());
        }
    }
    for expr in local_exprs {
        for part in expr.columns_and_aggregates() {
            if !tlist.contains(&part) {
                tlist.push(part);
            }
        }
    }
    tlist
}
