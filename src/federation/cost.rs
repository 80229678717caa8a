// SPDX-License-Identifier: BUSL-1.1

//! Cost estimation for remote execution shapes
//!
//! Without asking the remote side, sizes come from the statistics the host
//! already holds. The bare shape cost of a relation is computed once and
//! cached on its descriptor; orderings and parameterization are layered on
//! top, followed by the per-connection and per-row transfer overhead.

use qore_core::FdwResult;
use tracing::trace;

use crate::federation::descriptor::{CachedCost, RelationKind, RelationPushdownDescriptor};
use crate::federation::planner::PlannerSession;
use crate::federation::types::{DescriptorId, PathEstimate, PathKey, QualCost, RestrictInfo};

/// Pessimism applied to a shape when an ordering is requested from the remote side
pub const DEFAULT_FDW_SORT_MULTIPLIER: f64 = 1.2;

/// Row count assumed for a relation that has never been analyzed
pub const DEFAULT_TABLE_SIZE: f64 = 1_000_000.0;

/// Rounds a row estimate, never going below one row.
pub fn clamp_row_est(rows: f64) -> f64 {
    if rows.is_nan() || rows <= 1.0 {
        1.0
    } else {
        rows.round_ties_even()
    }
}

impl PlannerSession<'_> {
    /// Estimates rows, width and cost of scanning a descriptor's relation.
    ///
    /// `param_join_conds` are join clauses a parameterized path evaluates
    /// remotely; `pathkeys` is the ordering requested from the remote side.
    pub fn estimate_path_cost(
        &mut self,
        id: DescriptorId,
        param_join_conds: &[RestrictInfo],
        pathkeys: &[PathKey],
    ) -> FdwResult<PathEstimate> {
        let base = self.base_cost(id)?;
        let params = self.query.cost;
        let d = self.descriptor(id)?;
        let (mut rows, width, retrieved_rows) = self.shape_rows(d)?;

        let mut startup_cost = base.startup;
        let mut run_cost = base.total - base.startup;

        if !param_join_conds.is_empty() {
            let join_cost = QualCost::sum(param_join_conds);
            startup_cost += join_cost.startup;
            run_cost += join_cost.per_tuple * retrieved_rows;
            rows = clamp_row_est(rows * RestrictInfo::selectivity_of(param_join_conds));
        }

        if !pathkeys.is_empty() {
            startup_cost *= DEFAULT_FDW_SORT_MULTIPLIER;
            run_cost *= DEFAULT_FDW_SORT_MULTIPLIER;
        }

        let mut total_cost = startup_cost + run_cost;
        startup_cost += d.options.fdw_startup_cost;
        total_cost += d.options.fdw_startup_cost;
        total_cost += (d.options.fdw_tuple_cost + params.cpu_tuple_cost) * retrieved_rows;

        trace!(
            relation = %d.relation_name,
            rows,
            retrieved_rows,
            startup_cost,
            total_cost,
            "Estimated foreign path"
        );

        Ok(PathEstimate {
            rows,
            width,
            startup_cost,
            total_cost,
        })
    }

    /// Output rows, width and rows fetched from the remote side before
    /// local-only conditions filter them.
    fn shape_rows(&self, d: &RelationPushdownDescriptor) -> FdwResult<(f64, u32, f64)> {
        let rows = d.stats.rows;
        let backed_out = clamp_row_est(rows / d.local_conds_sel);
        match &d.kind {
            RelationKind::Base { .. } => Ok((rows, d.stats.width, backed_out.min(d.stats.tuples))),
            RelationKind::Join { outer, inner, .. } => {
                let cross = self.descriptor(*outer)?.stats.rows * self.descriptor(*inner)?.stats.rows;
                Ok((rows, d.stats.width, backed_out.min(cross)))
            }
            RelationKind::Upper { input, grouping, .. } => {
                // HAVING clauses: remote ones thin what is sent, local ones
                // thin what the host keeps.
                let width = self.descriptor(*input)?.stats.width;
                let retrieved = clamp_row_est(grouping.num_groups * RestrictInfo::selectivity_of(&d.remote_conds));
                Ok((clamp_row_est(retrieved * d.local_conds_sel), width, retrieved))
            }
        }
    }

    /// Bare shape cost of a relation, computed on first use.
    pub(crate) fn base_cost(&mut self, id: DescriptorId) -> FdwResult<CachedCost> {
        if let Some(cached) = self.descriptor(id)?.rel_cost {
            return Ok(cached);
        }
        let params = self.query.cost;
        let kind = self.descriptor(id)?.kind.clone();

        let (startup, run) = match kind {
            RelationKind::Base { .. } => {
                let d = self.descriptor(id)?;
                let startup = d.restrict_cost.startup;
                let cpu_per_tuple = params.cpu_tuple_cost + d.restrict_cost.per_tuple;
                let run = params.seq_page_cost * d.stats.pages + cpu_per_tuple * d.stats.tuples;
                (startup, run)
            }
            RelationKind::Join {
                outer,
                inner,
                join_clauses,
                ..
            } => {
                let outer_cost = self.base_cost(outer)?;
                let inner_cost = self.base_cost(inner)?;
                let d = self.descriptor(id)?;
                let (_, _, retrieved_rows) = self.shape_rows(d)?;
                let join_cost = QualCost::sum(&join_clauses);
                let remote_cost = QualCost::sum(&d.remote_conds);

                let mut nrows = self.descriptor(outer)?.stats.rows * self.descriptor(inner)?.stats.rows;
                let startup = outer_cost.startup
                    + inner_cost.startup
                    + join_cost.startup
                    + remote_cost.startup
                    + d.local_conds_cost.startup;

                let mut run = (outer_cost.total - outer_cost.startup) + (inner_cost.total - inner_cost.startup);
                run += nrows * join_cost.per_tuple;
                nrows = clamp_row_est(nrows * d.joinclause_sel);
                run += nrows * remote_cost.per_tuple;
                run += d.local_conds_cost.per_tuple * retrieved_rows;
                (startup, run)
            }
            RelationKind::Upper { input, grouping, .. } => {
                let input_cost = self.base_cost(input)?;
                let input_rows = self.descriptor(input)?.stats.rows;
                let groups = grouping.num_groups;
                let trans = grouping.agg_costs.trans;
                let d = self.descriptor(id)?;
                let (_, _, retrieved_rows) = self.shape_rows(d)?;
                let having_cost = QualCost::sum(&d.remote_conds);

                let startup = input_cost.startup
                    + trans.startup
                    + trans.per_tuple * input_rows
                    + params.cpu_operator_cost * grouping.num_group_cols as f64 * input_rows
                    + grouping.target_cost.startup
                    + having_cost.startup
                    + d.local_conds_cost.startup;

                let run = (input_cost.total - input_cost.startup)
                    + grouping.agg_costs.final_cost * groups
                    + params.cpu_tuple_cost * groups
                    + grouping.target_cost.per_tuple * groups
                    + having_cost.per_tuple * groups
                    + d.local_conds_cost.per_tuple * retrieved_rows;
                (startup, run)
            }
        };

        let cached = CachedCost {
            startup,
            total: startup + run,
        };
        self.descriptor_mut(id)?.rel_cost = Some(cached);
        Ok(cached)
    }
}
