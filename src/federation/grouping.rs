// SPDX-License-Identifier: BUSL-1.1

//! Grouping and aggregate pushdown

use qore_core::FdwResult;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::federation::descriptor::{AggCosts, GroupingCosts, RelationKind, RelationPushdownDescriptor};
use crate::federation::planner::PlannerSession;
use crate::federation::types::{DescriptorId, Expr, ForeignPath, PathKind, QualCost, RelationStats, RestrictInfo};

/// One output expression of the grouping step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTarget {
    pub expr: Expr,
    /// Reference into the GROUP BY list when this is a grouping key
    #[serde(default)]
    pub sort_group_ref: Option<u32>,
}

/// Host request to consider computing a grouping remotely
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupingRequest {
    pub input: DescriptorId,
    pub target: Vec<GroupTarget>,
    /// References of the GROUP BY clause entries
    #[serde(default)]
    pub group_refs: Vec<u32>,
    #[serde(default)]
    pub has_grouping_sets: bool,
    #[serde(default)]
    pub has_aggregates: bool,
    #[serde(default)]
    pub having: Vec<RestrictInfo>,
    pub num_groups: f64,
    #[serde(default)]
    pub agg_costs: AggCosts,
    #[serde(default)]
    pub target_cost: QualCost,
}

impl GroupingRequest {
    fn is_grouping_key(&self, target: &GroupTarget) -> bool {
        target
            .sort_group_ref
            .is_some_and(|sgref| self.group_refs.contains(&sgref))
    }
}

impl PlannerSession<'_> {
    /// Builds a remote grouping path, or `None` when grouping must run locally.
    pub fn get_upper_paths(&mut self, request: &GroupingRequest) -> FdwResult<Option<ForeignPath>> {
        let input = self.descriptor(request.input)?;
        if !input.pushdown_safe {
            return Ok(None);
        }
        if request.group_refs.is_empty()
            && !request.has_grouping_sets
            && !request.has_aggregates
            && request.having.is_empty()
        {
            return Ok(None);
        }

        let grouping = GroupingCosts {
            num_groups: request.num_groups,
            num_group_cols: request.group_refs.len(),
            agg_costs: request.agg_costs,
            target_cost: request.target_cost,
        };
        let mut d = RelationPushdownDescriptor::new(
            RelationKind::Upper {
                input: request.input,
                grouping,
                grouped_tlist: Vec::new(),
            },
            input.relids.clone(),
            input.server,
            input.table,
            input.options.clone(),
        );
        d.stats = RelationStats {
            rows: request.num_groups,
            tuples: request.num_groups,
            pages: 0.0,
            width: input.stats.width,
        };
        let input_name = input.relation_name.clone();
        let input_has_local_conds = !input.local_conds.is_empty();

        if input_has_local_conds || !self.grouping_ok(&mut d, request) {
            debug!(relation = %input_name, "Grouping stays local");
            return Ok(None);
        }

        d.pushdown_safe = true;
        d.refresh_local_conds();
        d.relation_name = format!("Aggregate on ({input_name})");

        let id = self.push_descriptor(d);
        let estimate = self.estimate_path_cost(id, &[], &[])?;
        self.descriptor_mut(id)?.estimate = estimate;

        debug!(relation = %input_name, groups = estimate.rows, "Grouping pushed down");
        Ok(Some(ForeignPath::new(id, PathKind::Grouped, estimate)))
    }

    /// Checks every grouping key, aggregate and HAVING clause and fills the
    /// remote target list of `d`.
    fn grouping_ok(&self, d: &mut RelationPushdownDescriptor, request: &GroupingRequest) -> bool {
        if request.has_grouping_sets {
            return false;
        }

        let mut tlist: Vec<Expr> = Vec::new();
        for target in &request.target {
            let expr = &target.expr;
            if request.is_grouping_key(target) {
                if !self.is_safe_for(d, expr) {
                    return false;
                }
                // Grouping keys keep duplicates; each carries its own reference.
                tlist.push(expr.clone());
            } else if self.is_safe_for(d, expr) {
                push_unique(&mut tlist, expr.clone());
            } else {
                let parts = expr.columns_and_aggregates();
                if !parts.iter().all(|p| self.is_safe_for(d, p)) {
                    return false;
                }
                // Plain columns outside aggregates are grouping keys already.
                for part in parts.into_iter().filter(|p| matches!(p, Expr::Aggregate { .. })) {
                    push_unique(&mut tlist, part);
                }
            }
        }

        let (remote, local) = self.classify_conditions(d, &request.having);
        d.remote_conds = remote;
        d.local_conds = local;

        for rinfo in &d.local_conds {
            for part in rinfo.clause.columns_and_aggregates() {
                if matches!(part, Expr::Aggregate { .. }) {
                    if !self.is_safe_for(d, &part) {
                        return false;
                    }
                    push_unique(&mut tlist, part);
                }
            }
        }

        if let RelationKind::Upper { grouped_tlist, .. } = &mut d.kind {
            *grouped_tlist = tlist;
        }
        true
    }
}

fn push_unique(tlist: &mut Vec<Expr>, expr: Expr) {
    if !tlist.contains(&expr) {
        tlist.push(expr);
    }
}
