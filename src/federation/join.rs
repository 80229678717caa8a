// SPDX-License-Identifier: BUSL-1.1

//! Join pushdown
//!
//! Two foreign relations on the same server join remotely when both can be
//! pushed down on their own, neither leaves conditions to be checked
//! locally, and the join clauses can be evaluated remotely with the same
//! meaning.

use qore_core::FdwResult;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::options::EffectiveOptions;
use crate::federation::descriptor::{JoinType, RelationKind, RelationPushdownDescriptor};
use crate::federation::planner::PlannerSession;
use crate::federation::types::{DescriptorId, Expr, ForeignPath, PathKind, RelationStats, RestrictInfo};

/// Host request to consider joining two foreign relations remotely
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub outer: DescriptorId,
    pub inner: DescriptorId,
    pub join_type: JoinType,
    /// Every clause the join must enforce
    pub clauses: Vec<RestrictInfo>,
    /// Host estimate of the joined relation
    pub stats: RelationStats,
    /// Output expressions the host needs from the join
    pub target: Vec<Expr>,
}

impl PlannerSession<'_> {
    /// Builds a remote join path, or `None` when the join must run locally.
    pub fn get_join_paths(&mut self, request: &JoinRequest) -> FdwResult<Option<ForeignPath>> {
        let Some(mut d) = self.join_descriptor(request)? else {
            return Ok(None);
        };

        d.pushdown_safe = true;
        d.refresh_local_conds();
        d.stats = request.stats;
        d.relation_name = format!(
            "({}) {} ({})",
            self.descriptor(request.outer)?.relation_name,
            request.join_type.label(),
            self.descriptor(request.inner)?.relation_name
        );

        let relation_name = d.relation_name.clone();
        let id = self.push_descriptor(d);
        let estimate = self.estimate_path_cost(id, &[], &[])?;
        self.descriptor_mut(id)?.estimate = estimate;

        debug!(relation = %relation_name, rows = estimate.rows, "Join pushed down");
        Ok(Some(ForeignPath::new(id, PathKind::Join, estimate)))
    }

    fn join_descriptor(&self, request: &JoinRequest) -> FdwResult<Option<RelationPushdownDescriptor>> {
        if !matches!(
            request.join_type,
            JoinType::Inner | JoinType::Left | JoinType::Right | JoinType::Full
        ) {
            return Ok(None);
        }

        let outer = self.descriptor(request.outer)?;
        let inner = self.descriptor(request.inner)?;
        if !outer.pushdown_safe || !inner.pushdown_safe || outer.is_upper() || inner.is_upper() {
            return Ok(None);
        }
        if outer.server != inner.server {
            return Ok(None);
        }
        // Local conditions of an input must be applied before the join.
        if !outer.local_conds.is_empty() || !inner.local_conds.is_empty() {
            return Ok(None);
        }

        let mut d = RelationPushdownDescriptor::new(
            RelationKind::Join {
                outer: request.outer,
                inner: request.inner,
                join_type: request.join_type,
                join_clauses: Vec::new(),
                target: request.target.clone(),
            },
            outer.relids.union(&inner.relids),
            outer.server,
            outer.table,
            EffectiveOptions::combine(&outer.options, &inner.options),
        );

        if request.join_type.is_outer() {
            if !request.clauses.iter().all(|c| self.is_safe_for(&d, &c.clause)) {
                return Ok(None);
            }
            d.joinclause_sel = RestrictInfo::selectivity_of(&request.clauses);
            if let RelationKind::Join { join_clauses, .. } = &mut d.kind {
                *join_clauses = request.clauses.clone();
            }
        } else {
            let (remote, local) = self.classify_conditions(&d, &request.clauses);
            d.remote_conds = remote;
            d.local_conds = local;
        }

        Ok(Some(d))
    }
}
