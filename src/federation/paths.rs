// SPDX-License-Identifier: BUSL-1.1

//! Candidate scan paths of a base foreign relation

use qore_core::FdwResult;
use tracing::debug;

use crate::federation::planner::PlannerSession;
use crate::federation::types::{
    BaseRelation, DescriptorId, EcId, Expr, ForeignPath, PathKey, PathKind, QualCost, Relids, RestrictInfo,
};

/// Selectivity assumed for an equality implied by an equivalence class
const IMPLIED_EQUALITY_SELECTIVITY: f64 = 0.005;

impl PlannerSession<'_> {
    /// Enumerates the paths of a sized base relation: the plain scan, one
    /// path per useful ordering, and with remote estimates enabled one
    /// parameterized path per set of outer relations.
    pub fn get_paths(&mut self, id: DescriptorId, rel: &BaseRelation) -> FdwResult<Vec<ForeignPath>> {
        let estimate = self.descriptor(id)?.estimate;
        let mut paths = vec![ForeignPath::new(id, PathKind::Scan, estimate)];

        for pathkeys in self.useful_pathkeys(id, &rel.join_clauses)? {
            let est = self.estimate_path_cost(id, &[], &pathkeys)?;
            let mut path = ForeignPath::new(id, PathKind::Scan, est);
            path.pathkeys = pathkeys;
            paths.push(path);
        }

        if self.descriptor(id)?.options.use_remote_estimate {
            for (required_outer, clauses) in self.parameterization_groups(id, rel)? {
                let est = self.estimate_path_cost(id, &clauses, &[])?;
                let mut path = ForeignPath::new(id, PathKind::Scan, est);
                path.required_outer = required_outer;
                path.param_clauses = clauses;
                paths.push(path);
            }
        }

        debug!(
            relation = %self.descriptor(id)?.relation_name,
            paths = paths.len(),
            "Enumerated foreign paths"
        );
        Ok(paths)
    }

    /// Orderings worth requesting from the remote side.
    pub(crate) fn useful_pathkeys(
        &self,
        id: DescriptorId,
        join_clauses: &[RestrictInfo],
    ) -> FdwResult<Vec<Vec<PathKey>>> {
        let d = self.descriptor(id)?;
        let mut useful = Vec::new();

        let query_pathkeys = &self.query.query_pathkeys;
        if !query_pathkeys.is_empty() {
            let all_pushable = query_pathkeys.iter().all(|pk| {
                self.query.eclass(pk.eclass).is_some_and(|ec| {
                    !ec.has_volatile
                        && ec
                            .member_for(&d.relids)
                            .is_some_and(|expr| self.is_safe_for(d, expr))
                })
            });
            if all_pushable {
                useful.push(query_pathkeys.clone());
            }
        }

        // Merge-join orderings are speculative; only offered with remote estimates.
        if !d.options.use_remote_estimate {
            return Ok(useful);
        }

        let query_ec = match query_pathkeys.as_slice() {
            [only] => Some(only.eclass),
            _ => None,
        };
        for ec_id in self.useful_eclasses(id, join_clauses)? {
            if Some(ec_id) == query_ec {
                continue;
            }
            let Some(ec) = self.query.eclass(ec_id) else {
                continue;
            };
            if ec.has_volatile {
                continue;
            }
            if ec
                .member_for(&d.relids)
                .is_some_and(|expr| self.is_safe_for(d, expr))
            {
                useful.push(vec![PathKey::ascending(ec_id)]);
            }
        }
        Ok(useful)
    }

    /// Equivalence classes that could drive a merge join against the relation.
    fn useful_eclasses(&self, id: DescriptorId, join_clauses: &[RestrictInfo]) -> FdwResult<Vec<EcId>> {
        let d = self.descriptor(id)?;
        let mut useful: Vec<EcId> = Vec::new();

        for (ec_id, ec) in self.query.eq_classes.iter().enumerate() {
            if ec.has_const() || ec.members.len() <= 1 {
                continue;
            }
            let ec_relids = ec.relids();
            if ec_relids.overlaps(&d.relids) && !ec_relids.is_subset(&d.relids) {
                useful.push(ec_id);
            }
        }

        for rinfo in join_clauses {
            let Some((left, right)) = rinfo.merge_ecs else {
                continue;
            };
            let right_overlaps = self
                .query
                .eclass(right)
                .is_some_and(|ec| ec.relids().overlaps(&d.relids));
            let ec_id = if right_overlaps { right } else { left };
            if !useful.contains(&ec_id) {
                useful.push(ec_id);
            }
        }
        Ok(useful)
    }

    /// Safe, movable join clauses grouped by the outer relations they need.
    fn parameterization_groups(
        &self,
        id: DescriptorId,
        rel: &BaseRelation,
    ) -> FdwResult<Vec<(Relids, Vec<RestrictInfo>)>> {
        let d = self.descriptor(id)?;
        let mut groups: Vec<(Relids, Vec<RestrictInfo>)> = Vec::new();

        let candidates = rel
            .join_clauses
            .iter()
            .cloned()
            .chain(self.implied_join_clauses(rel));

        for rinfo in candidates {
            if !is_movable_to(&rinfo, rel.relid) || !self.is_safe_for(d, &rinfo.clause) {
                continue;
            }
            let required_outer = rinfo.relids.difference(&Relids::single(rel.relid));
            if required_outer.is_empty() {
                continue;
            }
            match groups.iter_mut().find(|(outer, _)| *outer == required_outer) {
                Some((_, clauses)) => {
                    if !clauses.contains(&rinfo) {
                        clauses.push(rinfo);
                    }
                }
                None => groups.push((required_outer, vec![rinfo])),
            }
        }
        Ok(groups)
    }

    /// Equality clauses implied by equivalence classes joining this relation
    /// to others.
    fn implied_join_clauses(&self, rel: &BaseRelation) -> Vec<RestrictInfo> {
        let own = Relids::single(rel.relid);
        let per_tuple = self.query.cost.cpu_operator_cost;
        let mut clauses = Vec::new();

        for ec in &self.query.eq_classes {
            if ec.has_const() || ec.has_volatile || ec.members.len() <= 1 {
                continue;
            }
            let Some(inner) = ec.members.iter().find(|m| m.relids == own) else {
                continue;
            };
            for outer in ec
                .members
                .iter()
                .filter(|m| !m.relids.is_empty() && !m.relids.contains(rel.relid))
            {
                let clause = Expr::op(ec.eq_operator, "=", vec![inner.expr.clone(), outer.expr.clone()]);
                clauses.push(RestrictInfo::new(
                    clause,
                    IMPLIED_EQUALITY_SELECTIVITY,
                    QualCost {
                        startup: 0.0,
                        per_tuple,
                    },
                ));
            }
        }
        clauses
    }
}

/// A join clause can be evaluated inside a scan of `relid` when it references
/// the relation, at least one other relation, and no outer join pins it higher.
fn is_movable_to(rinfo: &RestrictInfo, relid: usize) -> bool {
    rinfo.relids.contains(relid) && rinfo.relids.len() > 1 && !rinfo.outer_join_restricted
}
