// SPDX-License-Identifier: BUSL-1.1

//! Relation pushdown descriptor
//!
//! Per-relation planning record: which conditions run remotely, which stay
//! local, what the relation costs, and whether it may be pushed down at all.
//! Descriptors live in a planning session and are dropped with it.

use std::collections::BTreeSet;

use qore_core::{ServerId, TableId};
use serde::{Deserialize, Serialize};

use crate::engine::options::EffectiveOptions;
use crate::federation::types::{
    DescriptorId, Expr, PathEstimate, QualCost, RelId, RelationStats, Relids, RestrictInfo,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Semi,
    Anti,
}

impl JoinType {
    pub fn label(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL JOIN",
            JoinType::Semi => "SEMI JOIN",
            JoinType::Anti => "ANTI JOIN",
        }
    }

    pub fn is_outer(self) -> bool {
        matches!(self, JoinType::Left | JoinType::Right | JoinType::Full)
    }
}

/// Aggregate evaluation costs supplied by the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggCosts {
    pub trans: QualCost,
    pub final_cost: f64,
}

/// Inputs to costing a grouped relation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupingCosts {
    pub num_groups: f64,
    pub num_group_cols: usize,
    pub agg_costs: AggCosts,
    pub target_cost: QualCost,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RelationKind {
    Base {
        relid: RelId,
        table: TableId,
    },
    Join {
        outer: DescriptorId,
        inner: DescriptorId,
        join_type: JoinType,
        /// Clauses of the join itself (remote-safe by construction)
        join_clauses: Vec<RestrictInfo>,
        /// Output expressions the host needs from the join
        target: Vec<Expr>,
    },
    Upper {
        input: DescriptorId,
        grouping: GroupingCosts,
        /// Grouping keys and aggregates to be computed remotely
        grouped_tlist: Vec<Expr>,
    },
}

/// Base cost of a relation, cached once computed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CachedCost {
    pub startup: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationPushdownDescriptor {
    pub kind: RelationKind,
    pub relids: Relids,
    pub server: ServerId,
    /// Table whose server connection a scan of this relation uses
    pub table: TableId,
    pub pushdown_safe: bool,
    pub remote_conds: Vec<RestrictInfo>,
    pub local_conds: Vec<RestrictInfo>,
    /// Remote expressions of the finalized plan
    pub final_remote_exprs: Vec<Expr>,
    /// Attributes needed locally (output columns plus local-only conditions)
    pub attrs_used: BTreeSet<usize>,
    pub local_conds_cost: QualCost,
    pub local_conds_sel: f64,
    pub joinclause_sel: f64,
    pub stats: RelationStats,
    /// Evaluation cost of the relation's own restriction clauses
    pub restrict_cost: QualCost,
    /// Default estimate of the relation, used by the plain scan path
    pub estimate: PathEstimate,
    /// `None` until the base cost has been computed
    pub rel_cost: Option<CachedCost>,
    pub options: EffectiveOptions,
    pub relation_name: String,
}

impl RelationPushdownDescriptor {
    pub fn new(kind: RelationKind, relids: Relids, server: ServerId, table: TableId, options: EffectiveOptions) -> Self {
        Self {
            kind,
            relids,
            server,
            table,
            pushdown_safe: false,
            remote_conds: Vec::new(),
            local_conds: Vec::new(),
            final_remote_exprs: Vec::new(),
            attrs_used: BTreeSet::new(),
            local_conds_cost: QualCost::default(),
            local_conds_sel: 1.0,
            joinclause_sel: 1.0,
            stats: RelationStats::default(),
            restrict_cost: QualCost::default(),
            estimate: PathEstimate::default(),
            rel_cost: None,
            options,
            relation_name: String::new(),
        }
    }

    pub fn is_upper(&self) -> bool {
        matches!(self.kind, RelationKind::Upper { .. })
    }

    pub fn base_relid(&self) -> Option<RelId> {
        match self.kind {
            RelationKind::Base { relid, .. } => Some(relid),
            _ => None,
        }
    }

    /// Recomputes the local-only condition cost and selectivity.
    pub fn refresh_local_conds(&mut self) {
        self.local_conds_cost = QualCost::sum(&self.local_conds);
        self.local_conds_sel = RestrictInfo::selectivity_of(&self.local_conds);
    }

    #[cfg(test)]
    pub(crate) fn for_tests(server: ServerId) -> Self {
        Self::new(
            RelationKind::Base {
                relid: 1,
                table: TableId(1),
            },
            Relids::single(1),
            server,
            TableId(1),
            EffectiveOptions::default(),
        )
    }
}

/// Quotes an identifier when it is not a plain lowercase name.
pub fn quote_identifier(ident: &str) -> String {
    let plain = ident
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && ident
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if plain {
        ident.to_string()
    } else {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }
}

/// Human-readable label of a base relation, e.g. `public.orders o`.
pub fn base_relation_name(namespace: &str, table: &str, alias: Option<&str>) -> String {
    let mut name = format!("{}.{}", quote_identifier(namespace), quote_identifier(table));
    if let Some(alias) = alias.filter(|a| *a != table) {
        name.push(' ');
        name.push_str(&quote_identifier(alias));
    }
    name
}
