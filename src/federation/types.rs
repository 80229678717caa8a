// SPDX-License-Identifier: BUSL-1.1

//! Planner-side types for foreign relation pushdown.

use std::collections::BTreeSet;

use compact_str::CompactString;
use qore_core::{LocalType, ObjectId, TableId, Value};
use serde::{Deserialize, Serialize};

/// Range-table index of a base relation in the host query.
pub type RelId = usize;

/// Index of an equivalence class in `QueryInfo::eq_classes`.
pub type EcId = usize;

/// Set of base relations, e.g. the members of a join or the outer
/// relations a parameterized path depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relids(BTreeSet<RelId>);

impl Relids {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(rel: RelId) -> Self {
        Self(BTreeSet::from([rel]))
    }

    pub fn contains(&self, rel: RelId) -> bool {
        self.0.contains(&rel)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn insert(&mut self, rel: RelId) {
        self.0.insert(rel);
    }

    pub fn union(&self, other: &Relids) -> Relids {
        Relids(self.0.union(&other.0).copied().collect())
    }

    pub fn difference(&self, other: &Relids) -> Relids {
        Relids(self.0.difference(&other.0).copied().collect())
    }

    pub fn is_subset(&self, other: &Relids) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn overlaps(&self, other: &Relids) -> bool {
        !self.0.is_disjoint(&other.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = RelId> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<RelId> for Relids {
    fn from_iter<I: IntoIterator<Item = RelId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoolOp {
    And,
    Or,
    Not,
}

/// Expression tree as handed over by the host planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Column {
        rel: RelId,
        attno: usize,
        type_id: ObjectId,
    },
    Const {
        type_id: ObjectId,
        value: Value,
    },
    /// Value supplied at execution time (outer reference, bind parameter)
    Param {
        id: usize,
        type_id: ObjectId,
    },
    Operator {
        op: ObjectId,
        name: CompactString,
        result_type: ObjectId,
        args: Vec<Expr>,
    },
    Function {
        func: ObjectId,
        name: CompactString,
        result_type: ObjectId,
        volatile: bool,
        args: Vec<Expr>,
    },
    Aggregate {
        agg: ObjectId,
        name: CompactString,
        result_type: ObjectId,
        args: Vec<Expr>,
    },
    Bool {
        op: BoolOp,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn column(rel: RelId, attno: usize, ty: LocalType) -> Self {
        Expr::Column {
            rel,
            attno,
            type_id: ty.type_id(),
        }
    }

    pub fn constant(ty: LocalType, value: Value) -> Self {
        Expr::Const {
            type_id: ty.type_id(),
            value,
        }
    }

    /// A boolean-valued operator application
    pub fn op(op: ObjectId, name: &str, args: Vec<Expr>) -> Self {
        Expr::Operator {
            op,
            name: CompactString::from(name),
            result_type: LocalType::Bool.type_id(),
            args,
        }
    }

    /// Type of the value this expression produces
    pub fn type_id(&self) -> ObjectId {
        match self {
            Expr::Column { type_id, .. } | Expr::Const { type_id, .. } | Expr::Param { type_id, .. } => *type_id,
            Expr::Operator { result_type, .. }
            | Expr::Function { result_type, .. }
            | Expr::Aggregate { result_type, .. } => *result_type,
            Expr::Bool { .. } => LocalType::Bool.type_id(),
        }
    }

    pub fn args(&self) -> &[Expr] {
        match self {
            Expr::Operator { args, .. }
            | Expr::Function { args, .. }
            | Expr::Aggregate { args, .. }
            | Expr::Bool { args, .. } => args,
            Expr::Column { .. } | Expr::Const { .. } | Expr::Param { .. } => &[],
        }
    }

    /// Pre-order walk over this expression and all its sub-expressions
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        for arg in self.args() {
            arg.walk(visit);
        }
    }

    pub fn relids(&self) -> Relids {
        let mut relids = Relids::empty();
        self.walk(&mut |e| {
            if let Expr::Column { rel, .. } = e {
                relids.insert(*rel);
            }
        });
        relids
    }

    /// Attribute numbers of `rel` referenced anywhere in the expression
    pub fn attnos_of(&self, rel: RelId) -> BTreeSet<usize> {
        let mut attnos = BTreeSet::new();
        self.walk(&mut |e| {
            if let Expr::Column { rel: r, attno, .. } = e {
                if *r == rel {
                    attnos.insert(*attno);
                }
            }
        });
        attnos
    }

    pub fn contains_aggregate(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| found |= matches!(e, Expr::Aggregate { .. }));
        found
    }

    /// Columns and aggregate calls this expression is built from.
    ///
    /// Aggregates are returned whole; columns inside them are not listed.
    pub fn columns_and_aggregates(&self) -> Vec<Expr> {
        let mut out: Vec<Expr> = Vec::new();
        collect_columns_and_aggregates(self, &mut out);
        out
    }
}

fn collect_columns_and_aggregates(expr: &Expr, out: &mut Vec<Expr>) {
    match expr {
        Expr::Column { .. } | Expr::Aggregate { .. } => {
            if !out.contains(expr) {
                out.push(expr.clone());
            }
        }
        _ => {
            for arg in expr.args() {
                collect_columns_and_aggregates(arg, out);
            }
        }
    }
}

/// Startup and per-row cost of evaluating expressions
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QualCost {
    pub startup: f64,
    pub per_tuple: f64,
}

impl QualCost {
    pub fn add(self, other: QualCost) -> QualCost {
        QualCost {
            startup: self.startup + other.startup,
            per_tuple: self.per_tuple + other.per_tuple,
        }
    }

    pub fn sum<'a>(clauses: impl IntoIterator<Item = &'a RestrictInfo>) -> QualCost {
        clauses
            .into_iter()
            .fold(QualCost::default(), |acc, c| acc.add(c.cost))
    }
}

/// A restriction or join clause with the planner's annotations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestrictInfo {
    pub clause: Expr,
    /// Relations referenced by the clause
    pub relids: Relids,
    pub selectivity: f64,
    pub cost: QualCost,
    /// Clause references no relation variables of this query level
    #[serde(default)]
    pub pseudoconstant: bool,
    /// Clause may not be moved below an outer join
    #[serde(default)]
    pub outer_join_restricted: bool,
    /// Equivalence classes of a mergejoinable clause's two sides
    #[serde(default)]
    pub merge_ecs: Option<(EcId, EcId)>,
}

impl RestrictInfo {
    /// Builds a clause annotation, taking the relids from the expression.
    pub fn new(clause: Expr, selectivity: f64, cost: QualCost) -> Self {
        let relids = clause.relids();
        Self {
            clause,
            relids,
            selectivity,
            cost,
            pseudoconstant: false,
            outer_join_restricted: false,
            merge_ecs: None,
        }
    }

    pub fn selectivity_of<'a>(clauses: impl IntoIterator<Item = &'a RestrictInfo>) -> f64 {
        clauses.into_iter().map(|c| c.selectivity).product()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcMember {
    pub expr: Expr,
    pub relids: Relids,
}

impl EcMember {
    pub fn new(expr: Expr) -> Self {
        let relids = expr.relids();
        Self { expr, relids }
    }
}

/// A set of expressions known to be equal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquivalenceClass {
    pub members: Vec<EcMember>,
    pub has_volatile: bool,
    /// Equality operator used to build implied clauses
    pub eq_operator: ObjectId,
}

impl EquivalenceClass {
    pub fn relids(&self) -> Relids {
        self.members
            .iter()
            .fold(Relids::empty(), |acc, m| acc.union(&m.relids))
    }

    pub fn has_const(&self) -> bool {
        self.members.iter().any(|m| m.relids.is_empty())
    }

    /// First member computable from `relids` alone
    pub fn member_for(&self, relids: &Relids) -> Option<&Expr> {
        self.members
            .iter()
            .find(|m| !m.relids.is_empty() && m.relids.is_subset(relids))
            .map(|m| &m.expr)
    }
}

/// One element of a sort ordering, referring to an equivalence class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathKey {
    pub eclass: EcId,
    pub descending: bool,
    pub nulls_first: bool,
}

impl PathKey {
    pub fn ascending(eclass: EcId) -> Self {
        Self {
            eclass,
            descending: false,
            nulls_first: false,
        }
    }
}

/// A resolved sort key handed to the statement generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub expr: Expr,
    pub descending: bool,
    pub nulls_first: bool,
}

/// Host planner cost constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostParams {
    #[serde(default = "default_seq_page_cost")]
    pub seq_page_cost: f64,
    #[serde(default = "default_cpu_tuple_cost")]
    pub cpu_tuple_cost: f64,
    #[serde(default = "default_cpu_operator_cost")]
    pub cpu_operator_cost: f64,
}

fn default_seq_page_cost() -> f64 {
    1.0
}

fn default_cpu_tuple_cost() -> f64 {
    0.01
}

fn default_cpu_operator_cost() -> f64 {
    0.0025
}

impl Default for CostParams {
    fn default() -> Self {
        Self {
            seq_page_cost: default_seq_page_cost(),
            cpu_tuple_cost: default_cpu_tuple_cost(),
            cpu_operator_cost: default_cpu_operator_cost(),
        }
    }
}

/// Statistics the host already knows about a relation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationStats {
    /// Estimated output rows after restrictions
    pub rows: f64,
    /// Total rows in the relation
    pub tuples: f64,
    pub pages: f64,
    /// Average output row width in bytes
    pub width: u32,
}

/// Query-wide planning input
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryInfo {
    #[serde(default)]
    pub eq_classes: Vec<EquivalenceClass>,
    /// Ordering requested by the query, if any
    #[serde(default)]
    pub query_pathkeys: Vec<PathKey>,
    #[serde(default)]
    pub cost: CostParams,
}

impl QueryInfo {
    pub fn eclass(&self, id: EcId) -> Option<&EquivalenceClass> {
        self.eq_classes.get(id)
    }
}

/// Host's view of a base foreign relation at sizing time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseRelation {
    pub relid: RelId,
    pub table: TableId,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub stats: RelationStats,
    /// Attributes the query reads from this relation
    pub target_attrs: Vec<usize>,
    /// Restriction clauses on this relation alone
    #[serde(default)]
    pub restrictions: Vec<RestrictInfo>,
    /// Join clauses involving this relation and others
    #[serde(default)]
    pub join_clauses: Vec<RestrictInfo>,
}

/// Index of a pushdown descriptor within one planning session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DescriptorId(pub usize);

/// Estimated size and cost of one way to produce a relation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PathEstimate {
    pub rows: f64,
    pub width: u32,
    pub startup_cost: f64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    Scan,
    Join,
    Grouped,
}

/// A candidate way to produce a foreign relation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignPath {
    pub descriptor: DescriptorId,
    pub kind: PathKind,
    pub rows: f64,
    pub startup_cost: f64,
    pub total_cost: f64,
    pub pathkeys: Vec<PathKey>,
    /// Outer relations whose values the path needs at execution time
    pub required_outer: Relids,
    /// Join clauses evaluated inside a parameterized path
    pub param_clauses: Vec<RestrictInfo>,
}

impl ForeignPath {
    pub fn new(descriptor: DescriptorId, kind: PathKind, estimate: PathEstimate) -> Self {
        Self {
            descriptor,
            kind,
            rows: estimate.rows,
            startup_cost: estimate.startup_cost,
            total_cost: estimate.total_cost,
            pathkeys: Vec::new(),
            required_outer: Relids::empty(),
            param_clauses: Vec::new(),
        }
    }

    pub fn is_parameterized(&self) -> bool {
        !self.required_outer.is_empty()
    }
}

/// Finalized foreign scan, everything execution needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignScanPlan {
    /// Table whose server the scan connects to
    pub table: TableId,
    /// Scanned base relation; `None` for join and grouped scans
    pub scan_relid: Option<RelId>,
    pub sql: String,
    /// 1-based positions in the output row, in remote column order
    pub retrieved_attrs: Vec<usize>,
    /// Expressions supplying the statement's parameter values, in order
    pub params: Vec<Expr>,
    pub fetch_size: usize,
    /// Label of a join or grouped relation
    pub relation_name: Option<String>,
    /// Output row shape of a join or grouped scan
    pub scan_tlist: Vec<Expr>,
    /// Clauses the host evaluates on each returned row
    pub local_exprs: Vec<Expr>,
    pub remote_exprs: Vec<Expr>,
    pub recheck_quals: Vec<Expr>,
}

impl ForeignScanPlan {
    /// Properties shown when the host explains the plan
    pub fn explain_properties(&self) -> Vec<(&'static str, String)> {
        let mut props = Vec::new();
        if let Some(name) = &self.relation_name {
            props.push(("Relations", name.clone()));
        }
        props.push(("Remote SQL", self.sql.clone()));
        props
    }
}
