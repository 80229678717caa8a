// SPDX-License-Identifier: BUSL-1.1

//! Foreign Relation Pushdown Planner
//!
//! Decides which filters, orderings, joins and aggregations of a query can
//! be evaluated by the remote source, estimates what each remote shape
//! costs, and finalizes the chosen shape into an executable scan plan.

pub mod cost;
pub mod deparse;
pub mod descriptor;
pub mod grouping;
pub mod join;
pub mod paths;
pub mod planner;
pub mod safety;
pub mod shippable;
pub mod types;

pub use deparse::{DeparsedModify, DeparsedSelect, Deparser, SelectRequest};
pub use descriptor::{JoinType, RelationPushdownDescriptor};
pub use grouping::{GroupTarget, GroupingRequest};
pub use join::JoinRequest;
pub use planner::{DirectModifyRequest, ModifyRequest, OnConflict, PlannerSession};
pub use safety::{RemoteSafety, StandardSqlSafety};
pub use shippable::{ExtensionCatalog, ShippabilityCache};
