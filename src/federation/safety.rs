// SPDX-License-Identifier: BUSL-1.1

//! Remote safety of expressions
//!
//! An expression is remote-safe when the remote side can evaluate it with
//! the same meaning: it uses shippable types and functions, has no volatile
//! calls, and uses only syntax the remote dialect understands. Columns of
//! relations outside the one being scanned are sent as parameters.

use std::collections::HashSet;

use compact_str::CompactString;

use crate::federation::descriptor::RelationPushdownDescriptor;
use crate::federation::shippable::{ObjectClass, ShipObject, ShippabilityCache};
use crate::federation::types::Expr;

/// What an expression is checked against
pub struct SafetyContext<'a> {
    pub descriptor: &'a RelationPushdownDescriptor,
    pub shippability: &'a ShippabilityCache,
}

/// Decides whether an expression may be evaluated by the remote source
pub trait RemoteSafety: Send + Sync {
    fn is_remote_safe(&self, ctx: &SafetyContext<'_>, expr: &Expr) -> bool;
}

/// Operators outside standard SQL: case-insensitive LIKE and regex matching
const NON_STANDARD_OPERATORS: [&str; 8] = ["~~*", "!~~*", "~", "~*", "!~", "!~*", "~<~", "~>~"];

/// Safety filter for remote sources speaking standard SQL
#[derive(Debug, Clone)]
pub struct StandardSqlSafety {
    unsupported_operators: HashSet<CompactString>,
}

impl StandardSqlSafety {
    pub fn new() -> Self {
        Self {
            unsupported_operators: NON_STANDARD_OPERATORS
                .iter()
                .map(|op| CompactString::from(*op))
                .collect(),
        }
    }

    fn walk(&self, ctx: &SafetyContext<'_>, expr: &Expr, inside_aggregate: bool) -> bool {
        let cache = ctx.shippability;
        let d = ctx.descriptor;
        let args_safe = |args: &[Expr], inside: bool| args.iter().all(|a| self.walk(ctx, a, inside));

        match expr {
            // Outer columns become statement parameters; they may not be
            // aggregated remotely.
            Expr::Column { rel, .. } => d.relids.contains(*rel) || !inside_aggregate,
            Expr::Const { type_id, .. } => {
                cache.is_shippable(*type_id, ObjectClass::Type, d, ShipObject::DataType)
            }
            Expr::Param { type_id, .. } => {
                cache.is_shippable(*type_id, ObjectClass::Type, d, ShipObject::DataType)
            }
            Expr::Operator { op, name, args, .. } => {
                !self.unsupported_operators.contains(name)
                    && cache.is_shippable(*op, ObjectClass::Operator, d, ShipObject::Operator)
                    && args_safe(args, inside_aggregate)
            }
            Expr::Function {
                func,
                volatile,
                args,
                ..
            } => {
                !*volatile
                    && cache.is_shippable(*func, ObjectClass::Procedure, d, ShipObject::Procedure)
                    && args_safe(args, inside_aggregate)
            }
            Expr::Aggregate { agg, args, .. } => {
                d.is_upper()
                    && !inside_aggregate
                    && cache.is_shippable(*agg, ObjectClass::Procedure, d, ShipObject::Aggregate)
                    && args_safe(args, true)
            }
            Expr::Bool { args, .. } => args_safe(args, inside_aggregate),
        }
    }
}

impl Default for StandardSqlSafety {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteSafety for StandardSqlSafety {
    fn is_remote_safe(&self, ctx: &SafetyContext<'_>, expr: &Expr) -> bool {
        self.walk(ctx, expr, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qore_core::{LocalType, ServerId, Value};

    fn ctx_parts() -> (RelationPushdownDescriptor, ShippabilityCache) {
        (
            RelationPushdownDescriptor::for_tests(ServerId(1)),
            ShippabilityCache::default(),
        )
    }

    fn text_eq(name: &str) -> Expr {
        Expr::op(
            98,
            name,
            vec![
                Expr::column(1, 2, LocalType::Text),
                Expr::constant(LocalType::Text, Value::Text("%x%".into())),
            ],
        )
    }

    #[test]
    fn plain_comparisons_are_safe() {
        let (d, cache) = ctx_parts();
        let ctx = SafetyContext {
            descriptor: &d,
            shippability: &cache,
        };
        let safety = StandardSqlSafety::default();
        assert!(safety.is_remote_safe(&ctx, &text_eq("=")));
        assert!(safety.is_remote_safe(&ctx, &text_eq("~~")));
        assert!(!safety.is_remote_safe(&ctx, &text_eq("~~*")));
    }

    #[test]
    fn outer_columns_are_parameters_but_volatile_calls_stay_local() {
        let (d, cache) = ctx_parts();
        let ctx = SafetyContext {
            descriptor: &d,
            shippability: &cache,
        };
        let safety = StandardSqlSafety::default();

        let other_rel = Expr::op(96, "=", vec![Expr::column(2, 1, LocalType::Int4), Expr::column(1, 1, LocalType::Int4)]);
        assert!(safety.is_remote_safe(&ctx, &other_rel));

        let random = Expr::Function {
            func: 1598,
            name: "random".into(),
            result_type: LocalType::Float8.type_id(),
            volatile: true,
            args: vec![],
        };
        assert!(!safety.is_remote_safe(&ctx, &random));

        let unshippable_const = Expr::Const {
            type_id: 114,
            value: Value::Text("{}".into()),
        };
        assert!(!safety.is_remote_safe(&ctx, &unshippable_const));
    }

    #[test]
    fn aggregates_need_a_grouped_relation() {
        let (d, cache) = ctx_parts();
        let ctx = SafetyContext {
            descriptor: &d,
            shippability: &cache,
        };
        let count = Expr::Aggregate {
            agg: 2147,
            name: "count".into(),
            result_type: LocalType::Int8.type_id(),
            args: vec![Expr::column(1, 1, LocalType::Int4)],
        };
        assert!(!StandardSqlSafety::default().is_remote_safe(&ctx, &count));
    }
}
