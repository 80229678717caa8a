// SPDX-License-Identifier: Apache-2.0

//! Server and table options
//!
//! Options arrive from the host catalog as JSON-compatible maps; every
//! field has a default so partial option sets deserialize cleanly.

use qore_core::ExtensionId;
use serde::{Deserialize, Serialize};

pub const DEFAULT_FDW_STARTUP_COST: f64 = 100.0;
pub const DEFAULT_FDW_TUPLE_COST: f64 = 0.01;
pub const DEFAULT_FETCH_SIZE: usize = 100;

fn default_startup_cost() -> f64 {
    DEFAULT_FDW_STARTUP_COST
}

fn default_tuple_cost() -> f64 {
    DEFAULT_FDW_TUPLE_COST
}

fn default_fetch_size() -> usize {
    DEFAULT_FETCH_SIZE
}

/// Options attached to a foreign server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerOptions {
    #[serde(default)]
    pub updatable: Option<bool>,
    /// Character encoding of text returned by the remote source
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub use_remote_estimate: bool,
    #[serde(default = "default_startup_cost")]
    pub fdw_startup_cost: f64,
    #[serde(default = "default_tuple_cost")]
    pub fdw_tuple_cost: f64,
    /// Extensions whose objects are trusted to exist on the remote side
    #[serde(default)]
    pub extensions: Vec<ExtensionId>,
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
    /// Send inserts as literal statement text instead of prepared statements
    #[serde(default)]
    pub direct_insert: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            updatable: None,
            encoding: None,
            use_remote_estimate: false,
            fdw_startup_cost: DEFAULT_FDW_STARTUP_COST,
            fdw_tuple_cost: DEFAULT_FDW_TUPLE_COST,
            extensions: Vec::new(),
            fetch_size: DEFAULT_FETCH_SIZE,
            direct_insert: false,
        }
    }
}

/// Options attached to a foreign table; unset fields fall back to the server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableOptions {
    #[serde(default)]
    pub updatable: Option<bool>,
    #[serde(default)]
    pub use_remote_estimate: Option<bool>,
    #[serde(default)]
    pub fetch_size: Option<usize>,
    #[serde(default)]
    pub direct_insert: Option<bool>,
}

/// Options in effect for one relation after table values override server ones
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveOptions {
    pub use_remote_estimate: bool,
    pub fdw_startup_cost: f64,
    pub fdw_tuple_cost: f64,
    pub shippable_extensions: Vec<ExtensionId>,
    pub fetch_size: usize,
    pub direct_insert: bool,
}

impl EffectiveOptions {
    pub fn merge(server: &ServerOptions, table: &TableOptions) -> Self {
        Self {
            use_remote_estimate: table.use_remote_estimate.unwrap_or(server.use_remote_estimate),
            fdw_startup_cost: server.fdw_startup_cost,
            fdw_tuple_cost: server.fdw_tuple_cost,
            shippable_extensions: server.extensions.clone(),
            fetch_size: table.fetch_size.unwrap_or(server.fetch_size),
            direct_insert: table.direct_insert.unwrap_or(server.direct_insert),
        }
    }

    /// Options of a relation built from two inputs on the same server.
    pub fn combine(outer: &Self, inner: &Self) -> Self {
        Self {
            use_remote_estimate: outer.use_remote_estimate || inner.use_remote_estimate,
            fetch_size: outer.fetch_size.max(inner.fetch_size),
            ..outer.clone()
        }
    }
}

impl Default for EffectiveOptions {
    fn default() -> Self {
        Self::merge(&ServerOptions::default(), &TableOptions::default())
    }
}

/// Modification operations a foreign table accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatableOperations {
    pub insert: bool,
    pub update: bool,
    pub delete: bool,
}

impl UpdatableOperations {
    pub fn from_flag(updatable: bool) -> Self {
        Self {
            insert: updatable,
            update: updatable,
            delete: updatable,
        }
    }
}

/// Table-level `updatable` wins over the server-level value; both default to true.
pub fn updatable_operations(server: &ServerOptions, table: &TableOptions) -> UpdatableOperations {
    let updatable = table.updatable.or(server.updatable).unwrap_or(true);
    UpdatableOperations::from_flag(updatable)
}
