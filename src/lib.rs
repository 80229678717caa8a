// QoreFDW - Foreign data wrapper core for call-level remote sources
// Core library

pub mod engine;
pub mod federation;
pub mod metrics;
pub mod observability;

use std::sync::Arc;

use qore_core::{FdwResult, ServerId, TableId, Value};
use tracing::info;

use engine::{
    DirectModifyPlan, DirectModifyState, ForeignCatalog, ForeignModifyState, ForeignScanState, ModifyPlan,
    ServerOptions, UpdatableOperations,
};
use federation::shippable::ExtensionCatalog;
use federation::types::{ForeignScanPlan, QueryInfo};
use federation::{Deparser, PlannerSession, RemoteSafety, ShippabilityCache, StandardSqlSafety};

pub use qore_core::{FdwError, LocalType};

/// Entry point the host engine drives: planning sessions, scan and modify
/// execution, and option changes.
pub struct ForeignDataWrapper {
    catalog: ForeignCatalog,
    shippability: ShippabilityCache,
    safety: Arc<dyn RemoteSafety>,
    deparser: Arc<dyn Deparser>,
}

impl ForeignDataWrapper {
    pub fn new(catalog: ForeignCatalog, deparser: Arc<dyn Deparser>) -> Self {
        Self {
            catalog,
            shippability: ShippabilityCache::default(),
            safety: Arc::new(StandardSqlSafety::new()),
            deparser,
        }
    }

    /// Uses `extensions` to find which extension a type, operator or function belongs to.
    pub fn with_extension_catalog(mut self, extensions: Arc<dyn ExtensionCatalog>) -> Self {
        self.shippability = ShippabilityCache::new(extensions);
        self
    }

    pub fn with_remote_safety(mut self, safety: Arc<dyn RemoteSafety>) -> Self {
        self.safety = safety;
        self
    }

    pub fn catalog(&self) -> &ForeignCatalog {
        &self.catalog
    }

    /// Mutable catalog access for registering drivers, servers and tables.
    pub fn catalog_mut(&mut self) -> &mut ForeignCatalog {
        &mut self.catalog
    }

    pub fn shippability(&self) -> &ShippabilityCache {
        &self.shippability
    }

    /// Starts planning one query.
    pub fn planner(&self, query: QueryInfo) -> PlannerSession<'_> {
        PlannerSession::new(
            &self.catalog,
            &self.shippability,
            self.safety.as_ref(),
            self.deparser.as_ref(),
            query,
        )
    }

    pub fn begin_scan(&self, plan: &ForeignScanPlan, params: &[Value]) -> FdwResult<ForeignScanState> {
        ForeignScanState::begin(&self.catalog, plan, params)
    }

    pub fn begin_modify(&self, plan: &ModifyPlan) -> FdwResult<ForeignModifyState> {
        ForeignModifyState::begin(&self.catalog, plan)
    }

    pub fn begin_direct_modify(&self, plan: &DirectModifyPlan) -> FdwResult<DirectModifyState> {
        DirectModifyState::begin(&self.catalog, plan)
    }

    /// Operations the host may run against a table.
    pub fn is_updatable(&self, table: TableId) -> FdwResult<UpdatableOperations> {
        self.catalog.updatable_operations(table)
    }

    /// Replaces a server's options. Shippability answers may depend on the
    /// old options, so every cached answer is dropped.
    pub fn alter_server_options(&mut self, server: ServerId, options: ServerOptions) -> FdwResult<ServerOptions> {
        let previous = self.catalog.set_server_options(server, options)?;
        self.shippability.invalidate_all();
        info!(server = %server, "Server options changed; shippability cache cleared");
        Ok(previous)
    }
}
