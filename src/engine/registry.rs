// SPDX-License-Identifier: Apache-2.0

//! Foreign Catalog
//!
//! Central registry of drivers, foreign servers and foreign tables.
//! Every lookup that can miss reports a `NotFound` error naming the object.

use std::collections::HashMap;
use std::sync::Arc;

use compact_str::CompactString;
use qore_core::{FdwError, FdwResult, LocalType, ObjectId, RemoteConnection, RemoteDriver, ServerId, TableId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::options::{
    updatable_operations, EffectiveOptions, ServerOptions, TableOptions, UpdatableOperations,
};
use crate::observability::Sensitive;

/// A foreign server: which driver to use and how to reach the source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignServer {
    pub id: ServerId,
    pub name: String,
    pub driver_id: String,
    /// Opaque connection string handed to the driver. Never written out;
    /// it must be supplied whenever a server is loaded.
    #[serde(skip_serializing)]
    pub connection: Sensitive<String>,
    #[serde(default)]
    pub options: ServerOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignColumn {
    pub name: CompactString,
    pub type_id: ObjectId,
    #[serde(default)]
    pub dropped: bool,
}

impl ForeignColumn {
    pub fn new(name: &str, ty: LocalType) -> Self {
        Self {
            name: CompactString::from(name),
            type_id: ty.type_id(),
            dropped: false,
        }
    }
}

/// A foreign table; column `i` of `columns` is attribute number `i + 1`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignTable {
    pub id: TableId,
    pub server: ServerId,
    pub namespace: String,
    pub name: String,
    pub columns: Vec<ForeignColumn>,
    #[serde(default)]
    pub options: TableOptions,
}

impl ForeignTable {
    pub fn column(&self, attno: usize) -> Option<&ForeignColumn> {
        attno.checked_sub(1).and_then(|i| self.columns.get(i))
    }

    /// Attribute numbers of every column that has not been dropped.
    pub fn live_attnos(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.dropped)
            .map(|(i, _)| i + 1)
            .collect()
    }

    /// Local type of an attribute; unknown types are a configuration error.
    pub fn local_type(&self, attno: usize) -> FdwResult<LocalType> {
        let column = self
            .column(attno)
            .ok_or_else(|| FdwError::not_found("Column", format!("{}.{} #{}", self.namespace, self.name, attno)))?;
        LocalType::from_type_id(column.type_id).ok_or_else(|| {
            FdwError::configuration(format!(
                "Column \"{}\" of \"{}\" has unsupported type {}",
                column.name, self.name, column.type_id
            ))
        })
    }
}

/// Registry of drivers, servers and tables
#[derive(Default)]
pub struct ForeignCatalog {
    drivers: HashMap<String, Arc<dyn RemoteDriver>>,
    servers: HashMap<ServerId, ForeignServer>,
    tables: HashMap<TableId, Arc<ForeignTable>>,
}

impl ForeignCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a driver under its `driver_id()`
    pub fn register_driver(&mut self, driver: Arc<dyn RemoteDriver>) {
        let id = driver.driver_id().to_string();
        self.drivers.insert(id, driver);
    }

    pub fn register_server(&mut self, server: ForeignServer) {
        self.servers.insert(server.id, server);
    }

    pub fn register_table(&mut self, table: ForeignTable) {
        self.tables.insert(table.id, Arc::new(table));
    }

    pub fn server(&self, id: ServerId) -> FdwResult<&ForeignServer> {
        self.servers
            .get(&id)
            .ok_or_else(|| FdwError::not_found("Foreign server", id.to_string()))
    }

    pub fn table(&self, id: TableId) -> FdwResult<Arc<ForeignTable>> {
        self.tables
            .get(&id)
            .cloned()
            .ok_or_else(|| FdwError::not_found("Foreign table", id.to_string()))
    }

    pub fn driver(&self, driver_id: &str) -> FdwResult<Arc<dyn RemoteDriver>> {
        self.drivers
            .get(driver_id)
            .cloned()
            .ok_or_else(|| FdwError::not_found("Driver", driver_id))
    }

    /// Replaces a server's options. Returns the previous options.
    pub fn set_server_options(&mut self, id: ServerId, options: ServerOptions) -> FdwResult<ServerOptions> {
        let server = self
            .servers
            .get_mut(&id)
            .ok_or_else(|| FdwError::not_found("Foreign server", id.to_string()))?;
        Ok(std::mem::replace(&mut server.options, options))
    }

    pub fn effective_options(&self, table: &ForeignTable) -> FdwResult<EffectiveOptions> {
        let server = self.server(table.server)?;
        Ok(EffectiveOptions::merge(&server.options, &table.options))
    }

    pub fn updatable_operations(&self, table_id: TableId) -> FdwResult<UpdatableOperations> {
        let table = self.table(table_id)?;
        let server = self.server(table.server)?;
        Ok(updatable_operations(&server.options, &table.options))
    }

    /// Opens a connection to the server a table lives on
    pub fn connect(&self, table: &ForeignTable) -> FdwResult<Box<dyn RemoteConnection>> {
        let server = self.server(table.server)?;
        let driver = self.driver(&server.driver_id)?;
        debug!(server = %server.name, connection = %server.connection.masked(), "Connecting to remote source");
        driver
            .connect(server.connection.expose())
            .map_err(|e| FdwError::remote_call("Connecting to remote source", e))
    }
}
