// SPDX-License-Identifier: Apache-2.0

//! qore-core: remote data source abstraction layer.
//!
//! This crate provides the shared vocabulary of the pushdown core:
//! the `Value` model, the closed set of local column types with their
//! text conversions, remote type descriptors, the synchronous call-level
//! driver traits, and the unified `FdwError`.

pub mod convert;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{DriverError, DriverResult, FdwError, FdwResult};
pub use traits::{RemoteConnection, RemoteDriver, RemoteStatement};
pub use types::*;
