// Remote Execution Module
// Catalog, options, type tables and the scan/modify execution states

pub mod direct_modify;
pub mod encoding;
pub mod fetch;
pub(crate) mod handles;
pub mod modify;
pub mod options;
pub mod params;
pub mod registry;
pub mod scan;
pub mod type_map;

pub use direct_modify::{DirectModifyPlan, DirectModifyState};
pub use modify::{ForeignModifyState, InsertMode, ModifyOperation, ModifyPlan};
pub use options::{EffectiveOptions, ServerOptions, TableOptions, UpdatableOperations};
pub use registry::{ForeignCatalog, ForeignColumn, ForeignServer, ForeignTable};
pub use scan::ForeignScanState;
