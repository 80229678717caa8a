// SPDX-License-Identifier: BUSL-1.1

//! Shippability decisions
//!
//! Whether a type, operator, function or aggregate may appear in remote
//! statement text. Core built-in objects are decided by fixed tables; any
//! other object is shippable only when it belongs to an extension the
//! server trusts. Those extension lookups are cached per server until the
//! host reports a server option change.

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

use parking_lot::Mutex;
use qore_core::{ExtensionId, ObjectId, ServerId};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::federation::descriptor::RelationPushdownDescriptor;

/// Catalog an object id belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectClass {
    Type,
    Operator,
    Procedure,
}

/// Role the object plays in the expression being checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipObject {
    Aggregate,
    DataType,
    Operator,
    Procedure,
}

/// Host callback resolving which extension, if any, owns an object
pub trait ExtensionCatalog: Send + Sync {
    fn extension_of(&self, object: ObjectId, class: ObjectClass) -> Option<ExtensionId>;
}

/// Catalog in which no object belongs to an extension
#[derive(Debug, Default)]
pub struct NoExtensions;

impl ExtensionCatalog for NoExtensions {
    fn extension_of(&self, _object: ObjectId, _class: ObjectClass) -> Option<ExtensionId> {
        None
    }
}

const SHIPPABLE_AGGREGATES: RangeInclusive<ObjectId> = 2100..=2803;

const SHIPPABLE_TYPES: [ObjectId; 16] = [
    16, 17, 18, 20, 21, 23, 25, 700, 701, 1042, 1043, 1082, 1083, 1114, 1700, 2950,
];

/// Built-in functions with a portable remote equivalent
const SHIPPABLE_PROCEDURES: &[RangeInclusive<ObjectId>] = &[
    31..=39,
    42..=43,
    46..=47,
    56..=67,
    70..=84,
    141..=183,
    200..=224,
    235..=238,
    240..=319,
    350..=382,
    438..=483,
    652..=659,
    740..=743,
    766..=848,
    852..=857,
    862..=946,
    1044..=1078,
    1084..=1092,
    1102..=1145,
    1150..=1158,
    1195..=1196,
    1219..=1219,
    1236..=1258,
    1274..=1281,
    1296..=1298,
    1312..=1316,
    1350..=1359,
    1377..=1380,
    1564..=1572,
    1579..=1596,
    1631..=1661,
    1666..=1672,
    1691..=1693,
    1701..=1703,
    1718..=1728,
    1742..=1746,
    1764..=1783,
    1850..=1862,
    1910..=1915,
    1948..=1954,
    2005..=2008,
    2052..=2057,
    2160..=2195,
    2338..=2383,
    2520..=2533,
    3129..=3137,
    3283..=3283,
    3322..=3322,
    3328..=3328,
    3331..=3331,
    3333..=3333,
    3344..=3345,
    3399..=3399,
    3546..=3546,
    3811..=3812,
    3822..=3824,
];

fn is_builtin_shippable(object: ObjectId, kind: ShipObject) -> bool {
    match kind {
        ShipObject::Aggregate => SHIPPABLE_AGGREGATES.contains(&object),
        ShipObject::DataType => SHIPPABLE_TYPES.contains(&object),
        ShipObject::Operator => true,
        ShipObject::Procedure => SHIPPABLE_PROCEDURES.iter().any(|r| r.contains(&object)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ShippableKey {
    object: ObjectId,
    class: ObjectClass,
    server: ServerId,
}

/// Process-wide memo of extension-membership decisions
pub struct ShippabilityCache {
    extensions: Arc<dyn ExtensionCatalog>,
    entries: Mutex<HashMap<ShippableKey, bool>>,
}

impl ShippabilityCache {
    pub fn new(extensions: Arc<dyn ExtensionCatalog>) -> Self {
        Self {
            extensions,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Decides whether an object may be referenced in remote statement text.
    pub fn is_shippable(
        &self,
        object: ObjectId,
        class: ObjectClass,
        descriptor: &RelationPushdownDescriptor,
        kind: ShipObject,
    ) -> bool {
        if is_builtin_shippable(object, kind) {
            return true;
        }

        let trusted = &descriptor.options.shippable_extensions;
        if trusted.is_empty() {
            return false;
        }

        let key = ShippableKey {
            object,
            class,
            server: descriptor.server,
        };
        if let Some(shippable) = self.entries.lock().get(&key) {
            return *shippable;
        }

        // The catalog lookup runs without the lock held; the entry is
        // recorded only once the answer is known.
        let shippable = self
            .extensions
            .extension_of(object, class)
            .is_some_and(|ext| trusted.contains(&ext));
        trace!(object, ?class, server = %descriptor.server, shippable, "Shippability lookup");
        self.entries.lock().insert(key, shippable);
        shippable
    }

    /// Forgets every cached decision.
    pub fn invalidate_all(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for ShippabilityCache {
    fn default() -> Self {
        Self::new(Arc::new(NoExtensions))
    }
}
