//! External repository adapters
//!
//! The reconciliation engine talks to the vendor store through the
//! [`ExternalStore`] trait: row-oriented access to one table per entity kind,
//! with references expressed as GUIDs and tag rows carried alongside.

mod ea;
mod record;
mod value;

use async_trait::async_trait;

use crate::error::Result;
use crate::identity::ExternalGuid;
use crate::model::EntityKind;

pub use ea::{EaRepository, table_for};
pub use record::{
    Column, ExternalRecord, ExternalTable, Fields, Owner, RefTarget, TagRow, TagTable, TagWrite, WriteOp,
};
pub use value::Value;

/// Column holding a record's vendor GUID
pub const GUID_COLUMN: &str = "ea_guid";

/// Row-level access to the vendor repository
#[async_trait]
pub trait ExternalStore: Send {
    /// Table layout the store uses for a kind
    fn table(&self, kind: EntityKind) -> &ExternalTable;

    /// Every record of a kind, with tags loaded
    async fn list(&mut self, kind: EntityKind) -> Result<Vec<ExternalRecord>>;

    /// Records of a kind carrying `guid`; more than one means the store is inconsistent
    async fn find(&mut self, kind: EntityKind, guid: &ExternalGuid) -> Result<Vec<ExternalRecord>>;

    /// Apply a batch atomically: either every operation lands or none does
    ///
    /// Returns the surrogate keys assigned to inserts, in operation order.
    async fn apply_batch(&mut self, kind: EntityKind, ops: &[WriteOp]) -> Result<Vec<i64>>;

    /// Whether a reference column of `kind` pointing at `guid` would resolve to a record
    async fn resolves(&mut self, kind: EntityKind, target: RefTarget, guid: &ExternalGuid) -> Result<bool>;

    fn supports_tags(&self, kind: EntityKind) -> bool {
        self.table(kind).tags.is_some()
    }
}
