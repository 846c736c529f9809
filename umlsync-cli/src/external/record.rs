//! Row-level types exchanged with an external store

use std::collections::BTreeMap;

use crate::identity::ExternalGuid;
use crate::model::EntityKind;

use super::Value;

/// Column name -> value, ordered for stable SQL and diffs
pub type Fields = BTreeMap<&'static str, Value>;

/// A row of a managed external table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRecord {
    /// Store-assigned surrogate key
    pub key: i64,
    pub guid: ExternalGuid,
    pub fields: Fields,
    /// Tag rows in storage order; a name may repeat
    pub tags: Vec<TagRow>,
}

impl ExternalRecord {
    pub fn field(&self, column: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.fields.get(column).unwrap_or(&NULL)
    }

    /// Tags as a map; the first row wins when a name repeats
    pub fn tag_map(&self) -> BTreeMap<&str, &str> {
        let mut map = BTreeMap::new();
        for tag in &self.tags {
            map.entry(tag.name.as_str()).or_insert(tag.value.as_str());
        }
        map
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRow {
    pub name: String,
    pub value: String,
}

impl TagRow {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        TagRow {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A single tag-row mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagWrite {
    /// Overwrite the value of every row carrying this name
    Update { name: String, value: String },
    /// Add a new row
    Insert { name: String, value: String },
    /// Remove every tag row of the record
    DeleteAll,
}

/// A record mutation within one kind batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Insert {
        guid: ExternalGuid,
        fields: Fields,
        tags: Vec<TagRow>,
    },
    Update {
        key: i64,
        fields: Fields,
        tags: Vec<TagWrite>,
    },
    /// Removes the record and its tag rows
    Delete { key: i64 },
}

impl WriteOp {
    pub fn verb(&self) -> &'static str {
        match self {
            WriteOp::Insert { .. } => "insert",
            WriteOp::Update { .. } => "update",
            WriteOp::Delete { .. } => "delete",
        }
    }
}

/// What a column's values point at when they are references
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefTarget {
    Package,
    Object,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub refers: Option<RefTarget>,
}

impl Column {
    pub const fn text(name: &'static str) -> Self {
        Column { name, refers: None }
    }

    pub const fn reference(name: &'static str, target: RefTarget) -> Self {
        Column {
            name,
            refers: Some(target),
        }
    }
}

/// The reference column that places a row inside its kind's scope
#[derive(Debug, Clone, Copy)]
pub struct Owner {
    pub column: &'static str,
    pub kind: EntityKind,
}

/// Layout of the tag table attached to a record table
#[derive(Debug, Clone, Copy)]
pub struct TagTable {
    pub table: &'static str,
    /// Column holding the owning record's surrogate key
    pub owner: &'static str,
    pub name: &'static str,
    pub value: &'static str,
}

/// Layout of the external table one entity kind lives in
///
/// Several kinds can share a table; `scope` is the SQL predicate (over the
/// alias `t`) selecting the rows of this kind, and `fixed` the column values
/// stamped on insert to place a new row inside that scope.
#[derive(Debug, Clone, Copy)]
pub struct ExternalTable {
    pub kind: EntityKind,
    pub table: &'static str,
    pub key: &'static str,
    pub scope: &'static str,
    pub columns: &'static [Column],
    /// Set when `scope` depends on the owning record's kind
    pub owner: Option<Owner>,
    pub fixed: &'static [(&'static str, &'static str)],
    pub created: Option<&'static str>,
    pub modified: Option<&'static str>,
    pub version: Option<&'static str>,
    pub tags: Option<TagTable>,
}

impl ExternalTable {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}
