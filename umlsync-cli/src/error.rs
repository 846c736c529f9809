//! Error types shared by the store, the copy engine and the reconciliation engine

use thiserror::Error;

use crate::model::EntityKind;

/// Failure raised by the model graph engines
///
/// Every variant carries enough context (entity kind, id, operation) for the
/// caller to decide whether to retry, report or abort the run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A referenced root or entity is absent from its partition
    #[error("{kind} '{id}' not found in schema '{schema_id}'")]
    NotFound {
        kind: EntityKind,
        id: String,
        schema_id: String,
    },

    /// A generalization cycle prevents materialization
    #[error("generalization cycle detected involving: {}", .classes.join(", "))]
    CycleDetected { classes: Vec<String> },

    /// The same external GUID was mapped under both the object and package spaces
    #[error("identity collision for GUID {guid}: already mapped as {existing}, requested as {requested}")]
    IdentityCollision {
        guid: String,
        existing: String,
        requested: String,
    },

    /// An identifier is in neither internal nor external form
    #[error("invalid identifier '{id}': {reason}")]
    InvalidIdentifier { id: String, reason: String },

    /// I/O failure against the external store
    #[error("external store error during {operation} on {kind}: {source}")]
    ExternalStore {
        kind: EntityKind,
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// More than one external record carries the same identifier
    #[error("{count} external {kind} records match GUID {guid}")]
    AmbiguousMatch {
        kind: EntityKind,
        guid: String,
        count: usize,
    },

    /// Failure in the partition store
    #[error("partition store error: {0}")]
    Store(#[from] sqlx::Error),

    /// The directory holding the store file could not be created
    #[error("cannot prepare store location {path}: {source}")]
    StoreLocation {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// An entity body could not be encoded or decoded
    #[error("entity serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>, schema_id: impl Into<String>) -> Self {
        SyncError::NotFound {
            kind,
            id: id.into(),
            schema_id: schema_id.into(),
        }
    }

    pub fn invalid_id(id: impl Into<String>, reason: impl Into<String>) -> Self {
        SyncError::InvalidIdentifier {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn external(kind: EntityKind, operation: &'static str, source: sqlx::Error) -> Self {
        SyncError::ExternalStore {
            kind,
            operation,
            source,
        }
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
