//! Reconciliation report: per-record outcomes and tallies

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::EntityKind;

use super::options::ReconcileOptions;

/// What happened to one model entity or external record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// New external record created
    Inserted,
    /// Existing record changed (fields and/or tags)
    Updated,
    /// Record already matched the model
    Unchanged,
    /// No external record and inserts are disabled
    Unmatched,
    /// External record absent from the model, kept because deletes are disabled
    Stale,
    /// External record absent from the model, removed
    Deleted,
    /// Several external records share the GUID; none was touched
    Ambiguous,
    /// Could not be processed (bad identifier, collision, ...)
    Skipped,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Inserted => "inserted",
            Action::Updated => "updated",
            Action::Unchanged => "unchanged",
            Action::Unmatched => "unmatched",
            Action::Stale => "stale",
            Action::Deleted => "deleted",
            Action::Ambiguous => "ambiguous",
            Action::Skipped => "skipped",
        }
    }

    /// Whether the action wrote to the external store
    pub fn is_write(&self) -> bool {
        matches!(self, Action::Inserted | Action::Updated | Action::Deleted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub kind: EntityKind,
    pub action: Action,
    /// Internal id; absent for external-only records
    pub id: Option<String>,
    pub guid: Option<String>,
    pub name: Option<String>,
    /// Columns written by an update
    pub changed_fields: Vec<String>,
    pub tag_writes: usize,
    /// Version after the write, when it was bumped or initialised
    pub version: Option<String>,
    pub detail: Option<String>,
}

impl ReportEntry {
    pub fn new(kind: EntityKind, action: Action) -> Self {
        ReportEntry {
            kind,
            action,
            id: None,
            guid: None,
            name: None,
            changed_fields: Vec::new(),
            tag_writes: 0,
            version: None,
            detail: None,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn guid(mut self, guid: impl ToString) -> Self {
        self.guid = Some(guid.to_string());
        self
    }

    pub fn name(mut self, name: Option<&str>) -> Self {
        self.name = name.map(str::to_string);
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// A kind batch that failed to commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub kind: EntityKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub started_at: DateTime<Utc>,
    pub options: ReconcileOptions,
    pub entries: Vec<ReportEntry>,
    /// Kinds whose batch committed, in processing order
    pub completed: Vec<EntityKind>,
    /// Set when a batch failed; later kinds were not processed
    pub failure: Option<BatchFailure>,
}

impl ReconciliationReport {
    pub fn new(started_at: DateTime<Utc>, options: ReconcileOptions) -> Self {
        ReconciliationReport {
            started_at,
            options,
            entries: Vec::new(),
            completed: Vec::new(),
            failure: None,
        }
    }

    pub fn push(&mut self, entry: ReportEntry) {
        self.entries.push(entry);
    }

    /// Get count of entries by action
    pub fn count_by_action(&self, action: Action) -> usize {
        self.entries.iter().filter(|e| e.action == action).count()
    }

    /// Get count of entries of one kind by action
    pub fn count(&self, kind: EntityKind, action: Action) -> usize {
        self.entries
            .iter()
            .filter(|e| e.kind == kind && e.action == action)
            .count()
    }

    pub fn inserted_count(&self) -> usize {
        self.count_by_action(Action::Inserted)
    }

    pub fn updated_count(&self) -> usize {
        self.count_by_action(Action::Updated)
    }

    pub fn unchanged_count(&self) -> usize {
        self.count_by_action(Action::Unchanged)
    }

    pub fn deleted_count(&self) -> usize {
        self.count_by_action(Action::Deleted)
    }

    /// Number of updates that carried a version increment
    pub fn version_increments(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.action == Action::Updated && e.version.is_some())
            .count()
    }

    pub fn write_count(&self) -> usize {
        self.entries.iter().filter(|e| e.action.is_write()).count()
    }

    /// True when every kind was processed without a batch failure
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    pub fn entries_for(&self, kind: EntityKind) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }

    /// One line per kind with non-zero tallies
    pub fn summary_lines(&self) -> Vec<String> {
        let actions = [
            Action::Inserted,
            Action::Updated,
            Action::Unchanged,
            Action::Unmatched,
            Action::Stale,
            Action::Deleted,
            Action::Ambiguous,
            Action::Skipped,
        ];

        let mut lines = Vec::new();
        for kind in EntityKind::all() {
            let parts: Vec<String> = actions
                .iter()
                .filter_map(|action| match self.count(*kind, *action) {
                    0 => None,
                    n => Some(format!("{} {}", n, action.as_str())),
                })
                .collect();
            if !parts.is_empty() {
                lines.push(format!("{}: {}", kind.label(), parts.join(", ")));
            }
        }
        lines
    }
}
