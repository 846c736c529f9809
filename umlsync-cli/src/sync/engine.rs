//! Reconciliation engine - pushes a model partition into an external repository
//!
//! Kinds are processed in dependency order. For every kind the external
//! records are listed once and indexed by GUID; each model entity is then
//! matched, diffed and turned into a write operation. The operations of one
//! kind are committed as a single batch.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::Utc;

use crate::error::{Result, SyncError};
use crate::external::{
    EaRepository, ExternalRecord, ExternalStore, ExternalTable, Fields, RefTarget, TagRow, TagWrite, Value, WriteOp,
};
use crate::identity::{ExternalGuid, IdentityMap, to_external, to_internal};
use crate::model::{EntityKind, ModelEntity, Package};
use crate::store::{IdentityRegistry, Partition, Snapshot};

use super::diff::diff_fields;
use super::mapping::ExternalMapping;
use super::options::ReconcileOptions;
use super::report::{Action, BatchFailure, ReconciliationReport, ReportEntry};
use super::tags::plan_tags;
use super::version::{INITIAL_VERSION, bump};

/// Timestamp format of the vendor's date columns
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Reconcile `partition` into `store`
///
/// Returns the report even when a kind batch fails; check
/// [`ReconciliationReport::is_complete`]. Only partition-store failures are
/// returned as errors.
pub async fn reconcile<S: ExternalStore>(
    partition: &Partition,
    store: &mut S,
    options: &ReconcileOptions,
) -> Result<ReconciliationReport> {
    let snapshot = partition.snapshot().await?;
    let registry = partition.registry();
    let ids = IdentityMap::from_entries(registry.load().await?);

    let started_at = Utc::now();
    let mut reconciler = Reconciler {
        store,
        registry,
        schema_id: partition.schema_id().to_string(),
        ids,
        resolvable: HashSet::new(),
        owners: HashSet::new(),
        options: options.clone(),
        stamp: started_at.format(TIMESTAMP_FORMAT).to_string(),
        report: ReconciliationReport::new(started_at, options.clone()),
    };

    log::info!(
        "Reconciling schema '{}' ({:?} tags, insert={}, delete={}, version step {:?})",
        reconciler.schema_id,
        options.tag_strategy,
        options.allow_insert,
        options.allow_delete,
        options.version_step
    );

    for kind in EntityKind::all() {
        let committed = match kind {
            EntityKind::Package => reconciler.run(&packages_parents_first(&snapshot)).await?,
            EntityKind::Class => reconciler.run(&collect(snapshot.classes.iter())).await?,
            EntityKind::Enumeration => reconciler.run(&collect(snapshot.enumerations.iter())).await?,
            EntityKind::Attribute => reconciler.run(&collect(snapshot.attributes.iter())).await?,
            EntityKind::Literal => reconciler.run(&collect(snapshot.literals.iter())).await?,
            EntityKind::Association => reconciler.run(&collect(snapshot.associations.iter())).await?,
            EntityKind::Generalization => reconciler.run(&collect(snapshot.generalizations.iter())).await?,
            EntityKind::Diagram => reconciler.run(&collect(snapshot.diagrams.iter())).await?,
        };
        if !committed {
            log::warn!("Stopping after failed {} batch; later kinds were not processed", kind);
            break;
        }
    }

    let report = reconciler.report;
    log::info!(
        "Reconciled schema '{}': {} inserted, {} updated, {} unchanged, {} deleted, {} version increments",
        partition.schema_id(),
        report.inserted_count(),
        report.updated_count(),
        report.unchanged_count(),
        report.deleted_count(),
        report.version_increments()
    );
    Ok(report)
}

/// Open the repository file at `path`, reconcile into it, and close it again
///
/// The connection is released whether or not reconciliation succeeds.
pub async fn reconcile_repository(
    partition: &Partition,
    path: &Path,
    options: &ReconcileOptions,
) -> Result<ReconciliationReport> {
    let mut repo = EaRepository::open(path).await?;
    let result = reconcile(partition, &mut repo, options).await;
    repo.close().await;
    result
}

fn collect<'a, T>(items: impl Iterator<Item = &'a T>) -> Vec<&'a T> {
    items.collect()
}

/// Packages ordered so every parent precedes its children
fn packages_parents_first(snapshot: &Snapshot) -> Vec<&Package> {
    let mut ordered = Vec::with_capacity(snapshot.packages.len());
    let mut placed = HashSet::new();

    for root in snapshot.root_packages() {
        for id in snapshot.package_subtree(root.id()) {
            if placed.insert(id.clone()) {
                if let Some(package) = snapshot.packages.get(&id) {
                    ordered.push(package);
                }
            }
        }
    }

    // Packages only reachable through a parent cycle
    for package in snapshot.packages.iter() {
        if placed.insert(package.id().to_string()) {
            log::warn!("Package '{}' is not under any root package", package.id());
            ordered.push(package);
        }
    }

    ordered
}

/// Outcome of checking an entity's reference columns against the store
enum Settled {
    /// Columns whose targets are missing and were cleared
    Resolved(Vec<&'static str>),
    /// The owner column names no managed record; the entity cannot be placed
    Orphaned(&'static str),
}

struct Reconciler<'s, S: ExternalStore> {
    store: &'s mut S,
    registry: IdentityRegistry,
    schema_id: String,
    ids: IdentityMap,
    /// Reference targets already confirmed to exist in the store
    resolvable: HashSet<ExternalGuid>,
    /// Owning records already confirmed to be managed records of their kind
    owners: HashSet<(EntityKind, ExternalGuid)>,
    options: ReconcileOptions,
    /// Modification timestamp shared by every write of the run
    stamp: String,
    report: ReconciliationReport,
}

impl<S: ExternalStore> Reconciler<'_, S> {
    /// Map an internal id to its GUID, checking it is in the kind's id space
    fn identify(&mut self, kind: EntityKind, id: &str) -> Result<ExternalGuid> {
        let (space, _) = to_external(id)?;
        if space != kind.id_space() {
            return Err(SyncError::invalid_id(
                id,
                format!("{} ids belong to the {} space", kind, kind.id_space()),
            ));
        }
        self.ids.map(id)
    }

    /// Process one kind; false when its batch failed and the run must stop
    async fn run<T: ExternalMapping>(&mut self, items: &[&T]) -> Result<bool> {
        let kind = T::KIND;
        let table: ExternalTable = *self.store.table(kind);
        let with_tags = self.store.supports_tags(kind);

        let records = match self.store.list(kind).await {
            Ok(records) => records,
            Err(e) => {
                self.fail(kind, &e);
                return Ok(false);
            }
        };

        let mut index: HashMap<&ExternalGuid, Vec<&ExternalRecord>> = HashMap::new();
        for record in &records {
            index.entry(&record.guid).or_default().push(record);
        }
        log::debug!(
            "{}: {} model entities, {} external records ({} distinct GUIDs)",
            kind,
            items.len(),
            records.len(),
            index.len()
        );

        let mut ops: Vec<WriteOp> = Vec::new();
        let mut entries: Vec<ReportEntry> = Vec::new();
        let mut matched: HashSet<ExternalGuid> = HashSet::new();
        let mut inserting: HashSet<ExternalGuid> = HashSet::new();

        for entity in items {
            let base = ReportEntry::new(kind, Action::Skipped)
                .id(entity.id())
                .name(entity.name());

            let guid = match self.identify(kind, entity.id()) {
                Ok(guid) => guid,
                Err(e) => {
                    log::warn!("Skipping {} '{}': {}", kind, entity.id(), e);
                    entries.push(base.detail(e.to_string()));
                    continue;
                }
            };
            let base = base.guid(&guid);
            matched.insert(guid.clone());

            let mut fields = match entity.external_fields(&mut self.ids) {
                Ok(fields) => fields,
                Err(e) => {
                    log::warn!("Skipping {} '{}': {}", kind, entity.id(), e);
                    entries.push(base.detail(e.to_string()));
                    continue;
                }
            };

            let existing: Option<&ExternalRecord> = match index.get(&guid).map(Vec::as_slice) {
                Some([record]) => Some(*record),
                Some(candidates) => {
                    let err = SyncError::AmbiguousMatch {
                        kind,
                        guid: guid.to_string(),
                        count: candidates.len(),
                    };
                    log::warn!("{}", err);
                    let mut entry = base.detail(err.to_string());
                    entry.action = Action::Ambiguous;
                    entries.push(entry);
                    continue;
                }
                None if self.options.allow_insert => None,
                None => {
                    log::debug!("{} '{}' has no external record", kind, entity.id());
                    let mut entry = base;
                    entry.action = Action::Unmatched;
                    entries.push(entry);
                    continue;
                }
            };

            let dangling = match self.settle_references(&table, &mut fields, &inserting).await {
                Ok(Settled::Resolved(dangling)) => dangling,
                Ok(Settled::Orphaned(column)) => {
                    log::warn!(
                        "Skipping {} '{}': its {} is not a managed record of the repository",
                        kind,
                        entity.id(),
                        column
                    );
                    entries.push(base.detail(format!("owner ({}) not in repository", column)));
                    continue;
                }
                Err(e) => {
                    for entry in &mut entries {
                        if entry.action.is_write() {
                            entry.action = Action::Skipped;
                            entry.detail = Some(format!("batch abandoned: {}", e));
                        }
                    }
                    self.ids.drain_pending();
                    self.report.entries.extend(entries);
                    self.fail(kind, &e);
                    return Ok(false);
                }
            };
            let base = if dangling.is_empty() {
                base
            } else {
                log::warn!(
                    "{} '{}': unresolved references in {}; stored empty",
                    kind,
                    entity.id(),
                    dangling.join(", ")
                );
                base.detail(format!("unresolved reference: {}", dangling.join(", ")))
            };

            match existing {
                Some(record) => {
                    let (op, entry) = self.plan_update(&table, with_tags, *entity, record, fields, base);
                    ops.extend(op);
                    entries.push(entry);
                }
                None => {
                    inserting.insert(guid.clone());
                    let (op, entry) = self.plan_insert(&table, with_tags, *entity, guid, fields, base);
                    ops.push(op);
                    entries.push(entry);
                }
            }
        }

        for record in &records {
            if matched.contains(&record.guid) {
                continue;
            }
            let mut entry = ReportEntry::new(kind, Action::Stale)
                .id(to_internal(&record.guid, kind.id_space()))
                .guid(&record.guid)
                .name(record.field("Name").as_str());
            if self.options.allow_delete {
                ops.push(WriteOp::Delete { key: record.key });
                entry.action = Action::Deleted;
            }
            entries.push(entry);
        }

        match self.store.apply_batch(kind, &ops).await {
            Ok(_) => {
                let pending = self.ids.drain_pending();
                self.registry.register(&self.schema_id, &pending).await?;
                self.report.entries.extend(entries);
                self.report.completed.push(kind);

                log::info!(
                    "{}: {} inserted, {} updated, {} unchanged, {} deleted",
                    kind,
                    self.report.count(kind, Action::Inserted),
                    self.report.count(kind, Action::Updated),
                    self.report.count(kind, Action::Unchanged),
                    self.report.count(kind, Action::Deleted)
                );
                Ok(true)
            }
            Err(e) => {
                // Nothing of this batch landed
                for entry in &mut entries {
                    if entry.action.is_write() {
                        entry.action = Action::Skipped;
                        entry.detail = Some(format!("batch rolled back: {}", e));
                    }
                }
                self.ids.drain_pending();
                self.report.entries.extend(entries);
                self.fail(kind, &e);
                Ok(false)
            }
        }
    }

    /// Replace references the store cannot resolve with the empty value it will hold
    ///
    /// Targets inserted earlier in the current batch count as resolvable. The
    /// owner column is stricter: it must name a record of the owning kind, or
    /// the written row would fall outside the kind's scope.
    async fn settle_references(
        &mut self,
        table: &ExternalTable,
        fields: &mut Fields,
        inserting: &HashSet<ExternalGuid>,
    ) -> Result<Settled> {
        let references: Vec<(&'static str, RefTarget, ExternalGuid)> = fields
            .iter()
            .filter_map(|(name, value)| {
                let target = table.column(name)?.refers?;
                match value {
                    Value::Ref(guid) => Some((*name, target, guid.clone())),
                    _ => None,
                }
            })
            .collect();

        let mut dangling = Vec::new();
        for (name, target, guid) in references {
            if let Some(owner) = table.owner.filter(|o| o.column == name) {
                let key = (owner.kind, guid);
                if !self.owners.contains(&key) {
                    if self.store.find(owner.kind, &key.1).await?.is_empty() {
                        return Ok(Settled::Orphaned(name));
                    }
                    self.owners.insert(key);
                }
                continue;
            }
            if inserting.contains(&guid) || self.resolvable.contains(&guid) {
                continue;
            }
            if self.store.resolves(table.kind, target, &guid).await? {
                self.resolvable.insert(guid);
            } else {
                fields.insert(name, Value::Null);
                dangling.push(name);
            }
        }
        Ok(Settled::Resolved(dangling))
    }

    fn fail(&mut self, kind: EntityKind, error: &SyncError) {
        log::error!("{} batch failed: {}", kind, error);
        self.report.failure = Some(BatchFailure {
            kind,
            message: error.to_string(),
        });
    }

    fn plan_update<T: ExternalMapping>(
        &self,
        table: &ExternalTable,
        with_tags: bool,
        entity: &T,
        record: &ExternalRecord,
        desired: Fields,
        base: ReportEntry,
    ) -> (Option<WriteOp>, ReportEntry) {
        let changes = diff_fields(table, &desired, record);
        let tag_writes: Vec<TagWrite> = if with_tags {
            plan_tags(self.options.tag_strategy, entity.external_tags(), &record.tags)
        } else {
            Vec::new()
        };

        let mut entry = base;
        if changes.is_empty() && tag_writes.is_empty() {
            entry.action = Action::Unchanged;
            return (None, entry);
        }

        let mut fields: Fields = changes.iter().map(|c| (c.column, c.new.clone())).collect();
        if let Some(modified) = table.modified {
            fields.insert(modified, Value::text(self.stamp.as_str()));
        }
        if let Some(version_column) = table.version {
            let current = record.field(version_column).as_str();
            if let Some(next) = bump(current, self.options.version_step) {
                fields.insert(version_column, Value::text(next.as_str()));
                entry.version = Some(next);
            }
        }

        log::debug!(
            "{} '{}': {} field changes [{}], {} tag writes",
            T::KIND,
            entity.id(),
            changes.len(),
            changes.iter().map(|c| c.column).collect::<Vec<_>>().join(", "),
            tag_writes.len()
        );

        entry.action = Action::Updated;
        entry.changed_fields = changes.iter().map(|c| c.column.to_string()).collect();
        entry.tag_writes = tag_writes.len();

        let op = WriteOp::Update {
            key: record.key,
            fields,
            tags: tag_writes,
        };
        (Some(op), entry)
    }

    fn plan_insert<T: ExternalMapping>(
        &self,
        table: &ExternalTable,
        with_tags: bool,
        entity: &T,
        guid: ExternalGuid,
        mut fields: Fields,
        base: ReportEntry,
    ) -> (WriteOp, ReportEntry) {
        if let Some(created) = table.created {
            fields.insert(created, Value::text(self.stamp.as_str()));
        }
        if let Some(modified) = table.modified {
            fields.insert(modified, Value::text(self.stamp.as_str()));
        }

        let mut entry = base;
        if let Some(version_column) = table.version {
            let version = entity
                .meta()
                .version
                .clone()
                .unwrap_or_else(|| INITIAL_VERSION.to_string());
            fields.insert(version_column, Value::text(version.as_str()));
            entry.version = Some(version);
        }

        let tags: Vec<TagRow> = if with_tags {
            plan_tags(self.options.tag_strategy, entity.external_tags(), &[])
                .into_iter()
                .filter_map(|write| match write {
                    TagWrite::Insert { name, value } => Some(TagRow::new(name, value)),
                    _ => None,
                })
                .collect()
        } else {
            Vec::new()
        };

        log::debug!("{} '{}': inserting as {}", T::KIND, entity.id(), guid);

        entry.action = Action::Inserted;
        entry.tag_writes = tags.len();
        (WriteOp::Insert { guid, fields, tags }, entry)
    }
}
