//! Partition-scoped repository operations

use std::collections::HashSet;

use sqlx::SqlitePool;

use crate::error::{Result, SyncError};
use crate::model::{
    Association, Attribute, Class, Diagram, EntityKind, Enumeration, EnumerationLiteral,
    Generalization, ModelEntity, Package,
};

use super::registry::IdentityRegistry;
use super::session::{Session, delete_entity, upsert_entity};
use super::snapshot::Snapshot;

/// Handle to one schema partition of the shared store
///
/// Every query is filtered by, and every write stamped with, this handle's
/// schema id.
#[derive(Debug, Clone)]
pub struct Partition {
    pool: SqlitePool,
    schema_id: String,
}

fn decode<T: ModelEntity>(body: &str) -> Result<T> {
    Ok(serde_json::from_str(body)?)
}

impl Partition {
    pub(crate) fn new(pool: SqlitePool, schema_id: String) -> Self {
        Partition { pool, schema_id }
    }

    pub fn schema_id(&self) -> &str {
        &self.schema_id
    }

    /// The store-wide identity registry
    pub fn registry(&self) -> IdentityRegistry {
        IdentityRegistry::new(self.pool.clone())
    }

    pub async fn get<T: ModelEntity>(&self, id: &str) -> Result<Option<T>> {
        let body: Option<String> = sqlx::query_scalar(
            "SELECT body FROM model_entities WHERE schema_id = ? AND kind = ? AND id = ?",
        )
        .bind(&self.schema_id)
        .bind(T::KIND.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        body.as_deref().map(decode).transpose()
    }

    /// Like [`Partition::get`], but absence is a `NotFound` error
    pub async fn require<T: ModelEntity>(&self, id: &str) -> Result<T> {
        self.get(id)
            .await?
            .ok_or_else(|| SyncError::not_found(T::KIND, id, &self.schema_id))
    }

    pub async fn exists(&self, kind: EntityKind, id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM model_entities WHERE schema_id = ? AND kind = ? AND id = ?",
        )
        .bind(&self.schema_id)
        .bind(kind.as_str())
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Insert or update an entity, stamping it with this partition's id
    pub async fn save<T: ModelEntity>(&self, entity: &mut T) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_entity(&mut conn, &self.schema_id, entity).await
    }

    pub async fn count(&self, kind: EntityKind) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM model_entities WHERE schema_id = ? AND kind = ?",
        )
        .bind(&self.schema_id)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// All entities of a kind in insertion order
    pub async fn all<T: ModelEntity>(&self) -> Result<Vec<T>> {
        let bodies: Vec<String> = sqlx::query_scalar(
            "SELECT body FROM model_entities WHERE schema_id = ? AND kind = ? ORDER BY rowid",
        )
        .bind(&self.schema_id)
        .bind(T::KIND.as_str())
        .fetch_all(&self.pool)
        .await?;

        bodies.iter().map(|b| decode(b)).collect()
    }

    /// Entities of a kind whose owner is `owner_id`
    pub async fn owned_by<T: ModelEntity>(&self, owner_id: &str) -> Result<Vec<T>> {
        let bodies: Vec<String> = sqlx::query_scalar(
            "SELECT body FROM model_entities WHERE schema_id = ? AND kind = ? AND owner_id = ? ORDER BY rowid",
        )
        .bind(&self.schema_id)
        .bind(T::KIND.as_str())
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        bodies.iter().map(|b| decode(b)).collect()
    }

    /// Start a transactional write session
    pub async fn session(&self) -> Result<Session> {
        Session::begin(&self.pool, self.schema_id.clone()).await
    }

    /// Load the whole partition into memory
    pub async fn snapshot(&self) -> Result<Snapshot> {
        Snapshot::load(self).await
    }

    pub async fn root_packages(&self) -> Result<Vec<Package>> {
        let packages: Vec<Package> = self.all().await?;
        let ids: HashSet<&str> = packages.iter().map(|p| p.id()).collect();
        Ok(packages
            .iter()
            .filter(|p| match p.parent_package_id.as_deref() {
                None => true,
                Some(parent) => !ids.contains(parent),
            })
            .cloned()
            .collect())
    }

    pub async fn child_packages(&self, package_id: &str) -> Result<Vec<Package>> {
        self.owned_by(package_id).await
    }

    pub async fn classes_in(&self, package_id: &str) -> Result<Vec<Class>> {
        self.owned_by(package_id).await
    }

    pub async fn enumerations_in(&self, package_id: &str) -> Result<Vec<Enumeration>> {
        self.owned_by(package_id).await
    }

    pub async fn diagrams_in(&self, package_id: &str) -> Result<Vec<Diagram>> {
        self.owned_by(package_id).await
    }

    pub async fn attributes_of(&self, class_id: &str) -> Result<Vec<Attribute>> {
        self.owned_by(class_id).await
    }

    pub async fn literals_of(&self, enumeration_id: &str) -> Result<Vec<EnumerationLiteral>> {
        self.owned_by(enumeration_id).await
    }

    pub async fn outgoing_associations(&self, class_id: &str) -> Result<Vec<Association>> {
        self.owned_by(class_id).await
    }

    /// Generalizations in which `class_id` is the subclass
    pub async fn generalizations_of(&self, class_id: &str) -> Result<Vec<Generalization>> {
        self.owned_by(class_id).await
    }

    /// Delete an entity together with everything it owns
    ///
    /// Packages take their sub-packages, classes, enumerations and diagrams;
    /// classes take their attributes and every association or generalization
    /// touching them; enumerations take their literals. Returns the number of
    /// rows removed.
    pub async fn delete(&self, kind: EntityKind, id: &str) -> Result<usize> {
        if !self.exists(kind, id).await? {
            return Err(SyncError::not_found(kind, id, &self.schema_id));
        }

        let snapshot = self.snapshot().await?;
        let targets = snapshot.cascade(kind, id);

        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for (target_kind, target_id) in &targets {
            if delete_entity(&mut tx, &self.schema_id, *target_kind, target_id).await? {
                removed += 1;
            }
        }
        tx.commit().await?;

        log::info!(
            "Deleted {} '{}' from schema '{}' ({} rows including cascades)",
            kind,
            id,
            self.schema_id,
            removed
        );
        Ok(removed)
    }

    /// Remove every entity of this partition
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM model_entities WHERE schema_id = ?")
            .bind(&self.schema_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Create placeholder classes for association ends that resolve to nothing
    ///
    /// Importers call this after loading so that every association has two
    /// class ends. Returns the number of placeholders created.
    pub async fn backfill_orphan_ends(&self) -> Result<usize> {
        let snapshot = self.snapshot().await?;

        let mut missing: Vec<String> = Vec::new();
        for assoc in snapshot.associations.iter() {
            for end in [&assoc.src_class_id, &assoc.dst_class_id] {
                if !snapshot.classes.contains(end) && !missing.contains(end) {
                    log::warn!(
                        "Association '{}' references missing class '{}'; adding placeholder",
                        assoc.id(),
                        end
                    );
                    missing.push(end.clone());
                }
            }
        }

        if missing.is_empty() {
            return Ok(0);
        }

        let mut orphans: Vec<Class> = missing.into_iter().map(Class::orphan).collect();
        let mut session = self.session().await?;
        session.save_all(&mut orphans).await?;
        session.commit().await?;

        Ok(orphans.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttributeType;
    use crate::store::SchemaStore;

    async fn store() -> SchemaStore {
        SchemaStore::in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_save_stamps_schema_id() {
        let store = store().await;
        let partition = store.partition("model");

        let mut pkg = Package::new("p1", "Root");
        partition.save(&mut pkg).await.unwrap();

        assert_eq!(pkg.meta.schema_id, "model");
        let loaded: Package = partition.require("p1").await.unwrap();
        assert_eq!(loaded.meta.schema_id, "model");
        assert_eq!(loaded.name(), Some("Root"));
    }

    #[tokio::test]
    async fn test_partitions_are_isolated() {
        let store = store().await;
        let left = store.partition("left");
        let right = store.partition("right");

        left.save(&mut Class::new("c1", "Person", "p1")).await.unwrap();

        assert!(right.get::<Class>("c1").await.unwrap().is_none());
        assert_eq!(left.count(EntityKind::Class).await.unwrap(), 1);
        assert_eq!(right.count(EntityKind::Class).await.unwrap(), 0);
        assert_eq!(store.schemas().await.unwrap(), vec!["left".to_string()]);
    }

    #[tokio::test]
    async fn test_save_is_upsert() {
        let store = store().await;
        let partition = store.partition("model");

        let mut class = Class::new("c1", "Person", "p1");
        partition.save(&mut class).await.unwrap();
        class.meta.name = Some("Persoon".into());
        partition.save(&mut class).await.unwrap();

        assert_eq!(partition.count(EntityKind::Class).await.unwrap(), 1);
        let loaded: Class = partition.require("c1").await.unwrap();
        assert_eq!(loaded.name(), Some("Persoon"));
    }

    #[tokio::test]
    async fn test_require_missing_is_not_found() {
        let store = store().await;
        let partition = store.partition("model");

        let err = partition.require::<Package>("nope").await.unwrap_err();

        assert!(matches!(err, SyncError::NotFound { kind: EntityKind::Package, .. }));
    }

    #[tokio::test]
    async fn test_navigation() {
        let store = store().await;
        let partition = store.partition("model");

        let mut session = partition.session().await.unwrap();
        session.save(&mut Package::new("p1", "Root")).await.unwrap();
        session.save(&mut Package::new("p2", "Sub").with_parent("p1")).await.unwrap();
        session.save(&mut Class::new("c1", "Person", "p2")).await.unwrap();
        session
            .save(&mut Attribute::new("a1", "naam", "c1").typed(AttributeType::Primitive("string".into())))
            .await
            .unwrap();
        session.commit().await.unwrap();

        let roots = partition.root_packages().await.unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id(), "p1");
        assert_eq!(partition.child_packages("p1").await.unwrap().len(), 1);
        assert_eq!(partition.classes_in("p2").await.unwrap().len(), 1);
        assert_eq!(partition.attributes_of("c1").await.unwrap()[0].primitive(), Some("string"));
    }

    #[tokio::test]
    async fn test_uncommitted_session_is_rolled_back() {
        let store = store().await;
        let partition = store.partition("model");

        {
            let mut session = partition.session().await.unwrap();
            session.save(&mut Package::new("p1", "Root")).await.unwrap();
            session.rollback().await.unwrap();
        }

        assert_eq!(partition.count(EntityKind::Package).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_package_cascades() {
        let store = store().await;
        let partition = store.partition("model");

        let mut session = partition.session().await.unwrap();
        session.save(&mut Package::new("p1", "Root")).await.unwrap();
        session.save(&mut Package::new("p2", "Sub").with_parent("p1")).await.unwrap();
        session.save(&mut Class::new("c1", "Person", "p2")).await.unwrap();
        session.save(&mut Class::new("c2", "Other", "p1")).await.unwrap();
        session.save(&mut Attribute::new("a1", "naam", "c1")).await.unwrap();
        session.save(&mut Association::new("as1", "c2", "c1")).await.unwrap();
        session.commit().await.unwrap();

        let removed = partition.delete(EntityKind::Package, "p2").await.unwrap();

        assert_eq!(removed, 4);
        assert_eq!(partition.count(EntityKind::Class).await.unwrap(), 1);
        assert_eq!(partition.count(EntityKind::Association).await.unwrap(), 0);
        assert_eq!(partition.count(EntityKind::Attribute).await.unwrap(), 0);
        assert!(partition.exists(EntityKind::Package, "p1").await.unwrap());
    }

    #[tokio::test]
    async fn test_backfill_orphan_ends() {
        let store = store().await;
        let partition = store.partition("model");

        partition.save(&mut Class::new("c1", "Person", "p1")).await.unwrap();
        partition.save(&mut Association::new("as1", "c1", "ghost")).await.unwrap();
        partition.save(&mut Association::new("as2", "ghost", "c1")).await.unwrap();

        let created = partition.backfill_orphan_ends().await.unwrap();

        assert_eq!(created, 1);
        let orphan: Class = partition.require("ghost").await.unwrap();
        assert!(orphan.is_orphan());
        assert!(partition.snapshot().await.unwrap().dangling_references().iter().all(|d| d.kind != EntityKind::Association));
    }
}
