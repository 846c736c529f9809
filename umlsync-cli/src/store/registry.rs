//! Durable record of which id space each vendor GUID was mapped under

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::error::{Result, SyncError};
use crate::identity::{ExternalGuid, IdSpace, IdentityEntry};

#[derive(Debug, Clone)]
pub struct IdentityRegistry {
    pool: SqlitePool,
}

impl IdentityRegistry {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        IdentityRegistry { pool }
    }

    /// All persisted mappings
    pub async fn load(&self) -> Result<Vec<IdentityEntry>> {
        let rows = sqlx::query("SELECT guid, space, internal_id FROM identity_registry ORDER BY guid")
            .fetch_all(&self.pool)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let guid: String = row.try_get("guid")?;
            let space: String = row.try_get("space")?;
            let space: IdSpace = match space.parse() {
                Ok(space) => space,
                Err(e) => {
                    log::warn!("Skipping registry row for {}: {}", guid, e);
                    continue;
                }
            };
            entries.push(IdentityEntry {
                guid: ExternalGuid::parse(&guid)?,
                space,
                internal_id: row.try_get("internal_id")?,
            });
        }
        Ok(entries)
    }

    /// Persist new mappings, rejecting any GUID already held by the other space
    pub async fn register(&self, schema_id: &str, entries: &[IdentityEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut added = 0;
        let now = Utc::now().to_rfc3339();

        for entry in entries {
            let other: Option<String> = sqlx::query_scalar(
                "SELECT space FROM identity_registry WHERE guid = ? AND space <> ?",
            )
            .bind(entry.guid.as_str())
            .bind(entry.space.as_str())
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(existing) = other {
                return Err(SyncError::IdentityCollision {
                    guid: entry.guid.to_string(),
                    existing,
                    requested: entry.space.to_string(),
                });
            }

            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO identity_registry (guid, space, schema_id, internal_id, registered_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(entry.guid.as_str())
            .bind(entry.space.as_str())
            .bind(schema_id)
            .bind(&entry.internal_id)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            added += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::to_external;
    use crate::store::SchemaStore;

    fn entry(internal: &str) -> IdentityEntry {
        let (space, guid) = to_external(internal).unwrap();
        IdentityEntry {
            guid,
            space,
            internal_id: internal.to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_and_load() {
        let store = SchemaStore::in_memory().await.unwrap();
        let registry = store.registry();

        let e = entry("EAID_11111111_2222_3333_4444_555555555555");
        assert_eq!(registry.register("model", &[e.clone(), e.clone()]).await.unwrap(), 1);

        let loaded = registry.load().await.unwrap();
        assert_eq!(loaded, vec![e.clone()]);
        assert_eq!(loaded[0].space, IdSpace::Object);
    }

    #[tokio::test]
    async fn test_register_rejects_cross_space_guid() {
        let store = SchemaStore::in_memory().await.unwrap();
        let registry = store.registry();

        registry
            .register("model", &[entry("EAID_11111111_2222_3333_4444_555555555555")])
            .await
            .unwrap();
        let err = registry
            .register("model", &[entry("EAPK_11111111_2222_3333_4444_555555555555")])
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::IdentityCollision { .. }));
    }
}
