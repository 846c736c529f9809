//! Transactional multi-entity writes within one partition

use chrono::Utc;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};

use crate::error::Result;
use crate::model::{EntityKind, ModelEntity};

/// Insert or replace an entity row, stamping the partition id into its body
pub(crate) async fn upsert_entity<T: ModelEntity>(
    conn: &mut SqliteConnection,
    schema_id: &str,
    entity: &mut T,
) -> Result<()> {
    entity.meta_mut().schema_id = schema_id.to_string();
    let body = serde_json::to_string(entity)?;

    sqlx::query(
        r#"
        INSERT INTO model_entities (schema_id, kind, id, name, owner_id, body, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(schema_id, kind, id) DO UPDATE SET
            name = excluded.name,
            owner_id = excluded.owner_id,
            body = excluded.body,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(schema_id)
    .bind(T::KIND.as_str())
    .bind(entity.id())
    .bind(entity.name())
    .bind(entity.owner_id())
    .bind(body)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn delete_entity(
    conn: &mut SqliteConnection,
    schema_id: &str,
    kind: EntityKind,
    id: &str,
) -> Result<bool> {
    let result = sqlx::query("DELETE FROM model_entities WHERE schema_id = ? AND kind = ? AND id = ?")
        .bind(schema_id)
        .bind(kind.as_str())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// A write transaction scoped to one partition
///
/// Dropping a session without calling [`Session::commit`] rolls it back.
pub struct Session {
    tx: Transaction<'static, Sqlite>,
    schema_id: String,
    written: usize,
}

impl Session {
    pub(crate) async fn begin(pool: &SqlitePool, schema_id: String) -> Result<Self> {
        let tx = pool.begin().await?;
        Ok(Session {
            tx,
            schema_id,
            written: 0,
        })
    }

    pub fn schema_id(&self) -> &str {
        &self.schema_id
    }

    pub async fn save<T: ModelEntity>(&mut self, entity: &mut T) -> Result<()> {
        upsert_entity(&mut self.tx, &self.schema_id, entity).await?;
        self.written += 1;
        Ok(())
    }

    /// Save every entity in a freshly built collection
    pub async fn save_all<T: ModelEntity>(&mut self, entities: &mut [T]) -> Result<()> {
        for entity in entities.iter_mut() {
            self.save(entity).await?;
        }
        Ok(())
    }

    pub async fn delete(&mut self, kind: EntityKind, id: &str) -> Result<bool> {
        let deleted = delete_entity(&mut self.tx, &self.schema_id, kind, id).await?;
        if deleted {
            self.written += 1;
        }
        Ok(deleted)
    }

    /// Rows written so far
    pub fn written(&self) -> usize {
        self.written
    }

    pub async fn commit(self) -> Result<usize> {
        self.tx.commit().await?;
        Ok(self.written)
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
