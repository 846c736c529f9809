//! Schema for the shared partition store

use sqlx::SqlitePool;

use crate::error::Result;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS model_entities (
        schema_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        id TEXT NOT NULL,
        name TEXT,
        owner_id TEXT,
        body TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (schema_id, kind, id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_model_entities_owner ON model_entities (schema_id, kind, owner_id)",
    r#"
    CREATE TABLE IF NOT EXISTS identity_registry (
        guid TEXT NOT NULL,
        space TEXT NOT NULL,
        schema_id TEXT NOT NULL,
        internal_id TEXT NOT NULL,
        registered_at TEXT NOT NULL,
        PRIMARY KEY (guid, space)
    )
    "#,
];

/// Create the store tables if they do not exist yet
pub async fn run(pool: &SqlitePool) -> Result<()> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    log::debug!("Partition store schema ready");
    Ok(())
}
