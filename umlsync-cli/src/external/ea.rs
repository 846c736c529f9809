//! Adapter for a vendor repository file (SQLite flavour of the EA schema)
//!
//! Packages live in `t_package`; classes and enumerations share `t_object`;
//! attributes and enumeration literals share `t_attribute`; associations and
//! generalizations share `t_connector`. Reference columns hold surrogate keys
//! in the file and GUIDs at the [`ExternalStore`] interface.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::error::{Result, SyncError};
use crate::identity::ExternalGuid;
use crate::model::EntityKind;

use super::record::{Column, ExternalRecord, ExternalTable, Fields, Owner, RefTarget, TagRow, TagTable, TagWrite, WriteOp};
use super::{ExternalStore, GUID_COLUMN, Value};

const OBJECT_TAGS: TagTable = TagTable {
    table: "t_objectproperties",
    owner: "Object_ID",
    name: "Property",
    value: "Value",
};

const ATTRIBUTE_TAGS: TagTable = TagTable {
    table: "t_attributetag",
    owner: "ElementID",
    name: "Property",
    value: "VALUE",
};

const CONNECTOR_TAGS: TagTable = TagTable {
    table: "t_connectortag",
    owner: "ElementID",
    name: "Property",
    value: "VALUE",
};

static PACKAGE: ExternalTable = ExternalTable {
    kind: EntityKind::Package,
    table: "t_package",
    key: "Package_ID",
    scope: "1 = 1",
    columns: &[
        Column::text("Name"),
        Column::text("Notes"),
        Column::reference("Parent_ID", RefTarget::Package),
        Column::text("Version"),
        Column::text("CreatedDate"),
        Column::text("ModifiedDate"),
    ],
    owner: None,
    fixed: &[],
    created: Some("CreatedDate"),
    modified: Some("ModifiedDate"),
    version: Some("Version"),
    // Package tags live on the package's twin t_object row, which this adapter does not manage
    tags: None,
};

static CLASS: ExternalTable = ExternalTable {
    kind: EntityKind::Class,
    table: "t_object",
    key: "Object_ID",
    scope: "t.Object_Type IN ('Class', 'DataType')",
    columns: &[
        Column::text("Object_Type"),
        Column::text("Name"),
        Column::text("Alias"),
        Column::text("Author"),
        Column::text("Note"),
        Column::reference("Package_ID", RefTarget::Package),
        Column::text("Stereotype"),
        Column::text("Status"),
        Column::text("Phase"),
        Column::text("Version"),
        Column::text("CreatedDate"),
        Column::text("ModifiedDate"),
    ],
    owner: None,
    fixed: &[],
    created: Some("CreatedDate"),
    modified: Some("ModifiedDate"),
    version: Some("Version"),
    tags: Some(OBJECT_TAGS),
};

static ENUMERATION: ExternalTable = ExternalTable {
    kind: EntityKind::Enumeration,
    table: "t_object",
    key: "Object_ID",
    scope: "t.Object_Type = 'Enumeration'",
    columns: &[
        Column::text("Name"),
        Column::text("Alias"),
        Column::text("Author"),
        Column::text("Note"),
        Column::reference("Package_ID", RefTarget::Package),
        Column::text("Stereotype"),
        Column::text("Status"),
        Column::text("Phase"),
        Column::text("Version"),
        Column::text("CreatedDate"),
        Column::text("ModifiedDate"),
    ],
    owner: None,
    fixed: &[("Object_Type", "Enumeration")],
    created: Some("CreatedDate"),
    modified: Some("ModifiedDate"),
    version: Some("Version"),
    tags: Some(OBJECT_TAGS),
};

static ATTRIBUTE: ExternalTable = ExternalTable {
    kind: EntityKind::Attribute,
    table: "t_attribute",
    key: "ID",
    scope: "t.Object_ID IN (SELECT Object_ID FROM t_object WHERE Object_Type IN ('Class', 'DataType'))",
    columns: &[
        Column::reference("Object_ID", RefTarget::Object),
        Column::text("Name"),
        Column::text("Style"),
        Column::text("Notes"),
        Column::text("Stereotype"),
        Column::text("Type"),
        Column::reference("Classifier", RefTarget::Object),
        Column::text("LowerBound"),
        Column::text("UpperBound"),
        Column::text("Length"),
    ],
    owner: Some(Owner {
        column: "Object_ID",
        kind: EntityKind::Class,
    }),
    fixed: &[],
    created: None,
    modified: None,
    version: None,
    tags: Some(ATTRIBUTE_TAGS),
};

static LITERAL: ExternalTable = ExternalTable {
    kind: EntityKind::Literal,
    table: "t_attribute",
    key: "ID",
    scope: "t.Object_ID IN (SELECT Object_ID FROM t_object WHERE Object_Type = 'Enumeration')",
    columns: &[
        Column::reference("Object_ID", RefTarget::Object),
        Column::text("Name"),
        Column::text("Style"),
        Column::text("Notes"),
    ],
    owner: Some(Owner {
        column: "Object_ID",
        kind: EntityKind::Enumeration,
    }),
    fixed: &[("Stereotype", "enum")],
    created: None,
    modified: None,
    version: None,
    tags: Some(ATTRIBUTE_TAGS),
};

static ASSOCIATION: ExternalTable = ExternalTable {
    kind: EntityKind::Association,
    table: "t_connector",
    key: "Connector_ID",
    scope: "t.Connector_Type = 'Association' \
            AND t.Start_Object_ID IN (SELECT Object_ID FROM t_object WHERE Object_Type IN ('Class', 'DataType'))",
    columns: &[
        Column::text("Name"),
        Column::text("Notes"),
        Column::text("Stereotype"),
        Column::reference("Start_Object_ID", RefTarget::Object),
        Column::reference("End_Object_ID", RefTarget::Object),
        Column::text("SourceCard"),
        Column::text("DestCard"),
        Column::text("SourceRole"),
        Column::text("DestRole"),
    ],
    owner: Some(Owner {
        column: "Start_Object_ID",
        kind: EntityKind::Class,
    }),
    fixed: &[("Connector_Type", "Association")],
    created: None,
    modified: None,
    version: None,
    tags: Some(CONNECTOR_TAGS),
};

static GENERALIZATION: ExternalTable = ExternalTable {
    kind: EntityKind::Generalization,
    table: "t_connector",
    key: "Connector_ID",
    scope: "t.Connector_Type = 'Generalization' \
            AND t.Start_Object_ID IN (SELECT Object_ID FROM t_object WHERE Object_Type IN ('Class', 'DataType'))",
    columns: &[
        Column::text("Notes"),
        Column::reference("Start_Object_ID", RefTarget::Object),
        Column::reference("End_Object_ID", RefTarget::Object),
    ],
    owner: Some(Owner {
        column: "Start_Object_ID",
        kind: EntityKind::Class,
    }),
    fixed: &[("Connector_Type", "Generalization")],
    created: None,
    modified: None,
    version: None,
    tags: Some(CONNECTOR_TAGS),
};

static DIAGRAM: ExternalTable = ExternalTable {
    kind: EntityKind::Diagram,
    table: "t_diagram",
    key: "Diagram_ID",
    scope: "1 = 1",
    columns: &[
        Column::text("Name"),
        Column::text("Notes"),
        Column::text("Author"),
        Column::text("Stereotype"),
        Column::reference("Package_ID", RefTarget::Package),
        Column::text("Version"),
        Column::text("CreatedDate"),
        Column::text("ModifiedDate"),
    ],
    owner: None,
    fixed: &[("Diagram_Type", "Logical")],
    created: Some("CreatedDate"),
    modified: Some("ModifiedDate"),
    version: Some("Version"),
    tags: None,
};

/// Table layout for an entity kind
pub fn table_for(kind: EntityKind) -> &'static ExternalTable {
    match kind {
        EntityKind::Package => &PACKAGE,
        EntityKind::Class => &CLASS,
        EntityKind::Enumeration => &ENUMERATION,
        EntityKind::Attribute => &ATTRIBUTE,
        EntityKind::Literal => &LITERAL,
        EntityKind::Association => &ASSOCIATION,
        EntityKind::Generalization => &GENERALIZATION,
        EntityKind::Diagram => &DIAGRAM,
    }
}

fn target_table(target: RefTarget) -> (&'static str, &'static str) {
    match target {
        RefTarget::Package => ("t_package", "Package_ID"),
        RefTarget::Object => ("t_object", "Object_ID"),
    }
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS t_package (
        Package_ID INTEGER PRIMARY KEY AUTOINCREMENT,
        Name TEXT,
        Parent_ID INTEGER DEFAULT 0,
        CreatedDate TEXT,
        ModifiedDate TEXT,
        Notes TEXT,
        ea_guid TEXT,
        Version TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS t_object (
        Object_ID INTEGER PRIMARY KEY AUTOINCREMENT,
        Object_Type TEXT,
        Name TEXT,
        Alias TEXT,
        Author TEXT,
        Version TEXT,
        Note TEXT,
        Package_ID INTEGER DEFAULT 0,
        Stereotype TEXT,
        Status TEXT,
        Phase TEXT,
        CreatedDate TEXT,
        ModifiedDate TEXT,
        ea_guid TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS t_attribute (
        ID INTEGER PRIMARY KEY AUTOINCREMENT,
        Object_ID INTEGER DEFAULT 0,
        Name TEXT,
        Style TEXT,
        Notes TEXT,
        Stereotype TEXT,
        Type TEXT,
        Classifier INTEGER DEFAULT 0,
        LowerBound TEXT,
        UpperBound TEXT,
        Length TEXT,
        ea_guid TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS t_connector (
        Connector_ID INTEGER PRIMARY KEY AUTOINCREMENT,
        Name TEXT,
        Notes TEXT,
        Connector_Type TEXT,
        Stereotype TEXT,
        SourceCard TEXT,
        DestCard TEXT,
        SourceRole TEXT,
        DestRole TEXT,
        Start_Object_ID INTEGER DEFAULT 0,
        End_Object_ID INTEGER DEFAULT 0,
        ea_guid TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS t_diagram (
        Diagram_ID INTEGER PRIMARY KEY AUTOINCREMENT,
        Package_ID INTEGER DEFAULT 0,
        Diagram_Type TEXT,
        Name TEXT,
        Author TEXT,
        Version TEXT,
        Notes TEXT,
        Stereotype TEXT,
        CreatedDate TEXT,
        ModifiedDate TEXT,
        ea_guid TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS t_objectproperties (
        PropertyID INTEGER PRIMARY KEY AUTOINCREMENT,
        Object_ID INTEGER,
        Property TEXT,
        Value TEXT,
        Notes TEXT,
        ea_guid TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS t_attributetag (
        PropertyID INTEGER PRIMARY KEY AUTOINCREMENT,
        ElementID INTEGER,
        Property TEXT,
        VALUE TEXT,
        NOTES TEXT,
        ea_guid TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS t_connectortag (
        PropertyID INTEGER PRIMARY KEY AUTOINCREMENT,
        ElementID INTEGER,
        Property TEXT,
        VALUE TEXT,
        NOTES TEXT,
        ea_guid TEXT
    )
    "#,
];

/// Parameter bound into a generated statement
enum Bind {
    Text(Option<String>),
    Int(i64),
}

fn bind_all<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    binds: Vec<Bind>,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    for bind in binds {
        query = match bind {
            Bind::Text(value) => query.bind(value),
            Bind::Int(value) => query.bind(value),
        };
    }
    query
}

/// Handle to an open vendor repository
#[derive(Debug, Clone)]
pub struct EaRepository {
    pool: SqlitePool,
}

impl EaRepository {
    /// Open an existing repository file
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(false);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        log::info!("Opened repository {}", path.display());
        Ok(EaRepository { pool })
    }

    /// An empty in-memory repository with the managed tables created
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let repo = EaRepository { pool };
        repo.create_schema().await?;
        Ok(repo)
    }

    /// Create the managed tables if they are missing
    pub async fn create_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn select_sql(table: &ExternalTable, by_guid: bool) -> String {
        let mut columns = vec![
            format!("t.{} AS row_key", table.key),
            format!("t.{} AS row_guid", GUID_COLUMN),
        ];
        for column in table.columns {
            match column.refers {
                None => columns.push(format!("CAST(t.{0} AS TEXT) AS \"{0}\"", column.name)),
                Some(target) => {
                    let (target_table, target_key) = target_table(target);
                    columns.push(format!(
                        "(SELECT r.{guid} FROM {tt} r WHERE r.{tk} = t.{c}) AS \"{c}\"",
                        guid = GUID_COLUMN,
                        tt = target_table,
                        tk = target_key,
                        c = column.name
                    ));
                }
            }
        }

        let mut sql = format!(
            "SELECT {} FROM {} t WHERE {}",
            columns.join(", "),
            table.table,
            table.scope
        );
        if by_guid {
            sql.push_str(&format!(" AND UPPER(t.{}) = ?", GUID_COLUMN));
        }
        sql.push_str(&format!(" ORDER BY t.{}", table.key));
        sql
    }

    fn decode_row(table: &ExternalTable, row: &SqliteRow) -> Result<Option<ExternalRecord>> {
        let key: i64 = row.try_get("row_key")?;
        let raw_guid: Option<String> = row.try_get("row_guid")?;
        let guid = match raw_guid.as_deref().map(ExternalGuid::parse) {
            Some(Ok(guid)) => guid,
            _ => {
                log::warn!(
                    "Skipping {} row {}={} without a usable GUID ({:?})",
                    table.table,
                    table.key,
                    key,
                    raw_guid
                );
                return Ok(None);
            }
        };

        let mut fields = Fields::new();
        for column in table.columns {
            let raw: Option<String> = row.try_get(column.name)?;
            let value = match column.refers {
                None => Value::from(raw),
                Some(_) => match raw.as_deref().map(ExternalGuid::parse) {
                    Some(Ok(target)) => Value::Ref(target),
                    _ => Value::Null,
                },
            };
            fields.insert(column.name, value);
        }

        Ok(Some(ExternalRecord {
            key,
            guid,
            fields,
            tags: Vec::new(),
        }))
    }

    async fn load_tags(&self, tags: &TagTable, owner: Option<i64>) -> Result<HashMap<i64, Vec<TagRow>>> {
        let mut sql = format!(
            "SELECT {o} AS owner_key, CAST({n} AS TEXT) AS tag_name, CAST({v} AS TEXT) AS tag_value FROM {t}",
            o = tags.owner,
            n = tags.name,
            v = tags.value,
            t = tags.table
        );
        if owner.is_some() {
            sql.push_str(&format!(" WHERE {} = ?", tags.owner));
        }
        sql.push_str(" ORDER BY PropertyID");

        let mut query = sqlx::query(&sql);
        if let Some(owner) = owner {
            query = query.bind(owner);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut by_owner: HashMap<i64, Vec<TagRow>> = HashMap::new();
        for row in rows {
            let owner: i64 = row.try_get("owner_key")?;
            let name: Option<String> = row.try_get("tag_name")?;
            let value: Option<String> = row.try_get("tag_value")?;
            let Some(name) = name else {
                continue;
            };
            by_owner
                .entry(owner)
                .or_default()
                .push(TagRow::new(name, value.unwrap_or_default()));
        }
        Ok(by_owner)
    }

    async fn fetch(&self, kind: EntityKind, guid: Option<&ExternalGuid>) -> Result<Vec<ExternalRecord>> {
        let table = table_for(kind);
        let sql = Self::select_sql(table, guid.is_some());

        let mut query = sqlx::query(&sql);
        if let Some(guid) = guid {
            query = query.bind(guid.as_str());
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SyncError::external(kind, "list", e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(record) = Self::decode_row(table, row)? {
                records.push(record);
            }
        }

        if let Some(tags) = &table.tags {
            let owner = match records.as_slice() {
                [single] if guid.is_some() => Some(single.key),
                _ => None,
            };
            let mut by_owner = self.load_tags(tags, owner).await?;
            for record in &mut records {
                record.tags = by_owner.remove(&record.key).unwrap_or_default();
            }
        }

        log::debug!("Read {} {} records from {}", records.len(), kind, table.table);
        Ok(records)
    }
}

async fn resolve_key(
    conn: &mut SqliteConnection,
    target: RefTarget,
    guid: &ExternalGuid,
) -> std::result::Result<Option<i64>, sqlx::Error> {
    let (table, key) = target_table(target);
    let sql = format!("SELECT {} FROM {} WHERE UPPER({}) = ? LIMIT 1", key, table, GUID_COLUMN);
    sqlx::query_scalar(&sql)
        .bind(guid.as_str())
        .fetch_optional(conn)
        .await
}

/// Turn field values into bind parameters, resolving references to surrogate keys
async fn column_binds(
    conn: &mut SqliteConnection,
    table: &ExternalTable,
    fields: &Fields,
) -> std::result::Result<(Vec<&'static str>, Vec<Bind>), sqlx::Error> {
    let mut names = Vec::with_capacity(fields.len());
    let mut binds = Vec::with_capacity(fields.len());

    for (name, value) in fields {
        let refers = table.column(name).and_then(|c| c.refers);
        let bind = match (refers, value) {
            (Some(target), Value::Ref(guid)) => match resolve_key(conn, target, guid).await? {
                Some(key) => Bind::Int(key),
                None => {
                    log::warn!("{}.{}: no record with GUID {}; storing 0", table.table, name, guid);
                    Bind::Int(0)
                }
            },
            (Some(_), _) => Bind::Int(0),
            (None, value) => Bind::Text(value.as_str().map(str::to_string)),
        };
        names.push(*name);
        binds.push(bind);
    }

    Ok((names, binds))
}

async fn insert_tag(
    conn: &mut SqliteConnection,
    tags: &TagTable,
    owner: i64,
    name: &str,
    value: &str,
) -> std::result::Result<(), sqlx::Error> {
    let sql = format!(
        "INSERT INTO {} ({}, {}, {}, {}) VALUES (?, ?, ?, ?)",
        tags.table, tags.owner, tags.name, tags.value, GUID_COLUMN
    );
    sqlx::query(&sql)
        .bind(owner)
        .bind(name)
        .bind(value)
        .bind(ExternalGuid::new_random().as_str())
        .execute(conn)
        .await?;
    Ok(())
}

async fn delete_tags(conn: &mut SqliteConnection, tags: &TagTable, owner: i64) -> std::result::Result<u64, sqlx::Error> {
    let sql = format!("DELETE FROM {} WHERE {} = ?", tags.table, tags.owner);
    let result = sqlx::query(&sql).bind(owner).execute(conn).await?;
    Ok(result.rows_affected())
}

async fn apply_op(
    conn: &mut SqliteConnection,
    table: &ExternalTable,
    op: &WriteOp,
) -> std::result::Result<Option<i64>, sqlx::Error> {
    match op {
        WriteOp::Insert { guid, fields, tags } => {
            let (mut names, mut binds) = column_binds(conn, table, fields).await?;
            for (name, value) in table.fixed {
                if !names.contains(name) {
                    names.push(*name);
                    binds.push(Bind::Text(Some(value.to_string())));
                }
            }
            names.push(GUID_COLUMN);
            binds.push(Bind::Text(Some(guid.to_string())));

            let placeholders = vec!["?"; names.len()].join(", ");
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table.table,
                names.join(", "),
                placeholders
            );
            let result = bind_all(sqlx::query(&sql), binds).execute(&mut *conn).await?;
            let key = result.last_insert_rowid();

            if let Some(tag_table) = &table.tags {
                for tag in tags {
                    insert_tag(conn, tag_table, key, &tag.name, &tag.value).await?;
                }
            }
            Ok(Some(key))
        }
        WriteOp::Update { key, fields, tags } => {
            if !fields.is_empty() {
                let (names, mut binds) = column_binds(conn, table, fields).await?;
                let assignments: Vec<String> = names.iter().map(|n| format!("{} = ?", n)).collect();
                let sql = format!(
                    "UPDATE {} SET {} WHERE {} = ?",
                    table.table,
                    assignments.join(", "),
                    table.key
                );
                binds.push(Bind::Int(*key));
                bind_all(sqlx::query(&sql), binds).execute(&mut *conn).await?;
            }

            if let Some(tag_table) = &table.tags {
                for write in tags {
                    match write {
                        TagWrite::Update { name, value } => {
                            let sql = format!(
                                "UPDATE {} SET {} = ? WHERE {} = ? AND {} = ?",
                                tag_table.table, tag_table.value, tag_table.owner, tag_table.name
                            );
                            sqlx::query(&sql)
                                .bind(value)
                                .bind(*key)
                                .bind(name)
                                .execute(&mut *conn)
                                .await?;
                        }
                        TagWrite::Insert { name, value } => {
                            insert_tag(conn, tag_table, *key, name, value).await?;
                        }
                        TagWrite::DeleteAll => {
                            delete_tags(conn, tag_table, *key).await?;
                        }
                    }
                }
            }
            Ok(None)
        }
        WriteOp::Delete { key } => {
            if let Some(tag_table) = &table.tags {
                delete_tags(conn, tag_table, *key).await?;
            }
            let sql = format!("DELETE FROM {} WHERE {} = ?", table.table, table.key);
            sqlx::query(&sql).bind(*key).execute(&mut *conn).await?;
            Ok(None)
        }
    }
}

#[async_trait]
impl ExternalStore for EaRepository {
    fn table(&self, kind: EntityKind) -> &ExternalTable {
        table_for(kind)
    }

    async fn list(&mut self, kind: EntityKind) -> Result<Vec<ExternalRecord>> {
        self.fetch(kind, None).await
    }

    async fn find(&mut self, kind: EntityKind, guid: &ExternalGuid) -> Result<Vec<ExternalRecord>> {
        self.fetch(kind, Some(guid)).await
    }

    async fn apply_batch(&mut self, kind: EntityKind, ops: &[WriteOp]) -> Result<Vec<i64>> {
        if ops.is_empty() {
            return Ok(Vec::new());
        }

        let table = table_for(kind);
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SyncError::external(kind, "begin", e))?;

        let mut inserted = Vec::new();
        for op in ops {
            let key = apply_op(&mut tx, table, op)
                .await
                .map_err(|e| SyncError::external(kind, op.verb(), e))?;
            inserted.extend(key);
        }

        tx.commit()
            .await
            .map_err(|e| SyncError::external(kind, "commit", e))?;

        log::debug!("Applied {} {} operations to {}", ops.len(), kind, table.table);
        Ok(inserted)
    }

    async fn resolves(&mut self, kind: EntityKind, target: RefTarget, guid: &ExternalGuid) -> Result<bool> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| SyncError::external(kind, "resolve", e))?;
        let key = resolve_key(&mut conn, target, guid)
            .await
            .map_err(|e| SyncError::external(kind, "resolve", e))?;
        Ok(key.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&'static str, Value)]) -> Fields {
        pairs.iter().cloned().collect()
    }

    #[tokio::test]
    async fn test_insert_and_read_back_with_references() {
        let mut repo = EaRepository::in_memory().await.unwrap();
        let pkg_guid = ExternalGuid::new_random();
        let class_guid = ExternalGuid::new_random();

        repo.apply_batch(
            EntityKind::Package,
            &[WriteOp::Insert {
                guid: pkg_guid.clone(),
                fields: fields(&[("Name", Value::text("Domain"))]),
                tags: vec![],
            }],
        )
        .await
        .unwrap();
        let keys = repo
            .apply_batch(
                EntityKind::Class,
                &[WriteOp::Insert {
                    guid: class_guid.clone(),
                    fields: fields(&[
                        ("Object_Type", Value::text("Class")),
                        ("Name", Value::text("Person")),
                        ("Package_ID", Value::Ref(pkg_guid.clone())),
                    ]),
                    tags: vec![TagRow::new("owner", "hr")],
                }],
            )
            .await
            .unwrap();
        assert_eq!(keys.len(), 1);

        let found = repo.find(EntityKind::Class, &class_guid).await.unwrap();
        assert_eq!(found.len(), 1);
        let record = &found[0];
        assert_eq!(record.key, keys[0]);
        assert_eq!(record.field("Name"), &Value::text("Person"));
        assert_eq!(record.field("Package_ID"), &Value::Ref(pkg_guid));
        assert_eq!(record.tags, vec![TagRow::new("owner", "hr")]);
    }

    #[tokio::test]
    async fn test_kinds_sharing_a_table_are_scoped() {
        let mut repo = EaRepository::in_memory().await.unwrap();
        let enum_guid = ExternalGuid::new_random();
        let class_guid = ExternalGuid::new_random();

        repo.apply_batch(
            EntityKind::Class,
            &[WriteOp::Insert {
                guid: class_guid.clone(),
                fields: fields(&[("Object_Type", Value::text("Class")), ("Name", Value::text("Car"))]),
                tags: vec![],
            }],
        )
        .await
        .unwrap();
        repo.apply_batch(
            EntityKind::Enumeration,
            &[WriteOp::Insert {
                guid: enum_guid.clone(),
                fields: fields(&[("Name", Value::text("Colour"))]),
                tags: vec![],
            }],
        )
        .await
        .unwrap();
        repo.apply_batch(
            EntityKind::Literal,
            &[WriteOp::Insert {
                guid: ExternalGuid::new_random(),
                fields: fields(&[("Name", Value::text("Red")), ("Object_ID", Value::Ref(enum_guid))]),
                tags: vec![],
            }],
        )
        .await
        .unwrap();
        repo.apply_batch(
            EntityKind::Attribute,
            &[WriteOp::Insert {
                guid: ExternalGuid::new_random(),
                fields: fields(&[("Name", Value::text("wheels")), ("Object_ID", Value::Ref(class_guid))]),
                tags: vec![],
            }],
        )
        .await
        .unwrap();

        assert_eq!(repo.list(EntityKind::Class).await.unwrap().len(), 1);
        assert_eq!(repo.list(EntityKind::Enumeration).await.unwrap().len(), 1);
        let literals = repo.list(EntityKind::Literal).await.unwrap();
        assert_eq!(literals.len(), 1);
        assert_eq!(literals[0].field("Name"), &Value::text("Red"));
        let attributes = repo.list(EntityKind::Attribute).await.unwrap();
        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes[0].field("Name"), &Value::text("wheels"));
    }

    #[tokio::test]
    async fn test_update_tags_and_delete_cascade() {
        let mut repo = EaRepository::in_memory().await.unwrap();
        let guid = ExternalGuid::new_random();
        let keys = repo
            .apply_batch(
                EntityKind::Class,
                &[WriteOp::Insert {
                    guid: guid.clone(),
                    fields: fields(&[("Object_Type", Value::text("Class")), ("Name", Value::text("A"))]),
                    tags: vec![TagRow::new("x", "1"), TagRow::new("y", "2")],
                }],
            )
            .await
            .unwrap();
        let key = keys[0];

        repo.apply_batch(
            EntityKind::Class,
            &[WriteOp::Update {
                key,
                fields: fields(&[("Name", Value::text("B"))]),
                tags: vec![
                    TagWrite::Update {
                        name: "x".into(),
                        value: "9".into(),
                    },
                    TagWrite::Insert {
                        name: "z".into(),
                        value: "3".into(),
                    },
                ],
            }],
        )
        .await
        .unwrap();

        let record = repo.find(EntityKind::Class, &guid).await.unwrap().remove(0);
        assert_eq!(record.field("Name"), &Value::text("B"));
        let tags = record.tag_map();
        assert_eq!(tags.get("x"), Some(&"9"));
        assert_eq!(tags.get("y"), Some(&"2"));
        assert_eq!(tags.get("z"), Some(&"3"));

        repo.apply_batch(EntityKind::Class, &[WriteOp::Delete { key }]).await.unwrap();

        assert!(repo.list(EntityKind::Class).await.unwrap().is_empty());
        let orphan_tags: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM t_objectproperties")
            .fetch_one(repo.pool())
            .await
            .unwrap();
        assert_eq!(orphan_tags, 0);
    }

    #[tokio::test]
    async fn test_failed_batch_rolls_back() {
        let mut repo = EaRepository::in_memory().await.unwrap();
        sqlx::query("DROP TABLE t_objectproperties")
            .execute(repo.pool())
            .await
            .unwrap();

        let err = repo
            .apply_batch(
                EntityKind::Class,
                &[
                    WriteOp::Insert {
                        guid: ExternalGuid::new_random(),
                        fields: fields(&[("Object_Type", Value::text("Class"))]),
                        tags: vec![],
                    },
                    WriteOp::Insert {
                        guid: ExternalGuid::new_random(),
                        fields: fields(&[("Object_Type", Value::text("Class"))]),
                        tags: vec![TagRow::new("x", "1")],
                    },
                ],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::ExternalStore { operation: "insert", .. }));
        assert!(repo.list(EntityKind::Class).await.unwrap().is_empty());
    }
}
