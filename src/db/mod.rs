mod schema;

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database lock poisoned")]
    LockPoisoned,
    #[error("collection name '{name}' collides with existing collection '{existing}'")]
    IdentifierCollision { name: String, existing: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Text,
    Link,
    Image,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Text => "text",
            ItemKind::Link => "link",
            ItemKind::Image => "image",
        }
    }
}

impl ToSql for ItemKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ItemKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "text" => Ok(ItemKind::Text),
            "link" => Ok(ItemKind::Link),
            "image" => Ok(ItemKind::Image),
            other => Err(FromSqlError::Other(
                format!("unknown item type '{other}'").into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: i64,
    pub name: String,
    pub identifier: String,
    pub created_at: String,
}

/// A stored item exactly as it sits in the `items` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRecord {
    pub id: i64,
    pub kind: ItemKind,
    pub title: Option<String>,
    pub content: Option<String>,
    pub image_data: Option<Vec<u8>>,
    pub created_at: String,
}

pub struct NewItem<'a> {
    pub kind: ItemKind,
    pub title: Option<&'a str>,
    pub content: Option<&'a str>,
    pub image_data: Option<&'a [u8]>,
}

pub struct Database {
    conn: Mutex<Connection>,
}

const COLLECTION_COLUMNS: &str = "id, name, identifier, created_at";

const ITEM_COLUMNS: &str = "
    items.id,
    items.type,
    items.title,
    items.content,
    items.image_data,
    items.created_at
";

impl Database {
    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    pub fn new(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize(conn: &Connection) -> Result<(), DbError> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        conn.execute_batch(schema::CREATE_COLLECTIONS_TABLE)?;
        ensure_items_schema(conn)?;
        conn.execute_batch(schema::CREATE_INDEX_COLLECTION_ITEMS)?;

        Ok(())
    }

    pub fn list_collections(&self) -> Result<Vec<Collection>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map([], collection_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Registers `name` unless it already exists.
    ///
    /// Returns the collection and whether this call inserted it. A different
    /// collection already holding `identifier` is rejected.
    pub fn ensure_collection(
        &self,
        name: &str,
        identifier: &str,
    ) -> Result<(Collection, bool), DbError> {
        let conn = self.conn()?;
        if let Some(existing) = find_collection_by(&conn, "name", name)? {
            return Ok((existing, false));
        }
        if let Some(holder) = find_collection_by(&conn, "identifier", identifier)? {
            return Err(DbError::IdentifierCollision {
                name: name.to_string(),
                existing: holder.name,
            });
        }

        let collection = insert_collection(&conn, name, identifier)?;
        Ok((collection, true))
    }

    /// Returns whichever collection holds `identifier`, registering `name` for
    /// it when none does.
    pub fn resolve_collection(
        &self,
        name: &str,
        identifier: &str,
    ) -> Result<(Collection, bool), DbError> {
        let conn = self.conn()?;
        if let Some(holder) = find_collection_by(&conn, "identifier", identifier)? {
            return Ok((holder, false));
        }

        let collection = insert_collection(&conn, name, identifier)?;
        Ok((collection, true))
    }

    /// Removes the collection and, through the foreign key, all of its items.
    pub fn delete_collection(&self, identifier: &str) -> Result<bool, DbError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM collections WHERE identifier = ?1",
            params![identifier],
        )?;
        Ok(deleted > 0)
    }

    pub fn insert_item(
        &self,
        collection_id: i64,
        new_item: NewItem<'_>,
    ) -> Result<ItemRecord, DbError> {
        let conn = self.conn()?;
        conn.execute(
            "
            INSERT INTO items (
                collection_id,
                type,
                title,
                content,
                image_data
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                collection_id,
                new_item.kind,
                new_item.title,
                new_item.content,
                new_item.image_data,
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(conn.query_row(
            &format!("SELECT {ITEM_COLUMNS} FROM items WHERE items.id = ?1"),
            params![id],
            item_from_row,
        )?)
    }

    pub fn list_items(&self, identifier: &str) -> Result<Vec<ItemRecord>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "
            SELECT {ITEM_COLUMNS}
            FROM items
            JOIN collections ON collections.id = items.collection_id
            WHERE collections.identifier = ?1
            ORDER BY items.id DESC
            "
        ))?;
        let rows = stmt.query_map(params![identifier], item_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    pub fn delete_item(&self, identifier: &str, id: i64) -> Result<bool, DbError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "
            DELETE FROM items
            WHERE id = ?1
              AND collection_id = (SELECT id FROM collections WHERE identifier = ?2)
            ",
            params![id, identifier],
        )?;
        Ok(deleted > 0)
    }

    pub fn update_title(
        &self,
        identifier: &str,
        id: i64,
        title: Option<&str>,
    ) -> Result<bool, DbError> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "
            UPDATE items SET title = ?1
            WHERE id = ?2
              AND collection_id = (SELECT id FROM collections WHERE identifier = ?3)
            ",
            params![title, id, identifier],
        )?;
        Ok(updated > 0)
    }
}

fn find_collection_by(
    conn: &Connection,
    column: &'static str,
    value: &str,
) -> Result<Option<Collection>, DbError> {
    conn.query_row(
        &format!("SELECT {COLLECTION_COLUMNS} FROM collections WHERE {column} = ?1"),
        params![value],
        collection_from_row,
    )
    .optional()
    .map_err(DbError::from)
}

fn insert_collection(
    conn: &Connection,
    name: &str,
    identifier: &str,
) -> Result<Collection, DbError> {
    conn.execute(
        "INSERT INTO collections (name, identifier) VALUES (?1, ?2)",
        params![name, identifier],
    )?;
    let id = conn.last_insert_rowid();
    Ok(conn.query_row(
        &format!("SELECT {COLLECTION_COLUMNS} FROM collections WHERE id = ?1"),
        params![id],
        collection_from_row,
    )?)
}

fn collection_from_row(row: &Row<'_>) -> Result<Collection, rusqlite::Error> {
    Ok(Collection {
        id: row.get(0)?,
        name: row.get(1)?,
        identifier: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn item_from_row(row: &Row<'_>) -> Result<ItemRecord, rusqlite::Error> {
    Ok(ItemRecord {
        id: row.get(0)?,
        kind: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        image_data: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn ensure_items_schema(conn: &Connection) -> Result<(), DbError> {
    let exists: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'items'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    if exists.is_none() {
        conn.execute_batch(schema::CREATE_ITEMS_TABLE)?;
        return Ok(());
    }

    let mut columns = HashSet::new();
    let mut stmt = conn.prepare("PRAGMA table_info(items)")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for row in rows {
        columns.insert(row?);
    }

    if !columns.contains("title") {
        conn.execute_batch(schema::ADD_ITEMS_TITLE_COLUMN)?;
    }

    Ok(())
}
