use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use super::{Database, DbError};

// ---------------------------------------------------------------------------
// Row types: flat structs that map directly to table columns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceRow {
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    pub content: Option<String>,
    pub ingestion_status: String,
    pub ingestion_error: Option<String>,
    pub ingestion_started_at: Option<String>,
    pub ingestion_completed_at: Option<String>,
    pub embedding_json: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub embedding_json: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Filter, order and window for a resource listing. `sort_column` must be a
/// known column name; callers map user input onto a fixed set first.
#[derive(Debug, Clone)]
pub struct ResourceListFilter<'a> {
    pub status: Option<&'a str>,
    pub title_contains: Option<&'a str>,
    pub sort_column: &'static str,
    pub descending: bool,
    pub offset: i64,
    pub limit: i64,
}

const RESOURCE_COLUMNS: &str = "id, title, url, content, ingestion_status, ingestion_error, \
     ingestion_started_at, ingestion_completed_at, embedding_json, created_at, updated_at";

fn resource_from_row(row: &Row<'_>) -> rusqlite::Result<ResourceRow> {
    Ok(ResourceRow {
        id: row.get(0)?,
        title: row.get(1)?,
        url: row.get(2)?,
        content: row.get(3)?,
        ingestion_status: row.get(4)?,
        ingestion_error: row.get(5)?,
        ingestion_started_at: row.get(6)?,
        ingestion_completed_at: row.get(7)?,
        embedding_json: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn collection_from_row(row: &Row<'_>) -> rusqlite::Result<CollectionRow> {
    Ok(CollectionRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        embedding_json: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

// ---------------------------------------------------------------------------
// Resource queries
// ---------------------------------------------------------------------------

pub fn insert_resource(db: &Database, row: &ResourceRow) -> Result<(), DbError> {
    let conn = db.conn();
    conn.execute(
        &format!(
            "INSERT INTO resources ({RESOURCE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            row.id,
            row.title,
            row.url,
            row.content,
            row.ingestion_status,
            row.ingestion_error,
            row.ingestion_started_at,
            row.ingestion_completed_at,
            row.embedding_json,
            row.created_at,
            row.updated_at
        ],
    )?;
    Ok(())
}

pub fn get_resource(db: &Database, id: &str) -> Result<Option<ResourceRow>, DbError> {
    let conn = db.conn();
    let row = conn
        .query_row(
            &format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE id = ?1"),
            params![id],
            resource_from_row,
        )
        .optional()?;
    Ok(row)
}

/// Overwrite every mutable column of an existing resource. Returns false if
/// the row no longer exists.
pub fn update_resource(db: &Database, row: &ResourceRow) -> Result<bool, DbError> {
    let conn = db.conn();
    let changed = conn.execute(
        "UPDATE resources SET title = ?2, url = ?3, content = ?4, ingestion_status = ?5,
            ingestion_error = ?6, ingestion_started_at = ?7, ingestion_completed_at = ?8,
            embedding_json = ?9, updated_at = ?10
         WHERE id = ?1",
        params![
            row.id,
            row.title,
            row.url,
            row.content,
            row.ingestion_status,
            row.ingestion_error,
            row.ingestion_started_at,
            row.ingestion_completed_at,
            row.embedding_json,
            row.updated_at
        ],
    )?;
    Ok(changed > 0)
}

pub fn list_resources(
    db: &Database,
    filter: &ResourceListFilter<'_>,
) -> Result<(Vec<ResourceRow>, i64), DbError> {
    let conn = db.conn();
    let pattern = filter
        .title_contains
        .map(|needle| format!("%{}%", needle.replace('%', "\\%").replace('_', "\\_")));
    let where_clause = "WHERE (?1 IS NULL OR ingestion_status = ?1)
           AND (?2 IS NULL OR title LIKE ?2 ESCAPE '\\')";

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM resources {where_clause}"),
        params![filter.status, pattern],
        |row| row.get(0),
    )?;

    let direction = if filter.descending { "DESC" } else { "ASC" };
    let mut stmt = conn.prepare(&format!(
        "SELECT {RESOURCE_COLUMNS} FROM resources {where_clause}
         ORDER BY {} {direction}, id ASC LIMIT ?3 OFFSET ?4",
        filter.sort_column
    ))?;
    let rows = stmt
        .query_map(
            params![filter.status, pattern, filter.limit, filter.offset],
            resource_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok((rows, total))
}

/// Delete a resource in its own transaction and return the removed row.
/// Membership rows are left for the resource.deleted handler.
pub fn delete_resource(db: &Database, id: &str) -> Result<Option<ResourceRow>, DbError> {
    let conn = db.conn();
    let tx = conn.unchecked_transaction()?;

    let existing = tx
        .query_row(
            &format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE id = ?1"),
            params![id],
            resource_from_row,
        )
        .optional()?;
    if existing.is_none() {
        return Ok(None);
    }
    tx.execute("DELETE FROM resources WHERE id = ?1", params![id])?;

    tx.commit()?;
    Ok(existing)
}

// ---------------------------------------------------------------------------
// Collection queries
// ---------------------------------------------------------------------------

pub fn insert_collection(db: &Database, row: &CollectionRow) -> Result<(), DbError> {
    let conn = db.conn();
    conn.execute(
        "INSERT INTO collections (id, name, description, embedding_json, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            row.id,
            row.name,
            row.description,
            row.embedding_json,
            row.created_at,
            row.updated_at
        ],
    )?;
    Ok(())
}

pub fn get_collection(db: &Database, id: &str) -> Result<Option<CollectionRow>, DbError> {
    let conn = db.conn();
    let row = conn
        .query_row(
            "SELECT id, name, description, embedding_json, created_at, updated_at
             FROM collections WHERE id = ?1",
            params![id],
            collection_from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn list_collections(db: &Database) -> Result<Vec<CollectionRow>, DbError> {
    let conn = db.conn();
    let mut stmt = conn.prepare(
        "SELECT id, name, description, embedding_json, created_at, updated_at
         FROM collections ORDER BY created_at ASC, id ASC",
    )?;
    let rows = stmt
        .query_map([], collection_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update_collection_embedding(
    db: &Database,
    id: &str,
    embedding_json: Option<&str>,
    updated_at: &str,
) -> Result<bool, DbError> {
    let conn = db.conn();
    let changed = conn.execute(
        "UPDATE collections SET embedding_json = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, embedding_json, updated_at],
    )?;
    Ok(changed > 0)
}

/// Returns false when the resource was already a member.
pub fn insert_collection_member(
    db: &Database,
    collection_id: &str,
    resource_id: &str,
    added_at: &str,
) -> Result<bool, DbError> {
    let conn = db.conn();
    let changed = conn.execute(
        "INSERT OR IGNORE INTO collection_members (collection_id, resource_id, added_at)
         VALUES (?1, ?2, ?3)",
        params![collection_id, resource_id, added_at],
    )?;
    Ok(changed > 0)
}

pub fn delete_collection_member(
    db: &Database,
    collection_id: &str,
    resource_id: &str,
) -> Result<bool, DbError> {
    let conn = db.conn();
    let changed = conn.execute(
        "DELETE FROM collection_members WHERE collection_id = ?1 AND resource_id = ?2",
        params![collection_id, resource_id],
    )?;
    Ok(changed > 0)
}

/// Live member resources of a collection. Membership rows whose resource is
/// gone are skipped.
pub fn list_collection_resources(
    db: &Database,
    collection_id: &str,
) -> Result<Vec<ResourceRow>, DbError> {
    let conn = db.conn();
    let columns = RESOURCE_COLUMNS
        .split(", ")
        .map(|column| format!("r.{}", column.trim()))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT {columns} FROM collection_members m
         JOIN resources r ON r.id = m.resource_id
         WHERE m.collection_id = ?1
         ORDER BY m.added_at ASC, r.id ASC"
    ))?;
    let rows = stmt
        .query_map(params![collection_id], resource_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_collections_referencing(
    db: &Database,
    resource_id: &str,
) -> Result<Vec<String>, DbError> {
    let conn = db.conn();
    let mut stmt = conn.prepare(
        "SELECT collection_id FROM collection_members WHERE resource_id = ?1
         ORDER BY collection_id ASC",
    )?;
    let rows = stmt
        .query_map(params![resource_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn delete_memberships_for_resource(db: &Database, resource_id: &str) -> Result<usize, DbError> {
    let conn = db.conn();
    let removed = conn.execute(
        "DELETE FROM collection_members WHERE resource_id = ?1",
        params![resource_id],
    )?;
    Ok(removed)
}
