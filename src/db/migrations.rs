use rusqlite::Connection;

use super::DbError;

struct Migration {
    version: i64,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: r#"
CREATE TABLE resources (
    id                      TEXT PRIMARY KEY,
    title                   TEXT NOT NULL,
    url                     TEXT,
    content                 TEXT,
    ingestion_status        TEXT NOT NULL DEFAULT 'pending',
    ingestion_error         TEXT,
    ingestion_started_at    TEXT,
    ingestion_completed_at  TEXT,
    embedding_json          TEXT,
    created_at              TEXT NOT NULL,
    updated_at              TEXT NOT NULL
);

CREATE TABLE collections (
    id              TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    description     TEXT,
    embedding_json  TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);
"#,
    },
    Migration {
        version: 2,
        // No foreign key on resource_id: membership rows outlive a resource
        // delete until the resource.deleted handler removes them.
        sql: r#"
CREATE TABLE collection_members (
    collection_id   TEXT NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
    resource_id     TEXT NOT NULL,
    added_at        TEXT NOT NULL,
    PRIMARY KEY (collection_id, resource_id)
);

CREATE INDEX idx_collection_members_resource ON collection_members(resource_id);
CREATE INDEX idx_resources_status ON resources(ingestion_status, updated_at);
CREATE INDEX idx_resources_created ON resources(created_at);
"#,
    },
];

pub(super) fn run_migrations(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL
        );",
    )?;

    let applied: Vec<i64> = {
        let mut stmt = conn.prepare("SELECT version FROM _migrations ORDER BY version")?;
        let result = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        result
    };

    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }

        tracing::info!("applying migration v{}", migration.version);

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.sql)
            .map_err(|e| DbError::Migration(format!("v{}: {e}", migration.version)))?;
        tx.execute(
            "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
            rusqlite::params![migration.version],
        )?;
        tx.commit()?;
    }

    Ok(())
}

#[cfg(test)]
pub(super) fn applied_versions(conn: &Connection) -> Result<Vec<i64>, DbError> {
    let mut stmt = conn.prepare("SELECT version FROM _migrations ORDER BY version")?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(versions)
}
