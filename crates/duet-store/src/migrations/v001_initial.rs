//! v001 -- Initial schema creation.
//!
//! A single `documents` table holds every collection. Sub-collections are
//! plain collection paths (`chats/{id}/messages`).

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,             -- collection path
    id         TEXT NOT NULL,             -- document id, unique per collection
    data       TEXT NOT NULL,             -- JSON object
    updated_at INTEGER NOT NULL,          -- server clock, microseconds

    PRIMARY KEY (collection, id)
);

CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
