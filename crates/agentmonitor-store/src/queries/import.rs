use agentmonitor_types::ImportStateRecord;
use rusqlite::{Connection, params};
use sha2::{Digest, Sha256};

use crate::Result;

pub fn get(conn: &Connection, source: &str, file_path: &str) -> Result<Option<ImportStateRecord>> {
    let mut stmt = conn.prepare(
        "SELECT source, file_path, content_hash, imported_at, record_count
         FROM import_state WHERE source = ?1 AND file_path = ?2",
    )?;
    let mut rows = stmt.query([source, file_path])?;
    match rows.next()? {
        Some(row) => Ok(Some(ImportStateRecord {
            source: row.get(0)?,
            file_path: row.get(1)?,
            content_hash: row.get(2)?,
            imported_at: row.get(3)?,
            record_count: row.get::<_, i64>(4)? as u64,
        })),
        None => Ok(None),
    }
}

pub fn upsert(conn: &Connection, state: &ImportStateRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO import_state (source, file_path, content_hash, imported_at, record_count)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(source, file_path) DO UPDATE SET
            content_hash = ?3,
            imported_at = ?4,
            record_count = ?5
        "#,
        params![
            &state.source,
            &state.file_path,
            &state.content_hash,
            &state.imported_at,
            state.record_count as i64,
        ],
    )?;
    Ok(())
}

/// Content hash importers compare against to skip unchanged files.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
