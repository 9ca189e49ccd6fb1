//! Progress ledger backed by the `progress` table

use super::{ProgressLedger, StateDb};
use crate::error::StoreError;
use crate::models::FileCursor;
use rusqlite::{params, OptionalExtension};

impl ProgressLedger for StateDb {
    fn get(&self, path: &str) -> Result<u64, StoreError> {
        Ok(self.cursor(path)?.map(|c| c.rows_done).unwrap_or(0))
    }

    fn cursor(&self, path: &str) -> Result<Option<FileCursor>, StoreError> {
        let conn = self.lock()?;
        let cursor = conn
            .query_row(
                "SELECT file_path, rows_done, last_size, last_mtime FROM progress WHERE file_path = ?1",
                params![path],
                |row| {
                    Ok(FileCursor {
                        path: row.get(0)?,
                        rows_done: row.get::<_, i64>(1)?.max(0) as u64,
                        last_size: row.get::<_, i64>(2)?.max(0) as u64,
                        last_mtime: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(cursor)
    }

    fn upsert(&self, path: &str, rows_done: u64, size: u64, mtime: i64) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO progress (file_path, rows_done, last_size, last_mtime)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(file_path) DO UPDATE SET
                rows_done = MAX(progress.rows_done, excluded.rows_done),
                last_size = excluded.last_size,
                last_mtime = excluded.last_mtime
            "#,
            params![path, rows_done as i64, size as i64, mtime],
        )?;
        Ok(())
    }

    fn tracked_files(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM progress", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
