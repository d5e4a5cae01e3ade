//! History store: append-only log of executed commands (SPEC_FULL §4.8).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Mutex;

use crate::error::ResultExt;

/// A single History Entry (SPEC_FULL §3).
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub command: String,
    pub directory: String,
    pub exit_code: Option<i32>,
}

/// Embedded-SQL-backed store for History Entries.
pub struct HistoryStore {
    conn: Mutex<Connection>,
}

impl HistoryStore {
    pub fn open(path: &std::path::Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context_path("create history dir", parent)?;
        }
        let conn = Connection::open(path).context_path("open history database", path)?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context_op("open in-memory history database")?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn migrate(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                command TEXT NOT NULL,
                directory TEXT NOT NULL,
                exit_code INTEGER
            );",
        )
        .context_op("create history schema")?;
        Ok(())
    }

    /// Insert a new entry with a null exit code, immediately before
    /// execution (SPEC_FULL §3 lifecycle).
    pub fn start(&self, command: &str, directory: &str) -> Result<HistoryEntry> {
        let now = Utc::now();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO history (created_at, updated_at, command, directory, exit_code)
             VALUES (?1, ?2, ?3, ?4, NULL)",
            params![now.to_rfc3339(), now.to_rfc3339(), command, directory],
        )
        .context_op("insert history entry")?;
        let id = conn.last_insert_rowid();
        Ok(HistoryEntry {
            id,
            created_at: now,
            updated_at: now,
            command: command.to_string(),
            directory: directory.to_string(),
            exit_code: None,
        })
    }

    /// Update the entry with the exit code observed at completion.
    pub fn finish(&self, entry: &HistoryEntry, exit_code: i32) -> Result<()> {
        let now = Utc::now();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE history SET exit_code = ?1, updated_at = ?2 WHERE id = ?3",
            params![exit_code, now.to_rfc3339(), entry.id],
        )
        .context_op("update history entry")?;
        Ok(())
    }

    /// Last `limit` commands for `directory`, oldest-first (SPEC_FULL §4.8:
    /// ordered by creation descending then reversed).
    pub fn recent(&self, directory: &str, limit: usize) -> Result<Vec<HistoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, created_at, updated_at, command, directory, exit_code
             FROM history WHERE directory = ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let mut rows: Vec<HistoryEntry> = stmt
            .query_map(params![directory, limit as i64], row_to_entry)?
            .collect::<rusqlite::Result<_>>()?;
        rows.reverse();
        Ok(rows)
    }

    pub fn recent_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<HistoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, created_at, updated_at, command, directory, exit_code
             FROM history WHERE command LIKE ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let pattern = format!("{}%", prefix.replace('%', "\\%"));
        let mut rows: Vec<HistoryEntry> = stmt
            .query_map(params![pattern, limit as i64], row_to_entry)?
            .collect::<rusqlite::Result<_>>()?;
        rows.reverse();
        Ok(rows)
    }

    pub fn all(&self) -> Result<Vec<HistoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, created_at, updated_at, command, directory, exit_code
             FROM history ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([], row_to_entry)?
            .collect::<rusqlite::Result<_>>()?;
        Ok(rows)
    }

    pub fn since(&self, time: DateTime<Utc>) -> Result<Vec<HistoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, created_at, updated_at, command, directory, exit_code
             FROM history WHERE created_at >= ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![time.to_rfc3339()], row_to_entry)?
            .collect::<rusqlite::Result<_>>()?;
        Ok(rows)
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM history WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    pub fn get(&self, id: i64) -> Result<Option<HistoryEntry>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, created_at, updated_at, command, directory, exit_code
             FROM history WHERE id = ?1",
            params![id],
            row_to_entry,
        )
        .optional()
        .context_op("look up history entry")
    }

    pub fn reset(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM history", [])?;
        Ok(())
    }
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<HistoryEntry> {
    let created_at: String = row.get(1)?;
    let updated_at: String = row.get(2)?;
    Ok(HistoryEntry {
        id: row.get(0)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        command: row.get(3)?,
        directory: row.get(4)?,
        exit_code: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_then_finish_round_trips_exit_code() {
        let store = HistoryStore::open_in_memory().unwrap();
        let entry = store.start("ls -la", "/tmp").unwrap();
        assert_eq!(entry.exit_code, None);
        store.finish(&entry, 0).unwrap();
        let fetched = store.get(entry.id).unwrap().unwrap();
        assert_eq!(fetched.exit_code, Some(0));
        assert_eq!(fetched.command, "ls -la");
    }

    #[test]
    fn recent_is_oldest_first() {
        let store = HistoryStore::open_in_memory().unwrap();
        for cmd in ["one", "two", "three"] {
            let e = store.start(cmd, "/tmp").unwrap();
            store.finish(&e, 0).unwrap();
        }
        let recent = store.recent("/tmp", 10).unwrap();
        let commands: Vec<_> = recent.iter().map(|e| e.command.as_str()).collect();
        assert_eq!(commands, vec!["one", "two", "three"]);
    }

    #[test]
    fn delete_removes_exactly_one_entry_and_preserves_ids() {
        let store = HistoryStore::open_in_memory().unwrap();
        let a = store.start("a", "/tmp").unwrap();
        let b = store.start("b", "/tmp").unwrap();
        let c = store.start("c", "/tmp").unwrap();
        assert!(store.delete(b.id).unwrap());
        let all = store.all().unwrap();
        let ids: Vec<_> = all.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![a.id, c.id]);
    }

    #[test]
    fn delete_unknown_id_returns_false() {
        let store = HistoryStore::open_in_memory().unwrap();
        assert!(!store.delete(999).unwrap());
    }

    #[test]
    fn reset_clears_all_entries() {
        let store = HistoryStore::open_in_memory().unwrap();
        store.start("a", "/tmp").unwrap();
        store.start("b", "/tmp").unwrap();
        store.reset().unwrap();
        assert!(store.all().unwrap().is_empty());
    }
}
