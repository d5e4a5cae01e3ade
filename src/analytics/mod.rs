//! Analytics store: records of prediction quality (SPEC_FULL §3, §4.8).

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::ResultExt;

/// A single Analytics Entry.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsEntry {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub input: String,
    pub prediction: String,
    pub actual: String,
}

pub struct AnalyticsStore {
    conn: Mutex<Connection>,
}

impl AnalyticsStore {
    pub fn open(path: &std::path::Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context_path("create analytics dir", parent)?;
        }
        let conn = Connection::open(path).context_path("open analytics database", path)?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context_op("open in-memory analytics database")?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn migrate(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS analytics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL,
                input TEXT NOT NULL,
                prediction TEXT NOT NULL,
                actual TEXT NOT NULL
            );",
        )
        .context_op("create analytics schema")?;
        Ok(())
    }

    /// Insert a new entry, only called when a prediction was produced and an
    /// actual command was entered (SPEC_FULL §3).
    pub fn new_entry(&self, input: &str, prediction: &str, actual: &str) -> Result<AnalyticsEntry> {
        let now = Utc::now();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO analytics (created_at, input, prediction, actual) VALUES (?1, ?2, ?3, ?4)",
            params![now.to_rfc3339(), input, prediction, actual],
        )
        .context_op("insert analytics entry")?;
        Ok(AnalyticsEntry {
            id: conn.last_insert_rowid(),
            created_at: now,
            input: input.to_string(),
            prediction: prediction.to_string(),
            actual: actual.to_string(),
        })
    }

    /// Recent entries, excluding blank inputs and comment actuals.
    pub fn recent(&self, limit: usize) -> Result<Vec<AnalyticsEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, created_at, input, prediction, actual FROM analytics
             WHERE trim(input) != '' AND actual NOT LIKE '#%'
             ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], row_to_entry)?
            .collect::<rusqlite::Result<_>>()?;
        Ok(rows)
    }

    pub fn all(&self) -> Result<Vec<AnalyticsEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, created_at, input, prediction, actual FROM analytics ORDER BY id ASC")?;
        let rows = stmt
            .query_map([], row_to_entry)?
            .collect::<rusqlite::Result<_>>()?;
        Ok(rows)
    }

    pub fn total_count(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM analytics", [], |r| r.get(0))?;
        Ok(count)
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM analytics WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    pub fn reset(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM analytics", [])?;
        Ok(())
    }

    /// Mapping actual→count, excluding comment entries.
    pub fn command_frequencies(&self) -> Result<HashMap<String, usize>> {
        let entries = self.all()?;
        let mut freq = HashMap::new();
        for entry in entries {
            if entry.actual.starts_with('#') {
                continue;
            }
            *freq.entry(entry.actual).or_insert(0) += 1;
        }
        Ok(freq)
    }

    /// Mapping calendar date (YYYY-MM-DD) → count of entries that day.
    pub fn daily_activity(&self) -> Result<HashMap<String, usize>> {
        let entries = self.all()?;
        let mut by_day: HashMap<String, usize> = HashMap::new();
        for entry in entries {
            let day: NaiveDate = entry.created_at.date_naive();
            *by_day.entry(day.to_string()).or_insert(0) += 1;
        }
        Ok(by_day)
    }
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<AnalyticsEntry> {
    let created_at: String = row.get(1)?;
    Ok(AnalyticsEntry {
        id: row.get(0)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        input: row.get(2)?,
        prediction: row.get(3)?,
        actual: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_excludes_blank_input_and_comment_actual() {
        let store = AnalyticsStore::open_in_memory().unwrap();
        store.new_entry("git st", "git status", "git status").unwrap();
        store.new_entry("", "ls", "ls").unwrap();
        store.new_entry("foo", "bar", "# just a comment").unwrap();
        let recent = store.recent(10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].actual, "git status");
    }

    #[test]
    fn command_frequencies_counts_actuals_excluding_comments() {
        let store = AnalyticsStore::open_in_memory().unwrap();
        store.new_entry("a", "ls", "ls").unwrap();
        store.new_entry("a", "ls", "ls").unwrap();
        store.new_entry("a", "ls", "# skip").unwrap();
        let freq = store.command_frequencies().unwrap();
        assert_eq!(freq.get("ls"), Some(&2));
        assert!(!freq.contains_key("# skip"));
    }

    #[test]
    fn total_count_reflects_all_inserts() {
        let store = AnalyticsStore::open_in_memory().unwrap();
        store.new_entry("a", "b", "c").unwrap();
        store.new_entry("d", "e", "f").unwrap();
        assert_eq!(store.total_count().unwrap(), 2);
    }
}
