use crate::models::{DateKey, Row, SEGMENT_PREFIX};
use duckdb::{Connection, params};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not create database at {path:?}: {reason}")]
    DatabaseCreation { path: PathBuf, reason: String },

    #[error("segment {0} is not provisioned")]
    MissingSegment(String),

    #[error(transparent)]
    Db(#[from] duckdb::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ── Schema ────────────────────────────────────────────────────────────────────

/// One fixed schema for every day; only the segment name varies.
fn segment_ddl(table: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    -- 1-based position on the listing page
    id                      BIGINT  PRIMARY KEY,
    company_name            VARCHAR NOT NULL,
    value_change            DOUBLE  NOT NULL,
    end_day_value           DOUBLE  NOT NULL,
    trading_value           BIGINT  NOT NULL,
    session_high_reference  DOUBLE  NOT NULL
);
"#
    )
}

// ── Snapshot store ────────────────────────────────────────────────────────────

pub struct SnapshotStore {
    conn: Connection,
}

impl SnapshotStore {
    /// Open the database file, creating it (and its directory) on first use.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if Self::database_exists(path) {
            let conn = Connection::open(path)?;
            return Ok(Self { conn });
        }

        info!("Database {:?} not found, creating it", path);
        let creation_failed = |reason: String| StoreError::DatabaseCreation {
            path: path.to_path_buf(),
            reason,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| creation_failed(e.to_string()))?;
        }
        let conn = Connection::open(path).map_err(|e| creation_failed(e.to_string()))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn database_exists(path: &Path) -> bool {
        path.is_file()
    }

    pub fn exists(&self, key: DateKey) -> StoreResult<bool> {
        self.has_table(&key.table_name())
    }

    pub fn missing(&self, keys: &[DateKey]) -> StoreResult<Vec<DateKey>> {
        let mut out = Vec::new();
        for key in keys {
            if !self.exists(*key)? {
                out.push(*key);
            }
        }
        Ok(out)
    }

    fn has_table(&self, table: &str) -> StoreResult<bool> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?",
            params![table],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }

    fn require(&self, key: DateKey) -> StoreResult<String> {
        let table = key.table_name();
        if self.has_table(&table)? {
            Ok(table)
        } else {
            Err(StoreError::MissingSegment(table))
        }
    }

    /// Create the segment for `key`. Returns `false` if it was already there.
    pub fn provision(&self, key: DateKey) -> StoreResult<bool> {
        let table = key.table_name();
        if self.has_table(&table)? {
            debug!("{} already provisioned", table);
            return Ok(false);
        }
        info!("Table {} doesn't exist, creating it", table);
        self.conn.execute_batch(&segment_ddl(&table))?;
        Ok(true)
    }

    /// Insert one row. Autocommit makes every call its own transaction.
    pub fn append(&self, key: DateKey, index: usize, row: &Row) -> StoreResult<()> {
        let table = self.require(key)?;
        self.conn.execute(
            &format!(
                "INSERT INTO {table}
                    (id, company_name, value_change, end_day_value, trading_value, session_high_reference)
                 VALUES (?, ?, ?, ?, ?, ?)"
            ),
            params![
                index as i64,
                row.company_name,
                row.value_change,
                row.end_day_value,
                row.trading_value,
                row.session_high_reference,
            ],
        )?;
        Ok(())
    }

    pub fn rows(&self, key: DateKey) -> StoreResult<Vec<Row>> {
        let table = self.require(key)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT company_name, value_change, end_day_value, trading_value, session_high_reference
             FROM {table} ORDER BY id"
        ))?;
        let rows = stmt
            .query_map([], |r| {
                Ok(Row {
                    company_name: r.get(0)?,
                    value_change: r.get(1)?,
                    end_day_value: r.get(2)?,
                    trading_value: r.get(3)?,
                    session_high_reference: r.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn row_count(&self, key: DateKey) -> StoreResult<i64> {
        let table = self.require(key)?;
        let mut s = self.conn.prepare(&format!("SELECT COUNT(*) FROM {table}"))?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn list_snapshots(&self) -> StoreResult<Vec<DateKey>> {
        let mut stmt = self.conn.prepare(
            "SELECT table_name FROM information_schema.tables WHERE table_name LIKE ?",
        )?;
        let names: Vec<String> = stmt
            .query_map(params![format!("{SEGMENT_PREFIX}%")], |r| r.get(0))?
            .collect::<Result<_, _>>()?;

        let mut keys: Vec<DateKey> = names
            .iter()
            .filter_map(|n| DateKey::from_table_name(n))
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn key(day: u32) -> DateKey {
        DateKey::new(NaiveDate::from_ymd_opt(2024, 3, day).unwrap())
    }

    fn row(name: &str, trading_value: i64) -> Row {
        Row {
            company_name: name.to_string(),
            value_change: 1.5,
            end_day_value: 10.0,
            trading_value,
            session_high_reference: 9.5,
        }
    }

    #[test]
    fn test_provision_is_idempotent() {
        let store = SnapshotStore::open_in_memory().unwrap();
        assert!(!store.exists(key(8)).unwrap());
        assert!(store.provision(key(8)).unwrap());
        assert!(!store.provision(key(8)).unwrap());
        assert!(store.exists(key(8)).unwrap());
        assert!(!store.exists(key(7)).unwrap());
    }

    #[test]
    fn test_missing_keeps_window_order() {
        let store = SnapshotStore::open_in_memory().unwrap();
        store.provision(key(7)).unwrap();

        assert_eq!(store.missing(&[key(8), key(7), key(6)]).unwrap(), vec![key(8), key(6)]);
        store.provision(key(8)).unwrap();
        store.provision(key(6)).unwrap();
        assert!(store.missing(&[key(8), key(7), key(6)]).unwrap().is_empty());
    }

    #[test]
    fn test_append_requires_segment() {
        let store = SnapshotStore::open_in_memory().unwrap();
        let err = store.append(key(8), 1, &row("ALLEGRO", 1)).unwrap_err();
        assert!(matches!(err, StoreError::MissingSegment(t) if t == "stock_data_08_03_2024"));
    }

    #[test]
    fn test_rows_come_back_in_page_order() {
        let store = SnapshotStore::open_in_memory().unwrap();
        store.provision(key(8)).unwrap();
        // Index 2 was skipped during extraction.
        store.append(key(8), 3, &row("CDPROJEKT", 30)).unwrap();
        store.append(key(8), 1, &row("ALLEGRO", 10)).unwrap();

        let rows = store.rows(key(8)).unwrap();
        assert_eq!(rows, vec![row("ALLEGRO", 10), row("CDPROJEKT", 30)]);
        assert_eq!(store.row_count(key(8)).unwrap(), 2);
    }

    #[test]
    fn test_segments_are_isolated_and_listed() {
        let store = SnapshotStore::open_in_memory().unwrap();
        store.provision(key(8)).unwrap();
        store.provision(key(6)).unwrap();
        store.append(key(8), 1, &row("ALLEGRO", 10)).unwrap();

        assert!(store.rows(key(6)).unwrap().is_empty());
        assert_eq!(store.list_snapshots().unwrap(), vec![key(6), key(8)]);
    }

    #[test]
    fn test_open_creates_database_file() {
        let dir = std::env::temp_dir().join(format!("gpw-momentum-store-{}", std::process::id()));
        let path = dir.join("nested").join("gpw.duckdb");
        let _ = std::fs::remove_dir_all(&dir);

        assert!(!SnapshotStore::database_exists(&path));
        {
            let store = SnapshotStore::open(&path).unwrap();
            store.provision(key(8)).unwrap();
        }
        assert!(SnapshotStore::database_exists(&path));
        assert!(SnapshotStore::open(&path).unwrap().exists(key(8)).unwrap());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
