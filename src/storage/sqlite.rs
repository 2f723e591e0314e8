//! SQLite Storage
//!
//! The SQL backend over a `rusqlite` connection to a database file.

use std::path::Path;

use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use tracing::info;

use crate::config::{SqlSettings, StorageType};
use crate::error::{CacheError, Result};
use crate::storage::sql::{SqlClient, SqlDialect, SqlStorage, SqlValue};

/// SQL storage over a SQLite connection.
pub type SqliteStorage = SqlStorage<Connection>;

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

fn from_value_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Integer(i),
        ValueRef::Real(f) => SqlValue::Integer(f as i64),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            SqlValue::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

impl SqlClient for Connection {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let affected = Connection::execute(self, sql, params_from_iter(params.iter()))?;
        Ok(affected as u64)
    }

    fn query_row(&mut self, sql: &str, params: &[SqlValue]) -> Result<Option<Vec<SqlValue>>> {
        let mut stmt = self.prepare(sql)?;
        let columns = stmt.column_count();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;

        match rows.next()? {
            Some(row) => {
                let mut values = Vec::with_capacity(columns);
                for index in 0..columns {
                    values.push(from_value_ref(row.get_ref(index)?));
                }
                Ok(Some(values))
            }
            None => Ok(None),
        }
    }
}

impl SqlStorage<Connection> {
    // == Constructor ==
    /// Opens (or creates) the database at `path` and ensures the cache table exists.
    pub fn open(path: impl AsRef<Path>, settings: &SqlSettings) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            CacheError::Connect(format!("cannot open {}: {}", path.display(), e))
        })?;
        let storage = Self::prepare_sqlite(conn, settings)?;
        info!("sqlite storage opened at {}", path.display());
        Ok(storage)
    }

    /// Opens an in-memory database (for testing).
    pub fn open_in_memory(settings: &SqlSettings) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| CacheError::Connect(e.to_string()))?;
        Self::prepare_sqlite(conn, settings)
    }

    fn prepare_sqlite(conn: Connection, settings: &SqlSettings) -> Result<Self> {
        let mut storage = Self::with_kind(conn, settings, StorageType::Sqlite)?;
        storage
            .create_table()
            .map_err(|e| CacheError::Connect(format!("cannot create cache table: {}", e)))?;
        Ok(storage)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::current_timestamp;
    use crate::storage::Storage;
    use rusqlite::params;
    use tempfile::TempDir;

    fn storage() -> SqliteStorage {
        SqliteStorage::open_in_memory(&SqlSettings::default()).unwrap()
    }

    fn insert_row(storage: &mut SqliteStorage, key: &str, created: i64, lifetime: i64, savetime: i64) {
        storage
            .client()
            .execute(
                "INSERT INTO cache (key, value, created, lifetime, savetime) VALUES (?1, 'v', ?2, ?3, ?4)",
                params![key, created, lifetime, savetime],
            )
            .unwrap();
    }

    #[test]
    fn test_sqlite_set_and_get() {
        let mut storage = storage();

        assert!(storage.set("key1", "value1", 10, 100));
        assert!(storage.has("key1"));
        let packet = storage.get_packet("key1").unwrap();
        assert_eq!(packet.value(), "value1");
        assert_eq!(packet.lifetime(), 10);
        assert_eq!(packet.savetime(), 100);
        assert!((packet.timestamp() - current_timestamp()).abs() <= 1);
    }

    #[test]
    fn test_sqlite_overwrite() {
        let mut storage = storage();
        insert_row(&mut storage, "key1", 1000, 1, 1);

        assert!(storage.set("key1", "value2", 20, 200));
        let packet = storage.get_packet("key1").unwrap();
        assert_eq!(packet.value(), "value2");
        assert_eq!(packet.savetime(), 200);
        assert!(packet.timestamp() > 1000);
    }

    #[test]
    fn test_sqlite_quotes_in_values() {
        let mut storage = storage();
        let tricky = "it's \"quoted\"; DROP TABLE cache; --";

        assert!(storage.set(tricky, tricky, 10, 100));
        assert_eq!(storage.get_value(tricky).unwrap(), tricky);
    }

    #[test]
    fn test_sqlite_missing_key() {
        let mut storage = storage();
        assert!(!storage.has("nope"));
        assert!(storage.get_packet("nope").unwrap_err().is_bad_packet());
        assert!(storage.delete("nope"));
    }

    #[test]
    fn test_sqlite_null_column_is_bad_packet() {
        let mut storage = SqliteStorage::open_in_memory(&SqlSettings::default()).unwrap();
        storage
            .client()
            .execute_batch(
                "DROP TABLE cache;
                 CREATE TABLE cache (key TEXT PRIMARY KEY, value TEXT, created INTEGER, lifetime INTEGER, savetime INTEGER);
                 INSERT INTO cache (key, value, created, lifetime, savetime) VALUES ('k', NULL, 1, 1, 1);",
            )
            .unwrap();

        assert!(!storage.has("k"));
        assert!(storage.get_value("k").unwrap_err().is_bad_packet());
    }

    #[test]
    fn test_sqlite_delete_outdated() {
        let mut storage = storage();
        let now = current_timestamp();
        insert_row(&mut storage, "stale", now - 10, 1, 5);
        insert_row(&mut storage, "expired", now - 10, 1, 60);
        storage.set("fresh", "v", 10, 100);

        assert!(storage.delete_outdated());
        assert!(!storage.has("stale"));
        assert!(storage.has("expired"));
        assert!(storage.has("fresh"));
    }

    #[test]
    fn test_sqlite_delete_outdated_removes_broken_rows() {
        let mut storage = SqliteStorage::open_in_memory(&SqlSettings::default()).unwrap();
        storage
            .client()
            .execute_batch(
                "DROP TABLE cache;
                 CREATE TABLE cache (key TEXT PRIMARY KEY, value TEXT, created INTEGER, lifetime INTEGER, savetime INTEGER);
                 INSERT INTO cache (key, value, created, lifetime, savetime) VALUES ('no_created', 'v', NULL, 1, 1);
                 INSERT INTO cache (key, value, created, lifetime, savetime) VALUES ('no_value', NULL, 1, 1, 1);
                 INSERT INTO cache (key, value, created, lifetime, savetime) VALUES ('negative', 'v', -5, 1, 1000000);",
            )
            .unwrap();
        storage.set("fresh", "v", 10, 100);

        assert!(!storage.has("no_created"));
        assert!(!storage.has("negative"));
        assert!(storage.delete_outdated());

        let count: i64 = storage
            .client()
            .query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        assert!(storage.has("fresh"));
    }

    #[test]
    fn test_sqlite_clear() {
        let mut storage = storage();
        storage.set("a", "1", 10, 100);
        storage.set("b", "2", 10, 100);

        assert!(storage.clear());
        assert!(!storage.has("a"));
        assert!(!storage.has("b"));
    }

    #[test]
    fn test_sqlite_custom_columns() {
        let settings = SqlSettings {
            table: "kv_cache".to_string(),
            key_field: "k".to_string(),
            value_field: "v".to_string(),
            timestamp_field: "ts".to_string(),
            lifetime_field: "life".to_string(),
            savetime_field: "save".to_string(),
        };
        let mut storage = SqliteStorage::open_in_memory(&settings).unwrap();

        assert!(storage.set("key1", "value1", 10, 100));
        assert_eq!(storage.get_value("key1").unwrap(), "value1");
        let count: i64 = storage
            .client()
            .query_row("SELECT COUNT(*) FROM kv_cache WHERE k = 'key1'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_sqlite_file_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.db");

        {
            let mut storage = SqliteStorage::open(&path, &SqlSettings::default()).unwrap();
            assert!(storage.set("key1", "value1", 10, 100));
        }

        let mut storage = SqliteStorage::open(&path, &SqlSettings::default()).unwrap();
        assert_eq!(storage.kind(), StorageType::Sqlite);
        assert_eq!(storage.get_value("key1").unwrap(), "value1");
    }

    #[test]
    fn test_sqlite_open_in_missing_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent").join("cache.db");
        assert!(matches!(
            SqliteStorage::open(&path, &SqlSettings::default()),
            Err(CacheError::Connect(_))
        ));
    }
}
