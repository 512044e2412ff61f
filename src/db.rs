use log::info;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use crate::error::StoreError;
use crate::store::BlobStore;

/// Durable blobs in a SQLite file. One row per key, scoped by store name so
/// several logical stores can share a database.
pub struct SqliteBlobStore {
    conn: Mutex<Connection>,
    store: String,
}

impl SqliteBlobStore {
    pub fn open(path: impl AsRef<Path>, store: &str) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Opened blob store '{}' at {}", store, path.display());
        Self::with_connection(conn, store)
    }

    #[cfg(test)]
    pub fn open_in_memory(store: &str) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: ":memory:".into(),
            source,
        })?;
        Self::with_connection(conn, store)
    }

    fn with_connection(conn: Connection, store: &str) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS blob (store TEXT NOT NULL, key TEXT NOT NULL, value TEXT NOT NULL, PRIMARY KEY (store, key)) WITHOUT ROWID",
            [],
        )?;
        Ok(SqliteBlobStore {
            conn: Mutex::new(conn),
            store: store.to_string(),
        })
    }
}

impl BlobStore for SqliteBlobStore {
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        match conn.execute(
            "INSERT INTO blob (store, key, value) VALUES (?1, ?2, ?3)",
            params![self.store, key, value],
        ) {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::KeyExists(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let value = conn
            .query_row(
                "SELECT value FROM blob WHERE store = ?1 AND key = ?2",
                params![self.store, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}
