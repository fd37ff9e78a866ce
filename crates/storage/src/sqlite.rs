use std::path::Path;

use rusqlite::Connection;
use tracing::debug;

use prefsync_core::{PrefMap, PrefValue};

use crate::error::StorageError;
use crate::repository::PreferenceRepository;

fn encode(value: &PrefValue) -> Result<Vec<u8>, StorageError> {
    value
        .to_msgpack()
        .map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<PrefValue, StorageError> {
    PrefValue::from_msgpack(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Preference repository persisted in a SQLite database.
///
/// Holds the live preference table and a defaults table that
/// `reset_to_defaults` copies over it.
pub struct SqliteRepository {
    conn: Connection,
}

impl SqliteRepository {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Replace the defaults table.
    pub fn seed_defaults(&self, defaults: &PrefMap) -> Result<(), StorageError> {
        self.replace_table("preference_defaults", defaults)
    }

    /// Replace the live preference table.
    pub fn seed_preferences(&self, preferences: &PrefMap) -> Result<(), StorageError> {
        self.replace_table("preferences", preferences)
    }

    fn replace_table(&self, table: &str, values: &PrefMap) -> Result<(), StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(&format!("DELETE FROM {table}"), [])?;
        {
            let mut stmt = tx.prepare(&format!("INSERT INTO {table} (key, value) VALUES (?1, ?2)"))?;
            for (key, value) in values {
                stmt.execute(rusqlite::params![key, encode(value)?])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn read_table(&self, table: &str) -> Result<PrefMap, StorageError> {
        let mut stmt = self.conn.prepare(&format!("SELECT key, value FROM {table}"))?;
        let rows = stmt.query_map([], |row| {
            let key: String = row.get(0)?;
            let value: Vec<u8> = row.get(1)?;
            Ok((key, value))
        })?;

        let mut map = PrefMap::new();
        for row in rows {
            let (key, bytes) = row?;
            map.insert(key, decode(&bytes)?);
        }
        Ok(map)
    }
}

impl PreferenceRepository for SqliteRepository {
    async fn fetch(&self) -> Result<PrefMap, StorageError> {
        self.read_table("preferences")
    }

    async fn write(&self, changes: &PrefMap) -> Result<(), StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO preferences (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = CAST(unixepoch('now','subsec') * 1000 AS INTEGER)",
            )?;
            for (key, value) in changes {
                stmt.execute(rusqlite::params![key, encode(value)?])?;
            }
        }
        tx.commit()?;
        debug!(keys = changes.len(), "preferences written");
        Ok(())
    }

    async fn reset_to_defaults(&self) -> Result<PrefMap, StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM preferences", [])?;
        tx.execute(
            "INSERT INTO preferences (key, value) SELECT key, value FROM preference_defaults",
            [],
        )?;
        tx.commit()?;
        debug!("preferences reset to defaults");
        self.read_table("preferences")
    }
}
