//! StateStore — redb-backed persistence for deployment attempts and releases.
//!
//! Provides typed CRUD operations over attempt records and the live-release
//! lookup. All values are JSON-serialized into redb's `&[u8]` value columns.
//! The store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use switchyard_core::{DeploymentKey, DeploymentRecord, Release, attempt_table_key};

use crate::error::{StateError, StateResult};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(ATTEMPTS).map_err(map_err!(Table))?;
        txn.open_table(RELEASES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Attempts ───────────────────────────────────────────────────

    /// Insert or update an attempt record.
    pub fn put_attempt(&self, record: &DeploymentRecord) -> StateResult<()> {
        let key = record.table_key();
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ATTEMPTS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, state = %record.state, "attempt stored");
        Ok(())
    }

    /// Get one attempt by key and sequence number.
    pub fn get_attempt(
        &self,
        key: &DeploymentKey,
        attempt: u64,
    ) -> StateResult<Option<DeploymentRecord>> {
        let table_key = attempt_table_key(&key.application, &key.environment, attempt);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ATTEMPTS).map_err(map_err!(Table))?;
        match table.get(table_key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: DeploymentRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// List all attempts for a key, in submission order.
    pub fn list_attempts(&self, key: &DeploymentKey) -> StateResult<Vec<DeploymentRecord>> {
        let prefix = format!("{key}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ATTEMPTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (entry_key, value) = entry.map_err(map_err!(Read))?;
            if entry_key.value().starts_with(&prefix) {
                let record: DeploymentRecord =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(record);
            }
        }
        Ok(results)
    }

    /// The most recently submitted attempt for a key, if any.
    pub fn latest_attempt(&self, key: &DeploymentKey) -> StateResult<Option<DeploymentRecord>> {
        Ok(self.list_attempts(key)?.into_iter().last())
    }

    /// Next attempt sequence number for a key (monotonically increasing,
    /// starting at 1). Callers must hold the key's admission registration,
    /// which serializes submissions per key.
    pub fn next_attempt_seq(&self, key: &DeploymentKey) -> StateResult<u64> {
        let last = self
            .list_attempts(key)?
            .into_iter()
            .map(|r| r.attempt)
            .max()
            .unwrap_or(0);
        Ok(last + 1)
    }

    // ── Releases ───────────────────────────────────────────────────

    /// Record the live release for a key. Written only on promotion.
    pub fn put_release(&self, release: &Release) -> StateResult<()> {
        let key = release.table_key();
        let value = serde_json::to_vec(release).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RELEASES).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, version = %release.version, color = %release.color, "release stored");
        Ok(())
    }

    /// The live release for a key — the rollback target. `None` before the
    /// first successful deployment for the key.
    pub fn get_release(&self, key: &DeploymentKey) -> StateResult<Option<Release>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RELEASES).map_err(map_err!(Table))?;
        match table.get(key.to_string().as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let release: Release =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(release))
            }
            None => Ok(None),
        }
    }

    /// List all live releases.
    pub fn list_releases(&self) -> StateResult<Vec<Release>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RELEASES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let release: Release =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(release);
        }
        Ok(results)
    }
}
