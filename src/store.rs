use std::collections::HashMap;
use std::path::Path;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};

use crate::catalog::Catalog;
use crate::error::{Error, Result};

// Not disk space used; LMDB maps lazily.
const DEFAULT_MAP_SIZE: usize = 1 << 40;

/// Reserved sub-databases: sequence counters and the process registry.
const RESERVED_DBS: u32 = 2;

pub(crate) const SEQUENCES_DB: &str = "__seq";
pub(crate) const PROCESSES_DB: &str = "__proc";

pub(crate) type RawDb = Database<Bytes, Bytes>;

/// An open store: one LMDB environment plus a resolved raw handle for
/// every bucket and index named in the catalog.
///
/// Cloning is cheap and clones share the environment. Any number of
/// read transactions may run concurrently; LMDB serializes writers.
#[derive(Debug, Clone)]
pub struct Store {
    pub(crate) env: Env,
    pub(crate) raw: HashMap<String, RawDb>,
    pub(crate) sequences: RawDb,
    pub(crate) processes: RawDb,
    // Keeps the testdir alive for the lifetime of a test store.
    #[cfg(test)]
    test_dir: Option<std::sync::Arc<tempfile::TempDir>>,
}

impl Store {
    /// Open (creating as needed) a store in the directory at `path`.
    ///
    /// Runs the bootstrap step: one write transaction that creates a
    /// sub-database for every name in `catalog`. Reopening an existing
    /// store with a grown catalog creates only the missing ones.
    ///
    /// # Safety
    ///
    /// The store uses LMDB, [opening][heed::EnvOpenOptions::open] which is
    /// marked unsafe, because of the possible Undefined Behavior (UB) if
    /// the lock file is broken.
    pub unsafe fn open(path: &Path, catalog: &Catalog) -> Result<Self> {
        let max_dbs = (catalog.buckets.len() + catalog.indexes.len()) as u32 + RESERVED_DBS;

        let env = EnvOpenOptions::new()
            .max_dbs(max_dbs)
            .map_size(DEFAULT_MAP_SIZE)
            .open(path)?;

        let mut wtxn = env.write_txn()?;
        let mut raw = HashMap::new();
        for name in catalog.buckets.iter().chain(catalog.indexes.iter()) {
            let db: RawDb = env.create_database(&mut wtxn, Some(name.as_str()))?;
            raw.insert(name.clone(), db);
        }
        let sequences: RawDb = env.create_database(&mut wtxn, Some(SEQUENCES_DB))?;
        let processes: RawDb = env.create_database(&mut wtxn, Some(PROCESSES_DB))?;
        wtxn.commit()?;

        tracing::info!(
            path = %path.display(),
            buckets = catalog.buckets.len(),
            indexes = catalog.indexes.len(),
            "store opened"
        );

        Ok(Store {
            env,
            raw,
            sequences,
            processes,
            #[cfg(test)]
            test_dir: None,
        })
    }

    /// Begin a read transaction. Concurrent readers are unrestricted.
    pub fn read_txn(&self) -> Result<RoTxn> {
        Ok(self.env.read_txn()?)
    }

    /// Begin the write transaction; blocks while another writer is open.
    /// Dropping the transaction without committing rolls it back.
    pub fn write_txn(&self) -> Result<RwTxn> {
        Ok(self.env.write_txn()?)
    }

    pub(crate) fn raw_bucket(&self, name: &str) -> Result<RawDb> {
        self.raw
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownBucket(name.to_string()))
    }

    // Create an ephemeral store for testing purposes.
    #[cfg(test)]
    pub(crate) fn test(catalog: &Catalog) -> Store {
        let dir = tempfile::tempdir().unwrap();
        let mut store = unsafe { Store::open(dir.path(), catalog).unwrap() };
        store.test_dir = Some(std::sync::Arc::new(dir));
        store
    }
}
