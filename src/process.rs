//! Run-once processes and batched rewrites.
//!
//! Mostly for recreating indexes and similar one-shot maintenance work
//! that must not run again on the next start.

use std::sync::{Mutex, PoisonError};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use heed::RwTxn;

use crate::catalog::Bucket;
use crate::codec::Codec;
use crate::error::Result;
use crate::store::Store;

static TAKE_TURNS: Mutex<()> = Mutex::new(());

impl Store {
    /// Run `f` at most once per store under `name`.
    ///
    /// Completed names are recorded with a timestamp in a reserved
    /// sub-database and skipped on later calls. Overlapping callers
    /// serialize on a process-wide mutex.
    pub fn apply_process(&self, name: &str, f: impl FnOnce(&Store) -> Result<()>) -> Result<()> {
        let _turn = TAKE_TURNS.lock().unwrap_or_else(PoisonError::into_inner);

        {
            let txn = self.read_txn()?;
            if self.processes.get(&txn, name.as_bytes())?.is_some() {
                return Ok(());
            }
        }

        let started = Instant::now();
        tracing::info!(process = name, "process start");
        f(self)?;
        tracing::info!(process = name, elapsed = ?started.elapsed(), "process end");

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let mut txn = self.write_txn()?;
        self.processes
            .put(&mut txn, name.as_bytes(), &now.to_be_bytes())?;
        txn.commit()?;
        Ok(())
    }

    /// Rewrite a bucket in batches: scan `batch_size` values at a time and
    /// hand each batch its own write transaction, committing between
    /// batches.
    pub fn write_batches<KC, VC>(
        &self,
        bucket: &Bucket<KC, VC>,
        batch_size: usize,
        mut f: impl FnMut(&mut RwTxn, &[VC::Item]) -> Result<()>,
    ) -> Result<()>
    where
        KC: Codec,
        KC::Item: Default,
        VC: Codec,
    {
        let mut start = KC::Item::default();
        loop {
            let mut batch = Vec::with_capacity(batch_size);
            let mut txn = self.write_txn()?;
            let next = self.scan_list(&txn, bucket, &start, batch_size, &mut batch)?;
            f(&mut txn, &batch)?;
            txn.commit()?;
            match next {
                Some(key) => start = key,
                None => return Ok(()),
            }
        }
    }
}
