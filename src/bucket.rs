//! Typed bucket operations.
//!
//! A bucket is a one-to-one mapping from a typed key to a typed value over
//! a single raw sub-database. The zero value of the key type is reserved:
//! writing under it is a silent no-op and reading it reports absence.

use std::collections::HashMap;
use std::hash::Hash;

use heed::{RoTxn, RwTxn};

use crate::catalog::Bucket;
use crate::codec::{self, Codec, U64BE};
use crate::error::Result;
use crate::scan::{scan_prefix, Direction, Window};
use crate::store::Store;

impl Store {
    /// True if `id` has a value in the bucket.
    pub fn has<KC, VC>(&self, txn: &RoTxn, bucket: &Bucket<KC, VC>, id: &KC::Item) -> Result<bool>
    where
        KC: Codec,
        VC: Codec,
    {
        let db = self.raw_bucket(&bucket.name)?;
        let key = codec::to_bytes::<KC>(id)?;
        Ok(db.get(txn, &key)?.is_some())
    }

    /// Read one value; `None` if absent. The zero id is always absent.
    pub fn read<KC, VC>(
        &self,
        txn: &RoTxn,
        bucket: &Bucket<KC, VC>,
        id: &KC::Item,
    ) -> Result<Option<VC::Item>>
    where
        KC: Codec,
        KC::Item: Default + PartialEq,
        VC: Codec,
    {
        if *id == KC::Item::default() {
            return Ok(None);
        }
        let db = self.raw_bucket(&bucket.name)?;
        let key = codec::to_bytes::<KC>(id)?;
        match db.get(txn, &key)? {
            Some(raw) => Ok(Some(codec::from_bytes::<VC>(raw)?)),
            None => Ok(None),
        }
    }

    /// Read many ids, appending the values found to `out`.
    ///
    /// Returns how many were found; missing ids are skipped, so a short
    /// count is how callers detect them.
    pub fn read_slice<KC, VC>(
        &self,
        txn: &RoTxn,
        bucket: &Bucket<KC, VC>,
        ids: &[KC::Item],
        out: &mut Vec<VC::Item>,
    ) -> Result<usize>
    where
        KC: Codec,
        KC::Item: Default + PartialEq,
        VC: Codec,
    {
        let mut found = 0;
        for id in ids {
            if let Some(item) = self.read(txn, bucket, id)? {
                out.push(item);
                found += 1;
            }
        }
        Ok(found)
    }

    /// Read many ids into a map. Returns how many were found.
    pub fn read_slice_to_map<KC, VC>(
        &self,
        txn: &RoTxn,
        bucket: &Bucket<KC, VC>,
        ids: &[KC::Item],
        out: &mut HashMap<KC::Item, VC::Item>,
    ) -> Result<usize>
    where
        KC: Codec,
        KC::Item: Default + PartialEq + Eq + Hash + Clone,
        VC: Codec,
    {
        let mut found = 0;
        for id in ids {
            if let Some(item) = self.read(txn, bucket, id)? {
                out.insert(id.clone(), item);
                found += 1;
            }
        }
        Ok(found)
    }

    /// Write a value under `id`. Writing under the zero id is a silent
    /// no-op.
    pub fn write<KC, VC>(
        &self,
        txn: &mut RwTxn,
        bucket: &Bucket<KC, VC>,
        id: &KC::Item,
        value: &VC::Item,
    ) -> Result<()>
    where
        KC: Codec,
        KC::Item: Default + PartialEq,
        VC: Codec,
    {
        if *id == KC::Item::default() {
            return Ok(());
        }
        let db = self.raw_bucket(&bucket.name)?;
        let key = codec::to_bytes::<KC>(id)?;
        let raw = codec::to_bytes::<VC>(value)?;
        db.put(txn, &key, &raw)?;
        Ok(())
    }

    /// Delete the value under `id`; true if something was deleted.
    pub fn delete<KC, VC>(
        &self,
        txn: &mut RwTxn,
        bucket: &Bucket<KC, VC>,
        id: &KC::Item,
    ) -> Result<bool>
    where
        KC: Codec,
        VC: Codec,
    {
        let db = self.raw_bucket(&bucket.name)?;
        let key = codec::to_bytes::<KC>(id)?;
        Ok(db.delete(txn, &key)?)
    }

    /// Allocate the next integer id for the bucket. The first call returns
    /// 1; the counter never reuses ids, even after deletes.
    pub fn next_int_id<KC, VC>(&self, txn: &mut RwTxn, bucket: &Bucket<KC, VC>) -> Result<u64>
    where
        KC: Codec,
        VC: Codec,
    {
        self.raw_bucket(&bucket.name)?;
        let key = bucket.name.as_bytes();
        let next = match self.sequences.get(txn, key)? {
            Some(raw) => codec::from_bytes::<U64BE>(raw)? + 1,
            None => 1,
        };
        self.sequences.put(txn, key, &next.to_be_bytes())?;
        Ok(next)
    }

    /// Re-seed the id counter from the bucket's highest key, e.g. after
    /// restoring into an empty store.
    pub fn reset_sequence<VC>(&self, txn: &mut RwTxn, bucket: &Bucket<U64BE, VC>) -> Result<()>
    where
        VC: Codec,
    {
        let db = self.raw_bucket(&bucket.name)?;
        let last = match db.last(txn)? {
            Some((key, _)) => codec::from_bytes::<U64BE>(key)?,
            None => 0,
        };
        self.sequences
            .put(txn, bucket.name.as_bytes(), &last.to_be_bytes())?;
        Ok(())
    }

    /// Visit every entry in key order; the visitor returns false to stop.
    pub fn iterate_all<KC, VC>(
        &self,
        txn: &RoTxn,
        bucket: &Bucket<KC, VC>,
        direction: Direction,
        mut visit: impl FnMut(KC::Item, VC::Item) -> bool,
    ) -> Result<()>
    where
        KC: Codec,
        VC: Codec,
    {
        let db = self.raw_bucket(&bucket.name)?;
        let window = Window {
            direction,
            ..Window::default()
        };
        scan_prefix(txn, db, &[], &window, &mut |key, value| {
            let id = codec::from_bytes::<KC>(key)?;
            let item = codec::from_bytes::<VC>(value)?;
            Ok(visit(id, item))
        })?;
        Ok(())
    }

    /// Read up to `count` values starting at `start` (inclusive), appending
    /// them to `out`. Returns the next unvisited key, or `None` when the
    /// bucket is exhausted.
    pub fn scan_list<KC, VC>(
        &self,
        txn: &RoTxn,
        bucket: &Bucket<KC, VC>,
        start: &KC::Item,
        count: usize,
        out: &mut Vec<VC::Item>,
    ) -> Result<Option<KC::Item>>
    where
        KC: Codec,
        VC: Codec,
    {
        let db = self.raw_bucket(&bucket.name)?;
        let window = Window {
            cursor: Some(codec::to_bytes::<KC>(start)?),
            limit: count,
            ..Window::default()
        };
        let resume = scan_prefix(txn, db, &[], &window, &mut |_, value| {
            out.push(codec::from_bytes::<VC>(value)?);
            Ok(true)
        })?;
        match resume {
            Some(key) => Ok(Some(codec::from_bytes::<KC>(&key)?)),
            None => Ok(None),
        }
    }

    /// Visit the bucket in batches of at most `batch_size` values; the
    /// visitor returns false to stop early.
    pub fn iterate_in_batches<KC, VC>(
        &self,
        txn: &RoTxn,
        bucket: &Bucket<KC, VC>,
        batch_size: usize,
        mut visit: impl FnMut(&[VC::Item]) -> bool,
    ) -> Result<()>
    where
        KC: Codec,
        KC::Item: Default,
        VC: Codec,
    {
        let mut start = KC::Item::default();
        loop {
            let mut batch = Vec::with_capacity(batch_size);
            let next = self.scan_list(txn, bucket, &start, batch_size, &mut batch)?;
            if !visit(&batch) {
                return Ok(());
            }
            match next {
                Some(key) => start = key,
                None => return Ok(()),
            }
        }
    }
}
