//! Backup and restore streams.
//!
//! The wire format is a sequence of tagged records: `0x01` introduces a
//! bucket by name, `0x02` an item belonging to the most recently named
//! bucket. Names, keys and values are length-prefixed with LEB128
//! varints. A stream ends cleanly at any record boundary.

use std::io::{ErrorKind, Read, Write};

use crate::codec::{Codec, VarUint};
use crate::error::{Error, Result};
use crate::store::{RawDb, Store};

const BUCKET_HEADER: u8 = 0x01;
const ITEM_HEADER: u8 = 0x02;

/// Restore commits after this many items to bound transaction size.
const RESTORE_TX_THRESHOLD: usize = 4096;

impl Store {
    /// Stream the named buckets to `out` under one read snapshot.
    ///
    /// Names not present in the catalog are skipped with a warning.
    pub fn backup(&self, out: &mut impl Write, names: &[&str]) -> Result<()> {
        let txn = self.read_txn()?;
        for &name in names {
            let db = match self.raw.get(name) {
                Some(db) => *db,
                None => {
                    tracing::warn!(bucket = name, "skipping unknown bucket in backup");
                    continue;
                }
            };

            out.write_all(&[BUCKET_HEADER])?;
            write_buffer(out, name.as_bytes())?;

            for entry in db.iter(&txn)? {
                let (key, value) = entry?;
                out.write_all(&[ITEM_HEADER])?;
                write_buffer(out, key)?;
                write_buffer(out, value)?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Apply a backup stream produced by [`Store::backup`].
    ///
    /// Every named bucket must be registered in this store's catalog.
    /// Large streams are committed in batches, so a failed restore may
    /// leave earlier batches applied.
    pub fn restore(&self, input: &mut impl Read) -> Result<()> {
        let mut txn = self.write_txn()?;
        let mut bucket: Option<RawDb> = None;
        let mut pending = 0usize;
        let mut total = 0usize;

        loop {
            let tag = match read_byte(input)? {
                Some(tag) => tag,
                None => break,
            };
            match tag {
                BUCKET_HEADER => {
                    let raw = read_buffer(input)?;
                    let name = String::from_utf8(raw)
                        .map_err(|_| Error::BackupFormat("bucket name is not utf-8"))?;
                    bucket = Some(self.raw_bucket(&name)?);
                }
                ITEM_HEADER => {
                    let key = read_buffer(input)?;
                    let value = read_buffer(input)?;
                    let db = bucket.ok_or(Error::BackupFormat("item before any bucket header"))?;
                    db.put(&mut txn, &key, &value)?;
                    pending += 1;
                    total += 1;
                    if pending >= RESTORE_TX_THRESHOLD {
                        txn.commit()?;
                        txn = self.write_txn()?;
                        pending = 0;
                        tracing::info!(items = total, "restore progress");
                    }
                }
                _ => return Err(Error::BackupFormat("unknown record tag")),
            }
        }

        txn.commit()?;
        tracing::info!(items = total, "restore complete");
        Ok(())
    }
}

fn write_buffer(out: &mut impl Write, buf: &[u8]) -> Result<()> {
    let mut prefix = Vec::new();
    VarUint::encode(&(buf.len() as u64), &mut prefix)?;
    out.write_all(&prefix)?;
    out.write_all(buf)?;
    Ok(())
}

fn read_byte(input: &mut impl Read) -> Result<Option<u8>> {
    let mut byte = [0u8; 1];
    match input.read_exact(&mut byte) {
        Ok(()) => Ok(Some(byte[0])),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn read_uvarint(input: &mut impl Read) -> Result<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = read_byte(input)?.ok_or(Error::BackupFormat("truncated length prefix"))?;
        if shift == 63 && byte > 1 {
            return Err(Error::BackupFormat("length prefix overflows 64 bits"));
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift > 63 {
            return Err(Error::BackupFormat("length prefix overflows 64 bits"));
        }
    }
}

fn read_buffer(input: &mut impl Read) -> Result<Vec<u8>> {
    let len = read_uvarint(input)? as usize;
    let mut buf = vec![0u8; len];
    input.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Bucket, Catalog};
    use crate::codec::{Pack, StringZ, U64BE, VarInt};
    use crate::scan::Window;
    use std::collections::BTreeMap;

    fn catalog() -> (Catalog, Bucket<U64BE, Pack<String>>, crate::Index<VarInt, StringZ>) {
        let mut catalog = Catalog::new();
        let notes = catalog.bucket::<U64BE, Pack<String>>("notes");
        let tags = catalog.index::<VarInt, StringZ>("tags");
        (catalog, notes, tags)
    }

    #[test]
    fn backup_then_restore_reproduces_the_data() {
        let (source_catalog, notes, tags) = catalog();
        let source = Store::test(&source_catalog);

        // Enough items to force a mid-restore commit.
        let item_count = RESTORE_TX_THRESHOLD as u64 + 500;
        let mut wtxn = source.write_txn().unwrap();
        for id in 1..=item_count {
            source
                .write(&mut wtxn, &notes, &id, &format!("note {id}"))
                .unwrap();
        }
        source
            .set_target_terms(
                &mut wtxn,
                &tags,
                &77,
                &BTreeMap::from([("alpha".to_string(), 1u16), ("beta".to_string(), 2)]),
            )
            .unwrap();
        wtxn.commit().unwrap();

        let mut stream = Vec::new();
        source.backup(&mut stream, &["notes", "tags"]).unwrap();

        let (target_catalog, notes_b, _) = catalog();
        let target = Store::test(&target_catalog);
        target.restore(&mut stream.as_slice()).unwrap();

        let txn = target.read_txn().unwrap();
        assert_eq!(
            target.read(&txn, &notes_b, &1).unwrap(),
            Some("note 1".to_string())
        );
        assert_eq!(
            target.read(&txn, &notes_b, &item_count).unwrap(),
            Some(format!("note {item_count}"))
        );

        let mut targets = Vec::new();
        target
            .read_term_targets(&txn, &tags, &"alpha".to_string(), &Window::default(), &mut targets)
            .unwrap();
        assert_eq!(targets, vec![77]);
        assert_eq!(
            target
                .read_term_count(&txn, &tags, &"beta".to_string())
                .unwrap(),
            Some(1)
        );
    }

    #[test]
    fn backup_skips_unknown_buckets() {
        let (source_catalog, notes, _) = catalog();
        let source = Store::test(&source_catalog);

        let mut wtxn = source.write_txn().unwrap();
        source.write(&mut wtxn, &notes, &1, &"kept".to_string()).unwrap();
        wtxn.commit().unwrap();

        let mut with_bogus = Vec::new();
        source.backup(&mut with_bogus, &["bogus", "notes"]).unwrap();
        let mut without = Vec::new();
        source.backup(&mut without, &["notes"]).unwrap();
        assert_eq!(with_bogus, without);
    }

    #[test]
    fn restore_rejects_items_before_a_bucket_header() {
        let (catalog, _, _) = catalog();
        let store = Store::test(&catalog);

        let mut stream = Vec::new();
        stream.push(ITEM_HEADER);
        write_buffer(&mut stream, b"key").unwrap();
        write_buffer(&mut stream, b"value").unwrap();

        assert!(matches!(
            store.restore(&mut stream.as_slice()),
            Err(Error::BackupFormat(_))
        ));
    }

    #[test]
    fn restore_rejects_unknown_tags() {
        let (catalog, _, _) = catalog();
        let store = Store::test(&catalog);
        let stream = [0x7fu8];
        assert!(matches!(
            store.restore(&mut stream.as_slice()),
            Err(Error::BackupFormat(_))
        ));
    }

    #[test]
    fn restore_rejects_unregistered_bucket_names() {
        let (catalog, _, _) = catalog();
        let store = Store::test(&catalog);

        let mut stream = Vec::new();
        stream.push(BUCKET_HEADER);
        write_buffer(&mut stream, b"stranger").unwrap();

        assert!(matches!(
            store.restore(&mut stream.as_slice()),
            Err(Error::UnknownBucket(_))
        ));
    }
}
