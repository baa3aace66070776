//! Bidirectional term/target indexes.
//!
//! One raw sub-database holds three kinds of rows, partitioned by a
//! leading tag byte:
//!
//! - forward rows, `0x01` + term + priority + target, with empty values:
//!   scanning a term prefix yields its targets in priority order;
//! - reverse rows, `0x02` + target + term, valued with the encoded
//!   priority: the source of truth for the terms linked to a target;
//! - count rows, `0x03` + term, valued with the signed count of targets
//!   currently linked to the term.
//!
//! Every mutation goes through [`Store::set_target_terms`], which keeps
//! the three row kinds in agreement within one write transaction.

use std::collections::BTreeMap;

use heed::{RoTxn, RwTxn};

use crate::catalog::Index;
use crate::codec::{self, Codec, VarInt};
use crate::error::Result;
use crate::scan::{scan_prefix, Window};
use crate::store::{RawDb, Store};

const FORWARD_TAG: u8 = 0x01;
const REVERSE_TAG: u8 = 0x02;
const COUNT_TAG: u8 = 0x03;

fn term_prefix<TC: Codec>(term: &TC::Item) -> Result<Vec<u8>> {
    let mut key = vec![FORWARD_TAG];
    TC::encode(term, &mut key)?;
    Ok(key)
}

fn target_prefix<KC: Codec>(target: &KC::Item) -> Result<Vec<u8>> {
    let mut key = vec![REVERSE_TAG];
    KC::encode(target, &mut key)?;
    Ok(key)
}

fn forward_key<KC: Codec, TC: Codec, PC: Codec>(
    target: &KC::Item,
    term: &TC::Item,
    priority: &PC::Item,
) -> Result<Vec<u8>> {
    let mut key = vec![FORWARD_TAG];
    TC::encode(term, &mut key)?;
    PC::encode(priority, &mut key)?;
    KC::encode(target, &mut key)?;
    Ok(key)
}

fn reverse_key<KC: Codec, TC: Codec>(target: &KC::Item, term: &TC::Item) -> Result<Vec<u8>> {
    let mut key = vec![REVERSE_TAG];
    KC::encode(target, &mut key)?;
    TC::encode(term, &mut key)?;
    Ok(key)
}

fn count_key<TC: Codec>(term: &TC::Item) -> Result<Vec<u8>> {
    let mut key = vec![COUNT_TAG];
    TC::encode(term, &mut key)?;
    Ok(key)
}

fn decode_forward<KC: Codec, TC: Codec, PC: Codec>(
    mut key: &[u8],
) -> Result<(TC::Item, PC::Item, KC::Item)> {
    key = &key[1..];
    let term = TC::decode(&mut key)?;
    let priority = PC::decode(&mut key)?;
    let target = KC::decode(&mut key)?;
    Ok((term, priority, target))
}

fn decode_reverse<KC: Codec, TC: Codec>(mut key: &[u8]) -> Result<(KC::Item, TC::Item)> {
    key = &key[1..];
    let target = KC::decode(&mut key)?;
    let term = TC::decode(&mut key)?;
    Ok((target, term))
}

fn bump_term_count<TC: Codec>(
    txn: &mut RwTxn,
    db: RawDb,
    term: &TC::Item,
    delta: i64,
) -> Result<()> {
    let key = count_key::<TC>(term)?;
    let count = match db.get(txn, &key)? {
        Some(raw) => codec::from_bytes::<VarInt>(raw)?,
        None => 0,
    };
    db.put(txn, &key, &codec::to_bytes::<VarInt>(&(count + delta))?)?;
    Ok(())
}

impl Store {
    /// Make the set of terms linked to `target` exactly the key set of
    /// `terms`, with the given priorities.
    ///
    /// Existing pairings missing from `terms` are unlinked, new ones
    /// linked, and a priority change is an unlink plus a relink, so the
    /// per-term counts net out either way. No other target is touched.
    pub fn set_target_terms<KC, TC, PC>(
        &self,
        txn: &mut RwTxn,
        index: &Index<KC, TC, PC>,
        target: &KC::Item,
        terms: &BTreeMap<TC::Item, PC::Item>,
    ) -> Result<()>
    where
        KC: Codec,
        TC: Codec,
        TC::Item: Ord + Clone,
        PC: Codec,
        PC::Item: PartialEq + Clone,
    {
        let db = self.raw_bucket(&index.name)?;

        let mut existing: BTreeMap<TC::Item, PC::Item> = BTreeMap::new();
        let prefix = target_prefix::<KC>(target)?;
        scan_prefix(txn, db, &prefix, &Window::default(), &mut |key, value| {
            let (_, term) = decode_reverse::<KC, TC>(key)?;
            let priority = codec::from_bytes::<PC>(value)?;
            existing.insert(term, priority);
            Ok(true)
        })?;

        // A changed priority lands in both lists: the delete carries the
        // old priority, the add the new one.
        let mut del: Vec<(TC::Item, PC::Item)> = Vec::new();
        let mut add: Vec<(TC::Item, PC::Item)> = Vec::new();
        for (term, old) in &existing {
            match terms.get(term) {
                Some(new) if new == old => {}
                _ => del.push((term.clone(), old.clone())),
            }
        }
        for (term, new) in terms {
            match existing.get(term) {
                Some(old) if old == new => {}
                _ => add.push((term.clone(), new.clone())),
            }
        }

        for (term, priority) in &del {
            db.delete(txn, &forward_key::<KC, TC, PC>(target, term, priority)?)?;
            db.delete(txn, &reverse_key::<KC, TC>(target, term)?)?;
            bump_term_count::<TC>(txn, db, term, -1)?;
        }
        for (term, priority) in &add {
            db.put(txn, &forward_key::<KC, TC, PC>(target, term, priority)?, &[])?;
            db.put(
                txn,
                &reverse_key::<KC, TC>(target, term)?,
                &codec::to_bytes::<PC>(priority)?,
            )?;
            bump_term_count::<TC>(txn, db, term, 1)?;
        }
        Ok(())
    }

    /// Link `target` under exactly one term at the zero priority.
    pub fn set_target_single_term<KC, TC, PC>(
        &self,
        txn: &mut RwTxn,
        index: &Index<KC, TC, PC>,
        target: &KC::Item,
        term: &TC::Item,
    ) -> Result<()>
    where
        KC: Codec,
        TC: Codec,
        TC::Item: Ord + Clone,
        PC: Codec,
        PC::Item: Default + PartialEq + Clone,
    {
        self.set_target_terms_plain(txn, index, target, std::slice::from_ref(term))
    }

    /// Link `target` under `terms`, all at the zero priority.
    pub fn set_target_terms_plain<KC, TC, PC>(
        &self,
        txn: &mut RwTxn,
        index: &Index<KC, TC, PC>,
        target: &KC::Item,
        terms: &[TC::Item],
    ) -> Result<()>
    where
        KC: Codec,
        TC: Codec,
        TC::Item: Ord + Clone,
        PC: Codec,
        PC::Item: Default + PartialEq + Clone,
    {
        self.set_target_terms_uniform(txn, index, target, terms, &PC::Item::default())
    }

    /// Link `target` under `terms`, all at the same priority.
    pub fn set_target_terms_uniform<KC, TC, PC>(
        &self,
        txn: &mut RwTxn,
        index: &Index<KC, TC, PC>,
        target: &KC::Item,
        terms: &[TC::Item],
        priority: &PC::Item,
    ) -> Result<()>
    where
        KC: Codec,
        TC: Codec,
        TC::Item: Ord + Clone,
        PC: Codec,
        PC::Item: PartialEq + Clone,
    {
        let desired: BTreeMap<TC::Item, PC::Item> = terms
            .iter()
            .map(|term| (term.clone(), priority.clone()))
            .collect();
        self.set_target_terms(txn, index, target, &desired)
    }

    /// Unlink every term from `target`.
    pub fn delete_target_terms<KC, TC, PC>(
        &self,
        txn: &mut RwTxn,
        index: &Index<KC, TC, PC>,
        target: &KC::Item,
    ) -> Result<()>
    where
        KC: Codec,
        TC: Codec,
        TC::Item: Ord + Clone,
        PC: Codec,
        PC::Item: PartialEq + Clone,
    {
        self.set_target_terms(txn, index, target, &BTreeMap::new())
    }

    /// Visit the targets of `term` in priority order (ties broken by
    /// target encoding), honoring the window.
    ///
    /// Returns the resume key for the next page when the visitor halted or
    /// the limit was reached; feed it back as the window's cursor.
    pub fn iterate_term<KC, TC, PC>(
        &self,
        txn: &RoTxn,
        index: &Index<KC, TC, PC>,
        term: &TC::Item,
        window: &Window,
        mut visit: impl FnMut(KC::Item, PC::Item) -> bool,
    ) -> Result<Option<Vec<u8>>>
    where
        KC: Codec,
        TC: Codec,
        PC: Codec,
    {
        let db = self.raw_bucket(&index.name)?;
        let prefix = term_prefix::<TC>(term)?;
        scan_prefix(txn, db, &prefix, window, &mut |key, _| {
            let (_, priority, target) = decode_forward::<KC, TC, PC>(key)?;
            Ok(visit(target, priority))
        })
    }

    /// Append the targets of `term` to `out`, honoring the window.
    pub fn read_term_targets<KC, TC, PC>(
        &self,
        txn: &RoTxn,
        index: &Index<KC, TC, PC>,
        term: &TC::Item,
        window: &Window,
        out: &mut Vec<KC::Item>,
    ) -> Result<Option<Vec<u8>>>
    where
        KC: Codec,
        TC: Codec,
        PC: Codec,
    {
        self.iterate_term(txn, index, term, window, |target, _| {
            out.push(target);
            true
        })
    }

    /// The first target of `term`, if any.
    pub fn read_term_target_single<KC, TC, PC>(
        &self,
        txn: &RoTxn,
        index: &Index<KC, TC, PC>,
        term: &TC::Item,
    ) -> Result<Option<KC::Item>>
    where
        KC: Codec,
        TC: Codec,
        PC: Codec,
    {
        let mut out = Vec::new();
        self.read_term_targets(txn, index, term, &Window::with_limit(1), &mut out)?;
        Ok(out.pop())
    }

    /// Visit the terms linked to `target`, with their priorities, in term
    /// encoding order.
    pub fn iterate_target<KC, TC, PC>(
        &self,
        txn: &RoTxn,
        index: &Index<KC, TC, PC>,
        target: &KC::Item,
        mut visit: impl FnMut(TC::Item, PC::Item) -> bool,
    ) -> Result<()>
    where
        KC: Codec,
        TC: Codec,
        PC: Codec,
    {
        let db = self.raw_bucket(&index.name)?;
        let prefix = target_prefix::<KC>(target)?;
        scan_prefix(txn, db, &prefix, &Window::default(), &mut |key, value| {
            let (_, term) = decode_reverse::<KC, TC>(key)?;
            let priority = codec::from_bytes::<PC>(value)?;
            Ok(visit(term, priority))
        })?;
        Ok(())
    }

    /// Visit every (term, target, priority) in the index, in forward-row
    /// order.
    pub fn iterate_all_terms<KC, TC, PC>(
        &self,
        txn: &RoTxn,
        index: &Index<KC, TC, PC>,
        mut visit: impl FnMut(TC::Item, KC::Item, PC::Item) -> bool,
    ) -> Result<()>
    where
        KC: Codec,
        TC: Codec,
        PC: Codec,
    {
        let db = self.raw_bucket(&index.name)?;
        scan_prefix(
            txn,
            db,
            &[FORWARD_TAG],
            &Window::default(),
            &mut |key, _| {
                let (term, priority, target) = decode_forward::<KC, TC, PC>(key)?;
                Ok(visit(term, target, priority))
            },
        )?;
        Ok(())
    }

    /// The number of targets currently linked to `term`.
    ///
    /// `None` means the term was never linked; a term whose last target
    /// was unlinked reads as `Some(0)`. Treat both as zero.
    pub fn read_term_count<KC, TC, PC>(
        &self,
        txn: &RoTxn,
        index: &Index<KC, TC, PC>,
        term: &TC::Item,
    ) -> Result<Option<i64>>
    where
        KC: Codec,
        TC: Codec,
        PC: Codec,
    {
        let db = self.raw_bucket(&index.name)?;
        match db.get(txn, &count_key::<TC>(term)?)? {
            Some(raw) => Ok(Some(codec::from_bytes::<VarInt>(raw)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::codec::{StringZ, VarInt};
    use crate::store::Store;

    type TagIndex = Index<VarInt, StringZ>;

    fn tag_store() -> (Store, TagIndex) {
        let mut catalog = Catalog::new();
        let tags = catalog.index::<VarInt, StringZ>("tags");
        (Store::test(&catalog), tags)
    }

    fn terms(pairs: &[(&str, u16)]) -> BTreeMap<String, u16> {
        pairs
            .iter()
            .map(|(term, priority)| (term.to_string(), *priority))
            .collect()
    }

    /// All forward rows as (term, target, priority), in forward-row order.
    fn entries(store: &Store, index: &TagIndex) -> Vec<(String, i64, u16)> {
        let txn = store.read_txn().unwrap();
        let mut out = Vec::new();
        store
            .iterate_all_terms(&txn, index, |term, target, priority| {
                out.push((term, target, priority));
                true
            })
            .unwrap();
        out
    }

    fn count(store: &Store, index: &TagIndex, term: &str) -> i64 {
        let txn = store.read_txn().unwrap();
        store
            .read_term_count(&txn, index, &term.to_string())
            .unwrap()
            .unwrap_or(0)
    }

    /// The three-step scenario used across the assertions below.
    fn populated() -> (Store, TagIndex) {
        let (store, tags) = tag_store();
        let mut wtxn = store.write_txn().unwrap();
        store
            .set_target_terms(&mut wtxn, &tags, &10, &terms(&[("abc", 1), ("lol", 2)]))
            .unwrap();
        store
            .set_target_terms(
                &mut wtxn,
                &tags,
                &12,
                &terms(&[("abc", 2), ("klm", 10), ("lol", 5)]),
            )
            .unwrap();
        store
            .set_target_terms(&mut wtxn, &tags, &10, &terms(&[("lol", 4), ("rofl", 7)]))
            .unwrap();
        wtxn.commit().unwrap();
        (store, tags)
    }

    #[test]
    fn reconciliation_leaves_exactly_the_requested_pairings() {
        let (store, tags) = populated();

        let mut found = entries(&store, &tags);
        found.sort();
        let mut expected = vec![
            ("abc".to_string(), 12, 2),
            ("lol".to_string(), 10, 4),
            ("lol".to_string(), 12, 5),
            ("rofl".to_string(), 10, 7),
            ("klm".to_string(), 12, 10),
        ];
        expected.sort();
        assert_eq!(found, expected);

        assert_eq!(count(&store, &tags, "abc"), 1);
        assert_eq!(count(&store, &tags, "lol"), 2);
        assert_eq!(count(&store, &tags, "rofl"), 1);
        assert_eq!(count(&store, &tags, "klm"), 1);
    }

    #[test]
    fn iterate_term_orders_by_priority_then_target() {
        let (store, tags) = populated();
        let txn = store.read_txn().unwrap();

        let mut seen = Vec::new();
        store
            .iterate_term(
                &txn,
                &tags,
                &"lol".to_string(),
                &Window::default(),
                |target, priority| {
                    seen.push((target, priority));
                    true
                },
            )
            .unwrap();
        assert_eq!(seen, vec![(10, 4), (12, 5)]);
    }

    #[test]
    fn iterate_target_lists_terms_with_priorities() {
        let (store, tags) = populated();
        let txn = store.read_txn().unwrap();

        let mut seen = Vec::new();
        store
            .iterate_target(&txn, &tags, &12, |term, priority| {
                seen.push((term, priority));
                true
            })
            .unwrap();
        assert_eq!(
            seen,
            vec![
                ("abc".to_string(), 2),
                ("klm".to_string(), 10),
                ("lol".to_string(), 5)
            ]
        );
    }

    #[test]
    fn deleting_a_target_updates_counts_and_rows() {
        let (store, tags) = populated();

        let mut wtxn = store.write_txn().unwrap();
        store.delete_target_terms(&mut wtxn, &tags, &10).unwrap();
        wtxn.commit().unwrap();

        assert_eq!(count(&store, &tags, "abc"), 1);
        assert_eq!(count(&store, &tags, "lol"), 1);
        assert_eq!(count(&store, &tags, "rofl"), 0);
        assert_eq!(count(&store, &tags, "klm"), 1);

        // The zeroed count row stays behind and still reads as present.
        let txn = store.read_txn().unwrap();
        assert_eq!(
            store
                .read_term_count(&txn, &tags, &"rofl".to_string())
                .unwrap(),
            Some(0)
        );
        drop(txn);

        let mut found = entries(&store, &tags);
        found.sort();
        let mut expected = vec![
            ("abc".to_string(), 12, 2),
            ("lol".to_string(), 12, 5),
            ("klm".to_string(), 12, 10),
        ];
        expected.sort();
        assert_eq!(found, expected);
    }

    #[test]
    fn set_target_terms_is_idempotent() {
        let (store, tags) = populated();
        let before = entries(&store, &tags);

        let mut wtxn = store.write_txn().unwrap();
        store
            .set_target_terms(&mut wtxn, &tags, &10, &terms(&[("lol", 4), ("rofl", 7)]))
            .unwrap();
        wtxn.commit().unwrap();

        assert_eq!(entries(&store, &tags), before);
        assert_eq!(count(&store, &tags, "lol"), 2);
        assert_eq!(count(&store, &tags, "rofl"), 1);
    }

    #[test]
    fn priority_changes_keep_counts_stable() {
        let (store, tags) = tag_store();

        let mut wtxn = store.write_txn().unwrap();
        store
            .set_target_terms(&mut wtxn, &tags, &1, &terms(&[("x", 1), ("y", 2)]))
            .unwrap();
        store
            .set_target_terms(&mut wtxn, &tags, &1, &terms(&[("x", 9), ("y", 2)]))
            .unwrap();
        wtxn.commit().unwrap();

        assert_eq!(count(&store, &tags, "x"), 1);
        assert_eq!(count(&store, &tags, "y"), 1);
        assert_eq!(
            entries(&store, &tags),
            vec![("x".to_string(), 1, 9), ("y".to_string(), 1, 2)]
        );
    }

    #[test]
    fn forward_and_reverse_rows_agree() {
        let (store, tags) = populated();
        let txn = store.read_txn().unwrap();

        let mut forward = Vec::new();
        store
            .iterate_all_terms(&txn, &tags, |term, target, priority| {
                forward.push((target, term, priority));
                true
            })
            .unwrap();

        let mut reverse = Vec::new();
        for target in [10i64, 12] {
            store
                .iterate_target(&txn, &tags, &target, |term, priority| {
                    reverse.push((target, term, priority));
                    true
                })
                .unwrap();
        }

        forward.sort();
        reverse.sort();
        assert_eq!(forward, reverse);
    }

    #[test]
    fn counts_match_forward_row_scans() {
        let (store, tags) = populated();

        let mut scanned = Vec::new();
        {
            let txn = store.read_txn().unwrap();
            for term in ["abc", "klm", "lol", "rofl"] {
                let mut rows = 0i64;
                store
                    .iterate_term(&txn, &tags, &term.to_string(), &Window::default(), |_, _| {
                        rows += 1;
                        true
                    })
                    .unwrap();
                scanned.push((term, rows));
            }
        }

        for (term, rows) in scanned {
            assert_eq!(rows, count(&store, &tags, term), "term {term}");
        }
    }

    #[test]
    fn windowed_term_reads_resume_exactly() {
        let (store, tags) = populated();
        let txn = store.read_txn().unwrap();
        let lol = "lol".to_string();

        let mut targets = Vec::new();
        let cursor = store
            .read_term_targets(&txn, &tags, &lol, &Window::with_limit(1), &mut targets)
            .unwrap();
        assert_eq!(targets, vec![10]);
        let cursor = cursor.expect("a second page exists");

        let mut rest = Vec::new();
        let done = store
            .read_term_targets(&txn, &tags, &lol, &Window::with_cursor(cursor), &mut rest)
            .unwrap();
        assert_eq!(rest, vec![12]);
        assert!(done.is_none());

        // Concatenated pages equal one unlimited read.
        let mut all = Vec::new();
        store
            .read_term_targets(&txn, &tags, &lol, &Window::default(), &mut all)
            .unwrap();
        targets.extend(rest);
        assert_eq!(targets, all);
    }

    #[test]
    fn read_term_target_single_finds_the_best_match() {
        let (store, tags) = populated();
        let txn = store.read_txn().unwrap();

        assert_eq!(
            store
                .read_term_target_single(&txn, &tags, &"lol".to_string())
                .unwrap(),
            Some(10)
        );
        assert_eq!(
            store
                .read_term_target_single(&txn, &tags, &"nope".to_string())
                .unwrap(),
            None
        );
    }

    #[test]
    fn plain_and_uniform_setters_share_one_priority() {
        let (store, tags) = tag_store();

        let mut wtxn = store.write_txn().unwrap();
        store
            .set_target_terms_plain(&mut wtxn, &tags, &5, &["a".to_string(), "b".to_string()])
            .unwrap();
        store
            .set_target_terms_uniform(&mut wtxn, &tags, &6, &["a".to_string()], &3)
            .unwrap();
        store.set_target_single_term(&mut wtxn, &tags, &7, &"b".to_string()).unwrap();
        wtxn.commit().unwrap();

        let mut found = entries(&store, &tags);
        found.sort();
        let mut expected = vec![
            ("a".to_string(), 5, 0),
            ("b".to_string(), 5, 0),
            ("a".to_string(), 6, 3),
            ("b".to_string(), 7, 0),
        ];
        expected.sort();
        assert_eq!(found, expected);
        assert_eq!(count(&store, &tags, "a"), 2);
        assert_eq!(count(&store, &tags, "b"), 2);
    }

    #[test]
    fn priority_ties_break_by_target_encoding() {
        let (store, tags) = tag_store();

        let mut wtxn = store.write_txn().unwrap();
        for target in [3i64, 1, 2] {
            store
                .set_target_terms_uniform(&mut wtxn, &tags, &target, &["t".to_string()], &9)
                .unwrap();
        }
        wtxn.commit().unwrap();

        let txn = store.read_txn().unwrap();
        let mut seen = Vec::new();
        store
            .iterate_term(&txn, &tags, &"t".to_string(), &Window::default(), |t, _| {
                seen.push(t);
                true
            })
            .unwrap();
        // Zigzag encoding of 1, 2, 3 is 0x02, 0x04, 0x06: numeric order.
        assert_eq!(seen, vec![1, 2, 3]);
    }
}
