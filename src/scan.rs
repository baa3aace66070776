//! Prefix-bounded iteration over a raw sub-database.
//!
//! [`scan_prefix`] is the one traversal primitive in the crate; bucket
//! scans and index iteration are typed adapters over it. It walks every
//! entry whose key begins with a prefix and returns a resume key for the
//! next page.

use heed::RoTxn;

use crate::error::Result;
use crate::store::RawDb;

/// Direction of a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

/// Parameters for one page of a prefix scan.
///
/// `cursor` is the resume key returned by a previous page; it must extend
/// the prefix and takes precedence over `offset`. A `limit` of zero means
/// unlimited.
#[derive(Debug, Clone, Default)]
pub struct Window {
    pub cursor: Option<Vec<u8>>,
    pub offset: usize,
    pub limit: usize,
    pub direction: Direction,
}

impl Window {
    pub fn with_limit(limit: usize) -> Self {
        Window {
            limit,
            ..Window::default()
        }
    }

    pub fn with_cursor(cursor: Vec<u8>) -> Self {
        Window {
            cursor: Some(cursor),
            ..Window::default()
        }
    }
}

/// Smallest byte string strictly greater than every key beginning with `s`.
///
/// The rightmost byte below 0xFF is incremented, keeping the suffix;
/// all-0xFF (and empty) input gets a zero byte appended instead.
pub(crate) fn next_prefix(s: &[u8]) -> Vec<u8> {
    let mut out = s.to_vec();
    for i in (0..out.len()).rev() {
        if out[i] < 0xff {
            out[i] += 1;
            return out;
        }
    }
    out.push(0);
    out
}

/// Visit every entry whose key begins with `prefix`, in `window.direction`
/// order, honoring the window's cursor, offset and limit.
///
/// The visitor returns `Ok(false)` to halt. The return value is the key at
/// which iteration stopped: feed it back as the next window's cursor to
/// continue exactly past the last visited entry. `None` means the range is
/// exhausted.
pub(crate) fn scan_prefix(
    txn: &RoTxn,
    db: RawDb,
    prefix: &[u8],
    window: &Window,
    visit: &mut dyn FnMut(&[u8], &[u8]) -> Result<bool>,
) -> Result<Option<Vec<u8>>> {
    let start: &[u8] = match &window.cursor {
        Some(cursor) if !cursor.is_empty() => {
            if !prefix.is_empty() && !cursor.starts_with(prefix) {
                return Ok(None);
            }
            cursor
        }
        _ => prefix,
    };

    let mut current = if start.is_empty() {
        match window.direction {
            Direction::Forward => db.first(txn)?,
            Direction::Reverse => db.last(txn)?,
        }
    } else {
        match window.direction {
            Direction::Forward => db.get_greater_than_or_equal_to(txn, start)?,
            Direction::Reverse => db.get_lower_than(txn, &next_prefix(start))?,
        }
    };

    for _ in 0..window.offset {
        match current {
            Some((key, _)) => current = step(txn, db, key, window.direction)?,
            None => return Ok(None),
        }
    }

    let mut visited = 0usize;
    while let Some((key, value)) = current {
        if !key.starts_with(prefix) {
            return Ok(None);
        }

        let mut halt = !visit(key, value)?;
        if !halt {
            visited += 1;
            halt = window.limit > 0 && visited == window.limit;
        }

        let next = step(txn, db, key, window.direction)?;
        if halt {
            return Ok(match next {
                Some((key, _)) if key.starts_with(prefix) => Some(key.to_vec()),
                _ => None,
            });
        }
        current = next;
    }

    Ok(None)
}

fn step<'t>(
    txn: &'t RoTxn,
    db: RawDb,
    key: &[u8],
    direction: Direction,
) -> Result<Option<(&'t [u8], &'t [u8])>> {
    Ok(match direction {
        Direction::Forward => db.get_greater_than(txn, key)?,
        Direction::Reverse => db.get_lower_than(txn, key)?,
    })
}
