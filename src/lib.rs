//! Typed buckets and bidirectional term/target indexes over LMDB.
//!
//! LMDB hands out an ordered map of byte strings; this crate puts a typed
//! surface on top of it. A [`Bucket`] is a one-to-one mapping from a typed
//! key to a typed value. An [`Index`] is a many-to-many mapping between
//! "terms" and "targets" with one priority per pairing and a maintained
//! per-term count, stored so that both directions can be walked in order
//! and paginated with opaque resume cursors.
//!
//! Register everything in a [`Catalog`] at program start, open the
//! [`Store`] once, then run every operation inside an explicit
//! transaction:
//!
//! ```no_run
//! use strata::{Catalog, Pack, Store, StringZ, U64BE, VarInt};
//!
//! # fn main() -> strata::Result<()> {
//! let mut catalog = Catalog::new();
//! let posts = catalog.bucket::<U64BE, Pack<String>>("posts");
//! let by_tag = catalog.index::<VarInt, StringZ>("post_tags");
//!
//! let store = unsafe { Store::open("data".as_ref(), &catalog)? };
//!
//! let mut txn = store.write_txn()?;
//! let id = store.next_int_id(&mut txn, &posts)?;
//! store.write(&mut txn, &posts, &id, &"hello".to_string())?;
//! store.set_target_terms_plain(&mut txn, &by_tag, &(id as i64), &["intro".to_string()])?;
//! txn.commit()?;
//! # Ok(())
//! # }
//! ```

mod backup;
mod bucket;
mod catalog;
mod codec;
mod error;
mod index;
mod process;
mod scan;
mod store;

pub use catalog::{Bucket, Catalog, Index};
pub use codec::{Codec, CodecError, Pack, StringLp, StringZ, U16BE, U32BE, U64BE, VarInt, VarUint};
pub use error::{Error, Result};
pub use scan::{Direction, Window};
pub use store::Store;
