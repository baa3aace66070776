//! Catalog of buckets and indexes.

use std::fmt;
use std::marker::PhantomData;

use crate::codec::{Codec, U16BE};

/// Names every bucket and index a store will use.
///
/// Built once at program start; [`Store::open`](crate::Store::open)
/// materializes a sub-database for every registered name. After that the
/// catalog is not consulted again.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    pub(crate) buckets: Vec<String>,
    pub(crate) indexes: Vec<String>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed bucket under `name`.
    pub fn bucket<KC: Codec, VC: Codec>(&mut self, name: &str) -> Bucket<KC, VC> {
        self.buckets.push(name.to_string());
        Bucket {
            name: name.to_string(),
            _codecs: PhantomData,
        }
    }

    /// Register a typed index under `name`, with big-endian u16 priorities.
    pub fn index<KC: Codec, TC: Codec>(&mut self, name: &str) -> Index<KC, TC> {
        self.index_with_priority(name)
    }

    /// Register a typed index with an arbitrary priority codec.
    pub fn index_with_priority<KC: Codec, TC: Codec, PC: Codec>(
        &mut self,
        name: &str,
    ) -> Index<KC, TC, PC> {
        self.indexes.push(name.to_string());
        Index {
            name: name.to_string(),
            _codecs: PhantomData,
        }
    }
}

/// Descriptor of a typed bucket: a name plus key and value codecs.
pub struct Bucket<KC, VC> {
    pub(crate) name: String,
    _codecs: PhantomData<(KC, VC)>,
}

impl<KC, VC> Bucket<KC, VC> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<KC, VC> Clone for Bucket<KC, VC> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _codecs: PhantomData,
        }
    }
}

impl<KC, VC> fmt::Debug for Bucket<KC, VC> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bucket").field("name", &self.name).finish()
    }
}

/// Descriptor of a typed index: a name plus target (`KC`), term (`TC`) and
/// priority (`PC`) codecs.
///
/// An index is a bidirectional multimap. Each term points at many targets
/// and each target carries few terms; every (term, target) pairing has one
/// priority that orders targets within a term.
pub struct Index<KC, TC, PC = U16BE> {
    pub(crate) name: String,
    _codecs: PhantomData<(KC, TC, PC)>,
}

impl<KC, TC, PC> Index<KC, TC, PC> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<KC, TC, PC> Clone for Index<KC, TC, PC> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _codecs: PhantomData,
        }
    }
}

impl<KC, TC, PC> fmt::Debug for Index<KC, TC, PC> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index").field("name", &self.name).finish()
    }
}
