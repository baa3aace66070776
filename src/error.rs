use crate::codec::CodecError;

/// Errors surfaced by store operations.
///
/// Engine failures pass through unchanged. Absence of a key is never an
/// error; point reads report it through `Option` and bulk reads through
/// the returned count.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] heed::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("bucket {0:?} is not registered in the catalog")]
    UnknownBucket(String),

    #[error("malformed backup stream: {0}")]
    BackupFormat(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
