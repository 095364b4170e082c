use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// EmberDB errors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// A record handed to insert or encode carried no `id` field.
    MissingId,
    /// The requested key is absent from both the memtable and the index.
    NotFound,
    /// An operation on a collection whose file handle was released.
    Closed,
    /// An IO error. Always fatal for the operation, never retried internally.
    Io(String),
    /// A block header is structurally broken (brackets, braces, count).
    InvalidHeader(String),
    /// A block with no header line at all.
    EmptyBlock,
    /// Block content that cannot be interpreted (bad UTF-8, truncated rows).
    MalformedBlock(String),
    /// A row's field count disagrees with the schema.
    SchemaMismatch(String),
    /// A block holds fewer rows than its header declared.
    CountMismatch(String),
    /// A gzip member is invalid or truncated.
    Compression(String),
    /// The index resolved a key to a block that does not contain it. Either
    /// a bug or external file corruption.
    Inconsistency(String),
    /// A query expression that cannot be parsed.
    InvalidQuery(String),
    /// A lock was poisoned by a panicking writer.
    LockPoisoned(String),
    /// The database directory is locked by another process.
    Lock(String),
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::MissingId => write!(f, "record missing 'id' field"),
            Error::NotFound => write!(f, "record not found"),
            Error::Closed => write!(f, "collection is closed"),
            Error::Io(msg) => write!(f, "io error: {msg}"),
            Error::InvalidHeader(msg) => write!(f, "invalid block header: {msg}"),
            Error::EmptyBlock => write!(f, "empty block"),
            Error::MalformedBlock(msg) => write!(f, "malformed block: {msg}"),
            Error::SchemaMismatch(msg) => write!(f, "schema/row mismatch: {msg}"),
            Error::CountMismatch(msg) => write!(f, "row count mismatch: {msg}"),
            Error::Compression(msg) => write!(f, "compression error: {msg}"),
            Error::Inconsistency(msg) => write!(f, "index inconsistency: {msg}"),
            Error::InvalidQuery(msg) => write!(f, "invalid query: {msg}"),
            Error::LockPoisoned(msg) => write!(f, "lock poisoned: {msg}"),
            Error::Lock(msg) => write!(f, "directory lock error: {msg}"),
        }
    }
}

/// An EmberDB Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::LockPoisoned(err.to_string())
    }
}
