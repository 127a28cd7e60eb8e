//! Error types shared by every cask store.
//!
//! [`CacheError`] is the taxonomy callers match on. Backends convert their
//! own transport errors into [`CacheError::Connection`] so that the contract
//! stays uniform across stores.

use thiserror::Error;

use crate::codec::CodecError;
use crate::record::RecordError;

/// Result alias used by every store operation.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors reported by cache store operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The requested key or hash field does not exist.
    #[error("cache: key not found")]
    CacheMiss,

    /// A write was rejected by its existence precondition.
    #[error("cache: not stored")]
    NotStored,

    /// The key exists but carries no expiry.
    #[error("cache: key has no TTL")]
    NoTtl,

    /// An optimistic transaction was aborted because a watched key changed
    /// between the watch and the commit.
    #[error("cache: watched key changed, transaction aborted")]
    Conflict,

    /// Arguments did not satisfy the operation's shape requirements.
    #[error("cache: invalid argument: {0}")]
    InvalidArgument(String),

    /// Value encoding or decoding failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Record field access failed.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// Transport, pool or server error, propagated unchanged.
    #[error(transparent)]
    Connection(Box<dyn std::error::Error + Send + Sync>),

    /// Backend state error not related to network interaction.
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl CacheError {
    /// Returns `true` for [`CacheError::CacheMiss`].
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::CacheMiss)
    }

    /// Returns `true` for [`CacheError::NotStored`].
    pub fn is_not_stored(&self) -> bool {
        matches!(self, CacheError::NotStored)
    }
}
