//! Error types for Redis store operations.
//!
//! All errors convert into [`CacheError::Connection`] so callers handle them
//! through the uniform cache taxonomy.
//!
//! [`CacheError::Connection`]: cask_core::CacheError::Connection

use cask_core::CacheError;
use redis::RedisError;

/// Error type for Redis store operations.
///
/// # When You'll Encounter This
///
/// Mostly wrapped inside [`CacheError`]. It surfaces directly from
/// [`RedisStoreBuilder::build`] when the configuration cannot be used.
///
/// [`RedisStoreBuilder::build`]: crate::RedisStoreBuilder::build
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An error from the underlying Redis client: connection failures,
    /// authentication failures, protocol errors and command errors.
    #[error("Redis store error: {0}")]
    Redis(#[from] RedisError),

    /// No connection could be checked out of the pool in time.
    #[error("Redis store error: timed out waiting for a pooled connection")]
    PoolTimedOut,

    /// The store configuration cannot be used.
    #[error("Redis store error: invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<bb8::RunError<RedisError>> for Error {
    fn from(error: bb8::RunError<RedisError>) -> Self {
        match error {
            bb8::RunError::User(error) => Error::Redis(error),
            bb8::RunError::TimedOut => Error::PoolTimedOut,
        }
    }
}

impl From<Error> for CacheError {
    fn from(error: Error) -> Self {
        Self::Connection(Box::new(error))
    }
}
