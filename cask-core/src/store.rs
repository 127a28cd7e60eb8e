//! The cache store contract.
//!
//! [`Backend`] is the object-safe, bytes-level half every store implements.
//! [`CacheStore`] layers typed operations on top of it by running values
//! through the store's [`Codec`]; it is implemented for every backend.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::codec::{Codec, CodecError};
use crate::error::{CacheError, CacheResult};
use crate::{Expiration, Raw};

/// Bytes-level cache operations.
///
/// Existence preconditions:
///
/// - `add_raw` fails [`CacheError::NotStored`] if the key exists.
/// - `replace_raw` fails [`CacheError::CacheMiss`] if the key is absent and
///   [`CacheError::NotStored`] when given no value.
/// - `get_raw`, `delete`, `increment` and `decrement` fail
///   [`CacheError::CacheMiss`] on an absent key; counters are never created
///   implicitly.
/// - `decrement` never takes a counter below zero.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Unconditionally stores `value` with `ttl`.
    async fn set_raw(&self, key: &str, value: Raw, ttl: Expiration) -> CacheResult<()>;

    /// Stores `value` only if `key` is absent.
    async fn add_raw(&self, key: &str, value: Raw, ttl: Expiration) -> CacheResult<()>;

    /// Stores `value` only if `key` is present.
    async fn replace_raw(&self, key: &str, value: Option<Raw>, ttl: Expiration)
    -> CacheResult<()>;

    /// Reads the stored bytes.
    async fn get_raw(&self, key: &str) -> CacheResult<Raw>;

    /// Reads every key in one round trip; any absent key fails the whole call.
    async fn mget_raw(&self, keys: &[&str]) -> CacheResult<Vec<Raw>>;

    /// Writes each absent key in one batch, skipping keys that already exist.
    async fn msetnx_raw(&self, ttl: Expiration, entries: Vec<(String, Raw)>) -> CacheResult<()>;

    /// Removes `key`.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Adds `delta` to an existing counter and returns the new value.
    async fn increment(&self, key: &str, delta: u64) -> CacheResult<i64>;

    /// Subtracts `delta` from an existing counter, flooring at zero.
    async fn decrement(&self, key: &str, delta: u64) -> CacheResult<i64>;

    /// Removes every key this store manages.
    async fn flush(&self) -> CacheResult<()>;

    /// Codec used by the typed operations.
    fn codec(&self) -> &Codec;

    /// Store name, used in logs.
    fn name(&self) -> &str {
        "backend"
    }
}

#[async_trait]
impl Backend for Box<dyn Backend> {
    async fn set_raw(&self, key: &str, value: Raw, ttl: Expiration) -> CacheResult<()> {
        (**self).set_raw(key, value, ttl).await
    }

    async fn add_raw(&self, key: &str, value: Raw, ttl: Expiration) -> CacheResult<()> {
        (**self).add_raw(key, value, ttl).await
    }

    async fn replace_raw(
        &self,
        key: &str,
        value: Option<Raw>,
        ttl: Expiration,
    ) -> CacheResult<()> {
        (**self).replace_raw(key, value, ttl).await
    }

    async fn get_raw(&self, key: &str) -> CacheResult<Raw> {
        (**self).get_raw(key).await
    }

    async fn mget_raw(&self, keys: &[&str]) -> CacheResult<Vec<Raw>> {
        (**self).mget_raw(keys).await
    }

    async fn msetnx_raw(&self, ttl: Expiration, entries: Vec<(String, Raw)>) -> CacheResult<()> {
        (**self).msetnx_raw(ttl, entries).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        (**self).delete(key).await
    }

    async fn increment(&self, key: &str, delta: u64) -> CacheResult<i64> {
        (**self).increment(key, delta).await
    }

    async fn decrement(&self, key: &str, delta: u64) -> CacheResult<i64> {
        (**self).decrement(key, delta).await
    }

    async fn flush(&self) -> CacheResult<()> {
        (**self).flush().await
    }

    fn codec(&self) -> &Codec {
        (**self).codec()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[async_trait]
impl Backend for Arc<dyn Backend> {
    async fn set_raw(&self, key: &str, value: Raw, ttl: Expiration) -> CacheResult<()> {
        (**self).set_raw(key, value, ttl).await
    }

    async fn add_raw(&self, key: &str, value: Raw, ttl: Expiration) -> CacheResult<()> {
        (**self).add_raw(key, value, ttl).await
    }

    async fn replace_raw(
        &self,
        key: &str,
        value: Option<Raw>,
        ttl: Expiration,
    ) -> CacheResult<()> {
        (**self).replace_raw(key, value, ttl).await
    }

    async fn get_raw(&self, key: &str) -> CacheResult<Raw> {
        (**self).get_raw(key).await
    }

    async fn mget_raw(&self, keys: &[&str]) -> CacheResult<Vec<Raw>> {
        (**self).mget_raw(keys).await
    }

    async fn msetnx_raw(&self, ttl: Expiration, entries: Vec<(String, Raw)>) -> CacheResult<()> {
        (**self).msetnx_raw(ttl, entries).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        (**self).delete(key).await
    }

    async fn increment(&self, key: &str, delta: u64) -> CacheResult<i64> {
        (**self).increment(key, delta).await
    }

    async fn decrement(&self, key: &str, delta: u64) -> CacheResult<i64> {
        (**self).decrement(key, delta).await
    }

    async fn flush(&self) -> CacheResult<()> {
        (**self).flush().await
    }

    fn codec(&self) -> &Codec {
        (**self).codec()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// A destination that stored bytes can be decoded into.
///
/// Implemented for every deserializable value type so heterogeneous
/// destinations can be passed to [`CacheStore::mget`]. Decoding is split
/// in two steps so a batch can be decoded completely before any
/// destination is written.
pub trait Slot: Send {
    /// Decodes `data` into a detached value of `Self`'s type.
    fn decode_staged(&self, codec: &Codec, data: &[u8]) -> Result<Box<dyn Any + Send>, CodecError>;

    /// Overwrites `self` with a value produced by [`Slot::decode_staged`].
    ///
    /// A value of any other type is ignored.
    fn commit(&mut self, staged: Box<dyn Any + Send>);
}

impl<T> Slot for T
where
    T: DeserializeOwned + Send + 'static,
{
    fn decode_staged(&self, codec: &Codec, data: &[u8]) -> Result<Box<dyn Any + Send>, CodecError> {
        Ok(Box::new(codec.decode::<T>(data)?))
    }

    fn commit(&mut self, staged: Box<dyn Any + Send>) {
        if let Ok(value) = staged.downcast::<T>() {
            *self = *value;
        }
    }
}

/// A value that can be encoded by a codec, the write-side twin of [`Slot`].
pub trait Encode: Send + Sync {
    /// Encodes `self`.
    fn encode_with(&self, codec: &Codec) -> Result<Raw, CodecError>;
}

impl<T> Encode for T
where
    T: Serialize + Send + Sync + 'static,
{
    fn encode_with(&self, codec: &Codec) -> Result<Raw, CodecError> {
        codec.serialize(self)
    }
}

/// Typed cache operations.
///
/// Values are encoded and decoded with [`Backend::codec`]; every type used
/// here must be registered with that codec.
pub trait CacheStore: Backend {
    /// Unconditionally stores `value`, overwriting value and TTL.
    fn set<T>(
        &self,
        key: &str,
        value: &T,
        ttl: Expiration,
    ) -> impl Future<Output = CacheResult<()>> + Send
    where
        T: Serialize + Send + Sync + 'static,
    {
        async move {
            let raw = self.codec().serialize(value)?;
            self.set_raw(key, raw, ttl).await
        }
    }

    /// Stores `value` only if `key` does not exist yet.
    fn add<T>(
        &self,
        key: &str,
        value: &T,
        ttl: Expiration,
    ) -> impl Future<Output = CacheResult<()>> + Send
    where
        T: Serialize + Send + Sync + 'static,
    {
        async move {
            let raw = self.codec().serialize(value)?;
            self.add_raw(key, raw, ttl).await
        }
    }

    /// Stores `value` only if `key` already exists.
    ///
    /// A `None` value is the nil value: nothing is written and the call
    /// reports [`CacheError::NotStored`] once the key is known to exist.
    fn replace<T>(
        &self,
        key: &str,
        value: Option<&T>,
        ttl: Expiration,
    ) -> impl Future<Output = CacheResult<()>> + Send
    where
        T: Serialize + Send + Sync + 'static,
    {
        async move {
            let raw = value
                .map(|value| self.codec().serialize(value))
                .transpose()?;
            self.replace_raw(key, raw, ttl).await
        }
    }

    /// Decodes the value stored at `key` into `dest`.
    fn get<T>(&self, key: &str, dest: &mut T) -> impl Future<Output = CacheResult<()>> + Send
    where
        T: DeserializeOwned + Send + 'static,
    {
        async move {
            let raw = self.get_raw(key).await?;
            self.codec().deserialize(&raw, dest)?;
            Ok(())
        }
    }

    /// Reads `keys` in one round trip, decoding position `i` into `dests[i]`.
    ///
    /// All or nothing: on a missing key or a decode failure at any position
    /// no destination is written.
    fn mget(
        &self,
        dests: &mut [&mut dyn Slot],
        keys: &[&str],
    ) -> impl Future<Output = CacheResult<()>> + Send {
        async move {
            if dests.len() != keys.len() {
                return Err(CacheError::InvalidArgument(format!(
                    "got {} destinations for {} keys",
                    dests.len(),
                    keys.len()
                )));
            }
            let values = self.mget_raw(keys).await?;
            let staged = dests
                .iter()
                .zip(&values)
                .map(|(dest, raw)| dest.decode_staged(self.codec(), raw))
                .collect::<Result<Vec<_>, _>>()?;
            for (dest, value) in dests.iter_mut().zip(staged) {
                dest.commit(value);
            }
            Ok(())
        }
    }

    /// Writes every absent key of `entries` in one batch with `ttl`.
    ///
    /// Keys that already exist are left untouched; the others are still
    /// written.
    fn msetnx(
        &self,
        ttl: Expiration,
        entries: &[(&str, &dyn Encode)],
    ) -> impl Future<Output = CacheResult<()>> + Send {
        async move {
            let encoded = entries
                .iter()
                .map(|(key, value)| -> CacheResult<(String, Raw)> {
                    Ok(((*key).to_owned(), value.encode_with(self.codec())?))
                })
                .collect::<CacheResult<Vec<_>>>()?;
            if encoded.is_empty() {
                return Ok(());
            }
            self.msetnx_raw(ttl, encoded).await
        }
    }
}

impl<B: Backend + ?Sized> CacheStore for B {}
