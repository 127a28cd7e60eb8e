//! Hash operations mapping registered records onto Redis hashes.

use std::collections::HashMap;

use cask_core::{CacheError, CacheResult, Expiration, Record};
use serde::de::DeserializeOwned;
use tracing::{trace, warn};

use crate::error::Error;
use crate::store::RedisStore;

impl RedisStore {
    /// Writes every exported field of `record` into the hash at `key`.
    ///
    /// Returns the number of fields that did not exist before; overwritten
    /// fields are not counted. With an expiry the field write and the
    /// `EXPIRE` are committed together in one transaction.
    #[tracing::instrument(skip(self, record), level = "trace")]
    pub async fn hset<R: Record>(&self, key: &str, ttl: Expiration, record: &R) -> CacheResult<i64> {
        let fields = self.codec.record::<R>()?.to_named_serialized(&self.codec, record)?;
        if fields.is_empty() {
            return Ok(0);
        }

        let mut hset = redis::cmd("HSET");
        hset.arg(key);
        for (name, value) in &fields {
            hset.arg(*name).arg(value.as_ref());
        }

        let mut con = self.connection().await?;
        match self.ttl_secs(ttl) {
            None => Ok(hset
                .query_async::<i64>(&mut *con)
                .await
                .map_err(Error::from)?),
            Some(secs) => redis::pipe()
                .atomic()
                .add_command(hset)
                .cmd("EXPIRE")
                .arg(key)
                .arg(secs)
                .ignore()
                .query_async::<Option<(i64,)>>(&mut *con)
                .await
                .map_err(Error::from)?
                .map(|(created,)| created)
                .ok_or(CacheError::Conflict),
        }
    }

    /// Decodes one hash field into `dest`.
    ///
    /// Fails with [`CacheError::CacheMiss`] if the key or field is absent.
    pub async fn hget<T>(&self, key: &str, field: &str, dest: &mut T) -> CacheResult<()>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let mut con = self.connection().await?;
        let data = redis::cmd("HGET")
            .arg(key)
            .arg(field)
            .query_async::<Option<Vec<u8>>>(&mut *con)
            .await
            .map_err(Error::from)?
            .ok_or(CacheError::CacheMiss)?;
        self.codec.deserialize(&data, dest)?;
        Ok(())
    }

    /// Decodes every field of the hash at `key` into the matching field of
    /// `record`.
    ///
    /// Hash fields without an exported counterpart in `R` are skipped, not
    /// reported; [`RedisStore::hget`] fails on the same input. Fails with
    /// [`CacheError::CacheMiss`] if the hash is empty or absent. Every field
    /// is decoded before any is written, so a decode failure leaves `record`
    /// unchanged.
    #[tracing::instrument(skip(self, record), level = "trace")]
    pub async fn hget_all<R: Record>(&self, key: &str, record: &mut R) -> CacheResult<()> {
        let descriptor = self.codec.record::<R>()?;
        let mut con = self.connection().await?;
        let values = redis::cmd("HGETALL")
            .arg(key)
            .query_async::<HashMap<String, Vec<u8>>>(&mut *con)
            .await
            .map_err(Error::from)?;
        drop(con);
        if values.is_empty() {
            return Err(CacheError::CacheMiss);
        }

        trace!(key, fields = values.len(), "Decode hash fields");
        for field in descriptor.decode_fields(&self.codec, record, values)? {
            warn!(key, %field, "Skipping unmapped hash field");
        }
        Ok(())
    }

    /// Whether the hash at `key` has `field`.
    pub async fn hexists(&self, key: &str, field: &str) -> CacheResult<bool> {
        let mut con = self.connection().await?;
        let exists = redis::cmd("HEXISTS")
            .arg(key)
            .arg(field)
            .query_async::<bool>(&mut *con)
            .await
            .map_err(Error::from)?;
        Ok(exists)
    }

    /// Field names of the hash at `key`; empty for an absent key.
    pub async fn hkeys(&self, key: &str) -> CacheResult<Vec<String>> {
        let mut con = self.connection().await?;
        let keys = redis::cmd("HKEYS")
            .arg(key)
            .query_async::<Vec<String>>(&mut *con)
            .await
            .map_err(Error::from)?;
        Ok(keys)
    }

    /// Number of fields in the hash at `key`; `0` for an absent key.
    pub async fn hlen(&self, key: &str) -> CacheResult<i64> {
        let mut con = self.connection().await?;
        let len = redis::cmd("HLEN")
            .arg(key)
            .query_async::<i64>(&mut *con)
            .await
            .map_err(Error::from)?;
        Ok(len)
    }

    /// Adds `delta` to a numeric hash field, creating it at zero if absent.
    pub async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> CacheResult<i64> {
        let mut con = self.connection().await?;
        let value = redis::cmd("HINCRBY")
            .arg(key)
            .arg(field)
            .arg(delta)
            .query_async::<i64>(&mut *con)
            .await
            .map_err(Error::from)?;
        Ok(value)
    }

    /// Removes `fields` from the hash at `key`.
    ///
    /// Returns how many fields were actually removed.
    pub async fn hdel(&self, key: &str, fields: &[&str]) -> CacheResult<i64> {
        if fields.is_empty() {
            return Ok(0);
        }
        let mut con = self.connection().await?;
        let removed = redis::cmd("HDEL")
            .arg(key)
            .arg(fields)
            .query_async::<i64>(&mut *con)
            .await
            .map_err(Error::from)?;
        Ok(removed)
    }
}
