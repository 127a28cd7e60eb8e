//! Redis store implementation.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use bytes::Bytes;
use cask_core::{Backend, CacheError, CacheResult, Codec, Expiration, Raw, counter};
use redis::aio::MultiplexedConnection;
use tracing::{debug, trace};

use crate::config::RedisConfig;
use crate::error::Error;
use crate::pool::RedisConnectionManager;

/// Connection borrowed from the store's pool.
pub type RedisConnection<'a> = PooledConnection<'a, RedisConnectionManager>;

/// Cache store backed by a single Redis endpoint.
///
/// Cloning is cheap: clones share the connection pool and the codec.
///
/// The contract operations that must not create keys (`add`, `replace`,
/// `delete`, `increment`, `decrement`) probe for the key before writing.
/// The probe and the write are separate commands, so a writer in another
/// process can interleave between them. [`RedisStore::increment_check_set`]
/// and [`RedisStore::increment_atomic`] exist for callers that need stronger
/// guarantees.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool<RedisConnectionManager>,
    default_ttl: Duration,
    pub(crate) codec: Arc<Codec>,
    name: Cow<'static, str>,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("name", &self.name)
            .field("default_ttl", &self.default_ttl)
            .field("pool", &self.pool.state())
            .finish()
    }
}

impl RedisStore {
    /// Creates a new builder with default settings.
    #[must_use]
    pub fn builder() -> RedisStoreBuilder {
        RedisStoreBuilder::default()
    }

    /// Creates a store from declarative configuration.
    ///
    /// Must be called within a Tokio runtime: the pool starts its idle
    /// connection reaper on creation.
    pub fn from_config(config: RedisConfig, codec: Arc<Codec>) -> Result<Self, Error> {
        Self::builder().config(config).codec(codec).build()
    }

    /// Creates a store over a caller-supplied pool.
    pub fn with_pool(
        pool: Pool<RedisConnectionManager>,
        default_ttl: Duration,
        codec: Arc<Codec>,
    ) -> Self {
        Self {
            pool,
            default_ttl,
            codec,
            name: Cow::Borrowed("redis"),
        }
    }

    /// Borrows a validated connection from the pool.
    ///
    /// The connection returns to the pool when the handle is dropped.
    pub async fn connection(&self) -> Result<RedisConnection<'_>, Error> {
        trace!("Borrow pooled redis connection");
        Ok(self.pool.get().await?)
    }

    /// Default TTL applied to [`Expiration::Default`] writes.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub(crate) fn ttl_secs(&self, ttl: Expiration) -> Option<u64> {
        ttl.whole_seconds(self.default_ttl)
    }

    /// Increments a counter inside an optimistic transaction.
    ///
    /// The key is watched before it is read; the write is committed with
    /// `MULTI`/`EXEC` and fails with [`CacheError::Conflict`] if another
    /// client modified the key in between. No lock is held. Fails with
    /// [`CacheError::CacheMiss`] if the key does not exist.
    #[tracing::instrument(skip(self), level = "trace")]
    pub async fn increment_check_set(&self, key: &str, delta: u64) -> CacheResult<i64> {
        let mut con = self.connection().await?;
        redis::cmd("WATCH")
            .arg(key)
            .query_async::<()>(&mut *con)
            .await
            .map_err(Error::from)?;

        let result = self.check_and_set(&mut con, key, delta).await;
        if result.is_err() {
            // EXEC clears the watch on commit; every other exit must do it
            if let Err(err) = redis::cmd("UNWATCH").query_async::<()>(&mut *con).await {
                trace!(%err, "UNWATCH failed");
            }
        }
        result
    }

    async fn check_and_set(
        &self,
        con: &mut MultiplexedConnection,
        key: &str,
        delta: u64,
    ) -> CacheResult<i64> {
        let current = redis::cmd("GET")
            .arg(key)
            .query_async::<Option<Vec<u8>>>(&mut *con)
            .await
            .map_err(Error::from)?
            .ok_or(CacheError::CacheMiss)?;
        let sum = counter::incremented(self.codec.decode::<i64>(&current)?, delta)?;
        let value = self.codec.serialize(&sum)?;

        let committed = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(key)
            .arg(value.as_ref())
            .arg("KEEPTTL")
            .query_async::<Option<redis::Value>>(&mut *con)
            .await
            .map_err(Error::from)?;
        match committed {
            Some(_) => Ok(sum),
            None => {
                debug!(key, "Watched counter changed, increment aborted");
                Err(CacheError::Conflict)
            }
        }
    }

    /// Increments a counter with the server's atomic `INCRBY`.
    ///
    /// Unlike [`Backend::increment`] the key is not probed first: an absent
    /// key is created and starts from zero.
    pub async fn increment_atomic(&self, key: &str, delta: u64) -> CacheResult<i64> {
        let delta = i64::try_from(delta)
            .map_err(|_| CacheError::InvalidArgument(format!("delta {delta} exceeds i64")))?;
        let mut con = self.connection().await?;
        let value = redis::cmd("INCRBY")
            .arg(key)
            .arg(delta)
            .query_async::<i64>(&mut *con)
            .await
            .map_err(Error::from)?;
        Ok(value)
    }

    /// Sets an absolute expiry, as seconds since the Unix epoch.
    pub async fn expire_at(&self, key: &str, epoch_secs: u64) -> CacheResult<()> {
        let mut con = self.connection().await?;
        let applied = redis::cmd("EXPIREAT")
            .arg(key)
            .arg(epoch_secs)
            .query_async::<i64>(&mut *con)
            .await
            .map_err(Error::from)?;
        if applied == 0 {
            return Err(CacheError::CacheMiss);
        }
        Ok(())
    }

    /// Milliseconds until `key` expires.
    ///
    /// Fails with [`CacheError::CacheMiss`] for an absent key and
    /// [`CacheError::NoTtl`] for a key without expiry.
    pub async fn expires_in(&self, key: &str) -> CacheResult<i64> {
        let mut con = self.connection().await?;
        let ttl = redis::cmd("PTTL")
            .arg(key)
            .query_async::<i64>(&mut *con)
            .await
            .map_err(Error::from)?;
        match ttl {
            -2 => Err(CacheError::CacheMiss),
            -1 => Err(CacheError::NoTtl),
            millis => Ok(millis),
        }
    }
}

async fn write(
    con: &mut MultiplexedConnection,
    key: &str,
    value: &[u8],
    ttl_secs: Option<u64>,
) -> Result<(), Error> {
    let mut cmd = redis::cmd("SET");
    cmd.arg(key).arg(value);
    if let Some(secs) = ttl_secs {
        cmd.arg("EX").arg(secs);
    }
    cmd.query_async::<()>(con).await?;
    Ok(())
}

async fn exists(con: &mut MultiplexedConnection, key: &str) -> Result<bool, Error> {
    Ok(redis::cmd("EXISTS")
        .arg(key)
        .query_async::<bool>(con)
        .await?)
}

async fn read(con: &mut MultiplexedConnection, key: &str) -> Result<Option<Vec<u8>>, Error> {
    Ok(redis::cmd("GET")
        .arg(key)
        .query_async::<Option<Vec<u8>>>(con)
        .await?)
}

#[async_trait]
impl Backend for RedisStore {
    async fn set_raw(&self, key: &str, value: Raw, ttl: Expiration) -> CacheResult<()> {
        let mut con = self.connection().await?;
        write(&mut con, key, &value, self.ttl_secs(ttl)).await?;
        Ok(())
    }

    async fn add_raw(&self, key: &str, value: Raw, ttl: Expiration) -> CacheResult<()> {
        let mut con = self.connection().await?;
        if exists(&mut con, key).await? {
            debug!(key, "Key exists, add not stored");
            return Err(CacheError::NotStored);
        }
        write(&mut con, key, &value, self.ttl_secs(ttl)).await?;
        Ok(())
    }

    async fn replace_raw(
        &self,
        key: &str,
        value: Option<Raw>,
        ttl: Expiration,
    ) -> CacheResult<()> {
        let mut con = self.connection().await?;
        if !exists(&mut con, key).await? {
            return Err(CacheError::CacheMiss);
        }
        let Some(value) = value else {
            debug!(key, "Nil value, replace not stored");
            return Err(CacheError::NotStored);
        };
        write(&mut con, key, &value, self.ttl_secs(ttl)).await?;
        Ok(())
    }

    async fn get_raw(&self, key: &str) -> CacheResult<Raw> {
        let mut con = self.connection().await?;
        read(&mut con, key)
            .await?
            .map(Bytes::from)
            .ok_or(CacheError::CacheMiss)
    }

    async fn mget_raw(&self, keys: &[&str]) -> CacheResult<Vec<Raw>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut con = self.connection().await?;
        let values = redis::cmd("MGET")
            .arg(keys)
            .query_async::<Vec<Option<Vec<u8>>>>(&mut *con)
            .await
            .map_err(Error::from)?;
        values
            .into_iter()
            .zip(keys)
            .map(|(value, key)| {
                value.map(Bytes::from).ok_or_else(|| {
                    debug!(key, "MGET key missing");
                    CacheError::CacheMiss
                })
            })
            .collect()
    }

    async fn msetnx_raw(&self, ttl: Expiration, entries: Vec<(String, Raw)>) -> CacheResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let ttl_secs = self.ttl_secs(ttl);
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in &entries {
            // NX keeps pre-existing keys, EX only applies to keys written here
            let cmd = pipe.cmd("SET").arg(key).arg(value.as_ref()).arg("NX");
            if let Some(secs) = ttl_secs {
                cmd.arg("EX").arg(secs);
            }
            pipe.ignore();
        }
        let mut con = self.connection().await?;
        // nil EXEC: a WATCH still held on this connection aborted the batch
        pipe.query_async::<Option<redis::Value>>(&mut *con)
            .await
            .map_err(Error::from)?
            .ok_or(CacheError::Conflict)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut con = self.connection().await?;
        if !exists(&mut con, key).await? {
            return Err(CacheError::CacheMiss);
        }
        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut *con)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn increment(&self, key: &str, delta: u64) -> CacheResult<i64> {
        let mut con = self.connection().await?;
        // the remote INCRBY would create a missing key, so read first
        let current = read(&mut con, key).await?.ok_or(CacheError::CacheMiss)?;
        let sum = counter::incremented(self.codec.decode::<i64>(&current)?, delta)?;
        let value = self.codec.serialize(&sum)?;
        redis::cmd("SET")
            .arg(key)
            .arg(value.as_ref())
            .arg("KEEPTTL")
            .query_async::<()>(&mut *con)
            .await
            .map_err(Error::from)?;
        Ok(sum)
    }

    async fn decrement(&self, key: &str, delta: u64) -> CacheResult<i64> {
        let mut con = self.connection().await?;
        let current = read(&mut con, key).await?.ok_or(CacheError::CacheMiss)?;
        let amount = counter::floored_decrement(self.codec.decode::<i64>(&current)?, delta);
        let value = redis::cmd("DECRBY")
            .arg(key)
            .arg(amount)
            .query_async::<i64>(&mut *con)
            .await
            .map_err(Error::from)?;
        Ok(value)
    }

    async fn flush(&self) -> CacheResult<()> {
        let mut con = self.connection().await?;
        redis::cmd("FLUSHDB")
            .query_async::<()>(&mut *con)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    fn codec(&self) -> &Codec {
        &self.codec
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Part of builder pattern implementation for [`RedisStore`].
pub struct RedisStoreBuilder {
    config: RedisConfig,
    codec: Arc<Codec>,
    name: Cow<'static, str>,
}

impl Default for RedisStoreBuilder {
    fn default() -> Self {
        Self {
            config: RedisConfig::default(),
            codec: Arc::new(Codec::default()),
            name: Cow::Borrowed("redis"),
        }
    }
}

impl RedisStoreBuilder {
    /// Replaces every connection and expiry setting at once.
    pub fn config(mut self, config: RedisConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the endpoint, `host:port` or a `redis://` URL.
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.config.server = server.into();
        self
    }

    /// Sets the password sent with `AUTH` on every new connection.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    /// Selects a logical database on every new connection.
    pub fn database(mut self, database: i64) -> Self {
        self.config.database = database;
        self
    }

    /// TTL used for [`Expiration::Default`] writes, floored to seconds.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.config.default_ttl_secs = ttl.as_secs();
        self
    }

    /// Upper bound on pooled connections.
    pub fn max_size(mut self, max_size: u32) -> Self {
        self.config.max_size = max_size;
        self
    }

    /// Idle connections are discarded after this long.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout_secs = timeout.as_secs();
        self
    }

    /// Codec holding the registered value and record types.
    pub fn codec(mut self, codec: Arc<Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Name reported by [`Backend::name`].
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Creates the store. Connections are dialed lazily on first use.
    ///
    /// Must be called within a Tokio runtime: the pool starts its idle
    /// connection reaper on creation.
    pub fn build(self) -> Result<RedisStore, Error> {
        if self.config.max_size == 0 {
            return Err(Error::InvalidConfig("max_size must be positive".to_owned()));
        }
        let manager = RedisConnectionManager::new(
            &self.config.server,
            self.config.password.clone(),
            self.config.database,
        )?;
        let idle_timeout = self.config.idle_timeout();
        let pool = Pool::builder()
            .max_size(self.config.max_size)
            .idle_timeout((!idle_timeout.is_zero()).then_some(idle_timeout))
            .test_on_check_out(true)
            .build_unchecked(manager);

        Ok(RedisStore {
            pool,
            default_ttl: self.config.default_ttl(),
            codec: self.codec,
            name: self.name,
        })
    }
}
