//! Moka store implementation.

use std::borrow::Cow;
use std::future::ready;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use cask_core::{Backend, CacheError, CacheResult, Codec, Expiration, Raw, counter};
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use tracing::debug;

use crate::builder::MokaStoreBuilder;
use crate::config::MokaConfig;

/// How a write affects the entry's expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryTtl {
    /// Replace the expiry; `None` means never expire.
    Reset(Option<Duration>),
    /// Keep whatever expiry the entry already had.
    Keep,
}

/// Value bytes plus the expiry directive they were written with.
#[derive(Debug, Clone)]
pub(crate) struct Stored {
    pub(crate) data: Bytes,
    pub(crate) ttl: EntryTtl,
}

/// In-memory cache store powered by Moka.
///
/// Stores the same bytes a remote store would: values go through the
/// shared [`Codec`] and counters are kept as decimal text, so a typed
/// [`get`](cask_core::CacheStore::get) reads a counter back as an integer.
///
/// # Caveats
///
/// - Data is **not persisted**; the cache is lost on process restart.
/// - Data is **not shared** across processes.
#[derive(Clone)]
pub struct MokaStore {
    pub(crate) cache: Cache<String, Stored>,
    pub(crate) default_ttl: Duration,
    pub(crate) codec: Arc<Codec>,
    pub(crate) name: Cow<'static, str>,
}

impl std::fmt::Debug for MokaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaStore")
            .field("name", &self.name)
            .field("default_ttl", &self.default_ttl)
            .field("cache", &self.cache)
            .finish()
    }
}

impl MokaStore {
    /// Creates a new builder holding at most `max_capacity` entries.
    pub fn builder(max_capacity: u64) -> MokaStoreBuilder {
        MokaStoreBuilder::new(max_capacity)
    }

    /// Creates a store from declarative configuration.
    pub fn from_config(config: MokaConfig, codec: Arc<Codec>) -> Self {
        Self::builder(config.max_capacity)
            .default_ttl(config.default_ttl())
            .codec(codec)
            .build()
    }

    fn entry(&self, data: Raw, ttl: Expiration) -> Stored {
        Stored {
            data,
            ttl: EntryTtl::Reset(ttl.resolve(self.default_ttl)),
        }
    }

    /// Applies `step` to an existing counter atomically, keeping its TTL.
    async fn update_counter<F>(&self, key: &str, step: F) -> CacheResult<i64>
    where
        F: FnOnce(i64) -> CacheResult<i64> + Send,
    {
        let mut outcome = Err(CacheError::CacheMiss);
        self.cache
            .entry_by_ref(key)
            .and_compute_with(|existing| {
                let op = match existing {
                    None => Op::Nop,
                    Some(entry) => {
                        let updated = self
                            .codec
                            .decode::<i64>(&entry.value().data)
                            .map_err(CacheError::from)
                            .and_then(step)
                            .and_then(|value| -> CacheResult<(i64, Bytes)> {
                                Ok((value, self.codec.serialize(&value)?))
                            });
                        match updated {
                            Ok((value, data)) => {
                                outcome = Ok(value);
                                Op::Put(Stored {
                                    data,
                                    ttl: EntryTtl::Keep,
                                })
                            }
                            Err(err) => {
                                outcome = Err(err);
                                Op::Nop
                            }
                        }
                    }
                };
                ready(op)
            })
            .await;
        outcome
    }
}

#[async_trait]
impl Backend for MokaStore {
    async fn set_raw(&self, key: &str, value: Raw, ttl: Expiration) -> CacheResult<()> {
        self.cache.insert(key.to_owned(), self.entry(value, ttl)).await;
        Ok(())
    }

    async fn add_raw(&self, key: &str, value: Raw, ttl: Expiration) -> CacheResult<()> {
        let stored = self.entry(value, ttl);
        let outcome = self
            .cache
            .entry_by_ref(key)
            .and_compute_with(|existing| {
                ready(match existing {
                    Some(_) => Op::Nop,
                    None => Op::Put(stored),
                })
            })
            .await;
        match outcome {
            CompResult::Inserted(_) => Ok(()),
            _ => {
                debug!(key, "Key exists, add not stored");
                Err(CacheError::NotStored)
            }
        }
    }

    async fn replace_raw(
        &self,
        key: &str,
        value: Option<Raw>,
        ttl: Expiration,
    ) -> CacheResult<()> {
        let stored = value.map(|value| self.entry(value, ttl));
        let outcome = self
            .cache
            .entry_by_ref(key)
            .and_compute_with(|existing| {
                ready(match (existing, stored) {
                    (Some(_), Some(stored)) => Op::Put(stored),
                    _ => Op::Nop,
                })
            })
            .await;
        match outcome {
            CompResult::ReplacedWith(_) => Ok(()),
            CompResult::StillNone(_) => Err(CacheError::CacheMiss),
            _ => {
                debug!(key, "Nil value, replace not stored");
                Err(CacheError::NotStored)
            }
        }
    }

    async fn get_raw(&self, key: &str) -> CacheResult<Raw> {
        self.cache
            .get(key)
            .await
            .map(|stored| stored.data)
            .ok_or(CacheError::CacheMiss)
    }

    async fn mget_raw(&self, keys: &[&str]) -> CacheResult<Vec<Raw>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get_raw(key).await?);
        }
        Ok(values)
    }

    async fn msetnx_raw(&self, ttl: Expiration, entries: Vec<(String, Raw)>) -> CacheResult<()> {
        for (key, value) in entries {
            let stored = self.entry(value, ttl);
            self.cache.entry(key).or_insert(stored).await;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.cache
            .remove(key)
            .await
            .map(|_| ())
            .ok_or(CacheError::CacheMiss)
    }

    async fn increment(&self, key: &str, delta: u64) -> CacheResult<i64> {
        self.update_counter(key, |current| counter::incremented(current, delta))
            .await
    }

    async fn decrement(&self, key: &str, delta: u64) -> CacheResult<i64> {
        self.update_counter(key, |current| {
            Ok(current - counter::floored_decrement(current, delta))
        })
        .await
    }

    async fn flush(&self) -> CacheResult<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        Ok(())
    }

    fn codec(&self) -> &Codec {
        &self.codec
    }

    fn name(&self) -> &str {
        &self.name
    }
}
