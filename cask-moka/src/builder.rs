//! Builder for configuring [`MokaStore`].

use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cask_core::Codec;
use moka::Expiry;
use moka::future::{Cache, CacheBuilder};
use moka::policy::EvictionPolicy;

use crate::store::{EntryTtl, MokaStore, Stored};

/// Expiration policy reading the TTL each stored entry carries.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct EntryExpiry;

impl Expiry<String, Stored> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Stored,
        _created_at: Instant,
    ) -> Option<Duration> {
        match value.ttl {
            EntryTtl::Reset(ttl) => ttl,
            EntryTtl::Keep => None,
        }
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Stored,
        _updated_at: Instant,
        duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        // a plain write replaces the old expiry, even with "none"
        match value.ttl {
            EntryTtl::Reset(ttl) => ttl,
            EntryTtl::Keep => duration_until_expiry,
        }
    }
}

/// Builder for creating and configuring a [`MokaStore`].
///
/// Use [`MokaStore::builder`] to create a new builder instance.
///
/// ```
/// use std::time::Duration;
/// use cask_moka::MokaStore;
///
/// let store = MokaStore::builder(10_000)
///     .default_ttl(Duration::from_secs(300))
///     .name("sessions")
///     .build();
/// ```
pub struct MokaStoreBuilder {
    max_capacity: u64,
    default_ttl: Duration,
    codec: Arc<Codec>,
    name: Cow<'static, str>,
    eviction_policy: Option<EvictionPolicy>,
}

impl MokaStoreBuilder {
    /// Creates a new builder holding at most `max_capacity` entries.
    pub fn new(max_capacity: u64) -> Self {
        Self {
            max_capacity,
            default_ttl: Duration::ZERO,
            codec: Arc::new(Codec::default()),
            name: Cow::Borrowed("moka"),
            eviction_policy: None,
        }
    }

    /// TTL used for [`Expiration::Default`](cask_core::Expiration::Default)
    /// writes. Zero disables the default expiry.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Codec holding the registered value types.
    pub fn codec(mut self, codec: Arc<Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Name reported by [`Backend::name`](cask_core::Backend::name).
    ///
    /// # Default
    ///
    /// `"moka"`
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the eviction policy used once the cache is full.
    ///
    /// # Default
    ///
    /// [`EvictionPolicy::tiny_lfu()`]
    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = Some(policy);
        self
    }

    /// Builds the [`MokaStore`].
    pub fn build(self) -> MokaStore {
        let policy = self
            .eviction_policy
            .unwrap_or_else(EvictionPolicy::tiny_lfu);
        let cache: Cache<String, Stored> = CacheBuilder::new(self.max_capacity)
            .name(&self.name)
            .eviction_policy(policy)
            .expire_after(EntryExpiry)
            .build();

        MokaStore {
            cache,
            default_ttl: self.default_ttl,
            codec: self.codec,
            name: self.name,
        }
    }
}
