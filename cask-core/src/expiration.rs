//! Time-to-live sentinels for cache writes.

use std::time::Duration;

/// Expiry requested for a write.
///
/// `Default` defers to the store's configured default TTL and `Never`
/// keeps the entry until it is deleted or flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiration {
    /// Use the store's configured default TTL.
    #[default]
    Default,
    /// Never expire.
    Never,
    /// Expire after the given duration.
    After(Duration),
}

impl Expiration {
    /// Shorthand for [`Expiration::After`] in whole seconds.
    pub const fn secs(secs: u64) -> Self {
        Expiration::After(Duration::from_secs(secs))
    }

    /// Resolves the sentinel against the store default.
    ///
    /// `None` means no expiry directive should be sent. A zero duration,
    /// whether explicit or coming from the default, also resolves to `None`.
    pub fn resolve(self, default: Duration) -> Option<Duration> {
        let ttl = match self {
            Expiration::Default => default,
            Expiration::Never => return None,
            Expiration::After(ttl) => ttl,
        };
        (!ttl.is_zero()).then_some(ttl)
    }

    /// Resolves the sentinel and floors it to whole seconds.
    ///
    /// Sub-second durations floor to zero and therefore to `None`.
    pub fn whole_seconds(self, default: Duration) -> Option<u64> {
        self.resolve(default)
            .map(|ttl| ttl.as_secs())
            .filter(|secs| *secs > 0)
    }
}

impl From<Duration> for Expiration {
    fn from(ttl: Duration) -> Self {
        Expiration::After(ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn default_uses_store_default() {
        assert_eq!(Expiration::Default.resolve(HOUR), Some(HOUR));
        assert_eq!(Expiration::Default.whole_seconds(HOUR), Some(3600));
    }

    #[test]
    fn zero_default_means_no_expiry() {
        assert_eq!(Expiration::Default.resolve(Duration::ZERO), None);
    }

    #[test]
    fn never_ignores_default() {
        assert_eq!(Expiration::Never.resolve(HOUR), None);
        assert_eq!(Expiration::Never.whole_seconds(HOUR), None);
    }

    #[test]
    fn explicit_duration_floors_to_seconds() {
        let ttl = Expiration::After(Duration::from_millis(2_900));
        assert_eq!(ttl.whole_seconds(HOUR), Some(2));
        assert_eq!(ttl.resolve(HOUR), Some(Duration::from_millis(2_900)));
    }

    #[test]
    fn sub_second_duration_sends_no_expiry() {
        let ttl = Expiration::After(Duration::from_millis(500));
        assert_eq!(ttl.whole_seconds(HOUR), None);
    }
}
