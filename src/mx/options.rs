use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;

/// Tuning for [`MxCache`](super::MxCache). Read once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MxCacheOptions {
    /// Lifetime of a "has MX" answer.
    pub positive_ttl: Duration,
    /// Lifetime of a "no MX" answer.
    pub negative_ttl: Duration,
    /// A positive entry read this close to expiry gets another `positive_ttl`.
    pub refresh_ahead: Duration,
    pub dns_timeout: Duration,
    /// Longest wait for a lookup slot. Must exceed `dns_timeout`.
    pub dns_burst_timeout: Duration,
    pub sweep_interval: Duration,
    /// Shard count is `2^(shard_exponent + 1)`; valid range `1..=31`.
    pub shard_exponent: u8,
    pub max_entries_per_shard: u32,
    pub max_concurrent_lookups: u32,
}

impl Default for MxCacheOptions {
    fn default() -> Self {
        Self {
            positive_ttl: Duration::from_secs(6 * 60 * 60),
            negative_ttl: Duration::from_secs(15 * 60),
            refresh_ahead: Duration::from_secs(10 * 60),
            dns_timeout: Duration::from_millis(400),
            dns_burst_timeout: Duration::from_secs(2),
            sweep_interval: Duration::from_secs(90),
            shard_exponent: 4,
            max_entries_per_shard: 10_000,
            max_concurrent_lookups: 250,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("shard exponent {0} outside 1..=31")]
    ShardExponent(u8),
    #[error("burst timeout {burst:?} must be longer than DNS timeout {dns:?}")]
    BurstNotAboveDnsTimeout { dns: Duration, burst: Duration },
    #[error("concurrent lookup limit {0} is out of range")]
    ConcurrencyLimit(u32),
    #[error("sweep interval must be non-zero")]
    ZeroSweepInterval,
    #[error("MX cache must be created inside a Tokio runtime")]
    NoRuntime,
    #[error("system resolver configuration: {0}")]
    Resolver(String),
}

impl MxCacheOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=31).contains(&self.shard_exponent) {
            return Err(ConfigError::ShardExponent(self.shard_exponent));
        }
        if self.shard_count().is_none() {
            return Err(ConfigError::ShardExponent(self.shard_exponent));
        }
        if self.dns_burst_timeout <= self.dns_timeout {
            return Err(ConfigError::BurstNotAboveDnsTimeout {
                dns: self.dns_timeout,
                burst: self.dns_burst_timeout,
            });
        }
        let limit = self.max_concurrent_lookups;
        let fits = isize::try_from(limit).is_ok()
            && usize::try_from(limit).is_ok_and(|l| l <= Semaphore::MAX_PERMITS);
        if limit == 0 || !fits {
            return Err(ConfigError::ConcurrencyLimit(limit));
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::ZeroSweepInterval);
        }
        Ok(())
    }

    /// `None` when the count does not fit the platform's `usize`.
    pub fn shard_count(&self) -> Option<usize> {
        1usize.checked_shl(u32::from(self.shard_exponent) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let options = MxCacheOptions::default();
        options.validate().expect("defaults validate");
        assert_eq!(options.shard_count(), Some(32));
    }

    #[test]
    fn shard_exponent_bounds() {
        for exponent in [0, 32, 200] {
            let options = MxCacheOptions {
                shard_exponent: exponent,
                ..MxCacheOptions::default()
            };
            assert_eq!(options.validate(), Err(ConfigError::ShardExponent(exponent)));
        }
        let options = MxCacheOptions {
            shard_exponent: 1,
            ..MxCacheOptions::default()
        };
        assert_eq!(options.shard_count(), Some(4));
    }

    #[test]
    fn burst_must_exceed_dns_timeout() {
        let options = MxCacheOptions {
            dns_timeout: Duration::from_secs(2),
            dns_burst_timeout: Duration::from_secs(2),
            ..MxCacheOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ConfigError::BurstNotAboveDnsTimeout { .. })
        ));
    }

    #[test]
    fn zero_concurrency_rejected() {
        let options = MxCacheOptions {
            max_concurrent_lookups: 0,
            ..MxCacheOptions::default()
        };
        assert_eq!(options.validate(), Err(ConfigError::ConcurrencyLimit(0)));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn full_u32_concurrency_fits_on_64_bit() {
        let options = MxCacheOptions {
            max_concurrent_lookups: u32::MAX,
            ..MxCacheOptions::default()
        };
        options.validate().expect("u32::MAX fits a 64-bit semaphore");
    }

    #[test]
    fn zero_sweep_interval_rejected() {
        let options = MxCacheOptions {
            sweep_interval: Duration::ZERO,
            ..MxCacheOptions::default()
        };
        assert_eq!(options.validate(), Err(ConfigError::ZeroSweepInterval));
    }
}
