use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::governor::Governor;
use super::options::{ConfigError, MxCacheOptions};
use super::resolver::{LookupMx, resolve_with, system_resolver};
use super::shard::{Reachability, Renewal, Shard, SweepStats};
use super::{MxError, MxStatus};

/// Sharded, TTL-bound cache of "does this domain accept mail" answers.
///
/// Cloning is not supported; share it behind an [`Arc`]. Concurrent checks of
/// one domain collapse into a single DNS query, and the total number of
/// queries in flight is bounded by
/// [`max_concurrent_lookups`](MxCacheOptions::max_concurrent_lookups).
///
/// A background sweeper drops expired entries and enforces the per-shard
/// capacity. It stops when the cache is closed, dropped, or when the parent
/// [`CancellationToken`] given to [`MxCache::new`] is cancelled.
pub struct MxCache {
    inner: Arc<Inner>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    shards: Box<[Shard]>,
    mask: usize,
    epoch: Instant,
    positive_ttl: u64,
    negative_ttl: u64,
    renewal: Renewal,
    dns_timeout: Duration,
    dns_burst_timeout: Duration,
    max_entries_per_shard: usize,
    governor: Governor,
    resolver: Arc<dyn LookupMx>,
    cancel: CancellationToken,
}

impl MxCache {
    /// Builds the cache and starts its sweeper on the current Tokio runtime.
    pub fn new(
        options: MxCacheOptions,
        resolver: Arc<dyn LookupMx>,
        parent: &CancellationToken,
    ) -> Result<Self, ConfigError> {
        options.validate()?;
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        let shard_count = options
            .shard_count()
            .ok_or(ConfigError::ShardExponent(options.shard_exponent))?;
        let lookups = usize::try_from(options.max_concurrent_lookups)
            .map_err(|_| ConfigError::ConcurrencyLimit(options.max_concurrent_lookups))?;

        let inner = Arc::new(Inner {
            shards: (0..shard_count).map(|_| Shard::new()).collect(),
            mask: shard_count - 1,
            epoch: Instant::now(),
            positive_ttl: nanos(options.positive_ttl),
            negative_ttl: nanos(options.negative_ttl),
            renewal: Renewal {
                window: nanos(options.refresh_ahead),
                extension: nanos(options.positive_ttl),
            },
            dns_timeout: options.dns_timeout,
            dns_burst_timeout: options.dns_burst_timeout,
            max_entries_per_shard: usize::try_from(options.max_entries_per_shard)
                .unwrap_or(usize::MAX),
            governor: Governor::new(lookups),
            resolver,
            cancel: parent.child_token(),
        });

        let sweeper = runtime.spawn(sweep_loop(Arc::clone(&inner), options.sweep_interval));
        info!(
            shards = shard_count,
            max_lookups = lookups,
            positive_ttl = ?options.positive_ttl,
            negative_ttl = ?options.negative_ttl,
            "mx cache started"
        );

        Ok(Self {
            inner,
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    /// Same as [`MxCache::new`] with the host's resolver configuration.
    pub fn with_system_resolver(
        options: MxCacheOptions,
        parent: &CancellationToken,
    ) -> Result<Self, ConfigError> {
        let resolver = system_resolver().map_err(|err| ConfigError::Resolver(err.to_string()))?;
        Self::new(options, Arc::new(resolver), parent)
    }

    /// `Ok(())` if `domain` has at least one MX record.
    ///
    /// `domain` is used as the cache key verbatim; pass it lowercased, as
    /// [`Address::domain`](crate::Address::domain) returns it.
    ///
    /// Answers and lookup failures are cached for the positive and negative
    /// TTL respectively. [`MxError::TooManyLookups`] and [`MxError::Cancelled`]
    /// are returned to every caller waiting on the same query but never
    /// cached.
    pub async fn check(&self, domain: &str) -> Result<(), MxError> {
        if domain.is_empty() {
            return Err(MxError::EmptyDomain);
        }
        self.inner.check(domain).await
    }

    /// Stops the sweeper and makes pending and future lookups return
    /// [`MxError::Cancelled`]. Fresh cached answers are still served.
    pub fn close(&self) {
        self.inner.cancel.cancel();
    }

    /// [`close`](Self::close), then waits for the sweeper to exit.
    pub async fn shutdown(&self) {
        self.close();
        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(error = %err, "mx cache sweeper ended abnormally");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Runs one sweep over every shard right away.
    pub fn sweep_now(&self) -> SweepStats {
        self.inner.sweep()
    }

    pub fn shard_count(&self) -> usize {
        self.inner.shards.len()
    }

    /// Entries currently held, expired ones not yet swept included.
    pub fn len(&self) -> usize {
        self.inner.shards.iter().map(Shard::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for MxCache {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

impl Inner {
    fn now(&self) -> u64 {
        nanos(self.epoch.elapsed())
    }

    fn shard_index(&self, domain: &str) -> usize {
        crc32fast::hash(domain.as_bytes()) as usize & self.mask
    }

    fn shard(&self, domain: &str) -> &Shard {
        &self.shards[self.shard_index(domain)]
    }

    async fn check(&self, domain: &str) -> Reachability {
        let shard = self.shard(domain);
        if let Some(hit) = shard.get(domain, self.now(), Some(self.renewal)) {
            trace!(domain, "mx cache hit");
            return hit;
        }
        shard.group.run(domain, || self.refresh(shard, domain)).await
    }

    async fn refresh(&self, shard: &Shard, domain: &str) -> Reachability {
        // a previous call may have stored the answer after our read
        if let Some(hit) = shard.get(domain, self.now(), None) {
            return hit;
        }

        let permit = match self.governor.acquire(self.dns_burst_timeout, &self.cancel).await {
            Ok(permit) => permit,
            Err(err) => {
                if err == MxError::TooManyLookups {
                    warn!(domain, wait = ?self.dns_burst_timeout, "no lookup slot free, shedding");
                }
                return Err(err);
            }
        };
        let status = self.query(domain).await;
        drop(permit);

        let result = status?.reachability();
        let ttl = match &result {
            Ok(()) => self.positive_ttl,
            Err(err) if err.is_cacheable() => self.negative_ttl,
            Err(err) => {
                debug!(domain, error = %err, "mx outcome not cached");
                return result;
            }
        };
        shard.insert(domain, result.clone(), self.now().saturating_add(ttl));
        debug!(domain, reachable = result.is_ok(), "mx answer cached");
        result
    }

    /// Lookup failures and timeouts count as "no records"; only cancellation
    /// is an error here.
    async fn query(&self, domain: &str) -> Result<MxStatus, MxError> {
        let lookup = tokio::time::timeout(
            self.dns_timeout,
            resolve_with(self.resolver.as_ref(), domain),
        );
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(MxError::Cancelled),
            answer = lookup => match answer {
                Ok(Ok(status)) => Ok(status),
                Ok(Err(err)) => {
                    debug!(domain, error = %err, "mx lookup failed");
                    Ok(MxStatus::NoRecords)
                }
                Err(_elapsed) => {
                    debug!(domain, timeout = ?self.dns_timeout, "mx lookup timed out");
                    Ok(MxStatus::NoRecords)
                }
            },
        }
    }

    fn sweep(&self) -> SweepStats {
        let now = self.now();
        let mut total = SweepStats::default();
        for (index, shard) in self.shards.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| {
                shard.sweep(now, self.max_entries_per_shard)
            })) {
                Ok(stats) => total += stats,
                Err(_) => error!(shard = index, "mx cache sweep panicked, skipping shard"),
            }
        }
        if total != SweepStats::default() {
            debug!(expired = total.expired, evicted = total.evicted, "mx cache swept");
        }
        total
    }
}

async fn sweep_loop(inner: Arc<Inner>, every: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            _ = ticker.tick() => {
                inner.sweep();
            }
        }
    }
    info!("mx cache sweeper stopped");
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
impl MxCache {
    pub(crate) fn shard_index(&self, domain: &str) -> usize {
        self.inner.shard_index(domain)
    }

    pub(crate) fn shard_len(&self, index: usize) -> usize {
        self.inner.shards[index].len()
    }

    /// Coalescing records still held across all shards.
    pub(crate) fn pending_calls(&self) -> usize {
        self.inner.shards.iter().map(|shard| shard.group.in_flight()).sum()
    }

    /// Time left before the entry for `domain` expires.
    pub(crate) fn remaining(&self, domain: &str) -> Option<Duration> {
        let expire_at = self.inner.shard(domain).expiry(domain)?;
        let now = self.inner.now();
        (expire_at > now).then(|| Duration::from_nanos(expire_at - now))
    }

    pub(crate) fn set_remaining(&self, domain: &str, left: Duration) {
        let expire_at = self.inner.now().saturating_add(nanos(left));
        self.inner.shard(domain).set_expiry(domain, expire_at);
    }

    pub(crate) fn expire(&self, domain: &str) {
        self.inner.shard(domain).set_expiry(domain, 0);
    }
}
