use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use trust_dns_resolver::error::ResolveError;

use super::{ConfigError, LookupMx, MxCache, MxCacheOptions, MxError, MxRecord, MxStatus, resolver};
use crate::Address;

type LookupResult = Result<Vec<MxRecord>, ResolveError>;
type LookupFn = dyn Fn(&str) -> LookupResult + Send + Sync;

pub(crate) struct StubResolver {
    on_lookup: Box<LookupFn>,
    delay: Duration,
    hang: bool,
    calls: AtomicUsize,
}

impl StubResolver {
    fn new<F>(f: F) -> Self
    where
        F: Fn(&str) -> LookupResult + Send + Sync + 'static,
    {
        Self {
            on_lookup: Box::new(f),
            delay: Duration::ZERO,
            hang: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every domain has records, except those starting with `nomx`.
    fn mail_hosts() -> Self {
        Self::new(|domain| {
            if domain.starts_with("nomx") {
                Ok(Vec::new())
            } else {
                Ok(vec![MxRecord::new(10, format!("mx.{domain}"))])
            }
        })
    }

    fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::mail_hosts()
        }
    }

    fn delayed(self, delay: Duration) -> Self {
        Self { delay, ..self }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LookupMx for StubResolver {
    async fn lookup_mx(&self, domain: &str) -> LookupResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.on_lookup)(domain)
    }
}

fn test_options() -> MxCacheOptions {
    MxCacheOptions {
        shard_exponent: 1,
        sweep_interval: Duration::from_secs(24 * 60 * 60),
        ..MxCacheOptions::default()
    }
}

fn cache_with(options: MxCacheOptions, stub: &Arc<StubResolver>) -> MxCache {
    MxCache::new(options, stub.clone(), &CancellationToken::new()).expect("valid cache options")
}

// ---------- resolver ----------

#[test]
fn normalize_domain_rejects_empty() {
    for raw in ["", "   ", "."] {
        let err = resolver::normalize_domain(raw).expect_err("empty domain should fail");
        assert_eq!(err, MxError::EmptyDomain);
    }
    assert_eq!(
        resolver::normalize_domain(" Example.COM. ").expect("valid"),
        "example.com"
    );
}

#[test]
fn normalize_exchange_trims_dot_and_lowercases() {
    assert_eq!(resolver::normalize_exchange("Mail.EXAMPLE.com."), "mail.example.com");
}

#[tokio::test]
async fn resolve_with_sorts_and_dedups_records() {
    let stub = StubResolver::new(|domain| {
        assert_eq!(domain, "example.com");
        Ok(vec![
            MxRecord::new(20, "mx2.example.com"),
            MxRecord::new(10, "mx1.example.com"),
            MxRecord::new(10, "mx1.example.com"),
            MxRecord::new(30, "mx3.example.com"),
        ])
    });

    let status = resolver::resolve_with(&stub, "example.com")
        .await
        .expect("lookup succeeds");
    let records = status.records();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0], MxRecord::new(10, "mx1.example.com"));
    assert_eq!(records[2].preference, 30);
    assert_eq!(status.reachability(), Ok(()));
}

#[tokio::test]
async fn resolve_with_handles_no_records() {
    let stub = StubResolver::new(|_| Ok(Vec::new()));
    let status = resolver::resolve_with(&stub, "example.com")
        .await
        .expect("lookup succeeds");
    assert_eq!(status, MxStatus::NoRecords);
    assert_eq!(status.reachability(), Err(MxError::NoMxRecords));
}

#[tokio::test]
async fn resolve_with_maps_failures() {
    let stub = StubResolver::new(|_| Err(ResolveError::from("servfail")));
    let err = resolver::resolve_with(&stub, "example.com")
        .await
        .expect_err("lookup fails");
    assert!(matches!(err, MxError::Lookup(ref msg) if msg.contains("servfail")));
}

// ---------- construction ----------

#[test]
fn construction_needs_a_runtime() {
    let stub: Arc<dyn LookupMx> = Arc::new(StubResolver::mail_hosts());
    let err = MxCache::new(test_options(), stub, &CancellationToken::new())
        .err()
        .expect("no runtime here");
    assert_eq!(err, ConfigError::NoRuntime);
}

#[tokio::test]
async fn construction_validates_options() {
    let stub = Arc::new(StubResolver::mail_hosts());
    let options = MxCacheOptions {
        max_concurrent_lookups: 0,
        ..test_options()
    };
    let err = MxCache::new(options, stub, &CancellationToken::new())
        .err()
        .expect("zero lookups rejected");
    assert_eq!(err, ConfigError::ConcurrencyLimit(0));
}

#[tokio::test]
async fn shard_count_follows_exponent() {
    let stub = Arc::new(StubResolver::mail_hosts());
    let cache = cache_with(test_options(), &stub);
    assert_eq!(cache.shard_count(), 4);
    assert!(cache.is_empty());
    for domain in ["a.test", "b.test", "example.com", "gmail.com"] {
        assert!(cache.shard_index(domain) < 4);
        assert_eq!(cache.shard_index(domain), cache.shard_index(domain));
    }
}

// ---------- lookups ----------

#[tokio::test]
async fn empty_domain_is_rejected_without_lookup() {
    let stub = Arc::new(StubResolver::mail_hosts());
    let cache = cache_with(test_options(), &stub);
    assert_eq!(cache.check("").await, Err(MxError::EmptyDomain));
    assert_eq!(stub.calls(), 0);
}

#[tokio::test]
async fn hit_skips_dns() {
    let stub = Arc::new(StubResolver::mail_hosts());
    let cache = cache_with(test_options(), &stub);

    assert_eq!(cache.check("example.com").await, Ok(()));
    assert_eq!(cache.check("example.com").await, Ok(()));
    assert_eq!(stub.calls(), 1);
    assert_eq!(cache.len(), 1);

    let remaining = cache.remaining("example.com").expect("entry cached");
    assert!(remaining <= MxCacheOptions::default().positive_ttl);
    assert!(remaining > Duration::from_secs(5 * 60 * 60));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checks_share_one_lookup() {
    let stub = Arc::new(StubResolver::mail_hosts().delayed(Duration::from_millis(100)));
    let cache = Arc::new(cache_with(test_options(), &stub));
    let mut tasks = JoinSet::new();

    for _ in 0..64 {
        let cache = Arc::clone(&cache);
        tasks.spawn(async move { cache.check("busy.example").await });
    }
    while let Some(joined) = tasks.join_next().await {
        assert_eq!(joined.expect("task ran"), Ok(()));
    }
    assert_eq!(stub.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_domains_resolve_independently() {
    let stub = Arc::new(StubResolver::mail_hosts().delayed(Duration::from_millis(20)));
    let cache = Arc::new(cache_with(test_options(), &stub));
    let mut tasks = JoinSet::new();

    for i in 0..20 {
        let cache = Arc::clone(&cache);
        tasks.spawn(async move { cache.check(&format!("d{i}.example")).await });
    }
    while let Some(joined) = tasks.join_next().await {
        assert_eq!(joined.expect("task ran"), Ok(()));
    }
    assert_eq!(stub.calls(), 20);
    assert_eq!(cache.len(), 20);
}

#[tokio::test]
async fn expired_entry_is_looked_up_again() {
    let stub = Arc::new(StubResolver::mail_hosts());
    let cache = cache_with(test_options(), &stub);

    cache.check("example.com").await.expect("has mx");
    cache.expire("example.com");
    assert_eq!(cache.remaining("example.com"), None);

    cache.check("example.com").await.expect("has mx");
    assert_eq!(stub.calls(), 2);
    assert!(cache.remaining("example.com").is_some());
}

#[tokio::test]
async fn no_records_cached_with_negative_ttl() {
    let stub = Arc::new(StubResolver::mail_hosts());
    let cache = cache_with(test_options(), &stub);

    assert_eq!(cache.check("nomx.example").await, Err(MxError::NoMxRecords));
    assert_eq!(cache.check("nomx.example").await, Err(MxError::NoMxRecords));
    assert_eq!(stub.calls(), 1);

    let remaining = cache.remaining("nomx.example").expect("negative entry cached");
    assert!(remaining <= MxCacheOptions::default().negative_ttl);
    assert!(remaining > Duration::from_secs(14 * 60));
}

#[tokio::test]
async fn lookup_failure_is_cached_negative() {
    let stub = Arc::new(StubResolver::new(|_| Err(ResolveError::from("refused"))));
    let cache = cache_with(test_options(), &stub);

    assert_eq!(cache.check("broken.example").await, Err(MxError::NoMxRecords));
    assert_eq!(cache.check("broken.example").await, Err(MxError::NoMxRecords));
    assert_eq!(stub.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_dns_times_out_as_no_records() {
    let stub = Arc::new(StubResolver::hanging());
    let options = MxCacheOptions {
        dns_timeout: Duration::from_millis(100),
        dns_burst_timeout: Duration::from_secs(1),
        ..test_options()
    };
    let cache = cache_with(options, &stub);

    assert_eq!(cache.check("slow.example").await, Err(MxError::NoMxRecords));
    assert!(cache.remaining("slow.example").is_some());
    assert_eq!(cache.check("slow.example").await, Err(MxError::NoMxRecords));
    assert_eq!(stub.calls(), 1);
}

// ---------- renewal ----------

#[tokio::test(start_paused = true)]
async fn positive_entry_renewed_near_expiry() {
    let stub = Arc::new(StubResolver::mail_hosts());
    let cache = cache_with(test_options(), &stub);
    let positive_ttl = MxCacheOptions::default().positive_ttl;

    cache.check("example.com").await.expect("has mx");
    cache.set_remaining("example.com", Duration::from_secs(60));
    cache.check("example.com").await.expect("still has mx");

    assert_eq!(
        cache.remaining("example.com"),
        Some(positive_ttl + Duration::from_secs(60))
    );
    assert_eq!(stub.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn entry_outside_window_is_not_renewed() {
    let stub = Arc::new(StubResolver::mail_hosts());
    let cache = cache_with(test_options(), &stub);

    cache.check("example.com").await.expect("has mx");
    cache.set_remaining("example.com", Duration::from_secs(30 * 60));
    cache.check("example.com").await.expect("still has mx");

    assert_eq!(
        cache.remaining("example.com"),
        Some(Duration::from_secs(30 * 60))
    );
}

#[tokio::test(start_paused = true)]
async fn negative_entry_is_never_renewed() {
    let stub = Arc::new(StubResolver::mail_hosts());
    let cache = cache_with(test_options(), &stub);

    let _ = cache.check("nomx.example").await;
    cache.set_remaining("nomx.example", Duration::from_secs(60));
    assert_eq!(cache.check("nomx.example").await, Err(MxError::NoMxRecords));

    assert_eq!(cache.remaining("nomx.example"), Some(Duration::from_secs(60)));
    assert_eq!(stub.calls(), 1);
}

// ---------- backpressure and cancellation ----------

#[tokio::test(start_paused = true)]
async fn saturated_lookups_shed_without_caching() {
    let stub = Arc::new(StubResolver::hanging());
    let options = MxCacheOptions {
        max_concurrent_lookups: 1,
        dns_timeout: Duration::from_secs(1),
        dns_burst_timeout: Duration::from_millis(1_500),
        ..test_options()
    };
    let cache = Arc::new(cache_with(options, &stub));
    let mut tasks = JoinSet::new();

    for domain in ["a.example", "b.example", "c.example"] {
        let cache = Arc::clone(&cache);
        tasks.spawn(async move { (domain, cache.check(domain).await) });
    }

    let mut shed = Vec::new();
    let mut answered = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.expect("task ran") {
            (domain, Err(MxError::TooManyLookups)) => shed.push(domain),
            (_, Err(MxError::NoMxRecords)) => answered += 1,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    // one slot: the first query holds it for a full DNS timeout, the second
    // takes it at 1s, the third gives up at 1.5s
    assert_eq!(shed.len(), 1);
    assert_eq!(answered, 2);
    assert_eq!(stub.calls(), 2);
    assert_eq!(cache.remaining(shed[0]), None);
    assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn closed_cache_cancels_lookups_but_serves_hits() {
    let stub = Arc::new(StubResolver::mail_hosts());
    let cache = cache_with(test_options(), &stub);

    cache.check("example.com").await.expect("has mx");
    cache.close();
    assert!(cache.is_closed());

    assert_eq!(cache.check("other.example").await, Err(MxError::Cancelled));
    assert_eq!(cache.remaining("other.example"), None);
    assert_eq!(cache.check("example.com").await, Ok(()));
    assert_eq!(stub.calls(), 1);
}

#[tokio::test]
async fn cancellation_reaches_in_flight_lookup() {
    let stub = Arc::new(StubResolver::hanging());
    let options = MxCacheOptions {
        dns_timeout: Duration::from_secs(30),
        dns_burst_timeout: Duration::from_secs(60),
        ..test_options()
    };
    let parent = CancellationToken::new();
    let cache = Arc::new(
        MxCache::new(options, stub.clone(), &parent).expect("valid cache options"),
    );

    let pending = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.check("hang.example").await })
    };
    while stub.calls() == 0 {
        tokio::task::yield_now().await;
    }
    parent.cancel();

    let outcome = pending.await.expect("task ran");
    assert_eq!(outcome, Err(MxError::Cancelled));
    assert!(cache.is_closed());
    assert_eq!(cache.remaining("hang.example"), None);
}

#[tokio::test(start_paused = true)]
async fn abandoned_checks_leave_no_coalescing_state() {
    let stub = Arc::new(StubResolver::hanging());
    let cache = cache_with(test_options(), &stub);

    for i in 0..200 {
        let domain = format!("d{i}.example");
        let check = cache.check(&domain);
        let outcome = tokio::time::timeout(Duration::from_millis(1), check).await;
        assert!(outcome.is_err(), "resolver never answers");
    }
    assert_eq!(stub.calls(), 200);
    assert_eq!(cache.len(), 0);
    assert_eq!(cache.pending_calls(), 0);

    cache.sweep_now();
    assert_eq!(cache.pending_calls(), 0);
}

#[tokio::test]
async fn shutdown_stops_sweeper() {
    let stub = Arc::new(StubResolver::mail_hosts());
    let cache = cache_with(test_options(), &stub);
    cache.shutdown().await;
    assert!(cache.is_closed());
    // second call finds no handle and returns at once
    cache.shutdown().await;
}

// ---------- sweeping ----------

#[tokio::test]
async fn sweep_drops_expired_entries() {
    let stub = Arc::new(StubResolver::mail_hosts());
    let cache = cache_with(test_options(), &stub);

    cache.check("old.example").await.expect("has mx");
    cache.check("new.example").await.expect("has mx");
    cache.expire("old.example");

    let stats = cache.sweep_now();
    assert_eq!(stats.expired, 1);
    assert_eq!(stats.evicted, 0);
    assert_eq!(cache.len(), 1);
    assert!(cache.remaining("new.example").is_some());
}

#[tokio::test]
async fn sweep_enforces_shard_capacity() {
    let stub = Arc::new(StubResolver::mail_hosts());
    let options = MxCacheOptions {
        max_entries_per_shard: 3,
        ..test_options()
    };
    let cache = cache_with(options, &stub);

    for i in 0..40 {
        cache.check(&format!("d{i}.example")).await.expect("has mx");
    }
    assert_eq!(cache.len(), 40);

    let stats = cache.sweep_now();
    assert_eq!(stats.expired, 0);
    for shard in 0..cache.shard_count() {
        assert!(cache.shard_len(shard) <= 3, "shard {shard} over capacity");
    }
    assert_eq!(stats.evicted, 40 - cache.len());
}

#[tokio::test(start_paused = true)]
async fn background_sweeper_runs_on_interval() {
    let stub = Arc::new(StubResolver::mail_hosts());
    let options = MxCacheOptions {
        negative_ttl: Duration::from_secs(30),
        sweep_interval: Duration::from_secs(60),
        ..test_options()
    };
    let cache = cache_with(options, &stub);

    let _ = cache.check("nomx.example").await;
    assert_eq!(cache.len(), 1);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(cache.len(), 0);
}

// ---------- address integration ----------

#[tokio::test]
async fn address_has_mx_uses_its_domain() {
    let stub = Arc::new(StubResolver::new(|domain| {
        assert_eq!(domain, "example.com");
        Ok(vec![MxRecord::new(5, "mx.example.com")])
    }));
    let cache = cache_with(test_options(), &stub);

    let address = Address::new("John.Doe+news@Example.COM").expect("valid address");
    assert_eq!(address.has_mx(&cache).await, Ok(()));
    assert_eq!(stub.calls(), 1);
}
