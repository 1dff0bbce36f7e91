use std::ops::AddAssign;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::RwLock;
use rand::Rng;

use super::MxError;
use super::coalesce::Group;

/// `Ok(())` when the domain has MX records.
pub(crate) type Reachability = Result<(), MxError>;

/// Entries examined per capacity-eviction round.
const EVICTION_SAMPLE: usize = 16;

struct CacheEntry {
    result: Reachability,
    /// Nanoseconds since the cache epoch. Atomic so renewal works under the
    /// read lock.
    expire_at: AtomicU64,
}

impl CacheEntry {
    fn expire_at(&self) -> u64 {
        self.expire_at.load(Ordering::Acquire)
    }
}

/// Sliding-window renewal of positive answers, in nanoseconds.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Renewal {
    pub window: u64,
    pub extension: u64,
}

/// What one sweep removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub expired: usize,
    pub evicted: usize,
}

impl AddAssign for SweepStats {
    fn add_assign(&mut self, other: Self) {
        self.expired += other.expired;
        self.evicted += other.evicted;
    }
}

/// One lock-partitioned slice of the domain space.
pub(crate) struct Shard {
    /// Indexed so eviction can sample by position.
    entries: RwLock<IndexMap<String, CacheEntry>>,
    pub(crate) group: Group<Reachability>,
}

impl Shard {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
            group: Group::new(),
        }
    }

    /// The cached answer if still fresh at `now`.
    ///
    /// With `renewal`, a positive answer closer than `window` to expiry is
    /// pushed back by `extension` without asking DNS again. Negative answers
    /// are never renewed.
    pub(crate) fn get(&self, domain: &str, now: u64, renewal: Option<Renewal>) -> Option<Reachability> {
        let entries = self.entries.read();
        let entry = entries.get(domain)?;
        let expire_at = entry.expire_at();
        if now >= expire_at {
            return None;
        }
        if let Some(renewal) = renewal {
            if entry.result.is_ok() && expire_at - now < renewal.window {
                // a failed exchange means a concurrent reader already renewed
                let _ = entry.expire_at.compare_exchange(
                    expire_at,
                    expire_at.saturating_add(renewal.extension),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
            }
        }
        Some(entry.result.clone())
    }

    pub(crate) fn insert(&self, domain: &str, result: Reachability, expire_at: u64) {
        let mut entries = self.entries.write();
        match entries.get_mut(domain) {
            Some(entry) => {
                entry.result = result;
                *entry.expire_at.get_mut() = expire_at;
            }
            None => {
                entries.insert(
                    domain.to_owned(),
                    CacheEntry {
                        result,
                        expire_at: AtomicU64::new(expire_at),
                    },
                );
            }
        }
    }

    /// Drops expired entries, then evicts until at most `max_entries` remain.
    ///
    /// Eviction is approximate: each round looks at a window of
    /// [`EVICTION_SAMPLE`] consecutive positions from a random offset and
    /// removes the entry expiring soonest, so a round costs the same whatever
    /// the shard size.
    pub(crate) fn sweep(&self, now: u64, max_entries: usize) -> SweepStats {
        let mut stats = SweepStats::default();
        let mut entries = self.entries.write();

        entries.retain(|domain, entry| {
            let live = now < entry.expire_at();
            if !live {
                self.group.forget(domain);
                stats.expired += 1;
            }
            live
        });

        if entries.len() <= max_entries {
            return stats;
        }

        let mut rng = rand::thread_rng();
        while entries.len() > max_entries {
            let len = entries.len();
            let start = rng.gen_range(0..=len.saturating_sub(EVICTION_SAMPLE));
            let end = (start + EVICTION_SAMPLE).min(len);
            let victim = (start..end)
                .filter_map(|index| {
                    let (_, entry) = entries.get_index(index)?;
                    Some((index, entry.expire_at()))
                })
                .min_by_key(|&(_, expire_at)| expire_at)
                .map(|(index, _)| index);
            let Some((domain, _)) = victim.and_then(|index| entries.swap_remove_index(index))
            else {
                break;
            };
            self.group.forget(&domain);
            stats.evicted += 1;
        }
        stats
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub(crate) fn expiry(&self, domain: &str) -> Option<u64> {
        self.entries.read().get(domain).map(CacheEntry::expire_at)
    }

    #[cfg(test)]
    pub(crate) fn set_expiry(&self, domain: &str, expire_at: u64) {
        if let Some(entry) = self.entries.read().get(domain) {
            entry.expire_at.store(expire_at, Ordering::Release);
        }
    }
}
