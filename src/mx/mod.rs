//! MX reachability checks.
//!
//! [`MxCache`] is the entry point for high-volume use: it answers from a
//! sharded TTL cache, coalesces concurrent queries for one domain, and bounds
//! the number of DNS queries in flight. [`check_mx`] does a single uncached
//! lookup and returns the records themselves.

mod cache;
mod coalesce;
mod error;
mod governor;
mod options;
mod resolver;
mod shard;
mod types;

pub use cache::MxCache;
pub use error::MxError;
pub use error::MxError as Error;
pub use options::{ConfigError, MxCacheOptions};
pub use resolver::{LookupMx, check_mx, system_resolver};
pub use shard::SweepStats;
pub use types::{MxRecord, MxStatus};

#[cfg(test)]
mod tests;
