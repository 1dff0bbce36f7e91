use thiserror::Error;

/// Outcome of a reachability check that is not "has MX".
///
/// `Clone` because one outcome is shared by every coalesced caller and kept
/// in the cache entry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MxError {
    #[error("domain is empty")]
    EmptyDomain,
    #[error("no MX records found")]
    NoMxRecords,
    #[error("too many lookups in flight")]
    TooManyLookups,
    #[error("MX check cancelled")]
    Cancelled,
    #[error("resolver initialization failed: {0}")]
    ResolverInit(String),
    #[error("MX lookup failed: {0}")]
    Lookup(String),
}

impl MxError {
    pub(crate) fn resolver_init(err: impl std::fmt::Display) -> Self {
        Self::ResolverInit(err.to_string())
    }

    pub(crate) fn lookup(err: impl std::fmt::Display) -> Self {
        Self::Lookup(err.to_string())
    }

    /// Durable answers about the domain, as opposed to transient conditions
    /// of this process (backpressure, cancellation).
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Self::NoMxRecords)
    }
}
