use async_trait::async_trait;
use trust_dns_resolver::{
    TokioAsyncResolver,
    error::{ResolveError, ResolveErrorKind},
};

use super::{MxError, MxRecord, MxStatus};

/// Uncached MX lookup for `domain` using the system resolver.
///
/// The returned [`MxStatus`] contains the sorted list of records (ascending
/// preference). High-volume callers should go through
/// [`MxCache`](super::MxCache) instead.
pub async fn check_mx(domain: &str) -> Result<MxStatus, MxError> {
    let ascii = normalize_domain(domain)?;
    let resolver = system_resolver()?;
    resolve_with(&resolver, &ascii).await
}

/// Resolver built from the host's resolver configuration.
pub fn system_resolver() -> Result<TokioAsyncResolver, MxError> {
    TokioAsyncResolver::tokio_from_system_conf().map_err(MxError::resolver_init)
}

pub(crate) async fn resolve_with<R>(resolver: &R, ascii_domain: &str) -> Result<MxStatus, MxError>
where
    R: LookupMx + ?Sized,
{
    let records = resolver
        .lookup_mx(ascii_domain)
        .await
        .map_err(MxError::lookup)?;
    Ok(MxStatus::from_records(records))
}

pub(crate) fn normalize_domain(domain: &str) -> Result<String, MxError> {
    let trimmed = domain.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(MxError::EmptyDomain);
    }
    Ok(trimmed.to_ascii_lowercase())
}

pub(crate) fn normalize_exchange(exchange: &str) -> String {
    exchange.trim_end_matches('.').to_ascii_lowercase()
}

/// The DNS seam of the crate. Implemented for trust-dns' Tokio resolver;
/// tests substitute their own.
///
/// "No records" answers should come back as `Ok(vec![])`, not as an error.
#[async_trait]
pub trait LookupMx: Send + Sync {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, ResolveError>;
}

#[async_trait]
impl LookupMx for TokioAsyncResolver {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, ResolveError> {
        let lookup = match TokioAsyncResolver::mx_lookup(self, domain).await {
            Ok(lookup) => lookup,
            Err(err) if matches!(err.kind(), ResolveErrorKind::NoRecordsFound { .. }) => {
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };
        Ok(lookup
            .iter()
            .map(|mx| MxRecord::new(mx.preference(), normalize_exchange(&mx.exchange().to_utf8())))
            .collect())
    }
}
