use std::sync::Arc;

use anyhow::{Context, Result};
use puremail::{Address, MxCache, MxCacheOptions, MxError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[cfg_attr(feature = "with-serde", derive(serde::Serialize))]
#[derive(Debug, Clone)]
pub struct MxSummary {
    pub reachable: bool,
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Option::is_none"))]
    pub error: Option<String>,
}

impl MxSummary {
    pub fn from_result(result: &Result<(), MxError>) -> Self {
        match result {
            Ok(()) => Self {
                reachable: true,
                error: None,
            },
            Err(err) => Self {
                reachable: false,
                error: Some(err.to_string()),
            },
        }
    }

    pub fn human_summary(&self) -> String {
        match &self.error {
            None => "MX ok".to_string(),
            Some(error) => format!("MX: {error}"),
        }
    }
}

/// Checks every parsed address through one shared cache; the result vector
/// is aligned with `addresses`.
pub fn check_all(
    addresses: Vec<Option<Address>>,
    options: MxCacheOptions,
) -> Result<Vec<Option<MxSummary>>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start tokio runtime")?;

    runtime.block_on(async move {
        let cancel = CancellationToken::new();
        let cache = Arc::new(
            MxCache::with_system_resolver(options, &cancel).context("create MX cache")?,
        );

        let mut summaries = vec![None; addresses.len()];
        let mut tasks = JoinSet::new();
        for (index, address) in addresses.into_iter().enumerate() {
            let Some(address) = address else { continue };
            let cache = Arc::clone(&cache);
            tasks.spawn(async move {
                let result = address.has_mx(&cache).await;
                (index, MxSummary::from_result(&result))
            });
        }
        while let Some(joined) = tasks.join_next().await {
            let (index, summary) = joined.context("MX task failed")?;
            summaries[index] = Some(summary);
        }

        info!(domains = cache.len(), "MX checks finished");
        cache.shutdown().await;
        Ok(summaries)
    })
}
