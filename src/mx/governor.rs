use std::time::Duration;

use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;

use super::MxError;

/// Process-wide bound on DNS queries in flight.
pub(crate) struct Governor {
    permits: Semaphore,
}

impl Governor {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            permits: Semaphore::new(limit),
        }
    }

    /// Waits at most `wait` for a slot. Timing out is backpressure
    /// ([`MxError::TooManyLookups`]); cancellation wins over both outcomes.
    pub(crate) async fn acquire(
        &self,
        wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<SemaphorePermit<'_>, MxError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MxError::Cancelled),
            acquired = tokio::time::timeout(wait, self.permits.acquire()) => match acquired {
                Ok(Ok(permit)) => Ok(permit),
                Ok(Err(_closed)) => Err(MxError::Cancelled),
                Err(_elapsed) => Err(MxError::TooManyLookups),
            },
        }
    }

    #[cfg(test)]
    pub(crate) fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
