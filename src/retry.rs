// bucket_ingestor/src/retry.rs
// Bounded exponential retry for transient store errors.

use std::future::Future;
use std::time::Duration;

use backoff::{ExponentialBackoff, future::retry};
use tracing::warn;

use crate::error::{IngestorError, Result};

/// Upper bound on time spent retrying a single call.
pub const MAX_RETRY_ELAPSED: Duration = Duration::from_secs(30,);

pub fn bounded_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        max_elapsed_time: Some(MAX_RETRY_ELAPSED,),
        ..ExponentialBackoff::default()
    }
}

pub async fn execute_with_retry<F, Fut, T,>(operation: F,) -> Result<T,>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, backoff::Error<IngestorError,>,>,>,
{
    retry(bounded_backoff(), operation,).await
}

pub fn transient_error(err: IngestorError,) -> backoff::Error<IngestorError,> {
    warn!("Transient error encountered, retrying: {}", err);
    backoff::Error::transient(err,)
}

pub fn permanent_error(err: IngestorError,) -> backoff::Error<IngestorError,> {
    backoff::Error::permanent(err,)
}

pub fn wrap_error(err: IngestorError,) -> backoff::Error<IngestorError,> {
    if err.is_transient() {
        transient_error(err,)
    } else {
        permanent_error(err,)
    }
}
