use crate::EmailError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Bounds on concurrent remote detail fetches.
#[derive(Debug, Clone)]
pub struct BatchLimits {
    pub concurrency: usize,
    pub chunk_size: usize,
    pub chunk_pause: Duration,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            concurrency: 10,
            chunk_size: 100,
            chunk_pause: Duration::from_millis(100),
        }
    }
}

/// Runs `fetch` once per id, at most `limits.concurrency` at a time, spawning
/// in chunks with a pause between them. Every task is awaited; if any failed
/// the first error is returned and the partial results are dropped.
pub async fn fan_out<T, F, Fut>(
    ids: &[String],
    limits: &BatchLimits,
    fetch: F,
) -> Result<Vec<T>, EmailError>
where
    T: Send + 'static,
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T, EmailError>> + Send + 'static,
{
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let semaphore = Arc::new(Semaphore::new(limits.concurrency.max(1)));
    let mut join_set = JoinSet::new();
    let chunks = ids.chunks(limits.chunk_size.max(1)).collect::<Vec<_>>();
    let chunk_count = chunks.len();

    for (index, chunk) in chunks.into_iter().enumerate() {
        for id in chunk {
            let semaphore = semaphore.clone();
            let task = fetch(id.clone());
            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|err| EmailError::Data(format!("fetch limiter closed: {err}")))?;
                task.await
            });
        }

        if index + 1 < chunk_count && !limits.chunk_pause.is_zero() {
            tokio::time::sleep(limits.chunk_pause).await;
        }
    }

    let mut results = Vec::with_capacity(ids.len());
    let mut first_error = None;
    while let Some(joined) = join_set.join_next().await {
        let outcome = joined
            .map_err(|err| EmailError::Data(format!("detail fetch task failed: {err}")))
            .and_then(|result| result);
        match outcome {
            Ok(value) => results.push(value),
            Err(err) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }

    if let Some(err) = first_error {
        tracing::warn!(total = ids.len(), error = %err, "batch detail fetch failed");
        return Err(err);
    }

    Ok(results)
}
