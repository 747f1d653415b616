//! Per-call time bounds for provider calls.

use std::future::Future;
use std::time::Duration;

use crate::ports::{CompletionRequest, CompletionResponse, LlmError, LlmProvider};

/// Runs `fut`, failing with `on_timeout(secs)` once `seconds` elapse.
///
/// `None`, zero, negative, non-finite and unrepresentably large bounds
/// leave the call unbounded.
pub async fn within<T, E, F>(
    seconds: Option<f64>,
    fut: F,
    on_timeout: impl FnOnce(f64) -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let bound = seconds
        .filter(|s| *s > 0.0)
        .and_then(|s| Duration::try_from_secs_f64(s).ok().map(|d| (s, d)));
    match bound {
        Some((secs, limit)) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(on_timeout(secs)),
        },
        None => fut.await,
    }
}

/// `llm.complete` bounded by `seconds`.
pub async fn complete_within(
    llm: &dyn LlmProvider,
    request: CompletionRequest,
    seconds: Option<f64>,
) -> Result<CompletionResponse, LlmError> {
    within(seconds, llm.complete(request), LlmError::timeout).await
}
