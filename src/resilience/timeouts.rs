//! Deadline enforcement.
//!
//! Every attempt runs under the call's overall deadline; when it passes, the
//! in-flight future is dropped (cancelling the network call) and the attempt
//! becomes [`RpcError::DeadlineExceeded`].

use std::future::Future;

use tokio::time::Instant;

use crate::error::RpcError;

/// Run `call` until `deadline`, converting expiry into `DeadlineExceeded`.
pub async fn with_deadline<T, F>(deadline: Option<Instant>, call: F) -> Result<T, RpcError>
where
    F: Future<Output = Result<T, RpcError>>,
{
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, call)
            .await
            .unwrap_or(Err(RpcError::DeadlineExceeded)),
        None => call.await,
    }
}
