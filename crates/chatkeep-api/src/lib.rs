pub mod accounts;
pub mod aggregate;
pub mod auth;
pub mod conversations;
pub mod error;
pub mod extract;
pub mod guard;
pub mod middleware;
pub mod password;
pub mod routes;
pub mod token;
pub mod users;

use tracing::error;

use crate::error::ApiError;

/// Run store or hashing work off the async runtime and fold its error into
/// an [`ApiError`].
pub(crate) async fn blocking<F, T, E>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal("worker task failed".into())
        })?
        .map_err(Into::into)
}
