//! Load-balancer path: every request on the balancer listener.

use axum::{body::Body, extract::State, http::Request, response::Response};
use tracing::warn;

use crate::balancer::forward;
use crate::error::AppError;
use crate::observability::EventKind;
use crate::state::BalancerState;

/// Fallback handler of the balancer listener.
pub async fn proxy_request(
    State(state): State<BalancerState>,
    request: Request<Body>,
) -> Result<Response, AppError> {
    let backend = state.router().select(request.uri().path())?.clone();

    match tokio::time::timeout(
        state.request_timeout(),
        forward(state.client(), &backend, request),
    )
    .await
    {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => {
            state.sink().record(EventKind::ProxyFailed, &e.to_string());
            Err(e.into())
        },
        Err(_) => {
            warn!(backend = %backend, "Backend did not answer within the request timeout");
            Err(AppError::Timeout)
        },
    }
}
