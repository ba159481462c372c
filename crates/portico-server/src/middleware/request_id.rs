//! Identificador de request: se propaga el `x-request-id` entrante o se
//! genera un UUID v7.

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request, Response},
};
use std::task::{Context, Poll};
use tower::{Layer, Service};
use uuid::Uuid;

/// Header name for request ID.
pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Request id, stored in the request extensions for later layers and handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(HeaderValue);

impl RequestId {
    /// Takes the incoming header when it is present and non-empty.
    fn from_request<B>(request: &Request<B>) -> Self {
        match request.headers().get(&REQUEST_ID_HEADER) {
            Some(value) if !value.is_empty() => Self(value.clone()),
            _ => Self::generate(),
        }
    }

    fn generate() -> Self {
        // Un UUID con guiones siempre es un header valido
        let value = HeaderValue::try_from(Uuid::now_v7().hyphenated().to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("unknown"));
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        self.0.to_str().unwrap_or("invalid")
    }

    pub fn header_value(&self) -> &HeaderValue {
        &self.0
    }
}

/// Layer that tags requests and responses with a [`RequestId`].
#[derive(Clone, Default)]
pub struct RequestIdLayer;

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdMiddleware { inner }
    }
}

#[derive(Clone)]
pub struct RequestIdMiddleware<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for RequestIdMiddleware<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let request_id = RequestId::from_request(&request);

        // El header tambien viaja al origin o backend
        request
            .headers_mut()
            .insert(REQUEST_ID_HEADER.clone(), request_id.header_value().clone());
        request.extensions_mut().insert(request_id.clone());

        let mut inner = self.inner.clone();

        Box::pin(async move {
            let mut response = inner.call(request).await?;
            response
                .headers_mut()
                .insert(REQUEST_ID_HEADER.clone(), request_id.0);
            Ok(response)
        })
    }
}
