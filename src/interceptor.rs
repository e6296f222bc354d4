//! Request and response interceptors.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{ApiResponse, Result, TransportRequest};

/// Rewrites a request before it is sent.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    async fn intercept(&self, request: TransportRequest) -> Result<TransportRequest>;
}

/// Rewrites a successful response before the controller sees it.
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    async fn intercept(&self, response: ApiResponse) -> Result<ApiResponse>;
}

/// Interceptor chains, applied in registration order.
#[derive(Clone, Default)]
pub struct Interceptors {
    pub request: Vec<Arc<dyn RequestInterceptor>>,
    pub response: Vec<Arc<dyn ResponseInterceptor>>,
}

impl fmt::Debug for Interceptors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptors")
            .field("request", &self.request.len())
            .field("response", &self.response.len())
            .finish()
    }
}

impl Interceptors {
    pub(crate) async fn apply_request(
        &self,
        mut request: TransportRequest,
    ) -> Result<TransportRequest> {
        for interceptor in &self.request {
            request = interceptor.intercept(request).await?;
        }
        Ok(request)
    }

    pub(crate) async fn apply_response(&self, mut response: ApiResponse) -> Result<ApiResponse> {
        for interceptor in &self.response {
            response = interceptor.intercept(response).await?;
        }
        Ok(response)
    }
}

/// Sets the `authorization` header on every request.
#[derive(Clone)]
pub struct BearerAuth {
    authorization: String,
}

impl fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuth")
            .field("authorization", &"<redacted>")
            .finish()
    }
}

impl BearerAuth {
    /// If the token is missing the `Bearer ` prefix, it is added automatically.
    pub fn new(token: impl AsRef<str>) -> Self {
        Self {
            authorization: normalize_bearer_authorization(token.as_ref()),
        }
    }
}

#[async_trait]
impl RequestInterceptor for BearerAuth {
    async fn intercept(&self, mut request: TransportRequest) -> Result<TransportRequest> {
        request
            .headers
            .insert("authorization".to_owned(), self.authorization.clone());
        Ok(request)
    }
}

/// Emits a `tracing` event for each request and response.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingInterceptor;

#[async_trait]
impl RequestInterceptor for TracingInterceptor {
    async fn intercept(&self, request: TransportRequest) -> Result<TransportRequest> {
        tracing::debug!(method = %request.method, url = %request.url, "sending request");
        Ok(request)
    }
}

#[async_trait]
impl ResponseInterceptor for TracingInterceptor {
    async fn intercept(&self, response: ApiResponse) -> Result<ApiResponse> {
        tracing::debug!(
            status = response.status,
            bytes = response.body.len(),
            "received response"
        );
        Ok(response)
    }
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
