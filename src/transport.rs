use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header;

use crate::interceptor::Interceptors;
use crate::{ApiCallError, ApiResponse, CancelHandle, ProgressEvent, Result, TransportRequest};

/// Receives progress events while a transfer runs.
pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Per-call context handed to [`Transport::send`].
#[derive(Clone, Default)]
pub struct TransferContext {
    pub cancel: CancelHandle,
    pub progress: Option<ProgressSink>,
}

impl fmt::Debug for TransferContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferContext")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl TransferContext {
    pub fn new(cancel: CancelHandle) -> Self {
        Self {
            cancel,
            progress: None,
        }
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn report(&self, event: ProgressEvent) {
        if let Some(sink) = &self.progress {
            sink(event);
        }
    }
}

/// How a transport call ended. Cancellation is not a failure.
#[derive(Debug)]
pub enum TransportOutcome {
    Completed(ApiResponse),
    Failed(ApiCallError),
    Cancelled,
}

impl From<Result<ApiResponse>> for TransportOutcome {
    fn from(result: Result<ApiResponse>) -> Self {
        match result {
            Ok(response) => Self::Completed(response),
            Err(err) => Self::Failed(err),
        }
    }
}

/// HTTP transport seam used by every [`CallController`](crate::CallController).
///
/// Implementations must honor `context.cancel` and resolve with
/// [`TransportOutcome::Cancelled`] when it fires before completion.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest, context: TransferContext) -> TransportOutcome;
}

/// [`Transport`] over `reqwest` with interceptor chains.
#[derive(Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    interceptors: Interceptors,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("interceptors", &self.interceptors)
            .finish()
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(Interceptors::default())
    }
}

impl ReqwestTransport {
    pub fn new(interceptors: Interceptors) -> Self {
        Self::with_client(reqwest::Client::new(), interceptors)
    }

    pub fn with_client(http: reqwest::Client, interceptors: Interceptors) -> Self {
        Self { http, interceptors }
    }

    async fn execute(
        &self,
        request: TransportRequest,
        context: &TransferContext,
    ) -> Result<ApiResponse> {
        let request = self.interceptors.apply_request(request).await?;
        let url = request.full_url()?;

        let mut builder = self.http.request(request.method.into(), url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let upload_len = match &request.body {
            Some(body) => {
                let bytes = serde_json::to_vec(body)
                    .map_err(|err| ApiCallError::Encode(err.to_string()))?;
                let len = bytes.len() as u64;
                if !request.headers.keys().any(|name| name.eq_ignore_ascii_case("content-type")) {
                    builder = builder.header(header::CONTENT_TYPE, "application/json");
                }
                builder = builder.body(bytes);
                Some(len)
            }
            None => None,
        };

        let response = builder.send().await.map_err(ApiCallError::Transport)?;

        // reqwest exposes no upload hook; the body has been sent once headers arrive.
        if let Some(len) = upload_len {
            context.report(ProgressEvent::upload(len, Some(len)));
        }

        let status = response.status();
        let headers = collect_headers(response.headers());
        let total = response.content_length();

        let mut body = Vec::with_capacity(total.unwrap_or(0).min(1 << 20) as usize);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(ApiCallError::Transport)?;
            body.extend_from_slice(&chunk);
            context.report(ProgressEvent::download(body.len() as u64, total));
        }

        if !status.is_success() {
            return Err(ApiCallError::Http {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let response = ApiResponse {
            status: status.as_u16(),
            headers,
            body: body.into(),
        };
        self.interceptors.apply_response(response).await
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest, context: TransferContext) -> TransportOutcome {
        let cancel = context.cancel.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => TransportOutcome::Cancelled,
            result = self.execute(request, &context) => result.into(),
        }
    }
}

fn collect_headers(headers: &header::HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_owned(), value.to_owned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH};

    use super::{collect_headers, TransportOutcome};
    use crate::{ApiCallError, ApiResponse};

    #[test]
    fn collect_headers_skips_opaque_values() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("12"));
        headers.insert(
            "x-binary",
            HeaderValue::from_bytes(&[0xfa, 0xfb]).expect("opaque header value"),
        );

        let collected = collect_headers(&headers);
        assert_eq!(collected.get("content-length").map(String::as_str), Some("12"));
        assert!(!collected.contains_key("x-binary"));
    }

    #[test]
    fn result_converts_into_outcome() {
        let ok: TransportOutcome = Ok(ApiResponse::new(200, "ok")).into();
        assert!(matches!(ok, TransportOutcome::Completed(_)));

        let err: TransportOutcome = Err(ApiCallError::InvalidUrl("x".to_owned())).into();
        assert!(matches!(err, TransportOutcome::Failed(ApiCallError::InvalidUrl(_))));
    }
}
