use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::interceptor::{Interceptors, RequestInterceptor, ResponseInterceptor};
use crate::{ApiCallError, LogLevel, ProgressEvent, ProgressMode};

/// Receives every terminal error of every controller built from a client.
pub type ExceptionHandler = Arc<dyn Fn(&ApiCallError) + Send + Sync>;
/// Decides whether a failed attempt may be retried.
pub type RetryCondition = Arc<dyn Fn(&ApiCallError) -> bool + Send + Sync>;
/// Custom log sink.
pub type LogFunction = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;
/// Raw upload/download progress observer.
pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Shared configuration bound once by [`ApiClient`](crate::ApiClient).
#[derive(Clone, Default)]
pub struct ClientConfig {
    /// Prefix prepended to every call path.
    pub base_url: String,
    pub on_exception: Option<ExceptionHandler>,
    /// Merged under per-call headers.
    pub default_headers: BTreeMap<String, String>,
    /// Merged under per-call query parameters.
    pub default_query_params: BTreeMap<String, String>,
    pub logging: LoggingOptions,
    pub retry: RetryOptions,
    pub progress: ProgressOptions,
    pub interceptors: Interceptors,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("on_exception", &self.on_exception.is_some())
            .field("default_headers", &self.default_headers.keys())
            .field("default_query_params", &self.default_query_params)
            .field("logging", &self.logging)
            .field("retry", &self.retry)
            .field("progress", &self.progress)
            .field("interceptors", &self.interceptors)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    pub fn default_query_param(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.default_query_params.insert(name.into(), value.into());
        self
    }

    pub fn on_exception<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ApiCallError) + Send + Sync + 'static,
    {
        self.on_exception = Some(Arc::new(handler));
        self
    }

    pub fn with_logging(mut self, logging: LoggingOptions) -> Self {
        self.logging = logging;
        self
    }

    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_progress(mut self, progress: ProgressOptions) -> Self {
        self.progress = progress;
        self
    }

    pub fn request_interceptor(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.interceptors.request.push(Arc::new(interceptor));
        self
    }

    pub fn response_interceptor(mut self, interceptor: impl ResponseInterceptor + 'static) -> Self {
        self.interceptors.response.push(Arc::new(interceptor));
        self
    }
}

/// Gates and routes diagnostic messages.
#[derive(Clone, Default)]
pub struct LoggingOptions {
    pub enable_logging: bool,
    pub log_level: LogLevel,
    /// Replaces the default `tracing` sink when set.
    pub log_function: Option<LogFunction>,
}

impl fmt::Debug for LoggingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingOptions")
            .field("enable_logging", &self.enable_logging)
            .field("log_level", &self.log_level)
            .field("log_function", &self.log_function.is_some())
            .finish()
    }
}

impl LoggingOptions {
    /// Enabled logging at `level` through the default sink.
    pub fn enabled(level: LogLevel) -> Self {
        Self {
            enable_logging: true,
            log_level: level,
            log_function: None,
        }
    }

    pub fn with_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(LogLevel, &str) + Send + Sync + 'static,
    {
        self.log_function = Some(Arc::new(sink));
        self
    }
}

/// Retry policy applied to failed transport calls.
#[derive(Clone)]
pub struct RetryOptions {
    pub enable_retry: bool,
    /// Retries after the initial attempt.
    pub max_retry_count: u32,
    /// Fixed delay before each retry.
    pub retry_interval: Duration,
    /// Only ever vetoes a retry; absence means every failure is retryable.
    pub retry_condition: Option<RetryCondition>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            enable_retry: false,
            max_retry_count: 3,
            retry_interval: Duration::from_millis(1_000),
            retry_condition: None,
        }
    }
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("enable_retry", &self.enable_retry)
            .field("max_retry_count", &self.max_retry_count)
            .field("retry_interval", &self.retry_interval)
            .field("retry_condition", &self.retry_condition.is_some())
            .finish()
    }
}

impl RetryOptions {
    /// Enabled retry with the given attempt budget and default interval.
    pub fn enabled(max_retry_count: u32) -> Self {
        Self {
            enable_retry: true,
            max_retry_count,
            ..Self::default()
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&ApiCallError) -> bool + Send + Sync + 'static,
    {
        self.retry_condition = Some(Arc::new(condition));
        self
    }
}

/// Progress sampling and reporting policy.
#[derive(Clone, Default)]
pub struct ProgressOptions {
    pub progress_mode: ProgressMode,
    /// Sampling cadence for the combined `progress` value. Zero or `None`
    /// disables sampling.
    pub progress_interval: Option<Duration>,
    pub on_upload_progress: Option<ProgressCallback>,
    pub on_download_progress: Option<ProgressCallback>,
}

impl fmt::Debug for ProgressOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressOptions")
            .field("progress_mode", &self.progress_mode)
            .field("progress_interval", &self.progress_interval)
            .field("on_upload_progress", &self.on_upload_progress.is_some())
            .field("on_download_progress", &self.on_download_progress.is_some())
            .finish()
    }
}

impl ProgressOptions {
    pub fn sampled(mode: ProgressMode, interval: Duration) -> Self {
        Self {
            progress_mode: mode,
            progress_interval: Some(interval),
            ..Self::default()
        }
    }

    pub fn on_upload<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.on_upload_progress = Some(Arc::new(callback));
        self
    }

    pub fn on_download<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.on_download_progress = Some(Arc::new(callback));
        self
    }

    pub(crate) fn sampling_interval(&self) -> Option<Duration> {
        self.progress_interval.filter(|interval| !interval.is_zero())
    }
}
