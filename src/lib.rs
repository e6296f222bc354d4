//! `apicall-http` layers caching, retry, polling and progress tracking over
//! an HTTP transport.
//!
//! An [`ApiClient`] binds shared configuration once; each
//! [`ApiClient::call`] produces a [`CallController`] that owns the state of
//! one logical request:
//! - [`CallController::fetch`] serves from cache or calls the transport,
//!   retrying per [`RetryOptions`]
//! - [`CallController::cancel`] aborts the in-flight request
//! - [`CallController::polling`] pauses and resumes interval polling
//! - [`CallController::subscribe`] observes every state change

mod cache;
mod cancel;
mod client;
mod controller;
mod error;
pub mod interceptor;
mod logger;
mod options;
mod progress;
mod request;
pub mod scheduler;
pub mod transport;
mod types;

pub use cancel::CancelHandle;
pub use client::ApiClient;
pub use controller::{CallController, Polling};
pub use error::ApiCallError;
pub use interceptor::{BearerAuth, RequestInterceptor, ResponseInterceptor, TracingInterceptor};
pub use logger::{LogLevel, Logger};
pub use options::{
    ClientConfig, ExceptionHandler, LogFunction, LoggingOptions, ProgressCallback, ProgressOptions,
    RetryCondition, RetryOptions,
};
pub use progress::{percent, ProgressMode, ProgressTracker};
pub use request::{CallOptions, Method, RawOptions, TransportRequest};
pub use scheduler::{Scheduler, TimerHandle, TimerTask, TokioScheduler};
pub use transport::{ReqwestTransport, TransferContext, Transport, TransportOutcome};
pub use types::{ApiResponse, CallSnapshot, ProgressEvent, Transfer};

pub type Result<T> = std::result::Result<T, ApiCallError>;
