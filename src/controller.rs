//! Per-call request lifecycle: cache, retry, polling, progress and
//! cancellation for one endpoint binding.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::cache::ResponseCache;
use crate::scheduler::{Scheduler, TimerHandle, TimerTask};
use crate::transport::{ProgressSink, TransferContext, Transport, TransportOutcome};
use crate::{
    ApiCallError, ApiResponse, CallOptions, CallSnapshot, CancelHandle, ClientConfig, Logger,
    ProgressEvent, ProgressTracker, Transfer, TransportRequest,
};

/// Stateful controller for one logical, repeatable API request.
///
/// Built by [`ApiClient::call`](crate::ApiClient::call). Dropping the
/// controller disposes it: timers are cleared and the in-flight request is
/// cancelled.
pub struct CallController {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<ClientConfig>,
    options: CallOptions,
    transport: Arc<dyn Transport>,
    scheduler: Arc<dyn Scheduler>,
    logger: Logger,
    state: Mutex<CallState>,
    notify: watch::Sender<CallSnapshot>,
}

#[derive(Default)]
struct CallState {
    response: Option<Arc<ApiResponse>>,
    loading: bool,
    error: Option<Arc<ApiCallError>>,
    cache: ResponseCache<Arc<ApiResponse>>,
    retry_count: u32,
    tracker: ProgressTracker,
    progress: u8,
    poll: Option<TimerHandle>,
    progress_tick: Option<TimerHandle>,
    retry: Option<TimerHandle>,
    // Shared by every overlapping request; `cancel()` aborts them all.
    cancel: Option<CancelHandle>,
    in_flight: usize,
    disposed: bool,
}

impl CallState {
    fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            response: self.response.clone(),
            loading: self.loading,
            error: self.error.clone(),
            progress: self.progress,
            upload_progress: self.tracker.upload(),
            download_progress: self.tracker.download(),
            retry_count: self.retry_count,
        }
    }

    fn reset_progress(&mut self) {
        self.tracker.reset();
        self.progress = 0;
    }
}

enum Failure {
    Retry { attempt: u32, delay: Duration },
    Surface(Arc<ApiCallError>),
}

impl fmt::Debug for CallController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("CallController")
            .field("method", &self.inner.options.method)
            .field("path", &self.inner.options.path)
            .field("loading", &state.loading)
            .field("retry_count", &state.retry_count)
            .field("polling", &state.poll.is_some())
            .finish()
    }
}

impl CallController {
    pub(crate) fn new(
        config: Arc<ClientConfig>,
        options: CallOptions,
        transport: Arc<dyn Transport>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let logger = Logger::new(config.logging.clone());
        let (notify, _) = watch::channel(CallSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                config,
                options,
                transport,
                scheduler,
                logger,
                state: Mutex::new(CallState::default()),
                notify,
            }),
        }
    }

    /// Arms polling when the binding has a refresh interval.
    pub fn start(&self) {
        self.start_polling();
    }

    /// Clears every timer and cancels the in-flight request. Later calls to
    /// [`fetch`](Self::fetch) do nothing.
    pub fn dispose(&self) {
        let mut state = self.inner.state.lock();
        if state.disposed {
            return;
        }
        state.disposed = true;
        state.poll = None;
        state.progress_tick = None;
        state.retry = None;
        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
        }
        state.in_flight = 0;
        state.loading = false;
        self.inner.publish(&state);
        drop(state);
        tracing::debug!(path = %self.inner.options.path, "call controller disposed");
    }

    /// Runs one attempt of the request: serves from cache when possible,
    /// otherwise calls the transport and applies the outcome. A failure that
    /// qualifies for retry schedules the next attempt instead of surfacing.
    pub async fn fetch(&self) {
        self.inner.fetch().await;
    }

    /// Spawns [`fetch`](Self::fetch) on the runtime.
    pub fn trigger(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.fetch().await })
    }

    /// Cancels every in-flight request, if any. They then resolve as
    /// cancelled: no error, no retry. An already scheduled retry still fires.
    pub fn cancel(&self) {
        let cancel = self.inner.state.lock().cancel.take();
        if let Some(cancel) = cancel {
            cancel.cancel();
            self.inner.logger.info(&format!(
                "{} {} cancelled",
                self.inner.options.method, self.inner.options.path
            ));
        }
    }

    /// (Re)arms the poll timer. Does nothing without a refresh interval.
    pub fn start_polling(&self) {
        self.inner.start_polling();
    }

    /// Clears the poll timer. No-op when polling is not active.
    pub fn stop_polling(&self) {
        let previous = self.inner.state.lock().poll.take();
        if let Some(previous) = previous {
            previous.cancel();
            tracing::debug!(path = %self.inner.options.path, "polling paused");
        }
    }

    /// Pause/resume handle over the poll timer.
    pub fn polling(&self) -> Polling<'_> {
        Polling { controller: self }
    }

    /// Whether a poll timer is currently armed.
    pub fn is_polling(&self) -> bool {
        self.inner.state.lock().poll.is_some()
    }

    /// Last successful response, kept across later failures.
    pub fn response(&self) -> Option<Arc<ApiResponse>> {
        self.inner.state.lock().response.clone()
    }

    /// True while at least one request is in flight.
    pub fn loading(&self) -> bool {
        self.inner.state.lock().loading
    }

    /// Error of the last failed attempt that was not retried.
    pub fn error(&self) -> Option<Arc<ApiCallError>> {
        self.inner.state.lock().error.clone()
    }

    /// Combined progress percentage, refreshed on each sampling tick.
    pub fn progress(&self) -> u8 {
        self.inner.state.lock().progress
    }

    /// Upload percentage of the current request.
    pub fn upload_progress(&self) -> u8 {
        self.inner.state.lock().tracker.upload()
    }

    /// Download percentage of the current request.
    pub fn download_progress(&self) -> u8 {
        self.inner.state.lock().tracker.download()
    }

    /// Retries consumed by the current failure streak.
    pub fn retry_count(&self) -> u32 {
        self.inner.state.lock().retry_count
    }

    /// Copy of every observable field at once.
    pub fn snapshot(&self) -> CallSnapshot {
        self.inner.state.lock().snapshot()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<CallSnapshot> {
        self.inner.notify.subscribe()
    }

    /// The endpoint binding this controller was created for.
    pub fn options(&self) -> &CallOptions {
        &self.inner.options
    }
}

impl Drop for CallController {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Pause/resume view over a controller's poll timer.
#[derive(Debug)]
pub struct Polling<'a> {
    controller: &'a CallController,
}

impl Polling<'_> {
    /// Re-arms the poll timer, replacing any existing one.
    pub fn resume(&self) {
        self.controller.start_polling();
    }

    /// Clears the poll timer.
    pub fn pause(&self) {
        self.controller.stop_polling();
    }

    /// Whether the poll timer is armed.
    pub fn is_active(&self) -> bool {
        self.controller.is_polling()
    }
}

impl Inner {
    fn publish(&self, state: &CallState) {
        self.notify.send_replace(state.snapshot());
    }

    fn describe(&self) -> String {
        format!("{} {}", self.options.method, self.options.path)
    }

    async fn fetch(self: &Arc<Self>) {
        let cancel = {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.error = None;
            state.reset_progress();
            state.loading = true;

            if let Some(ttl) = self.options.cache_ttl() {
                if let Some(cached) = state.cache.get(ttl, Instant::now()).cloned() {
                    state.response = Some(cached);
                    state.loading = state.in_flight > 0;
                    self.publish(&state);
                    drop(state);
                    self.logger
                        .debug(&format!("{} served from cache", self.describe()));
                    return;
                }
            }

            let cancel = match &state.cancel {
                Some(current) if !current.is_cancelled() => current.clone(),
                _ => {
                    let fresh = CancelHandle::new();
                    state.cancel = Some(fresh.clone());
                    fresh
                }
            };
            state.in_flight += 1;
            if state.progress_tick.is_none() {
                state.progress_tick = self.progress_timer();
            }
            self.publish(&state);
            cancel
        };

        self.logger.info(&format!("{} requesting", self.describe()));

        let request = TransportRequest::from_call(&self.config, &self.options);
        let context = TransferContext::new(cancel).with_progress(self.progress_sink());
        let outcome = self.transport.send(request, context).await;
        self.complete(outcome);
    }

    /// Applies one transport outcome. Overlapping requests all complete;
    /// whichever finishes last owns `response` and `error`.
    fn complete(self: &Arc<Self>, outcome: TransportOutcome) {
        let retry_allowed = match &outcome {
            TransportOutcome::Failed(err) => self.retry_allowed(err),
            _ => false,
        };

        let mut state = self.state.lock();
        if state.disposed {
            return;
        }
        state.in_flight = state.in_flight.saturating_sub(1);
        state.loading = state.in_flight > 0;
        if !state.loading {
            state.cancel = None;
            state.progress_tick = None;
        }

        match outcome {
            TransportOutcome::Completed(response) => {
                let response = Arc::new(response);
                if self.options.cache_ttl().is_some() {
                    state.cache.store(Arc::clone(&response), Instant::now());
                }
                state.response = Some(response);
                state.retry_count = 0;
                self.publish(&state);
                drop(state);
                self.logger.info(&format!("{} succeeded", self.describe()));
            }
            TransportOutcome::Cancelled => {
                self.publish(&state);
                drop(state);
                self.logger.debug(&format!("{} resolved as cancelled", self.describe()));
            }
            TransportOutcome::Failed(err) => {
                let failure = self.on_failure(&mut state, err, retry_allowed);
                self.publish(&state);
                drop(state);
                self.report_failure(failure);
            }
        }
    }

    /// Whether a failed attempt may be retried. The retry condition is only
    /// consulted when the policy leaves room for another attempt, and never
    /// under the state lock.
    fn retry_allowed(&self, err: &ApiCallError) -> bool {
        let retry = &self.config.retry;
        if !retry.enable_retry {
            return false;
        }
        {
            let state = self.state.lock();
            if state.disposed || state.retry_count >= retry.max_retry_count {
                return false;
            }
        }
        retry
            .retry_condition
            .as_ref()
            .map_or(true, |condition| condition(err))
    }

    fn on_failure(
        self: &Arc<Self>,
        state: &mut CallState,
        err: ApiCallError,
        retry_allowed: bool,
    ) -> Failure {
        let retry = &self.config.retry;
        if retry_allowed && state.retry_count < retry.max_retry_count {
            state.retry_count += 1;
            state.retry = Some(
                self.scheduler
                    .schedule_once(retry.retry_interval, self.fetch_task()),
            );
            tracing::debug!(
                path = %self.options.path,
                attempt = state.retry_count,
                error = %err,
                "scheduling retry"
            );
            return Failure::Retry {
                attempt: state.retry_count,
                delay: retry.retry_interval,
            };
        }

        state.retry_count = 0;
        let err = Arc::new(err);
        state.error = Some(Arc::clone(&err));
        Failure::Surface(err)
    }

    fn report_failure(&self, failure: Failure) {
        match failure {
            Failure::Retry { attempt, delay } => self.logger.warn(&format!(
                "{} failed, retry {attempt}/{} in {} ms",
                self.describe(),
                self.config.retry.max_retry_count,
                delay.as_millis()
            )),
            Failure::Surface(err) => {
                self.logger
                    .error(&format!("{} failed: {err}", self.describe()));
                if let Some(handler) = &self.config.on_exception {
                    handler(err.as_ref());
                }
            }
        }
    }

    fn start_polling(self: &Arc<Self>) {
        let Some(refresh) = self.options.poll_interval() else {
            return;
        };
        let mut state = self.state.lock();
        if state.disposed {
            return;
        }
        if let Some(previous) = state.poll.take() {
            previous.cancel();
        }
        state.poll = Some(self.scheduler.schedule_repeating(refresh, self.fetch_task()));
        drop(state);
        tracing::debug!(
            path = %self.options.path,
            interval_ms = refresh.as_millis() as u64,
            "polling armed"
        );
    }

    /// Timer callback that spawns a fetch without keeping the controller
    /// alive.
    fn fetch_task(self: &Arc<Self>) -> TimerTask {
        let weak = Arc::downgrade(self);
        Arc::new(move || {
            let weak: Weak<Inner> = weak.clone();
            tokio::spawn(async move {
                if let Some(inner) = weak.upgrade() {
                    inner.fetch().await;
                }
            });
        })
    }

    fn progress_timer(self: &Arc<Self>) -> Option<TimerHandle> {
        let interval = self.config.progress.sampling_interval()?;
        let mode = self.config.progress.progress_mode;
        let weak = Arc::downgrade(self);
        let task: TimerTask = Arc::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut state = inner.state.lock();
            let progress = state.tracker.combined(mode);
            if progress != state.progress {
                state.progress = progress;
                inner.publish(&state);
            }
        });
        Some(self.scheduler.schedule_repeating(interval, task))
    }

    fn progress_sink(self: &Arc<Self>) -> ProgressSink {
        let weak = Arc::downgrade(self);
        let options = self.config.progress.clone();
        let sampling = options.sampling_interval().is_some();
        Arc::new(move |event: ProgressEvent| {
            let callback = match event.transfer {
                Transfer::Upload => &options.on_upload_progress,
                Transfer::Download => &options.on_download_progress,
            };
            if let Some(callback) = callback {
                callback(&event);
            }
            if !sampling {
                return;
            }
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut state = inner.state.lock();
            if state.loading && state.tracker.record(&event) {
                inner.publish(&state);
            }
        })
    }
}
