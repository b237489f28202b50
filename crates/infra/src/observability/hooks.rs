//! Hook trait and the stock implementations

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use basecamp_domain::BasecampError;
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn, Level};

/// Semantic operation being performed (`projects.list`, `todos.create`, ...)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationInfo {
    pub service: String,
    pub operation: String,
    pub resource_type: String,
    pub is_mutation: bool,
    pub bucket_id: Option<u64>,
    pub resource_id: Option<u64>,
}

impl OperationInfo {
    #[must_use]
    pub fn new(service: impl Into<String>, operation: impl Into<String>) -> Self {
        Self { service: service.into(), operation: operation.into(), ..Self::default() }
    }

    #[must_use]
    pub fn resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = resource_type.into();
        self
    }

    #[must_use]
    pub const fn mutation(mut self) -> Self {
        self.is_mutation = true;
        self
    }

    #[must_use]
    pub const fn bucket(mut self, bucket_id: u64) -> Self {
        self.bucket_id = Some(bucket_id);
        self
    }

    #[must_use]
    pub const fn resource(mut self, resource_id: u64) -> Self {
        self.resource_id = Some(resource_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    pub error: Option<BasecampError>,
    pub duration: Duration,
}

/// One HTTP attempt as seen by hooks; never carries headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub method: String,
    pub url: String,
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestResult {
    /// `None` when no response was received
    pub status: Option<u16>,
    pub error: Option<BasecampError>,
    pub duration: Duration,
    pub from_cache: bool,
}

/// Observer for pipeline activity
///
/// Every method has an empty default, so implementations override only
/// what they care about. Calls happen inline on the request task and
/// should return quickly.
pub trait Hooks: Send + Sync {
    fn on_operation_start(&self, _op: &OperationInfo) {}

    fn on_operation_end(&self, _op: &OperationInfo, _result: &OperationResult) {}

    fn on_request_start(&self, _request: &RequestInfo) {}

    fn on_request_end(&self, _request: &RequestInfo, _result: &RequestResult) {}

    /// Called before attempt number `attempt` is issued, after `delay`
    fn on_retry(&self, _request: &RequestInfo, _attempt: u32, _error: &BasecampError, _delay: Duration) {}

    /// Called before page number `page` (2 and up) is fetched
    fn on_paginate(&self, _url: &str, _page: usize) {}
}

/// Run one hook call, swallowing a panic
pub(crate) fn isolate(hook: &'static str, call: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(call)).is_err() {
        warn!(hook, "Hook panicked; ignoring");
    }
}

/// Does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl Hooks for NoopHooks {}

/// Logs pipeline activity through `tracing`
///
/// Failures are always logged at `warn`; everything else at the configured
/// level (`debug` by default).
#[derive(Debug, Clone, Copy)]
pub struct TracingHooks {
    level: Level,
}

impl Default for TracingHooks {
    fn default() -> Self {
        Self { level: Level::DEBUG }
    }
}

impl TracingHooks {
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }

    #[must_use]
    pub const fn level(&self) -> Level {
        self.level
    }
}

macro_rules! emit {
    ($level:expr, $($arg:tt)+) => {{
        let level = $level;
        if level == Level::ERROR {
            error!($($arg)+);
        } else if level == Level::WARN {
            warn!($($arg)+);
        } else if level == Level::INFO {
            info!($($arg)+);
        } else if level == Level::DEBUG {
            debug!($($arg)+);
        } else {
            trace!($($arg)+);
        }
    }};
}

impl Hooks for TracingHooks {
    fn on_operation_start(&self, op: &OperationInfo) {
        emit!(self.level, service = %op.service, operation = %op.operation, "Operation started");
    }

    fn on_operation_end(&self, op: &OperationInfo, result: &OperationResult) {
        let duration_ms = result.duration.as_millis();
        match &result.error {
            Some(err) => warn!(
                service = %op.service,
                operation = %op.operation,
                duration_ms,
                error = %err,
                "Operation failed"
            ),
            None => emit!(
                self.level,
                service = %op.service,
                operation = %op.operation,
                duration_ms,
                "Operation completed"
            ),
        }
    }

    fn on_request_start(&self, request: &RequestInfo) {
        emit!(
            self.level,
            method = %request.method,
            url = %request.url,
            attempt = request.attempt,
            "Request started"
        );
    }

    fn on_request_end(&self, request: &RequestInfo, result: &RequestResult) {
        let duration_ms = result.duration.as_millis();
        match &result.error {
            Some(err) => warn!(
                method = %request.method,
                url = %request.url,
                status = ?result.status,
                duration_ms,
                error = %err,
                "Request failed"
            ),
            None => emit!(
                self.level,
                method = %request.method,
                url = %request.url,
                status = ?result.status,
                duration_ms,
                from_cache = result.from_cache,
                "Request completed"
            ),
        }
    }

    fn on_retry(&self, request: &RequestInfo, attempt: u32, error: &BasecampError, delay: Duration) {
        warn!(
            method = %request.method,
            url = %request.url,
            attempt,
            delay_ms = delay.as_millis(),
            error = %error,
            "Retrying request"
        );
    }

    fn on_paginate(&self, url: &str, page: usize) {
        emit!(self.level, url, page, "Fetching next page");
    }
}

/// Fans every call out to several hooks
///
/// Start events run in registration order, end events in reverse order.
/// Each hook is isolated from the others' panics.
#[derive(Clone, Default)]
pub struct ChainHooks {
    hooks: Vec<Arc<dyn Hooks>>,
}

impl ChainHooks {
    #[must_use]
    pub fn new(hooks: Vec<Arc<dyn Hooks>>) -> Self {
        Self { hooks }
    }

    #[must_use]
    pub fn with(mut self, hook: Arc<dyn Hooks>) -> Self {
        self.hooks.push(hook);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl std::fmt::Debug for ChainHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainHooks").field("hooks", &self.hooks.len()).finish()
    }
}

impl Hooks for ChainHooks {
    fn on_operation_start(&self, op: &OperationInfo) {
        for hook in &self.hooks {
            isolate("on_operation_start", || hook.on_operation_start(op));
        }
    }

    fn on_operation_end(&self, op: &OperationInfo, result: &OperationResult) {
        for hook in self.hooks.iter().rev() {
            isolate("on_operation_end", || hook.on_operation_end(op, result));
        }
    }

    fn on_request_start(&self, request: &RequestInfo) {
        for hook in &self.hooks {
            isolate("on_request_start", || hook.on_request_start(request));
        }
    }

    fn on_request_end(&self, request: &RequestInfo, result: &RequestResult) {
        for hook in self.hooks.iter().rev() {
            isolate("on_request_end", || hook.on_request_end(request, result));
        }
    }

    fn on_retry(&self, request: &RequestInfo, attempt: u32, error: &BasecampError, delay: Duration) {
        for hook in &self.hooks {
            isolate("on_retry", || hook.on_retry(request, attempt, error, delay));
        }
    }

    fn on_paginate(&self, url: &str, page: usize) {
        for hook in &self.hooks {
            isolate("on_paginate", || hook.on_paginate(url, page));
        }
    }
}

/// A hook call captured by [`RecordingHooks`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookEvent {
    OperationStart(OperationInfo),
    OperationEnd { op: OperationInfo, error: Option<BasecampError> },
    RequestStart(RequestInfo),
    RequestEnd { request: RequestInfo, status: Option<u16>, from_cache: bool },
    Retry { request: RequestInfo, attempt: u32, error: BasecampError, delay: Duration },
    Paginate { url: String, page: usize },
}

/// Keeps every call in memory, in order
#[derive(Debug, Default)]
pub struct RecordingHooks {
    events: Mutex<Vec<HookEvent>>,
}

impl RecordingHooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<HookEvent> {
        self.events.lock().clone()
    }

    #[must_use]
    pub fn request_starts(&self) -> usize {
        self.count(|e| matches!(e, HookEvent::RequestStart(_)))
    }

    #[must_use]
    pub fn request_ends(&self) -> usize {
        self.count(|e| matches!(e, HookEvent::RequestEnd { .. }))
    }

    #[must_use]
    pub fn retries(&self) -> usize {
        self.count(|e| matches!(e, HookEvent::Retry { .. }))
    }

    #[must_use]
    pub fn paginations(&self) -> usize {
        self.count(|e| matches!(e, HookEvent::Paginate { .. }))
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn count(&self, predicate: impl Fn(&HookEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    fn push(&self, event: HookEvent) {
        self.events.lock().push(event);
    }
}

impl Hooks for RecordingHooks {
    fn on_operation_start(&self, op: &OperationInfo) {
        self.push(HookEvent::OperationStart(op.clone()));
    }

    fn on_operation_end(&self, op: &OperationInfo, result: &OperationResult) {
        self.push(HookEvent::OperationEnd { op: op.clone(), error: result.error.clone() });
    }

    fn on_request_start(&self, request: &RequestInfo) {
        self.push(HookEvent::RequestStart(request.clone()));
    }

    fn on_request_end(&self, request: &RequestInfo, result: &RequestResult) {
        self.push(HookEvent::RequestEnd {
            request: request.clone(),
            status: result.status,
            from_cache: result.from_cache,
        });
    }

    fn on_retry(&self, request: &RequestInfo, attempt: u32, error: &BasecampError, delay: Duration) {
        self.push(HookEvent::Retry {
            request: request.clone(),
            attempt,
            error: error.clone(),
            delay,
        });
    }

    fn on_paginate(&self, url: &str, page: usize) {
        self.push(HookEvent::Paginate { url: url.to_string(), page });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RequestInfo {
        RequestInfo { method: "GET".into(), url: "https://x.test/1/projects.json".into(), attempt: 1 }
    }

    fn ok_result() -> RequestResult {
        RequestResult { status: Some(200), error: None, duration: Duration::ZERO, from_cache: false }
    }

    /// Records its label into a shared log
    struct Labeled {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Hooks for Labeled {
        fn on_request_start(&self, _request: &RequestInfo) {
            self.log.lock().push(format!("start:{}", self.label));
        }

        fn on_request_end(&self, _request: &RequestInfo, _result: &RequestResult) {
            self.log.lock().push(format!("end:{}", self.label));
        }
    }

    struct Panicking;

    impl Hooks for Panicking {
        fn on_request_start(&self, _request: &RequestInfo) {
            panic!("hook failure");
        }

        fn on_request_end(&self, _request: &RequestInfo, _result: &RequestResult) {
            panic!("hook failure");
        }
    }

    #[test]
    fn chain_runs_starts_in_order_and_ends_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = ChainHooks::default()
            .with(Arc::new(Labeled { label: "a", log: log.clone() }))
            .with(Arc::new(Labeled { label: "b", log: log.clone() }));

        chain.on_request_start(&request());
        chain.on_request_end(&request(), &ok_result());

        assert_eq!(*log.lock(), vec!["start:a", "start:b", "end:b", "end:a"]);
    }

    #[test]
    fn chain_isolates_panicking_hook() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = ChainHooks::new(vec![
            Arc::new(Panicking),
            Arc::new(Labeled { label: "after", log: log.clone() }),
        ]);

        chain.on_request_start(&request());
        chain.on_request_end(&request(), &ok_result());

        assert_eq!(*log.lock(), vec!["start:after", "end:after"]);
    }

    #[test]
    fn recording_hooks_capture_calls_in_order() {
        let hooks = RecordingHooks::new();
        hooks.on_request_start(&request());
        hooks.on_retry(&request(), 2, &BasecampError::Network("reset".into()), Duration::from_millis(5));
        hooks.on_paginate("https://x.test/1/projects.json?page=2", 2);
        hooks.on_request_end(&request(), &ok_result());

        assert_eq!(hooks.request_starts(), 1);
        assert_eq!(hooks.retries(), 1);
        assert_eq!(hooks.paginations(), 1);
        assert_eq!(hooks.request_ends(), 1);
        assert!(matches!(hooks.events()[1], HookEvent::Retry { attempt: 2, .. }));
    }

    #[test]
    fn tracing_hooks_default_to_debug() {
        assert_eq!(TracingHooks::default().level(), Level::DEBUG);
        // Logging must not panic for any level
        for level in [Level::TRACE, Level::DEBUG, Level::INFO, Level::WARN, Level::ERROR] {
            let hooks = TracingHooks::new(level);
            hooks.on_request_start(&request());
            hooks.on_paginate("https://x.test", 2);
        }
    }

    #[test]
    fn operation_info_builder() {
        let op = OperationInfo::new("todos", "create").resource_type("todo").mutation().bucket(7);
        assert!(op.is_mutation);
        assert_eq!(op.bucket_id, Some(7));
        assert_eq!(op.resource_id, None);
    }
}
