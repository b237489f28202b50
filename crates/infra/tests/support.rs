use std::sync::Arc;
use std::time::Duration;

use basecamp_common::resilience::RetryConfig;
use basecamp_infra::http::{Pipeline, PipelineBuilder};
use basecamp_infra::observability::RecordingHooks;
use wiremock::MockServer;

pub const ACCOUNT: &str = "999";

/// Retry policy with millisecond delays so tests stay fast.
pub fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig::builder()
        .max_attempts(max_attempts)
        .base_delay(Duration::from_millis(5))
        .max_jitter(Duration::from_millis(2))
        .build()
        .expect("retry config should be valid")
}

/// Builder pointed at the mock server's account path with a static token.
pub fn builder_for(server: &MockServer) -> PipelineBuilder {
    basecamp_common::testing::init_test_tracing();
    Pipeline::builder().base_url(server.uri()).account_id(ACCOUNT).token("test-token").retry(fast_retry(3))
}

/// Pipeline plus the hooks recording its activity.
pub fn recorded_pipeline(server: &MockServer) -> (Pipeline, Arc<RecordingHooks>) {
    let hooks = Arc::new(RecordingHooks::new());
    let pipeline = builder_for(server).hooks(hooks.clone()).build().expect("pipeline should build");
    (pipeline, hooks)
}

/// Account-scoped path on the mock server.
pub fn account_path(path: &str) -> String {
    format!("/{ACCOUNT}/{path}")
}
