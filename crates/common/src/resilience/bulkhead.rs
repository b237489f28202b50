//! Bulkhead limiting concurrent operations
//!
//! Permits are owned so they can travel with a request through the
//! pipeline and be released when the operation finishes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use super::{ResilienceConfigError, ResilienceError};

/// Configuration for bulkhead behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkheadConfig {
    /// Operations allowed to run at the same time
    pub max_concurrent: usize,
    /// How long a caller waits for a free slot; zero fails immediately
    pub max_wait: Duration,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self { max_concurrent: 10, max_wait: Duration::from_secs(5) }
    }
}

impl BulkheadConfig {
    pub fn builder() -> BulkheadConfigBuilder {
        BulkheadConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), ResilienceConfigError> {
        if self.max_concurrent == 0 {
            return Err(ResilienceConfigError::new("max_concurrent must be greater than 0"));
        }
        Ok(())
    }
}

/// Builder for [`BulkheadConfig`]
#[derive(Debug, Default)]
pub struct BulkheadConfigBuilder {
    config: BulkheadConfig,
}

impl BulkheadConfigBuilder {
    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.config.max_concurrent = max;
        self
    }

    pub fn max_wait(mut self, wait: Duration) -> Self {
        self.config.max_wait = wait;
        self
    }

    pub fn build(self) -> Result<BulkheadConfig, ResilienceConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Semaphore-backed concurrency limit
#[derive(Debug)]
pub struct Bulkhead {
    config: BulkheadConfig,
    semaphore: Arc<Semaphore>,
}

impl Bulkhead {
    pub fn new(config: BulkheadConfig) -> Result<Self, ResilienceConfigError> {
        config.validate()?;
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Ok(Self { config, semaphore })
    }

    /// Take a slot, waiting up to `max_wait` for one to free up
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, ResilienceError> {
        if self.config.max_wait.is_zero() {
            return self.try_acquire();
        }
        match tokio::time::timeout(self.config.max_wait, self.semaphore.clone().acquire_owned())
            .await
        {
            Ok(Ok(permit)) => Ok(permit),
            // Closed semaphore or timed out
            Ok(Err(_)) | Err(_) => {
                debug!(capacity = self.config.max_concurrent, "Bulkhead wait expired");
                Err(self.full())
            }
        }
    }

    /// Take a slot without waiting
    pub fn try_acquire(&self) -> Result<OwnedSemaphorePermit, ResilienceError> {
        self.semaphore.clone().try_acquire_owned().map_err(|_| self.full())
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_use(&self) -> usize {
        self.config.max_concurrent.saturating_sub(self.available())
    }

    pub fn capacity(&self) -> usize {
        self.config.max_concurrent
    }

    fn full(&self) -> ResilienceError {
        ResilienceError::BulkheadFull { capacity: self.config.max_concurrent }
    }
}
