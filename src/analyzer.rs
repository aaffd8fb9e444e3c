//! Per-chunk analysis against the reasoning service.
//!
//! [`ChunkAnalyzer::analyze`] sends one chunk with the mode's instruction,
//! validates the reply against the mode's schema and retries on failure.
//!
//! # Retry Strategy
//!
//! Validation failures and retryable service failures (429, 5xx, network
//! errors, unparseable replies) share one budget of `max_attempts`
//! invocations. Non-retryable failures (other 4xx, disabled provider) fail
//! at once. Between attempts the analyzer waits `retry_backoff_ms`,
//! doubling each time (capped at 2^5).
//!
//! # Rate Limiting
//!
//! - At most `max_concurrency` invocations are in flight at once.
//! - Consecutive invocations start at least `request_delay_ms` apart,
//!   across all tasks sharing the analyzer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::AnalyzerConfig;
use crate::error::{AnalysisError, ServiceError};
use crate::mode::AnalysisMode;
use crate::models::ChunkRecord;
use crate::reasoning::ReasoningService;

/// Scheduling and retry knobs. All delays may be zero.
#[derive(Debug, Clone)]
pub struct AnalyzerPolicy {
    pub max_attempts: u32,
    pub request_delay: Duration,
    pub retry_backoff: Duration,
    pub max_concurrency: usize,
}

impl AnalyzerPolicy {
    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            request_delay: Duration::from_millis(config.request_delay_ms),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    /// No delays; for tests and local stubs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            request_delay: Duration::ZERO,
            retry_backoff: Duration::ZERO,
            max_concurrency: 4,
        }
    }

    fn backoff(&self, failed_attempts: u32) -> Duration {
        self.retry_backoff * (1u32 << (failed_attempts - 1).min(5))
    }
}

enum AttemptFailure {
    Validation(String),
    Service(ServiceError),
}

pub struct ChunkAnalyzer {
    service: Arc<dyn ReasoningService>,
    policy: AnalyzerPolicy,
    permits: Semaphore,
    /// Earliest instant the next invocation may start.
    next_slot: Mutex<Instant>,
}

impl ChunkAnalyzer {
    pub fn new(service: Arc<dyn ReasoningService>, policy: AnalyzerPolicy) -> Self {
        Self {
            service,
            permits: Semaphore::new(policy.max_concurrency),
            policy,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    pub fn service_name(&self) -> &str {
        self.service.name()
    }

    pub fn max_concurrency(&self) -> usize {
        self.policy.max_concurrency
    }

    /// Analyze one chunk, returning a schema-valid record or an
    /// [`AnalysisError`] once the attempt budget is spent.
    pub async fn analyze(
        &self,
        chunk_text: &str,
        mode: AnalysisMode,
    ) -> Result<ChunkRecord, AnalysisError> {
        let mut last_failure = None;

        for attempt in 1..=self.policy.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.policy.backoff(attempt - 1)).await;
            }

            let reply = self.invoke(chunk_text, mode).await;
            let failure = match reply {
                Ok(value) => match mode.validate(&value) {
                    Ok(record) => return Ok(record),
                    Err(e) => AttemptFailure::Validation(e.0),
                },
                Err(e) if e.is_retryable() => AttemptFailure::Service(e),
                Err(e) => {
                    return Err(AnalysisError::Service {
                        attempts: attempt,
                        source: e,
                    })
                }
            };

            match &failure {
                AttemptFailure::Validation(reason) => {
                    warn!(attempt, mode = %mode, reason = %reason, "chunk record failed validation")
                }
                AttemptFailure::Service(e) => {
                    warn!(attempt, mode = %mode, error = %e, "reasoning service call failed")
                }
            }
            last_failure = Some(failure);
        }

        let attempts = self.policy.max_attempts;
        Err(match last_failure {
            Some(AttemptFailure::Validation(reason)) => AnalysisError::Validation { attempts, reason },
            Some(AttemptFailure::Service(source)) => AnalysisError::Service { attempts, source },
            None => AnalysisError::Validation {
                attempts,
                reason: "no attempt was made".to_string(),
            },
        })
    }

    async fn invoke(
        &self,
        chunk_text: &str,
        mode: AnalysisMode,
    ) -> Result<serde_json::Value, ServiceError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ServiceError::Transport("analyzer shut down".to_string()))?;
        self.wait_for_slot().await;
        debug!(service = self.service.name(), mode = %mode, bytes = chunk_text.len(), "invoking reasoning service");
        self.service
            .complete(mode.instruction(), chunk_text, mode)
            .await
    }

    async fn wait_for_slot(&self) {
        if self.policy.request_delay.is_zero() {
            return;
        }
        let start = {
            let mut next = self.next_slot.lock().await;
            let start = (*next).max(Instant::now());
            *next = start + self.policy.request_delay;
            start
        };
        tokio::time::sleep_until(start).await;
    }
}
